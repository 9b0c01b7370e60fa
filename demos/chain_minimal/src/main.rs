//! Minimal on-screen filter chain:
//! checkerboard source -> alpha fade -> save "base" -> invert -> blend "base".
//!
//! The four-pass chain exercises nested composition, the save/blend pair, and
//! the final-pass flip parity in one window.

use cascade_chain::coords::{CANONICAL_QUAD, CANONICAL_TEX};
use cascade_chain::{ChainNode, StateTag};
use cascade_core::EngineError;
use cascade_filters::{NormalBlendFilter, ShaderFilter, FILTER_VERT};
use cascade_runtime_glow::{create_texture_rgba8, FilterGroup};

use raw_window_handle::HasRawWindowHandle;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use glutin::config::ConfigTemplateBuilder;
use glutin::config::GlConfig;
use glutin::context::{
    ContextApi, ContextAttributesBuilder, NotCurrentGlContextSurfaceAccessor, Version,
};
use glutin::display::GetGlDisplay;
use glutin::display::GlDisplay;
use glutin::prelude::GlSurface;
use glutin::surface::{SurfaceAttributesBuilder, SwapInterval, WindowSurface};

const SOURCE_SIZE: i32 = 512;

/// Keeps the color but ramps alpha left to right, so the saved state blends
/// back in as a horizontal crossfade.
const ALPHA_FADE_FRAG: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 fragColor;

uniform sampler2D uInput0;

void main() {
    vec4 c = texture(uInput0, v_uv);
    fragColor = vec4(c.rgb, v_uv.x);
}
"#;

const INVERT_FRAG: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 fragColor;

uniform sampler2D uInput0;

void main() {
    vec4 c = texture(uInput0, v_uv);
    fragColor = vec4(vec3(1.0) - c.rgb, c.a);
}
"#;

fn checkerboard_rgba(size: i32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let on = ((x / 32) + (y / 32)) % 2 == 0;
            if on {
                pixels.extend_from_slice(&[230, 90, 40, 255]);
            } else {
                pixels.extend_from_slice(&[30, 60, 160, 255]);
            }
        }
    }
    pixels
}

fn build_chain() -> FilterGroup {
    FilterGroup::with_nodes(vec![
        ChainNode::Filter(Box::new(ShaderFilter::new(FILTER_VERT, ALPHA_FADE_FRAG))),
        ChainNode::SaveMarker {
            tag: StateTag::new("base"),
            filter: Box::new(ShaderFilter::passthrough()),
        },
        ChainNode::Filter(Box::new(ShaderFilter::new(FILTER_VERT, INVERT_FRAG))),
        ChainNode::Blend {
            tag: StateTag::new("base"),
            filter: Box::new(NormalBlendFilter::new()),
        },
    ])
}

fn main() -> Result<(), EngineError> {
    // --- Window / GL context ---
    let event_loop = EventLoop::new();
    let window_builder = WindowBuilder::new()
        .with_title("cascade chain_minimal")
        .with_inner_size(winit::dpi::LogicalSize::new(960.0, 540.0));

    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(8)
        .with_depth_size(0)
        .with_stencil_size(0)
        .with_transparency(false);

    let display_builder =
        glutin_winit::DisplayBuilder::new().with_window_builder(Some(window_builder));

    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| {
            configs
                .reduce(|accum, config| {
                    if config.num_samples() > accum.num_samples() {
                        config
                    } else {
                        accum
                    }
                })
                .unwrap()
        })
        .map_err(|e| EngineError::GlCreate(format!("DisplayBuilder.build: {e}")))?;

    let window = window.unwrap();

    let raw_window_handle = window.raw_window_handle();

    let gl_display = gl_config.display();
    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .build(Some(raw_window_handle));

    let not_current = unsafe { gl_display.create_context(&gl_config, &context_attributes) }
        .map_err(|e| EngineError::GlCreate(format!("create_context: {e}")))?;

    let (width, height): (u32, u32) = window.inner_size().into();

    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        std::num::NonZeroU32::new(width.max(1)).unwrap(),
        std::num::NonZeroU32::new(height.max(1)).unwrap(),
    );

    let gl_surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs) }
        .map_err(|e| EngineError::GlCreate(format!("create_window_surface: {e}")))?;

    let gl_context = not_current
        .make_current(&gl_surface)
        .map_err(|e| EngineError::GlCreate(format!("make_current: {e}")))?;

    gl_surface
        .set_swap_interval(
            &gl_context,
            SwapInterval::Wait(std::num::NonZeroU32::new(1).unwrap()),
        )
        .ok();

    let gl = unsafe {
        glow::Context::from_loader_function(|s| {
            gl_display.get_proc_address(std::ffi::CString::new(s).unwrap().as_c_str()) as *const _
        })
    };

    // --- Source texture + chain ---
    let pattern = checkerboard_rgba(SOURCE_SIZE);
    let source =
        unsafe { create_texture_rgba8(&gl, SOURCE_SIZE, SOURCE_SIZE, Some(&pattern))? };

    let mut group = build_chain();
    unsafe {
        group.init(&gl)?;
        group.resize(&gl, width.max(1) as i32, height.max(1) as i32)?;
    }

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                WindowEvent::Resized(size) => {
                    let w = size.width.max(1);
                    let h = size.height.max(1);
                    gl_surface.resize(
                        &gl_context,
                        std::num::NonZeroU32::new(w).unwrap(),
                        std::num::NonZeroU32::new(h).unwrap(),
                    );
                    unsafe {
                        if let Err(e) = group.resize(&gl, w as i32, h as i32) {
                            eprintln!("group resize error: {e}");
                        }
                    }
                }
                _ => {}
            },

            Event::RedrawRequested(_) => unsafe {
                // The window framebuffer is the final destination; the source
                // is already upright, so canonical coordinates serve as the
                // caller-supplied buffers.
                match group.draw(&gl, source, None, &CANONICAL_QUAD, &CANONICAL_TEX) {
                    Ok(()) => {}
                    Err(e) => eprintln!("chain draw error: {e}"),
                }

                gl_surface.swap_buffers(&gl_context).unwrap();
            },

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}
