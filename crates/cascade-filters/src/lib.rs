#![allow(clippy::missing_safety_doc)]

//! Built-in leaf filters for cascade chains.
//!
//! Small reusable passes on top of the glow runtime: the generic single-input
//! shader filter (with a passthrough and a BGRA-swap preset) and the
//! two-input normal-blend filter that consumes saved chain state.

use glow::HasContext;

use cascade_runtime_glow::{compile_program, EngineError, Filter, QuadGeometry};

pub const FILTER_VERT: &str = r#"#version 330 core
layout (location = 0) in vec2 a_pos;
layout (location = 1) in vec2 a_uv;
out vec2 v_uv;
void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_pos, 0.0, 1.0);
}
"#;

pub const PASSTHROUGH_FRAG: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 fragColor;

uniform sampler2D uInput0;

void main() {
    fragColor = texture(uInput0, v_uv);
}
"#;

pub const BGRA_SWAP_FRAG: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 fragColor;

uniform sampler2D uInput0;

void main() {
    vec4 c = texture(uInput0, v_uv);
    fragColor = vec4(c.b, c.g, c.r, c.a);
}
"#;

pub const NORMAL_BLEND_FRAG: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 fragColor;

uniform sampler2D uInput0;
uniform sampler2D uInput1;
uniform float uHasSecondary;

void main() {
    vec4 base = texture(uInput0, v_uv);
    vec4 overlay = texture(uInput1, v_uv) * uHasSecondary;
    vec3 rgb = overlay.rgb * overlay.a + base.rgb * (1.0 - overlay.a);
    float a = overlay.a + base.a * (1.0 - overlay.a);
    fragColor = vec4(rgb, a);
}
"#;

/// The universal single-input pass: one shader program sampling `uInput0`
/// over a full quad. GPU resources are created lazily on first init.
#[derive(Debug)]
pub struct ShaderFilter {
    vert: String,
    frag: String,
    program: Option<glow::NativeProgram>,
    quad: Option<QuadGeometry>,
    width: i32,
    height: i32,
}

impl ShaderFilter {
    pub fn new(vert: impl Into<String>, frag: impl Into<String>) -> Self {
        Self {
            vert: vert.into(),
            frag: frag.into(),
            program: None,
            quad: None,
            width: 0,
            height: 0,
        }
    }

    /// Reproduces its input unchanged. Save markers draw with one of these.
    pub fn passthrough() -> Self {
        Self::new(FILTER_VERT, PASSTHROUGH_FRAG)
    }

    /// Swaps the red and blue channels.
    pub fn bgra_swap() -> Self {
        Self::new(FILTER_VERT, BGRA_SWAP_FRAG)
    }
}

impl Filter for ShaderFilter {
    unsafe fn init(&mut self, gl: &glow::Context) -> Result<(), EngineError> {
        if self.program.is_some() {
            return Ok(());
        }
        let program = compile_program(gl, &self.vert, &self.frag)?;
        let quad = match QuadGeometry::new(gl) {
            Ok(quad) => quad,
            Err(e) => {
                gl.delete_program(program);
                return Err(e);
            }
        };
        self.program = Some(program);
        self.quad = Some(quad);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.program.is_some()
    }

    unsafe fn resize(&mut self, _gl: &glow::Context, width: i32, height: i32) {
        self.width = width;
        self.height = height;
    }

    unsafe fn draw(
        &mut self,
        gl: &glow::Context,
        input: glow::NativeTexture,
        quad: &[f32; 8],
        tex_coords: &[f32; 8],
    ) -> Result<(), EngineError> {
        let (Some(program), Some(geometry)) = (self.program, self.quad.as_ref()) else {
            return Err(EngineError::other("ShaderFilter::draw called before init"));
        };

        gl.use_program(Some(program));
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, Some(input));
        if let Some(loc) = gl.get_uniform_location(program, "uInput0") {
            gl.uniform_1_i32(Some(&loc), 0);
        }
        if let Some(loc) = gl.get_uniform_location(program, "uResolution") {
            gl.uniform_2_f32(Some(&loc), self.width as f32, self.height as f32);
        }

        geometry.draw(gl, quad, tex_coords);

        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(())
    }

    unsafe fn destroy(&mut self, gl: &glow::Context) {
        if let Some(program) = self.program.take() {
            gl.delete_program(program);
        }
        if let Some(mut quad) = self.quad.take() {
            quad.destroy(gl);
        }
    }
}

/// Two-input blend: pastes the saved-state texture over the live input with
/// source-over compositing. With no secondary bound it reproduces its input
/// pixel for pixel.
#[derive(Debug, Default)]
pub struct NormalBlendFilter {
    program: Option<glow::NativeProgram>,
    quad: Option<QuadGeometry>,
    secondary: Option<glow::NativeTexture>,
}

impl NormalBlendFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for NormalBlendFilter {
    unsafe fn init(&mut self, gl: &glow::Context) -> Result<(), EngineError> {
        if self.program.is_some() {
            return Ok(());
        }
        let program = compile_program(gl, FILTER_VERT, NORMAL_BLEND_FRAG)?;
        let quad = match QuadGeometry::new(gl) {
            Ok(quad) => quad,
            Err(e) => {
                gl.delete_program(program);
                return Err(e);
            }
        };
        self.program = Some(program);
        self.quad = Some(quad);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.program.is_some()
    }

    unsafe fn resize(&mut self, _gl: &glow::Context, _width: i32, _height: i32) {}

    fn set_secondary_texture(&mut self, tex: Option<glow::NativeTexture>) {
        self.secondary = tex;
    }

    unsafe fn draw(
        &mut self,
        gl: &glow::Context,
        input: glow::NativeTexture,
        quad: &[f32; 8],
        tex_coords: &[f32; 8],
    ) -> Result<(), EngineError> {
        let (Some(program), Some(geometry)) = (self.program, self.quad.as_ref()) else {
            return Err(EngineError::other(
                "NormalBlendFilter::draw called before init",
            ));
        };

        gl.use_program(Some(program));

        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, Some(input));
        if let Some(loc) = gl.get_uniform_location(program, "uInput0") {
            gl.uniform_1_i32(Some(&loc), 0);
        }

        gl.active_texture(glow::TEXTURE1);
        gl.bind_texture(glow::TEXTURE_2D, self.secondary);
        if let Some(loc) = gl.get_uniform_location(program, "uInput1") {
            gl.uniform_1_i32(Some(&loc), 1);
        }
        if let Some(loc) = gl.get_uniform_location(program, "uHasSecondary") {
            gl.uniform_1_f32(Some(&loc), if self.secondary.is_some() { 1.0 } else { 0.0 });
        }

        geometry.draw(gl, quad, tex_coords);

        gl.bind_texture(glow::TEXTURE_2D, None);
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(())
    }

    unsafe fn destroy(&mut self, gl: &glow::Context) {
        if let Some(program) = self.program.take() {
            gl.delete_program(program);
        }
        if let Some(mut quad) = self.quad.take() {
            quad.destroy(gl);
        }
        self.secondary = None;
    }
}

/// Maps chain-description kind names to built-in filters.
///
/// The names `"save"` and `"blend"` come from the chain description format;
/// `"passthrough"` and `"bgra"` are the built-in leaves. Returns `None` for
/// unknown kinds so hosts can layer their own filters on top.
pub fn builtin_filter(kind: &str) -> Option<Box<dyn Filter>> {
    match kind {
        "passthrough" | "save" => Some(Box::new(ShaderFilter::passthrough())),
        "bgra" => Some(Box::new(ShaderFilter::bgra_swap())),
        "blend" => Some(Box::new(NormalBlendFilter::new())),
        _ => None,
    }
}
