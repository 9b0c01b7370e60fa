//! cascade runtime (glow/OpenGL backend)
//
// This crate intentionally contains **only** the filter machine runtime:
// - compile/link filter shader programs
// - manage off-screen render targets (FBO + texture)
// - execute flattened filter chains pass by pass
//
// It does NOT contain windowing, file IO, pixel kernels, or host policy.
#![allow(clippy::missing_safety_doc)]

use glow::HasContext;

mod group;

pub use cascade_core::EngineError;
pub use group::{FilterGroup, TargetArena};

/// Offscreen render target (FBO + color texture).
#[derive(Debug)]
pub struct RenderTarget {
    pub fbo: glow::NativeFramebuffer,
    pub tex: glow::NativeTexture,
    pub w: i32,
    pub h: i32,
}

unsafe fn configure_bound_texture(gl: &glow::Context, w: i32, h: i32, pixels: Option<&[u8]>) {
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_MIN_FILTER,
        glow::LINEAR as i32,
    );
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_MAG_FILTER,
        glow::LINEAR as i32,
    );
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_WRAP_S,
        glow::CLAMP_TO_EDGE as i32,
    );
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_WRAP_T,
        glow::CLAMP_TO_EDGE as i32,
    );
    gl.tex_image_2d(
        glow::TEXTURE_2D,
        0,
        glow::RGBA8 as i32,
        w,
        h,
        0,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        pixels,
    );
}

/// Creates an off-screen render target: an RGBA8 texture (linear filtering,
/// clamp-to-edge) bound to its own framebuffer.
///
/// On any failure the objects created so far are deleted before the error is
/// returned; no half-bound target escapes.
pub unsafe fn create_render_target(
    gl: &glow::Context,
    w: i32,
    h: i32,
) -> Result<RenderTarget, EngineError> {
    let fbo = gl
        .create_framebuffer()
        .map_err(|e| EngineError::GlCreate(format!("create_framebuffer failed: {e:?}")))?;
    let tex = match gl.create_texture() {
        Ok(tex) => tex,
        Err(e) => {
            gl.delete_framebuffer(fbo);
            return Err(EngineError::GlCreate(format!(
                "create_texture failed: {e:?}"
            )));
        }
    };

    let ww = w.max(1);
    let hh = h.max(1);
    gl.bind_texture(glow::TEXTURE_2D, Some(tex));
    configure_bound_texture(gl, ww, hh, None);

    gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
    gl.framebuffer_texture_2d(
        glow::FRAMEBUFFER,
        glow::COLOR_ATTACHMENT0,
        glow::TEXTURE_2D,
        Some(tex),
        0,
    );

    let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
    gl.bind_framebuffer(glow::FRAMEBUFFER, None);
    gl.bind_texture(glow::TEXTURE_2D, None);

    if status != glow::FRAMEBUFFER_COMPLETE {
        gl.delete_framebuffer(fbo);
        gl.delete_texture(tex);
        return Err(EngineError::GlCreate(format!(
            "framebuffer incomplete: 0x{status:x}"
        )));
    }

    Ok(RenderTarget {
        fbo,
        tex,
        w: ww,
        h: hh,
    })
}

/// Creates a plain RGBA8 texture (linear filtering, clamp-to-edge), optionally
/// uploading initial pixel data. Useful for host-provided source images.
pub unsafe fn create_texture_rgba8(
    gl: &glow::Context,
    w: i32,
    h: i32,
    pixels: Option<&[u8]>,
) -> Result<glow::NativeTexture, EngineError> {
    let tex = gl
        .create_texture()
        .map_err(|e| EngineError::GlCreate(format!("create_texture failed: {e:?}")))?;
    gl.bind_texture(glow::TEXTURE_2D, Some(tex));
    configure_bound_texture(gl, w.max(1), h.max(1), pixels);
    gl.bind_texture(glow::TEXTURE_2D, None);
    Ok(tex)
}

pub unsafe fn compile_program(
    gl: &glow::Context,
    vert_src: &str,
    frag_src: &str,
) -> Result<glow::NativeProgram, EngineError> {
    let vs = gl
        .create_shader(glow::VERTEX_SHADER)
        .map_err(|e| EngineError::GlCreate(format!("create_shader(VS) failed: {e:?}")))?;
    gl.shader_source(vs, vert_src);
    gl.compile_shader(vs);
    if !gl.get_shader_compile_status(vs) {
        let log = gl.get_shader_info_log(vs);
        gl.delete_shader(vs);
        return Err(EngineError::VertexCompile(log));
    }

    let fs = gl
        .create_shader(glow::FRAGMENT_SHADER)
        .map_err(|e| EngineError::GlCreate(format!("create_shader(FS) failed: {e:?}")))?;
    gl.shader_source(fs, frag_src);
    gl.compile_shader(fs);
    if !gl.get_shader_compile_status(fs) {
        let log = gl.get_shader_info_log(fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        return Err(EngineError::FragmentCompile(log));
    }

    let program = gl
        .create_program()
        .map_err(|e| EngineError::GlCreate(format!("create_program failed: {e:?}")))?;
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(EngineError::Link(log));
    }

    Ok(program)
}

#[derive(Debug)]
pub struct ShaderProgram {
    pub program: glow::NativeProgram,
}

impl ShaderProgram {
    pub unsafe fn new(
        gl: &glow::Context,
        vert_src: &str,
        frag_src: &str,
    ) -> Result<Self, EngineError> {
        let program = compile_program(gl, vert_src, frag_src)?;
        Ok(Self { program })
    }

    pub unsafe fn destroy(&mut self, gl: &glow::Context) {
        gl.delete_program(self.program);
    }
}

/// A leaf image-processing pass.
///
/// A filter samples one input texture and writes into whatever destination
/// the caller has bound; it must never rebind the destination itself.
/// Coordinate buffers are 4-vertex triangle strips (x,y interleaved).
pub trait Filter {
    /// One-time GPU resource setup. Must be a no-op when already initialized.
    unsafe fn init(&mut self, gl: &glow::Context) -> Result<(), EngineError>;

    fn is_initialized(&self) -> bool;

    /// Initializes on first use only.
    unsafe fn ensure_init(&mut self, gl: &glow::Context) -> Result<(), EngineError> {
        if !self.is_initialized() {
            self.init(gl)?;
        }
        Ok(())
    }

    /// Recomputes any size-dependent state. Called on every leaf before the
    /// first draw at a new size.
    unsafe fn resize(&mut self, gl: &glow::Context, width: i32, height: i32);

    unsafe fn draw(
        &mut self,
        gl: &glow::Context,
        input: glow::NativeTexture,
        quad: &[f32; 8],
        tex_coords: &[f32; 8],
    ) -> Result<(), EngineError>;

    /// Supplies (or clears) the saved-state texture for two-input filters.
    /// Single-input filters ignore it.
    fn set_secondary_texture(&mut self, tex: Option<glow::NativeTexture>) {
        let _ = tex;
    }

    /// Releases all GPU resources. Safe to call once.
    unsafe fn destroy(&mut self, gl: &glow::Context);
}

/// A 4-vertex quad with per-draw position and texture coordinate upload.
///
/// Filters own one of these; the chain executor decides which coordinate
/// buffers each pass draws with.
#[derive(Debug)]
pub struct QuadGeometry {
    vao: glow::NativeVertexArray,
    pos_vbo: glow::NativeBuffer,
    uv_vbo: glow::NativeBuffer,
}

const QUAD_BYTES: i32 = (8 * std::mem::size_of::<f32>()) as i32;

impl QuadGeometry {
    pub unsafe fn new(gl: &glow::Context) -> Result<Self, EngineError> {
        let vao = gl
            .create_vertex_array()
            .map_err(|e| EngineError::GlCreate(format!("create_vertex_array: {e}")))?;
        let pos_vbo = gl
            .create_buffer()
            .map_err(|e| EngineError::GlCreate(format!("create_buffer: {e}")))?;
        let uv_vbo = gl
            .create_buffer()
            .map_err(|e| EngineError::GlCreate(format!("create_buffer: {e}")))?;

        gl.bind_vertex_array(Some(vao));

        gl.bind_buffer(glow::ARRAY_BUFFER, Some(pos_vbo));
        gl.buffer_data_size(glow::ARRAY_BUFFER, QUAD_BYTES, glow::DYNAMIC_DRAW);
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 2 * 4, 0);

        gl.bind_buffer(glow::ARRAY_BUFFER, Some(uv_vbo));
        gl.buffer_data_size(glow::ARRAY_BUFFER, QUAD_BYTES, glow::DYNAMIC_DRAW);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, 2 * 4, 0);

        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        gl.bind_vertex_array(None);

        Ok(Self {
            vao,
            pos_vbo,
            uv_vbo,
        })
    }

    pub unsafe fn draw(&self, gl: &glow::Context, quad: &[f32; 8], tex_coords: &[f32; 8]) {
        gl.bind_vertex_array(Some(self.vao));

        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.pos_vbo));
        gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, bytemuck::cast_slice(quad));
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.uv_vbo));
        gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, bytemuck::cast_slice(tex_coords));
        gl.bind_buffer(glow::ARRAY_BUFFER, None);

        gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        gl.bind_vertex_array(None);
    }

    pub unsafe fn destroy(&mut self, gl: &glow::Context) {
        gl.delete_vertex_array(self.vao);
        gl.delete_buffer(self.pos_vbo);
        gl.delete_buffer(self.uv_vbo);
    }
}
