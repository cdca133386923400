mod device;
mod engine_base;
mod error;
mod graphics_event;
mod headless;
mod line_renderer;
pub mod render_states;
mod resources;
pub mod settings;
pub mod shader_manager;

use derive_new::new;
use getset::{CopyGetters, Getters};

pub use device::*;
pub use engine_base::EngineBase;
pub use error::{DeviceError, EngineError};
pub use graphics_event::GraphicsEventRecord;
pub use headless::{DeviceCall, HeadlessAnnotation, HeadlessDevice};
pub use line_renderer::LineRenderer;
pub use render_states::FixedFunctionState;
pub use resources::*;
pub use settings::EngineSettings;
pub use shader_manager::{Shader, ShaderManager};

use crate::AlphaBlendFunc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Initialized,
    InFrame,
    TornDown,
}

/// Text the game printed this frame, kept for the overlay.
#[derive(Clone, Debug, PartialEq, Eq, CopyGetters, Getters, new)]
pub struct TrackedText {
    #[get_copy = "pub"]
    x: i32,
    #[get_copy = "pub"]
    y: i32,
    #[get = "pub"]
    text: String,
}

/// Everything the hooks need from a renderer.
pub trait GraphicsEngine {
    fn init(&mut self) -> Result<(), EngineError>;
    /// Moves output to `window`; a different handle gets a new swap chain.
    fn set_window(&mut self, window: WindowHandle) -> Result<(), EngineError>;
    fn on_resize(&mut self, size: Int2) -> Result<(), EngineError>;
    fn set_window_mode(&mut self, mode: WindowMode) -> Result<(), EngineError>;
    fn window_mode(&self) -> WindowMode;

    fn on_begin_frame(&mut self) -> Result<(), EngineError>;
    fn on_end_frame(&mut self) -> Result<(), EngineError>;
    fn on_start_world_rendering(&mut self) -> Result<(), EngineError>;
    fn present(&mut self) -> Result<(), EngineError>;
    fn is_present_pending(&self) -> bool;
    fn reset_present_pending(&mut self);

    fn set_viewport(&mut self, viewport: &ViewportInfo);
    fn clear(&mut self, color: [f32; 4]);

    fn create_vertex_buffer(
        &mut self,
        size_in_bytes: usize,
        usage: BufferUsage,
        initial_data: Option<&[u8]>,
    ) -> Result<VertexBuffer, EngineError>;
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Texture, EngineError>;
    fn create_constant_buffer(
        &mut self,
        size_in_bytes: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<ConstantBuffer, EngineError>;
    fn create_shadowed_point_light(
        &mut self,
        light: VobLightInfo,
        dynamic: bool,
    ) -> Result<ShadowedPointLight, EngineError>;
    /// Frees a resource made by one of the `create_*` factories.
    fn release_resource(&mut self, resource: ResourceId);

    fn set_active_pixel_shader(&mut self, name: &str) -> Result<(), EngineError>;
    fn set_active_vertex_shader(&mut self, name: &str) -> Result<(), EngineError>;
    fn set_active_hd_shader(&mut self, name: &str) -> Result<(), EngineError>;
    fn set_active_g_shader(&mut self, name: &str) -> Result<(), EngineError>;
    fn unbind_active_ps(&mut self);

    fn fixed_function_state(&mut self) -> &mut FixedFunctionState;
    fn set_alpha_blend_func(&mut self, func: AlphaBlendFunc) {
        self.fixed_function_state().set_alpha_blend_func(func);
    }
    fn set_default_states(&mut self) -> Result<(), EngineError>;
    fn update_render_states(&mut self) -> Result<(), EngineError>;
    /// Uploads view/projection and the world matrix and binds both buffers.
    fn update_transforms_cb(&mut self) -> Result<(), EngineError>;
    fn setup_per_instance_constant_buffer(&mut self, slot: u32) -> Result<(), EngineError>;
    /// Binds states, transforms and active shaders for a draw of `ExVertex`
    /// geometry.
    fn setup_vs_ex_mesh_draw_call(&mut self) -> Result<(), EngineError>;
    fn bind_viewport_information(
        &mut self,
        stage: ShaderStage,
        shader: &str,
        slot: u32,
    ) -> Result<(), EngineError>;

    fn draw_vertex_array(
        &mut self,
        vertices: &[u8],
        num_vertices: u32,
        start_vertex: u32,
        stride: u32,
    ) -> Result<(), EngineError>;
    fn draw_vertex_array_mm(
        &mut self,
        vertices: &[u8],
        num_vertices: u32,
        start_vertex: u32,
        stride: u32,
    ) -> Result<(), EngineError> {
        self.draw_vertex_array(vertices, num_vertices, start_vertex, stride)
    }
    fn draw_vertex_buffer_ff(
        &mut self,
        vertex_buffer: &VertexBuffer,
        num_vertices: u32,
        start_vertex: u32,
        stride: u32,
    ) -> Result<(), EngineError>;

    fn line_renderer(&mut self) -> &mut LineRenderer;
    /// Draws and forgets the queued debug lines.
    fn flush_line_renderer(&mut self) -> Result<(), EngineError>;

    fn record_graphics_event(&self, label: &str) -> GraphicsEventRecord;

    fn display_mode_list(&self) -> &[DisplayModeInfo];
    fn graphics_device_name(&self) -> &str;
    fn resolution(&self) -> Int2;
    fn state(&self) -> EngineState;

    fn track_text(&mut self, text: TrackedText);
    fn tracked_texts(&self) -> &[TrackedText];
    fn save_screenshot(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn shutdown(&mut self);
}
