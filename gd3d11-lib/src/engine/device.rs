use std::rc::Rc;

use super::{
    error::DeviceError,
    render_states::{BlendStateDesc, DepthStencilStateDesc, RasterizerStateDesc},
};

/// Opaque handle of an object living on the GPU device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Int2 {
    pub x: i32,
    pub y: i32,
}

impl Int2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Native window handle of the host's main window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowHandle(pub usize);

/// How the swap chain is shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WindowMode {
    FullscreenExclusive,
    FullscreenBorderless,
    FullscreenLowRes,
    #[default]
    Windowed,
}

impl WindowMode {
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::FullscreenExclusive | Self::FullscreenLowRes)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    LineList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DisplayModeInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportInfo {
    pub top_left_x: u32,
    pub top_left_y: u32,
    pub width: u32,
    pub height: u32,
    pub min_z: f32,
    pub max_z: f32,
}

impl ViewportInfo {
    pub fn full(size: Int2) -> Self {
        Self {
            top_left_x: 0,
            top_left_y: 0,
            width: size.x as u32,
            height: size.y as u32,
            min_z: 0.0,
            max_z: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Constant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferUsage {
    #[default]
    Default,
    /// CPU writable every frame.
    Dynamic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub kind: BufferKind,
    pub usage: BufferUsage,
    pub size_in_bytes: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Rgba16Float,
    R32Float,
    D32Float,
    Bc1,
    Bc2,
    Bc3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTargetKind {
    /// View onto the swap chain's back buffer.
    Backbuffer,
    Hdr,
    DepthStencil,
    ShadowCube,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub kind: RenderTargetKind,
    pub size: Int2,
    pub format: TextureFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    HullDomain,
    Geometry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderDesc {
    pub name: &'static str,
    pub stage: ShaderStage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderMacro {
    pub name: String,
    pub definition: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
    Point,
    Linear,
    #[default]
    Anisotropic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub wrap: bool,
    pub max_anisotropy: u32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Anisotropic,
            wrap: true,
            max_anisotropy: 16,
        }
    }
}

/// Named profiling regions on the GPU command stream.
pub trait UserAnnotation {
    fn begin_event(&self, label: &str);
    fn end_event(&self);
}

/// The graphics device capability the engine draws through.
///
/// Implementations wrap one GPU API. All calls happen on the render thread.
pub trait GpuDevice {
    /// Creates the device and returns the adapter description.
    fn create_device(&mut self) -> Result<String, DeviceError>;
    fn display_modes(&self) -> Vec<DisplayModeInfo>;
    fn user_annotation(&self) -> Option<Rc<dyn UserAnnotation>>;

    fn create_swap_chain(
        &mut self,
        window: WindowHandle,
        size: Int2,
        vsync: bool,
    ) -> Result<(), DeviceError>;
    /// All views onto the old back buffer must be released before this call.
    fn resize_swap_chain(&mut self, size: Int2) -> Result<(), DeviceError>;
    /// Same precondition as `resize_swap_chain`.
    fn release_swap_chain(&mut self);
    fn set_fullscreen_state(&mut self, exclusive: bool) -> Result<(), DeviceError>;

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<ResourceId, DeviceError>;
    fn create_buffer(
        &mut self,
        desc: &BufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceId, DeviceError>;
    fn update_buffer(&mut self, buffer: ResourceId, data: &[u8]) -> Result<(), DeviceError>;
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<ResourceId, DeviceError>;
    fn create_sampler_state(&mut self, desc: &SamplerDesc) -> Result<ResourceId, DeviceError>;
    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerStateDesc,
    ) -> Result<ResourceId, DeviceError>;
    fn create_blend_state(&mut self, desc: &BlendStateDesc) -> Result<ResourceId, DeviceError>;
    fn create_depth_stencil_state(
        &mut self,
        desc: &DepthStencilStateDesc,
    ) -> Result<ResourceId, DeviceError>;
    fn compile_shader(
        &mut self,
        desc: &ShaderDesc,
        macros: &[ShaderMacro],
    ) -> Result<ResourceId, DeviceError>;
    fn release(&mut self, resource: ResourceId);

    fn bind_render_target(&mut self, target: ResourceId, depth: Option<ResourceId>);
    fn bind_rasterizer_state(&mut self, state: ResourceId);
    fn bind_blend_state(&mut self, state: ResourceId);
    fn bind_depth_stencil_state(&mut self, state: ResourceId);
    fn bind_sampler(&mut self, slot: u32, sampler: ResourceId);
    fn bind_shader(&mut self, stage: ShaderStage, shader: Option<ResourceId>);
    fn bind_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: ResourceId);
    fn bind_vertex_buffer(&mut self, buffer: ResourceId, stride: u32, offset: u32);
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    fn set_viewport(&mut self, viewport: &ViewportInfo);
    fn clear_render_target(&mut self, target: ResourceId, color: [f32; 4]);
    fn clear_depth_stencil(&mut self, depth: ResourceId, depth_value: f32);
    fn draw(&mut self, vertex_count: u32, start_vertex: u32);
    fn present(&mut self, sync_interval: u32) -> Result<(), DeviceError>;
}
