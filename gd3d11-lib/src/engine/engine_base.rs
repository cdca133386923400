use std::{
    collections::HashMap,
    rc::{Rc, Weak},
};

use bytemuck::{bytes_of, cast_slice, Pod, Zeroable};
use tracing::{debug, info, trace, warn};

use super::{
    device::*,
    error::EngineError,
    graphics_event::GraphicsEventRecord,
    line_renderer::LineRenderer,
    render_states::{
        BlendStateDesc, DepthStencilStateDesc, FixedFunctionState, PerInstanceConstantBuffer,
        RasterizerStateDesc, StateCache, TransformsConstantBuffer,
    },
    resources::*,
    settings::{construct_shader_macro_list, EngineSettings},
    shader_manager::{Shader, ShaderManager, DEFAULT_SHADERS, PS_SIMPLE, VS_EX},
    EngineState, GraphicsEngine, TrackedText,
};

const DEFAULT_RESOLUTION: Int2 = Int2::new(800, 600);
const TRANSFORMS_CB_SLOT: u32 = 0;
const PER_INSTANCE_CB_SLOT: u32 = 1;
const EX_VERTEX_STRIDE: u32 = std::mem::size_of::<ExVertex>() as u32;

/// Bytes covered by `num_vertices` vertices starting at `start_vertex`.
fn required_bytes(num_vertices: u32, start_vertex: u32, stride: u32) -> Option<usize> {
    (start_vertex as usize)
        .checked_add(num_vertices as usize)?
        .checked_mul(stride as usize)
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
struct ViewportConstantBuffer {
    position: [f32; 2],
    size: [f32; 2],
}

unsafe impl Pod for ViewportConstantBuffer {}
unsafe impl Zeroable for ViewportConstantBuffer {}

#[derive(Default)]
struct SizeDependentResources {
    backbuffer: Option<RenderTarget>,
    depth_stencil: Option<RenderTarget>,
    hdr: Option<RenderTarget>,
}

impl SizeDependentResources {
    fn take_all(&mut self) -> impl Iterator<Item = RenderTarget> {
        [
            self.backbuffer.take(),
            self.depth_stencil.take(),
            self.hdr.take(),
        ]
        .into_iter()
        .flatten()
    }
}

/// The backend independent part of the renderer.
pub struct EngineBase<D: GpuDevice> {
    device: D,
    settings: EngineSettings,
    state: EngineState,
    device_name: String,
    display_modes: Vec<DisplayModeInfo>,
    annotation: Option<Rc<dyn UserAnnotation>>,

    window: Option<WindowHandle>,
    window_mode: WindowMode,
    resolution: Int2,
    targets: SizeDependentResources,

    shader_manager: ShaderManager,
    active_shaders: HashMap<ShaderStage, Weak<Shader>>,

    ff_state: FixedFunctionState,
    rasterizer_states: StateCache<RasterizerStateDesc>,
    blend_states: StateCache<BlendStateDesc>,
    depth_stencil_states: StateCache<DepthStencilStateDesc>,

    default_sampler: Option<ResourceId>,
    transforms_cb: Option<ConstantBuffer>,
    per_instance_cb: Option<ConstantBuffer>,
    viewport_cb: Option<ConstantBuffer>,
    scratch_vb: Option<VertexBuffer>,
    line_renderer: LineRenderer,

    present_pending: bool,
    tracked_texts: Vec<TrackedText>,
}

impl<D: GpuDevice> EngineBase<D> {
    pub fn new(device: D, settings: EngineSettings) -> Self {
        let resolution = settings
            .resolution_override
            .map(|[x, y]| Int2::new(x, y))
            .unwrap_or(DEFAULT_RESOLUTION);
        Self {
            device,
            settings,
            state: EngineState::Uninitialized,
            device_name: String::new(),
            display_modes: Vec::new(),
            annotation: None,
            window: None,
            window_mode: WindowMode::default(),
            resolution,
            targets: SizeDependentResources::default(),
            shader_manager: ShaderManager::new(),
            active_shaders: HashMap::new(),
            ff_state: FixedFunctionState::default(),
            rasterizer_states: StateCache::new(),
            blend_states: StateCache::new(),
            depth_stencil_states: StateCache::new(),
            default_sampler: None,
            transforms_cb: None,
            per_instance_cb: None,
            viewport_cb: None,
            scratch_vb: None,
            line_renderer: LineRenderer::new(),
            present_pending: false,
            tracked_texts: Vec::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn scratch_vertex_buffer(&self) -> Option<&VertexBuffer> {
        self.scratch_vb.as_ref()
    }

    pub fn backbuffer(&self) -> Option<&RenderTarget> {
        self.targets.backbuffer.as_ref()
    }

    pub fn active_shader(&self, stage: ShaderStage) -> Option<Rc<Shader>> {
        self.active_shaders.get(&stage).and_then(Weak::upgrade)
    }

    fn ensure_initialized(&self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Initialized | EngineState::InFrame => Ok(()),
            EngineState::Uninitialized | EngineState::TornDown => {
                Err(EngineError::NotInitialized)
            }
        }
    }

    fn create_buffer(
        &mut self,
        kind: BufferKind,
        usage: BufferUsage,
        size_in_bytes: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceId, EngineError> {
        let desc = BufferDesc {
            kind,
            usage,
            size_in_bytes,
        };
        Ok(self.device.create_buffer(&desc, initial_data)?)
    }

    fn create_size_dependent_resources(&mut self) -> Result<(), EngineError> {
        let size = self.resolution;
        let mut create = |kind, format| -> Result<_, EngineError> {
            let desc = RenderTargetDesc { kind, size, format };
            Ok(Some(RenderTarget::new(
                self.device.create_render_target(&desc)?,
                desc,
            )))
        };
        let backbuffer = create(RenderTargetKind::Backbuffer, TextureFormat::Rgba8)?;
        let depth_stencil = create(RenderTargetKind::DepthStencil, TextureFormat::D32Float)?;
        let hdr = create(RenderTargetKind::Hdr, TextureFormat::Rgba16Float)?;
        self.targets = SizeDependentResources {
            backbuffer,
            depth_stencil,
            hdr,
        };
        self.bind_backbuffer();
        self.device.set_viewport(&ViewportInfo::full(size));
        Ok(())
    }

    fn release_size_dependent_resources(&mut self) {
        for target in self.targets.take_all() {
            self.device.release(target.id());
        }
    }

    fn bind_backbuffer(&mut self) {
        if let Some(backbuffer) = &self.targets.backbuffer {
            let depth = self.targets.depth_stencil.as_ref().map(|d| d.id());
            self.device.bind_render_target(backbuffer.id(), depth);
        }
    }

    /// Makes sure the scratch buffer holds at least `size` bytes.
    fn ensure_scratch_capacity(&mut self, size: usize) -> Result<VertexBuffer, EngineError> {
        if let Some(scratch) = self.scratch_vb {
            if scratch.size_in_bytes() >= size {
                return Ok(scratch);
            }
            self.scratch_vb = None;
            self.device.release(scratch.id());
        }
        let new_size = size.max(self.settings.scratch_vertex_buffer_size).next_power_of_two();
        let id = self.create_buffer(BufferKind::Vertex, BufferUsage::Dynamic, new_size, None)?;
        debug!("scratch vertex buffer is now {} bytes", new_size);
        let scratch = VertexBuffer::new(id, new_size, BufferUsage::Dynamic);
        self.scratch_vb = Some(scratch);
        Ok(scratch)
    }

    fn set_active_shader(&mut self, stage: ShaderStage, name: &str) -> Result<(), EngineError> {
        let shader = self.shader_manager.get(stage, name)?;
        self.active_shaders.insert(stage, Rc::downgrade(&shader));
        Ok(())
    }

    fn bind_active_shaders(&mut self) -> Result<(), EngineError> {
        for stage in [ShaderStage::Vertex, ShaderStage::Pixel] {
            let shader = self
                .active_shader(stage)
                .ok_or(EngineError::NoActiveShader(stage))?;
            self.device.bind_shader(stage, Some(shader.id()));
        }
        for stage in [ShaderStage::HullDomain, ShaderStage::Geometry] {
            let shader = self.active_shader(stage).map(|shader| shader.id());
            self.device.bind_shader(stage, shader);
        }
        Ok(())
    }

    /// Everything `init` creates after the device itself.
    fn init_resources(&mut self) -> Result<(), EngineError> {
        let sampler = self.device.create_sampler_state(&SamplerDesc::default())?;
        self.default_sampler = Some(sampler);
        self.device.bind_sampler(0, sampler);

        let macros = construct_shader_macro_list(&self.settings);
        self.shader_manager
            .compile_all(&mut self.device, DEFAULT_SHADERS, &macros)?;

        let transforms_cb = self.create_constant_buffer(
            std::mem::size_of::<TransformsConstantBuffer>(),
            None,
        )?;
        self.transforms_cb = Some(transforms_cb);
        let per_instance_cb =
            self.create_constant_buffer(std::mem::size_of::<PerInstanceConstantBuffer>(), None)?;
        self.per_instance_cb = Some(per_instance_cb);
        let viewport_cb =
            self.create_constant_buffer(std::mem::size_of::<ViewportConstantBuffer>(), None)?;
        self.viewport_cb = Some(viewport_cb);
        self.ensure_scratch_capacity(self.settings.scratch_vertex_buffer_size)?;

        self.state = EngineState::Initialized;
        self.set_default_states()
    }

    fn draw_lines(&mut self, lines: &LineRenderer) -> Result<(), EngineError> {
        self.set_active_shader(ShaderStage::Vertex, VS_EX)?;
        self.set_active_shader(ShaderStage::Pixel, PS_SIMPLE)?;
        self.device.set_primitive_topology(PrimitiveTopology::LineList);
        let result = self.draw_vertex_array(
            cast_slice(lines.vertices()),
            lines.vertices().len() as u32,
            0,
            EX_VERTEX_STRIDE,
        );
        self.device
            .set_primitive_topology(PrimitiveTopology::TriangleList);
        result
    }

    /// Releases every device object the engine created for itself.
    fn release_owned_resources(&mut self) {
        self.active_shaders.clear();
        self.release_size_dependent_resources();
        let owned = [
            self.scratch_vb.take().map(|vb| vb.id()),
            self.transforms_cb.take().map(|cb| cb.id()),
            self.per_instance_cb.take().map(|cb| cb.id()),
            self.viewport_cb.take().map(|cb| cb.id()),
            self.default_sampler.take(),
        ];
        for id in owned.into_iter().flatten() {
            self.device.release(id);
        }
        let states: Vec<_> = self
            .rasterizer_states
            .drain()
            .chain(self.blend_states.drain())
            .chain(self.depth_stencil_states.drain())
            .collect();
        for id in states {
            self.device.release(id);
        }
        self.shader_manager.release_all(&mut self.device);
    }
}

impl<D: GpuDevice> GraphicsEngine for EngineBase<D> {
    fn init(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Uninitialized {
            warn!("init called in state {:?}", self.state);
            return Ok(());
        }
        self.device_name = self
            .device
            .create_device()
            .map_err(EngineError::DeviceCreation)?;
        info!("graphics device: {}", self.device_name);
        self.display_modes = self.device.display_modes();
        self.display_modes.sort();
        self.display_modes.dedup();
        if self.settings.enable_graphics_events {
            self.annotation = self.device.user_annotation();
        }
        if let Err(err) = self.init_resources() {
            self.release_owned_resources();
            self.state = EngineState::Uninitialized;
            return Err(err);
        }
        Ok(())
    }

    fn set_window(&mut self, window: WindowHandle) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        match self.window {
            Some(current) if current == window => return self.on_resize(self.resolution),
            Some(current) => {
                debug!("output moves from {:?} to {:?}", current, window);
                self.release_size_dependent_resources();
                self.device.release_swap_chain();
                self.window = None;
            }
            None => {}
        }
        self.device
            .create_swap_chain(window, self.resolution, self.settings.vsync)?;
        self.window = Some(window);
        info!(
            "swap chain created at {}x{}",
            self.resolution.x, self.resolution.y
        );
        self.create_size_dependent_resources()?;
        if self.window_mode.is_exclusive() {
            self.device.set_fullscreen_state(true)?;
        }
        Ok(())
    }

    fn on_resize(&mut self, size: Int2) -> Result<(), EngineError> {
        let size = self
            .settings
            .resolution_override
            .map(|[x, y]| Int2::new(x, y))
            .unwrap_or(size);
        if size.x <= 0 || size.y <= 0 {
            return Err(EngineError::InvalidResolution(size.x, size.y));
        }
        if self.window.is_none() {
            self.resolution = size;
            return Ok(());
        }
        if size == self.resolution && self.targets.backbuffer.is_some() {
            return Ok(());
        }
        self.release_size_dependent_resources();
        self.device.resize_swap_chain(size)?;
        self.resolution = size;
        info!("resized to {}x{}", size.x, size.y);
        self.create_size_dependent_resources()
    }

    fn set_window_mode(&mut self, mode: WindowMode) -> Result<(), EngineError> {
        let was_exclusive = self.window_mode.is_exclusive();
        self.window_mode = mode;
        info!("window mode: {:?}", mode);
        if self.window.is_some() && was_exclusive != mode.is_exclusive() {
            self.device.set_fullscreen_state(mode.is_exclusive())?;
        }
        Ok(())
    }

    fn window_mode(&self) -> WindowMode {
        self.window_mode
    }

    fn on_begin_frame(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        if self.state == EngineState::InFrame {
            warn!("begin frame without end frame");
        }
        self.state = EngineState::InFrame;
        self.present_pending = true;
        self.tracked_texts.clear();
        self.bind_backbuffer();
        Ok(())
    }

    fn on_end_frame(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        if let Err(err) = self.flush_line_renderer() {
            warn!("debug lines dropped: {}", err);
        }
        let result = self.present();
        self.state = EngineState::Initialized;
        result
    }

    fn on_start_world_rendering(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        let _event = self.record_graphics_event("StartWorldRendering");
        self.set_default_states()?;
        self.bind_backbuffer();
        self.device.set_viewport(&ViewportInfo::full(self.resolution));
        Ok(())
    }

    /// At most one device present per frame, attempted or not.
    fn present(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        if !self.present_pending {
            trace!("present skipped, frame already presented");
            return Ok(());
        }
        self.present_pending = false;
        let sync_interval = self.settings.vsync as u32;
        self.device.present(sync_interval)?;
        Ok(())
    }

    fn is_present_pending(&self) -> bool {
        self.present_pending
    }

    fn reset_present_pending(&mut self) {
        self.present_pending = false;
    }

    fn set_viewport(&mut self, viewport: &ViewportInfo) {
        self.device.set_viewport(viewport);
    }

    fn clear(&mut self, color: [f32; 4]) {
        if let Some(backbuffer) = &self.targets.backbuffer {
            self.device.clear_render_target(backbuffer.id(), color);
        }
        if let Some(depth) = &self.targets.depth_stencil {
            self.device.clear_depth_stencil(depth.id(), 1.0);
        }
    }

    fn create_vertex_buffer(
        &mut self,
        size_in_bytes: usize,
        usage: BufferUsage,
        initial_data: Option<&[u8]>,
    ) -> Result<VertexBuffer, EngineError> {
        let id = self.create_buffer(BufferKind::Vertex, usage, size_in_bytes, initial_data)?;
        Ok(VertexBuffer::new(id, size_in_bytes, usage))
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Texture, EngineError> {
        Ok(Texture::new(self.device.create_texture(desc)?, *desc))
    }

    fn create_constant_buffer(
        &mut self,
        size_in_bytes: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<ConstantBuffer, EngineError> {
        let size = ConstantBuffer::aligned_size(size_in_bytes);
        let id = self.create_buffer(
            BufferKind::Constant,
            BufferUsage::Dynamic,
            size,
            initial_data,
        )?;
        Ok(ConstantBuffer::new(id, size))
    }

    fn create_shadowed_point_light(
        &mut self,
        light: VobLightInfo,
        dynamic: bool,
    ) -> Result<ShadowedPointLight, EngineError> {
        let size = self.settings.shadow_map_size as i32;
        let desc = RenderTargetDesc {
            kind: RenderTargetKind::ShadowCube,
            size: Int2::new(size, size),
            format: TextureFormat::R32Float,
        };
        let shadow_cube = RenderTarget::new(self.device.create_render_target(&desc)?, desc);
        Ok(ShadowedPointLight::new(light, shadow_cube, dynamic))
    }

    fn release_resource(&mut self, resource: ResourceId) {
        self.device.release(resource);
    }

    fn set_active_pixel_shader(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_active_shader(ShaderStage::Pixel, name)
    }

    fn set_active_vertex_shader(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_active_shader(ShaderStage::Vertex, name)
    }

    fn set_active_hd_shader(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_active_shader(ShaderStage::HullDomain, name)
    }

    fn set_active_g_shader(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_active_shader(ShaderStage::Geometry, name)
    }

    fn unbind_active_ps(&mut self) {
        self.active_shaders.remove(&ShaderStage::Pixel);
        self.device.bind_shader(ShaderStage::Pixel, None);
    }

    fn fixed_function_state(&mut self) -> &mut FixedFunctionState {
        &mut self.ff_state
    }

    fn set_default_states(&mut self) -> Result<(), EngineError> {
        self.ff_state = FixedFunctionState::default();
        self.rasterizer_states.invalidate();
        self.blend_states.invalidate();
        self.depth_stencil_states.invalidate();
        self.update_render_states()
    }

    fn update_render_states(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        let device = &mut self.device;
        if let Some(id) = self
            .rasterizer_states
            .resolve(&self.ff_state.rasterizer, |desc| {
                device.create_rasterizer_state(desc)
            })?
        {
            device.bind_rasterizer_state(id);
        }
        if let Some(id) = self
            .blend_states
            .resolve(&self.ff_state.blend, |desc| device.create_blend_state(desc))?
        {
            device.bind_blend_state(id);
        }
        if let Some(id) = self
            .depth_stencil_states
            .resolve(&self.ff_state.depth_stencil, |desc| {
                device.create_depth_stencil_state(desc)
            })?
        {
            device.bind_depth_stencil_state(id);
        }
        Ok(())
    }

    fn update_transforms_cb(&mut self) -> Result<(), EngineError> {
        let cb = self.transforms_cb.ok_or(EngineError::NotInitialized)?;
        let transforms = self.ff_state.take_transforms();
        self.device.update_buffer(cb.id(), bytes_of(&transforms))?;
        self.device
            .bind_constant_buffer(ShaderStage::Vertex, TRANSFORMS_CB_SLOT, cb.id());
        self.setup_per_instance_constant_buffer(PER_INSTANCE_CB_SLOT)
    }

    fn setup_per_instance_constant_buffer(&mut self, slot: u32) -> Result<(), EngineError> {
        let cb = self.per_instance_cb.ok_or(EngineError::NotInitialized)?;
        let world = self.ff_state.take_world();
        self.device.update_buffer(cb.id(), bytes_of(&world))?;
        self.device
            .bind_constant_buffer(ShaderStage::Vertex, slot, cb.id());
        Ok(())
    }

    fn setup_vs_ex_mesh_draw_call(&mut self) -> Result<(), EngineError> {
        self.update_render_states()?;
        if self.ff_state.transforms_dirty() {
            self.update_transforms_cb()?;
        } else if self.ff_state.world_dirty() {
            self.setup_per_instance_constant_buffer(PER_INSTANCE_CB_SLOT)?;
        }
        self.bind_active_shaders()
    }

    fn bind_viewport_information(
        &mut self,
        stage: ShaderStage,
        shader: &str,
        slot: u32,
    ) -> Result<(), EngineError> {
        self.shader_manager.get(stage, shader)?;
        let cb = self.viewport_cb.ok_or(EngineError::NotInitialized)?;
        let data = ViewportConstantBuffer {
            position: [0.0, 0.0],
            size: [self.resolution.x as f32, self.resolution.y as f32],
        };
        self.device.update_buffer(cb.id(), bytes_of(&data))?;
        self.device.bind_constant_buffer(stage, slot, cb.id());
        Ok(())
    }

    fn draw_vertex_array(
        &mut self,
        vertices: &[u8],
        num_vertices: u32,
        start_vertex: u32,
        stride: u32,
    ) -> Result<(), EngineError> {
        let _event = self.record_graphics_event("DrawVertexArray");
        self.ensure_initialized()?;
        let needed = required_bytes(num_vertices, start_vertex, stride).unwrap_or(usize::MAX);
        if vertices.len() < needed {
            return Err(EngineError::VertexDataTooShort {
                expected: needed,
                actual: vertices.len(),
            });
        }
        if num_vertices == 0 {
            return Ok(());
        }
        let scratch = self.ensure_scratch_capacity(needed)?;
        self.device.update_buffer(scratch.id(), &vertices[..needed])?;
        self.setup_vs_ex_mesh_draw_call()?;
        self.device.bind_vertex_buffer(scratch.id(), stride, 0);
        self.device.draw(num_vertices, start_vertex);
        Ok(())
    }

    fn draw_vertex_buffer_ff(
        &mut self,
        vertex_buffer: &VertexBuffer,
        num_vertices: u32,
        start_vertex: u32,
        stride: u32,
    ) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        let needed = required_bytes(num_vertices, start_vertex, stride).unwrap_or(usize::MAX);
        if vertex_buffer.size_in_bytes() < needed {
            return Err(EngineError::VertexDataTooShort {
                expected: needed,
                actual: vertex_buffer.size_in_bytes(),
            });
        }
        self.setup_vs_ex_mesh_draw_call()?;
        self.device.bind_vertex_buffer(vertex_buffer.id(), stride, 0);
        self.device.draw(num_vertices, start_vertex);
        Ok(())
    }

    fn line_renderer(&mut self) -> &mut LineRenderer {
        &mut self.line_renderer
    }

    fn flush_line_renderer(&mut self) -> Result<(), EngineError> {
        if self.line_renderer.is_empty() {
            return Ok(());
        }
        let _event = self.record_graphics_event("LineRenderer");
        let mut lines = std::mem::take(&mut self.line_renderer);
        let saved_shaders = self.active_shaders.clone();
        self.active_shaders.remove(&ShaderStage::HullDomain);
        self.active_shaders.remove(&ShaderStage::Geometry);
        let result = self.draw_lines(&lines);
        self.active_shaders = saved_shaders;
        lines.clear_cache();
        self.line_renderer = lines;
        result
    }

    fn record_graphics_event(&self, label: &str) -> GraphicsEventRecord {
        match &self.annotation {
            Some(annotation) => GraphicsEventRecord::begin(annotation.clone(), label),
            None => GraphicsEventRecord::inert(),
        }
    }

    fn display_mode_list(&self) -> &[DisplayModeInfo] {
        &self.display_modes
    }

    fn graphics_device_name(&self) -> &str {
        &self.device_name
    }

    fn resolution(&self) -> Int2 {
        self.resolution
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn track_text(&mut self, text: TrackedText) {
        self.tracked_texts.push(text);
    }

    fn tracked_texts(&self) -> &[TrackedText] {
        &self.tracked_texts
    }

    fn shutdown(&mut self) {
        if matches!(
            self.state,
            EngineState::Uninitialized | EngineState::TornDown
        ) {
            self.state = EngineState::TornDown;
            return;
        }
        self.release_owned_resources();
        self.line_renderer.clear_cache();
        self.state = EngineState::TornDown;
        info!("engine shut down");
    }
}

impl<D: GpuDevice> Drop for EngineBase<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
