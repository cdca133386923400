use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

use tracing::warn;

use super::{
    device::*,
    error::DeviceError,
    render_states::{BlendStateDesc, DepthStencilStateDesc, RasterizerStateDesc},
};

/// One call into [`HeadlessDevice`], as recorded in its call log.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CreateDevice,
    CreateSwapChain(WindowHandle, Int2),
    ResizeSwapChain(Int2),
    ReleaseSwapChain,
    SetFullscreenState(bool),
    CreateRenderTarget(ResourceId, RenderTargetDesc),
    CreateBuffer(ResourceId, BufferDesc),
    UpdateBuffer(ResourceId, usize),
    CreateTexture(ResourceId),
    CreateSamplerState(ResourceId),
    CreateRasterizerState(ResourceId),
    CreateBlendState(ResourceId),
    CreateDepthStencilState(ResourceId),
    CompileShader(ResourceId, &'static str),
    Release(ResourceId),
    BindRenderTarget(ResourceId),
    BindRasterizerState(ResourceId),
    BindBlendState(ResourceId),
    BindDepthStencilState(ResourceId),
    BindSampler(u32, ResourceId),
    BindShader(ShaderStage, Option<ResourceId>),
    BindConstantBuffer(ShaderStage, u32, ResourceId),
    BindVertexBuffer(ResourceId, u32),
    SetPrimitiveTopology(PrimitiveTopology),
    SetViewport(ViewportInfo),
    ClearRenderTarget(ResourceId),
    ClearDepthStencil(ResourceId),
    Draw { vertex_count: u32, start_vertex: u32 },
    Present(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Live {
    Buffer(usize),
    RenderTarget(RenderTargetDesc),
    Other,
}

/// Counts profiling regions instead of sending them anywhere.
#[derive(Debug, Default)]
pub struct HeadlessAnnotation {
    begins: Cell<usize>,
    ends: Cell<usize>,
    labels: RefCell<Vec<String>>,
}

impl HeadlessAnnotation {
    pub fn begins(&self) -> usize {
        self.begins.get()
    }

    pub fn ends(&self) -> usize {
        self.ends.get()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.borrow().clone()
    }
}

impl UserAnnotation for HeadlessAnnotation {
    fn begin_event(&self, label: &str) {
        self.begins.set(self.begins.get() + 1);
        self.labels.borrow_mut().push(label.to_owned());
    }

    fn end_event(&self) {
        self.ends.set(self.ends.get() + 1);
    }
}

/// A device without a GPU.
///
/// Hands out ids, tracks which resources are alive and optionally records
/// every call. Serves as the null backend and as the test double.
#[derive(Default)]
pub struct HeadlessDevice {
    record_calls: bool,
    calls: Vec<DeviceCall>,
    next_id: u64,
    live: BTreeMap<ResourceId, Live>,
    swap_chain: Option<(WindowHandle, Int2)>,
    annotation: Option<Rc<HeadlessAnnotation>>,
    fail_device_creation: bool,
    fail_present: bool,
    failing_shaders: Vec<&'static str>,
    draw_count: u64,
    present_count: u64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that keeps a log of every call.
    pub fn recording() -> Self {
        Self {
            record_calls: true,
            ..Self::default()
        }
    }

    pub fn with_annotation(mut self) -> Self {
        self.annotation = Some(Rc::new(HeadlessAnnotation::default()));
        self
    }

    pub fn fail_device_creation(&mut self) {
        self.fail_device_creation = true;
    }

    /// Every present reports a removed device.
    pub fn fail_present(&mut self) {
        self.fail_present = true;
    }

    pub fn fail_shader(&mut self, name: &'static str) {
        self.failing_shaders.push(name);
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn annotation(&self) -> Option<&Rc<HeadlessAnnotation>> {
        self.annotation.as_ref()
    }

    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }

    pub fn present_count(&self) -> u64 {
        self.present_count
    }

    pub fn swap_chain_size(&self) -> Option<Int2> {
        self.swap_chain.map(|(_, size)| size)
    }

    pub fn swap_chain_window(&self) -> Option<WindowHandle> {
        self.swap_chain.map(|(window, _)| window)
    }

    fn live_backbuffer_views(&self) -> usize {
        self.render_targets(RenderTargetKind::Backbuffer).len()
    }

    pub fn is_live(&self, resource: ResourceId) -> bool {
        self.live.contains_key(&resource)
    }

    pub fn live_resource_count(&self) -> usize {
        self.live.len()
    }

    pub fn buffer_size(&self, buffer: ResourceId) -> Option<usize> {
        match self.live.get(&buffer) {
            Some(Live::Buffer(size)) => Some(*size),
            _ => None,
        }
    }

    /// Live render targets of `kind`.
    pub fn render_targets(&self, kind: RenderTargetKind) -> Vec<RenderTargetDesc> {
        self.live
            .values()
            .filter_map(|live| match live {
                Live::RenderTarget(desc) if desc.kind == kind => Some(*desc),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, call: DeviceCall) {
        if self.record_calls {
            self.calls.push(call);
        }
    }

    fn alloc(&mut self, live: Live) -> ResourceId {
        self.next_id += 1;
        let id = ResourceId(self.next_id);
        self.live.insert(id, live);
        id
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_device(&mut self) -> Result<String, DeviceError> {
        self.record(DeviceCall::CreateDevice);
        if self.fail_device_creation {
            return Err(DeviceError::CallFailed {
                call: "D3D11CreateDevice",
                reason: "no adapter".into(),
            });
        }
        Ok("Headless".to_owned())
    }

    fn display_modes(&self) -> Vec<DisplayModeInfo> {
        [(800, 600), (1024, 768), (1280, 720), (1920, 1080)]
            .into_iter()
            .map(|(width, height)| DisplayModeInfo { width, height })
            .collect()
    }

    fn user_annotation(&self) -> Option<Rc<dyn UserAnnotation>> {
        self.annotation
            .clone()
            .map(|annotation| annotation as Rc<dyn UserAnnotation>)
    }

    fn create_swap_chain(
        &mut self,
        window: WindowHandle,
        size: Int2,
        _vsync: bool,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::CreateSwapChain(window, size));
        if self.swap_chain.is_some() {
            return Err(DeviceError::CallFailed {
                call: "CreateSwapChain",
                reason: "a swap chain already exists".into(),
            });
        }
        self.swap_chain = Some((window, size));
        Ok(())
    }

    fn resize_swap_chain(&mut self, size: Int2) -> Result<(), DeviceError> {
        self.record(DeviceCall::ResizeSwapChain(size));
        let Some((window, _)) = self.swap_chain else {
            return Err(DeviceError::CallFailed {
                call: "ResizeBuffers",
                reason: "no swap chain".into(),
            });
        };
        let backbuffer_views = self.live_backbuffer_views();
        if backbuffer_views > 0 {
            return Err(DeviceError::CallFailed {
                call: "ResizeBuffers",
                reason: format!("{} back buffer views still alive", backbuffer_views),
            });
        }
        self.swap_chain = Some((window, size));
        Ok(())
    }

    fn release_swap_chain(&mut self) {
        self.record(DeviceCall::ReleaseSwapChain);
        let backbuffer_views = self.live_backbuffer_views();
        if backbuffer_views > 0 {
            warn!("swap chain released with {} back buffer views alive", backbuffer_views);
        }
        self.swap_chain = None;
    }

    fn set_fullscreen_state(&mut self, exclusive: bool) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetFullscreenState(exclusive));
        if self.swap_chain.is_none() {
            return Err(DeviceError::CallFailed {
                call: "SetFullscreenState",
                reason: "no swap chain".into(),
            });
        }
        Ok(())
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<ResourceId, DeviceError> {
        let id = self.alloc(Live::RenderTarget(*desc));
        self.record(DeviceCall::CreateRenderTarget(id, *desc));
        Ok(id)
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceId, DeviceError> {
        if initial_data.is_some_and(|data| data.len() > desc.size_in_bytes) {
            return Err(DeviceError::CallFailed {
                call: "CreateBuffer",
                reason: "initial data larger than buffer".into(),
            });
        }
        let id = self.alloc(Live::Buffer(desc.size_in_bytes));
        self.record(DeviceCall::CreateBuffer(id, *desc));
        Ok(id)
    }

    fn update_buffer(&mut self, buffer: ResourceId, data: &[u8]) -> Result<(), DeviceError> {
        self.record(DeviceCall::UpdateBuffer(buffer, data.len()));
        match self.live.get(&buffer) {
            Some(Live::Buffer(size)) if data.len() <= *size => Ok(()),
            Some(Live::Buffer(size)) => Err(DeviceError::CallFailed {
                call: "Map",
                reason: format!("{} bytes into a {} byte buffer", data.len(), size),
            }),
            _ => Err(DeviceError::CallFailed {
                call: "Map",
                reason: format!("{:?} is not a live buffer", buffer),
            }),
        }
    }

    fn create_texture(&mut self, _desc: &TextureDesc) -> Result<ResourceId, DeviceError> {
        let id = self.alloc(Live::Other);
        self.record(DeviceCall::CreateTexture(id));
        Ok(id)
    }

    fn create_sampler_state(&mut self, _desc: &SamplerDesc) -> Result<ResourceId, DeviceError> {
        let id = self.alloc(Live::Other);
        self.record(DeviceCall::CreateSamplerState(id));
        Ok(id)
    }

    fn create_rasterizer_state(
        &mut self,
        _desc: &RasterizerStateDesc,
    ) -> Result<ResourceId, DeviceError> {
        let id = self.alloc(Live::Other);
        self.record(DeviceCall::CreateRasterizerState(id));
        Ok(id)
    }

    fn create_blend_state(&mut self, _desc: &BlendStateDesc) -> Result<ResourceId, DeviceError> {
        let id = self.alloc(Live::Other);
        self.record(DeviceCall::CreateBlendState(id));
        Ok(id)
    }

    fn create_depth_stencil_state(
        &mut self,
        _desc: &DepthStencilStateDesc,
    ) -> Result<ResourceId, DeviceError> {
        let id = self.alloc(Live::Other);
        self.record(DeviceCall::CreateDepthStencilState(id));
        Ok(id)
    }

    fn compile_shader(
        &mut self,
        desc: &ShaderDesc,
        _macros: &[ShaderMacro],
    ) -> Result<ResourceId, DeviceError> {
        if self.failing_shaders.contains(&desc.name) {
            return Err(DeviceError::ShaderCompilation(desc.name.to_owned()));
        }
        let id = self.alloc(Live::Other);
        self.record(DeviceCall::CompileShader(id, desc.name));
        Ok(id)
    }

    fn release(&mut self, resource: ResourceId) {
        self.record(DeviceCall::Release(resource));
        if self.live.remove(&resource).is_none() {
            warn!("release of dead resource {:?}", resource);
        }
    }

    fn bind_render_target(&mut self, target: ResourceId, _depth: Option<ResourceId>) {
        self.record(DeviceCall::BindRenderTarget(target));
    }

    fn bind_rasterizer_state(&mut self, state: ResourceId) {
        self.record(DeviceCall::BindRasterizerState(state));
    }

    fn bind_blend_state(&mut self, state: ResourceId) {
        self.record(DeviceCall::BindBlendState(state));
    }

    fn bind_depth_stencil_state(&mut self, state: ResourceId) {
        self.record(DeviceCall::BindDepthStencilState(state));
    }

    fn bind_sampler(&mut self, slot: u32, sampler: ResourceId) {
        self.record(DeviceCall::BindSampler(slot, sampler));
    }

    fn bind_shader(&mut self, stage: ShaderStage, shader: Option<ResourceId>) {
        self.record(DeviceCall::BindShader(stage, shader));
    }

    fn bind_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: ResourceId) {
        self.record(DeviceCall::BindConstantBuffer(stage, slot, buffer));
    }

    fn bind_vertex_buffer(&mut self, buffer: ResourceId, stride: u32, _offset: u32) {
        self.record(DeviceCall::BindVertexBuffer(buffer, stride));
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.record(DeviceCall::SetPrimitiveTopology(topology));
    }

    fn set_viewport(&mut self, viewport: &ViewportInfo) {
        self.record(DeviceCall::SetViewport(*viewport));
    }

    fn clear_render_target(&mut self, target: ResourceId, _color: [f32; 4]) {
        self.record(DeviceCall::ClearRenderTarget(target));
    }

    fn clear_depth_stencil(&mut self, depth: ResourceId, _depth_value: f32) {
        self.record(DeviceCall::ClearDepthStencil(depth));
    }

    fn draw(&mut self, vertex_count: u32, start_vertex: u32) {
        self.draw_count += 1;
        self.record(DeviceCall::Draw {
            vertex_count,
            start_vertex,
        });
    }

    fn present(&mut self, sync_interval: u32) -> Result<(), DeviceError> {
        self.record(DeviceCall::Present(sync_interval));
        if self.fail_present {
            return Err(DeviceError::DeviceRemoved);
        }
        self.present_count += 1;
        Ok(())
    }
}
