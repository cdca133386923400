//! What each hooked host function does once control reaches the renderer.
//!
//! Hook bodies are plain functions over the engine so that they run off-host.
//! Hooks that forward to the original receive the engine through an accessor
//! that is only called after the original has returned; the original may
//! re-enter other hooks.

pub mod rnd;
#[cfg(all(windows, target_arch = "x86"))]
pub mod thunks;
pub mod view;

#[cfg(test)]
pub(crate) mod test_utils {
    use gd3d11_lib::engine::{
        EngineBase, EngineSettings, GraphicsEngine, HeadlessDevice, WindowHandle,
    };

    pub fn engine() -> EngineBase<HeadlessDevice> {
        let mut engine = EngineBase::new(HeadlessDevice::recording(), EngineSettings::default());
        engine.init().unwrap();
        engine.set_window(WindowHandle(1)).unwrap();
        engine.device_mut().clear_calls();
        engine
    }
}
