#[cfg(any(test, all(windows, target_arch = "x86")))]
mod ddraw_proxy;
#[cfg(any(test, all(windows, target_arch = "x86")))]
mod file;
mod hooks;
#[cfg(all(windows, target_arch = "x86"))]
mod state;
#[cfg(all(windows, target_arch = "x86"))]
mod tracing_helper;

#[cfg(all(windows, target_arch = "x86"))]
mod dll_main {
    use anyhow::{Context, Result};
    use gd3d11_lib::{
        engine::{EngineBase, GraphicsEngine, HeadlessDevice},
        layout::{verify_layouts, LAYOUT_VERSION},
        memory_locations::BUILD_NAME,
        Gothic,
    };
    use tracing::{error, info, warn};
    use windows::Win32::{
        Foundation::{HINSTANCE, HMODULE},
        System::{
            Console::AllocConsole,
            SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH},
        },
    };

    use crate::{
        ddraw_proxy,
        file::{to_dll_path, SettingsRepo, SETTINGS_FILE_NAME},
        hooks::thunks::install_hooks,
        state::{self, State},
        tracing_helper,
    };

    fn attach(module: HMODULE) -> Result<()> {
        let dll_path = to_dll_path(module)?;
        let dir = dll_path.parent().context("DLL path has no parent")?;
        let stem = dll_path.file_stem().context("DLL path has no file name")?;
        tracing_helper::init_tracing(
            dir,
            &format!("{}.log", stem.to_string_lossy()),
            cfg!(debug_assertions),
        )?;
        info!(
            "{} {} for {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            BUILD_NAME
        );
        ddraw_proxy::load_system_ddraw()?;

        verify_layouts()?;
        info!("struct layouts match (v{})", LAYOUT_VERSION);

        let settings = SettingsRepo::new(dir.join(SETTINGS_FILE_NAME)).load();
        let mut engine: Box<dyn GraphicsEngine> =
            Box::new(EngineBase::new(HeadlessDevice::new(), settings));
        engine.init()?;

        state::init_state(State::new(Gothic::new_hooked_process(), engine));
        let state = state::state_mut().context("state missing after init")?;
        if let Err(err) = install_hooks(state.gothic_mut()) {
            if let Err(restore_err) = state.gothic_mut().unhook_all() {
                error!("{:?}", restore_err);
            }
            return Err(err);
        }
        Ok(())
    }

    fn detach() {
        if let Some(state) = state::take_state() {
            let (mut gothic, mut engine) = state.into_parts();
            if let Err(err) = gothic.unhook_all() {
                warn!("{:?}", err);
            }
            engine.shutdown();
        }
        ddraw_proxy::unload_system_ddraw();
    }

    #[no_mangle]
    pub extern "stdcall" fn DllMain(inst_dll: HINSTANCE, reason: u32, _reserved: u32) -> bool {
        match reason {
            DLL_PROCESS_ATTACH => {
                if cfg!(debug_assertions) {
                    let _ = unsafe { AllocConsole() };
                    std::env::set_var("RUST_BACKTRACE", "1");
                }
                if let Err(err) = attach(inst_dll.into()) {
                    error!("renderer not installed: {:?}", err);
                }
            }
            DLL_PROCESS_DETACH => detach(),
            _ => {}
        }
        true
    }
}
