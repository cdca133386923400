//! The host loads this DLL in place of the system `ddraw.dll`. Its exports
//! forward to the real library so the game's own DirectDraw setup keeps working.

use anyhow::{Context, Result};

pub const DLL_NAME: &str = "ddraw.dll";

/// Addresses of the forwarded entry points inside the system library.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardedExports {
    pub direct_draw_create: usize,
    pub direct_draw_create_ex: usize,
    pub direct_draw_enumerate_a: usize,
}

impl ForwardedExports {
    pub const UNRESOLVED: Self = Self {
        direct_draw_create: 0,
        direct_draw_create_ex: 0,
        direct_draw_enumerate_a: 0,
    };

    pub fn resolve(mut lookup: impl FnMut(&str) -> Option<usize>) -> Result<Self> {
        let mut resolve = |name: &str| {
            lookup(name)
                .filter(|&addr| addr != 0)
                .with_context(|| format!("{} does not export {}", DLL_NAME, name))
        };
        Ok(Self {
            direct_draw_create: resolve("DirectDrawCreate")?,
            direct_draw_create_ex: resolve("DirectDrawCreateEx")?,
            direct_draw_enumerate_a: resolve("DirectDrawEnumerateA")?,
        })
    }
}

#[cfg(all(windows, target_arch = "x86"))]
mod forward {
    use std::{
        ffi::{c_void, CString},
        mem::transmute,
        ptr::{addr_of, addr_of_mut, null_mut},
    };

    use anyhow::{bail, Context, Result};
    use tracing::{info, warn};
    use windows::{
        core::{GUID, HRESULT, HSTRING, PCSTR},
        Win32::{
            Foundation::{FreeLibrary, E_FAIL, HMODULE, MAX_PATH},
            System::{
                LibraryLoader::{GetProcAddress, LoadLibraryW},
                SystemInformation::GetSystemDirectoryW,
            },
        },
    };

    use super::{ForwardedExports, DLL_NAME};

    static mut SYSTEM_DDRAW: HMODULE = HMODULE(null_mut());
    static mut FORWARDED: ForwardedExports = ForwardedExports::UNRESOLVED;

    fn system_directory() -> Result<String> {
        let mut buf = [0u16; MAX_PATH as usize];
        let len = unsafe { GetSystemDirectoryW(Some(&mut buf)) } as usize;
        if len == 0 || len > buf.len() {
            bail!("GetSystemDirectoryW failed");
        }
        Ok(String::from_utf16(&buf[..len])?)
    }

    pub fn load_system_ddraw() -> Result<()> {
        let path = format!("{}\\{}", system_directory()?, DLL_NAME);
        let module = unsafe { LoadLibraryW(&HSTRING::from(path.as_str())) }
            .with_context(|| format!("failed to load {}", path))?;
        let exports = ForwardedExports::resolve(|name| {
            let name = CString::new(name).ok()?;
            unsafe { GetProcAddress(module, PCSTR::from_raw(name.as_ptr().cast())) }
                .map(|func| func as usize)
        });
        let exports = match exports {
            Ok(exports) => exports,
            Err(err) => {
                let _ = unsafe { FreeLibrary(module) };
                return Err(err);
            }
        };
        unsafe {
            *addr_of_mut!(SYSTEM_DDRAW) = module;
            *addr_of_mut!(FORWARDED) = exports;
        }
        info!("forwarding to {}", path);
        Ok(())
    }

    pub fn unload_system_ddraw() {
        let module = unsafe {
            *addr_of_mut!(FORWARDED) = ForwardedExports::UNRESOLVED;
            std::mem::replace(&mut *addr_of_mut!(SYSTEM_DDRAW), HMODULE(null_mut()))
        };
        if module.is_invalid() {
            return;
        }
        if let Err(err) = unsafe { FreeLibrary(module) } {
            warn!("{:?}", err);
        }
    }

    fn forwarded() -> ForwardedExports {
        unsafe { *addr_of!(FORWARDED) }
    }

    #[no_mangle]
    pub extern "system" fn DirectDrawCreate(
        guid: *mut GUID,
        direct_draw: *mut *mut c_void,
        outer: *mut c_void,
    ) -> HRESULT {
        type Func = unsafe extern "system" fn(*mut GUID, *mut *mut c_void, *mut c_void) -> HRESULT;
        let addr = forwarded().direct_draw_create;
        if addr == 0 {
            return E_FAIL;
        }
        let func: Func = unsafe { transmute(addr) };
        unsafe { func(guid, direct_draw, outer) }
    }

    #[no_mangle]
    pub extern "system" fn DirectDrawCreateEx(
        guid: *mut GUID,
        direct_draw: *mut *mut c_void,
        iid: *const GUID,
        outer: *mut c_void,
    ) -> HRESULT {
        type Func = unsafe extern "system" fn(
            *mut GUID,
            *mut *mut c_void,
            *const GUID,
            *mut c_void,
        ) -> HRESULT;
        let addr = forwarded().direct_draw_create_ex;
        if addr == 0 {
            return E_FAIL;
        }
        let func: Func = unsafe { transmute(addr) };
        unsafe { func(guid, direct_draw, iid, outer) }
    }

    #[no_mangle]
    pub extern "system" fn DirectDrawEnumerateA(
        callback: *mut c_void,
        context: *mut c_void,
    ) -> HRESULT {
        type Func = unsafe extern "system" fn(*mut c_void, *mut c_void) -> HRESULT;
        let addr = forwarded().direct_draw_enumerate_a;
        if addr == 0 {
            return E_FAIL;
        }
        let func: Func = unsafe { transmute(addr) };
        unsafe { func(callback, context) }
    }
}

#[cfg(all(windows, target_arch = "x86"))]
pub use forward::{load_system_ddraw, unload_system_ddraw};
