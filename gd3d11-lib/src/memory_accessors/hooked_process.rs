use std::ffi::c_void;

use anyhow::{bail, Result};
use windows::Win32::System::{
    Diagnostics::Debug::FlushInstructionCache,
    Memory::{
        VirtualAlloc, VirtualProtect, MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READ,
        PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_NOACCESS, PAGE_PROTECTION_FLAGS,
        PAGE_READONLY, PAGE_READWRITE,
    },
    Threading::GetCurrentProcess,
};

use super::Protection;

const TRAMPOLINE_PAGE_SIZE: usize = 0x1000;

impl From<Protection> for PAGE_PROTECTION_FLAGS {
    fn from(value: Protection) -> Self {
        match value {
            Protection::NoAccess => PAGE_NOACCESS,
            Protection::ReadOnly => PAGE_READONLY,
            Protection::ReadWrite => PAGE_READWRITE,
            Protection::ExecuteRead => PAGE_EXECUTE_READ,
            Protection::ExecuteReadWrite => PAGE_EXECUTE_READWRITE,
            Protection::ExecuteWriteCopy => PAGE_EXECUTE_WRITECOPY,
        }
    }
}

impl From<PAGE_PROTECTION_FLAGS> for Protection {
    fn from(value: PAGE_PROTECTION_FLAGS) -> Self {
        match value {
            PAGE_NOACCESS => Protection::NoAccess,
            PAGE_READONLY => Protection::ReadOnly,
            PAGE_READWRITE => Protection::ReadWrite,
            PAGE_EXECUTE_READWRITE => Protection::ExecuteReadWrite,
            PAGE_EXECUTE_WRITECOPY => Protection::ExecuteWriteCopy,
            _ => Protection::ExecuteRead,
        }
    }
}

/// The process this library has been injected into. Addresses are absolute.
#[derive(Default)]
pub struct HookedProcess {
    /// (page base, bytes used) of the current trampoline page.
    trampoline_page: Option<(usize, usize)>,
}

impl HookedProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: usize, buffer: &mut [u8]) {
        unsafe { (addr as *const u8).copy_to(buffer.as_mut_ptr(), buffer.len()) };
    }

    pub fn write(&mut self, addr: usize, buffer: &[u8]) -> Result<()> {
        unsafe { (addr as *mut u8).copy_from(buffer.as_ptr(), buffer.len()) };
        unsafe {
            FlushInstructionCache(
                GetCurrentProcess(),
                Some(addr as *const c_void),
                buffer.len(),
            )
        }?;
        Ok(())
    }

    pub fn raw_ptr(&self, addr: usize) -> *const c_void {
        addr as *const c_void
    }

    pub fn virtual_protect(
        &mut self,
        addr: usize,
        size: usize,
        protect: Protection,
    ) -> Result<Protection> {
        let mut old: PAGE_PROTECTION_FLAGS = Default::default();
        unsafe { VirtualProtect(addr as _, size, protect.into(), &mut old) }?;
        Ok(old.into())
    }

    pub fn alloc_executable(&mut self, size: usize) -> Result<usize> {
        if size > TRAMPOLINE_PAGE_SIZE {
            bail!("trampoline of {} bytes does not fit into a page", size);
        }
        if let Some((base, used)) = self.trampoline_page {
            if used + size <= TRAMPOLINE_PAGE_SIZE {
                self.trampoline_page = Some((base, used + size));
                return Ok(base + used);
            }
        }
        let base = unsafe {
            VirtualAlloc(
                None,
                TRAMPOLINE_PAGE_SIZE,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };
        if base.is_null() {
            bail!("VirtualAlloc failed for trampoline page");
        }
        let base = base as usize;
        self.trampoline_page = Some((base, size));
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_into_a_trampoline_page_and_flushes() {
        let mut process = HookedProcess::new();
        let addr = process.alloc_executable(8).unwrap();
        process.write(addr, &[0x90, 0x90, 0xc3]).unwrap();
        let mut buf = [0; 3];
        process.read(addr, &mut buf);
        assert_eq!(buf, [0x90, 0x90, 0xc3]);
        assert_eq!(process.alloc_executable(8).unwrap(), addr + 8);
    }
}
