#[cfg(windows)]
mod hooked_process;
mod module_image;

use anyhow::Result;

#[cfg(windows)]
pub use hooked_process::HookedProcess;
pub use module_image::ModuleImage;

/// Page protection of host memory, independent of the OS flag encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Protection {
    NoAccess,
    ReadOnly,
    ReadWrite,
    #[default]
    ExecuteRead,
    ExecuteReadWrite,
    ExecuteWriteCopy,
}

impl Protection {
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Protection::ReadWrite | Protection::ExecuteReadWrite | Protection::ExecuteWriteCopy
        )
    }
}

pub enum MemoryAccessor {
    #[cfg(windows)]
    HookedProcess(HookedProcess),
    ModuleImage(ModuleImage),
}

impl MemoryAccessor {
    pub fn read_u8(&self, addr: usize) -> Result<u8> {
        let mut buffer = [0; 1];
        self.read(addr, &mut buffer)?;
        Ok(buffer[0])
    }

    pub fn read_u32(&self, addr: usize) -> Result<u32> {
        let mut buffer = [0; 4];
        self.read(addr, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    pub fn write_u32(&mut self, addr: usize, value: u32) -> Result<()> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn read(&self, addr: usize, buffer: &mut [u8]) -> Result<()> {
        match self {
            #[cfg(windows)]
            MemoryAccessor::HookedProcess(accessor) => {
                accessor.read(addr, buffer);
                Ok(())
            }
            MemoryAccessor::ModuleImage(accessor) => accessor.read(addr, buffer),
        }
    }

    pub fn read_vec(&self, addr: usize, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0; len];
        self.read(addr, &mut buffer)?;
        Ok(buffer)
    }

    pub fn write(&mut self, addr: usize, buffer: &[u8]) -> Result<()> {
        match self {
            #[cfg(windows)]
            MemoryAccessor::HookedProcess(accessor) => accessor.write(addr, buffer),
            MemoryAccessor::ModuleImage(accessor) => accessor.write(addr, buffer),
        }
    }

    /// Changes the protection of `[addr, addr + size)` and returns the previous one.
    pub fn virtual_protect(
        &mut self,
        addr: usize,
        size: usize,
        protect: Protection,
    ) -> Result<Protection> {
        match self {
            #[cfg(windows)]
            MemoryAccessor::HookedProcess(accessor) => accessor.virtual_protect(addr, size, protect),
            MemoryAccessor::ModuleImage(accessor) => accessor.virtual_protect(addr, size, protect),
        }
    }

    /// Reserves `size` bytes of executable memory for a trampoline.
    pub fn alloc_executable(&mut self, size: usize) -> Result<usize> {
        match self {
            #[cfg(windows)]
            MemoryAccessor::HookedProcess(accessor) => accessor.alloc_executable(size),
            MemoryAccessor::ModuleImage(accessor) => accessor.alloc_executable(size),
        }
    }
}
