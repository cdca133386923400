use std::collections::BTreeMap;

use anyhow::{bail, Result};

use super::Protection;

const PAGE_SIZE: usize = 0x1000;

/// A copy of a module's code mapped at its preferred base address.
///
/// Page protections are tracked like the OS would so that a patch set can be
/// replayed and verified without a live host process. Trampolines are placed
/// in a separate arena directly behind the image.
pub struct ModuleImage {
    base_addr: usize,
    bytes: Vec<u8>,
    protections: BTreeMap<usize, Protection>,
    arena: Vec<u8>,
}

impl ModuleImage {
    pub fn new(base_addr: usize, bytes: Vec<u8>) -> Self {
        Self {
            base_addr,
            bytes,
            protections: BTreeMap::new(),
            arena: Vec::new(),
        }
    }

    /// An image of `len` bytes filled with `int3`.
    pub fn filled(base_addr: usize, len: usize) -> Self {
        Self::new(base_addr, vec![0xcc; len])
    }

    pub fn base_addr(&self) -> usize {
        self.base_addr
    }

    fn arena_base(&self) -> usize {
        (self.base_addr + self.bytes.len()).next_multiple_of(PAGE_SIZE)
    }

    fn slice(&self, addr: usize, len: usize) -> Result<&[u8]> {
        if let Some(offset) = addr.checked_sub(self.base_addr) {
            if offset + len <= self.bytes.len() {
                return Ok(&self.bytes[offset..offset + len]);
            }
        }
        if let Some(offset) = addr.checked_sub(self.arena_base()) {
            if offset + len <= self.arena.len() {
                return Ok(&self.arena[offset..offset + len]);
            }
        }
        bail!("{:#x}..{:#x} is outside of the image", addr, addr + len);
    }

    fn slice_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8]> {
        let arena_base = self.arena_base();
        if let Some(offset) = addr.checked_sub(self.base_addr) {
            if offset + len <= self.bytes.len() {
                return Ok(&mut self.bytes[offset..offset + len]);
            }
        }
        if let Some(offset) = addr.checked_sub(arena_base) {
            if offset + len <= self.arena.len() {
                return Ok(&mut self.arena[offset..offset + len]);
            }
        }
        bail!("{:#x}..{:#x} is outside of the image", addr, addr + len);
    }

    pub fn protection(&self, addr: usize) -> Protection {
        let page = addr & !(PAGE_SIZE - 1);
        if page >= self.arena_base() {
            return Protection::ExecuteReadWrite;
        }
        self.protections.get(&page).copied().unwrap_or_default()
    }

    pub fn read(&self, addr: usize, buffer: &mut [u8]) -> Result<()> {
        buffer.copy_from_slice(self.slice(addr, buffer.len())?);
        Ok(())
    }

    pub fn write(&mut self, addr: usize, buffer: &[u8]) -> Result<()> {
        if addr < self.arena_base() {
            let last = addr + buffer.len().max(1) - 1;
            if let Some(page) = (addr..=last)
                .step_by(PAGE_SIZE)
                .chain([last])
                .find(|&a| !self.protection(a).is_writable())
            {
                bail!("write to protected page at {:#x}", page);
            }
        }
        self.slice_mut(addr, buffer.len())?.copy_from_slice(buffer);
        Ok(())
    }

    pub fn virtual_protect(
        &mut self,
        addr: usize,
        size: usize,
        protect: Protection,
    ) -> Result<Protection> {
        self.slice(addr, size)?;
        let old = self.protection(addr);
        let first = addr & !(PAGE_SIZE - 1);
        let last = (addr + size.max(1) - 1) & !(PAGE_SIZE - 1);
        for page in (first..=last).step_by(PAGE_SIZE) {
            self.protections.insert(page, protect);
        }
        Ok(old)
    }

    pub fn alloc_executable(&mut self, size: usize) -> Result<usize> {
        let addr = self.arena_base() + self.arena.len();
        self.arena.resize(self.arena.len() + size, 0xcc);
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_writable_protection() {
        let mut image = ModuleImage::filled(0x400000, 0x3000);
        assert!(image.write(0x401000, &[0x90]).is_err());

        let old = image
            .virtual_protect(0x401000, 1, Protection::ExecuteReadWrite)
            .unwrap();
        assert_eq!(old, Protection::ExecuteRead);
        image.write(0x401000, &[0x90]).unwrap();

        let mut buf = [0];
        image.read(0x401000, &mut buf).unwrap();
        assert_eq!(buf, [0x90]);
    }

    #[test]
    fn write_spanning_pages_checks_every_page() {
        let mut image = ModuleImage::filled(0x400000, 0x3000);
        image
            .virtual_protect(0x400ffe, 1, Protection::ExecuteReadWrite)
            .unwrap();
        assert!(image.write(0x400ffe, &[0x90; 4]).is_err());
    }

    #[test]
    fn out_of_range_access_fails() {
        let image = ModuleImage::filled(0x400000, 0x100);
        let mut buf = [0; 4];
        assert!(image.read(0x3ffffe, &mut buf).is_err());
        assert!(image.read(0x4000fe, &mut buf).is_err());
    }

    #[test]
    fn trampolines_live_behind_the_image() {
        let mut image = ModuleImage::filled(0x400000, 0x1800);
        let first = image.alloc_executable(12).unwrap();
        let second = image.alloc_executable(8).unwrap();
        assert_eq!(first, 0x402000);
        assert_eq!(second, 0x40200c);
        image.write(second, &[0xe9, 0, 0, 0, 0]).unwrap();
    }
}
