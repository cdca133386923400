use anyhow::{bail, ensure, Result};
use tracing::{debug, trace};

use crate::{
    hook_utils::OriginalFn,
    memory_accessors::{MemoryAccessor, Protection},
};

pub const INST_NOP: u8 = 0x90;
const INST_CALL_REL32: u8 = 0xe8;
const INST_JMP_REL32: u8 = 0xe9;
const INST_JMP_REL8: u8 = 0xeb;
const REL32_INST_LEN: usize = 5;
const MAX_INST_LEN: usize = 15;

fn rel32(from: usize, target: usize) -> i32 {
    let jump_base_addr = from.wrapping_add(REL32_INST_LEN) as i64;
    (target as i64 - jump_base_addr) as i32
}

pub fn assemble_rel32(opcode: u8, from: usize, target: usize) -> [u8; REL32_INST_LEN] {
    let mut buf = [opcode, 0, 0, 0, 0];
    buf[1..].copy_from_slice(&rel32(from, target).to_le_bytes());
    buf
}

/// Destination of the `call`/`jmp rel32` encoded in `inst` located at `addr`.
pub fn rel32_target(addr: usize, inst: &[u8; REL32_INST_LEN]) -> usize {
    let value = i32::from_le_bytes([inst[1], inst[2], inst[3], inst[4]]);
    (addr.wrapping_add(REL32_INST_LEN) as i64 + value as i64) as usize
}

fn modrm_len(code: &[u8]) -> Option<usize> {
    let modrm = *code.first()?;
    let (md, rm) = (modrm >> 6, modrm & 7);
    let sib = usize::from(md != 3 && rm == 4);
    let disp = match md {
        0 if rm == 5 => 4,
        0 if rm == 4 && code.get(1)? & 7 == 5 => 4,
        0 => 0,
        1 => 1,
        2 => 4,
        _ => 0,
    };
    Some(1 + sib + disp)
}

/// Length of the instruction at the start of `code`, and whether it is a
/// relative branch. `None` for opcodes outside the usual prologue set.
fn decode(code: &[u8]) -> Option<(usize, bool)> {
    let opcode = *code.first()?;
    let decoded = match opcode {
        0x50..=0x5f | 0x90 | 0xcc => (1, false),
        0x6a => (2, false),
        0x68 | 0xa1 | 0xa3 | 0xb8..=0xbf => (5, false),
        0x01 | 0x03 | 0x29 | 0x2b | 0x31 | 0x33 | 0x39 | 0x3b | 0x85 | 0x89 | 0x8b | 0x8d => {
            (1 + modrm_len(&code[1..])?, false)
        }
        0x83 => (2 + modrm_len(&code[1..])?, false),
        0x81 => (5 + modrm_len(&code[1..])?, false),
        0x64 => {
            let (len, branch) = decode(&code[1..])?;
            (1 + len, branch)
        }
        INST_CALL_REL32 | INST_JMP_REL32 => (REL32_INST_LEN, true),
        INST_JMP_REL8 | 0x70..=0x7f | 0xe0..=0xe3 => (2, true),
        0x0f if matches!(code.get(1)?, 0x80..=0x8f) => (6, true),
        _ => return None,
    };
    Some(decoded)
}

/// Offset of the first relative branch among the first `len` bytes.
///
/// Decoding stops at the first unknown opcode; bytes after it are not checked.
fn find_relative_branch(code: &[u8], len: usize) -> Option<usize> {
    let mut offset = 0;
    while offset < len {
        let (inst_len, branch) = decode(code.get(offset..)?)?;
        if branch {
            return Some(offset);
        }
        offset += inst_len;
    }
    None
}

struct Patch {
    addr: usize,
    original_bytes: Vec<u8>,
}

/// Writes code patches into host memory and journals the overwritten bytes.
pub struct Patcher {
    memory_accessor: MemoryAccessor,
    patches: Vec<Patch>,
}

impl Patcher {
    pub fn new(memory_accessor: MemoryAccessor) -> Self {
        Self {
            memory_accessor,
            patches: vec![],
        }
    }

    pub fn memory_accessor(&self) -> &MemoryAccessor {
        &self.memory_accessor
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    fn safe_write(&mut self, addr: usize, bytes: &[u8]) -> Result<()> {
        let old =
            self.memory_accessor
                .virtual_protect(addr, bytes.len(), Protection::ExecuteReadWrite)?;
        let result = self.memory_accessor.write(addr, bytes);
        self.memory_accessor.virtual_protect(addr, bytes.len(), old)?;
        result
    }

    pub fn patch(&mut self, addr: usize, bytes: &[u8]) -> Result<()> {
        let original_bytes = self.memory_accessor.read_vec(addr, bytes.len())?;
        self.safe_write(addr, bytes)?;
        self.patches.push(Patch {
            addr,
            original_bytes,
        });
        trace!("patched {} bytes at {:#x}", bytes.len(), addr);
        Ok(())
    }

    /// Overwrites `[start, end)` with `fill`.
    pub fn replace_range(&mut self, start: usize, end: usize, fill: u8) -> Result<()> {
        ensure!(end > start, "empty range {:#x}..{:#x}", start, end);
        self.patch(start, &vec![fill; end - start])
    }

    /// Points the `call rel32` at `call_site` to `target` and returns the
    /// destination it called before.
    pub fn hook_call(&mut self, call_site: usize, target: usize) -> Result<usize> {
        let mut inst = [0u8; REL32_INST_LEN];
        self.memory_accessor.read(call_site, &mut inst)?;
        ensure!(
            inst[0] == INST_CALL_REL32,
            "{:#x} is not a call instruction ({:#04x})",
            call_site,
            inst[0]
        );
        let original = rel32_target(call_site, &inst);
        self.patch(
            call_site,
            &assemble_rel32(INST_CALL_REL32, call_site, target),
        )?;
        Ok(original)
    }

    /// Redirects the function at `addr` to `replacement`.
    ///
    /// The first `prologue_len` bytes are moved into a trampoline that ends
    /// with a jump back behind them. `original` receives the trampoline
    /// before the entry is overwritten, so calling it runs the unmodified
    /// function.
    ///
    /// Stolen bytes are copied as is. A relative branch inside them is
    /// refused rather than relocated.
    pub fn install_hook<F: Copy>(
        &mut self,
        addr: usize,
        prologue_len: usize,
        original: &OriginalFn<F>,
        replacement: usize,
    ) -> Result<()> {
        ensure!(
            prologue_len >= REL32_INST_LEN,
            "prologue of {:#x} must be at least {} bytes",
            addr,
            REL32_INST_LEN
        );
        if original.is_captured() {
            bail!("original of {:#x} is already captured", addr);
        }
        // Read a little past the prologue so the last instruction decodes whole.
        let mut prologue = self
            .memory_accessor
            .read_vec(addr, prologue_len + MAX_INST_LEN)?;
        if let Some(offset) = find_relative_branch(&prologue, prologue_len) {
            bail!(
                "prologue of {:#x} has a relative branch at +{} ({:#04x}), already hooked?",
                addr,
                offset,
                prologue[offset]
            );
        }
        prologue.truncate(prologue_len);

        let trampoline = self
            .memory_accessor
            .alloc_executable(prologue_len + REL32_INST_LEN)?;
        let mut code = prologue;
        code.extend_from_slice(&assemble_rel32(
            INST_JMP_REL32,
            trampoline + prologue_len,
            addr + prologue_len,
        ));
        self.memory_accessor.write(trampoline, &code)?;
        original.capture(trampoline)?;

        let mut entry = assemble_rel32(INST_JMP_REL32, addr, replacement).to_vec();
        entry.resize(prologue_len, INST_NOP);
        self.patch(addr, &entry)?;
        debug!(
            "hooked {:#x} -> {:#x} (trampoline {:#x})",
            addr, replacement, trampoline
        );
        Ok(())
    }

    /// Writes every journaled original back, newest first.
    pub fn restore_all(&mut self) -> Result<()> {
        while let Some(patch) = self.patches.pop() {
            self.safe_write(patch.addr, &patch.original_bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::memory_accessors::ModuleImage;

    use super::*;

    const BASE: usize = 0x400000;

    fn image_with(addr: usize, code: &[u8]) -> MemoryAccessor {
        let mut image = ModuleImage::filled(BASE, 0x4000);
        image
            .virtual_protect(addr, code.len(), Protection::ExecuteReadWrite)
            .unwrap();
        image.write(addr, code).unwrap();
        image
            .virtual_protect(addr, code.len(), Protection::ExecuteRead)
            .unwrap();
        MemoryAccessor::ModuleImage(image)
    }

    fn protection(patcher: &Patcher, addr: usize) -> Protection {
        let MemoryAccessor::ModuleImage(image) = patcher.memory_accessor() else {
            unreachable!();
        };
        image.protection(addr)
    }

    #[test]
    fn replace_range_fills_half_open_range() {
        let mut patcher = Patcher::new(image_with(0x401000, &[1, 2, 3, 4, 5, 6]));
        patcher.replace_range(0x401001, 0x401004, INST_NOP).unwrap();
        let bytes = patcher.memory_accessor().read_vec(0x401000, 6).unwrap();
        assert_eq!(bytes, [1, 0x90, 0x90, 0x90, 5, 6]);
        assert_eq!(protection(&patcher, 0x401000), Protection::ExecuteRead);
    }

    #[test]
    fn replace_range_rejects_empty_range() {
        let mut patcher = Patcher::new(image_with(0x401000, &[1, 2]));
        assert!(patcher.replace_range(0x401001, 0x401001, INST_NOP).is_err());
        assert_eq!(patcher.patch_count(), 0);
    }

    #[test]
    fn hook_call_returns_previous_destination() {
        let call = assemble_rel32(INST_CALL_REL32, 0x401000, 0x402000);
        let mut patcher = Patcher::new(image_with(0x401000, &call));
        let original = patcher.hook_call(0x401000, 0x403000).unwrap();
        assert_eq!(original, 0x402000);

        let mut inst = [0; 5];
        patcher.memory_accessor().read(0x401000, &mut inst).unwrap();
        assert_eq!(rel32_target(0x401000, &inst), 0x403000);
    }

    #[test]
    fn hook_call_requires_call_instruction() {
        let mut patcher = Patcher::new(image_with(0x401000, &[0x55, 0x8b, 0xec, 0x90, 0x90]));
        assert!(patcher.hook_call(0x401000, 0x403000).is_err());
    }

    #[test]
    fn install_hook_builds_trampoline_and_redirects_entry() {
        // push -1; push 0x00812345; mov eax, ...
        let prologue = [0x6a, 0xff, 0x68, 0x45, 0x23, 0x81, 0x00, 0x64, 0xa1];
        let mut patcher = Patcher::new(image_with(0x401000, &prologue));
        let original = OriginalFn::<extern "C" fn()>::new();

        patcher
            .install_hook(0x401000, 7, &original, 0x403000)
            .unwrap();

        let trampoline = original.addr().unwrap();
        let code = patcher.memory_accessor().read_vec(trampoline, 12).unwrap();
        assert_eq!(&code[..7], &prologue[..7]);
        assert_eq!(code[7], INST_JMP_REL32);
        let mut jmp = [0; 5];
        jmp.copy_from_slice(&code[7..]);
        assert_eq!(rel32_target(trampoline + 7, &jmp), 0x401007);

        let entry = patcher.memory_accessor().read_vec(0x401000, 9).unwrap();
        let mut jmp = [0; 5];
        jmp.copy_from_slice(&entry[..5]);
        assert_eq!(entry[0], INST_JMP_REL32);
        assert_eq!(rel32_target(0x401000, &jmp), 0x403000);
        assert_eq!(&entry[5..7], &[INST_NOP, INST_NOP]);
        assert_eq!(&entry[7..], &prologue[7..]);
        assert_eq!(protection(&patcher, 0x401000), Protection::ExecuteRead);
    }

    #[test]
    fn install_hook_refuses_captured_slot_without_touching_host() {
        let prologue = [0x55, 0x8b, 0xec, 0x83, 0xec, 0x10];
        let mut patcher = Patcher::new(image_with(0x401000, &prologue));
        let original = OriginalFn::<extern "C" fn()>::new();
        original.capture(0x1234).unwrap();

        assert!(patcher
            .install_hook(0x401000, 6, &original, 0x403000)
            .is_err());
        assert_eq!(original.addr(), Some(0x1234));
        let entry = patcher.memory_accessor().read_vec(0x401000, 6).unwrap();
        assert_eq!(entry, prologue);
    }

    #[test]
    fn install_hook_refuses_branch_at_entry() {
        let jmp = assemble_rel32(INST_JMP_REL32, 0x401000, 0x402000);
        let mut patcher = Patcher::new(image_with(0x401000, &jmp));
        let original = OriginalFn::<extern "C" fn()>::new();
        assert!(patcher
            .install_hook(0x401000, 5, &original, 0x403000)
            .is_err());
        assert!(!original.is_captured());
    }

    #[test]
    fn install_hook_refuses_branch_inside_prologue() {
        // push ebp; mov ebp, esp; call rel32
        let mut code = vec![0x55, 0x8b, 0xec];
        code.extend_from_slice(&assemble_rel32(INST_CALL_REL32, 0x401003, 0x402000));
        let mut patcher = Patcher::new(image_with(0x401000, &code));
        let original = OriginalFn::<extern "C" fn()>::new();
        let err = patcher
            .install_hook(0x401000, 8, &original, 0x403000)
            .unwrap_err();
        assert!(err.to_string().contains("+3"), "{}", err);
        assert!(!original.is_captured());
        assert_eq!(patcher.patch_count(), 0);
        assert_eq!(patcher.memory_accessor().read_vec(0x401000, 8).unwrap(), code);
    }

    #[test]
    fn prologue_decoding_walks_instruction_boundaries() {
        // push -1; push imm32 holding an 0xe8 byte; mov eax, fs:[0]
        let code = [0x6a, 0xff, 0x68, 0xe8, 0x23, 0x81, 0x00, 0x64, 0xa1, 0, 0, 0, 0];
        assert_eq!(find_relative_branch(&code, 7), None);
        assert_eq!(find_relative_branch(&code, 13), None);
        // sub esp, 0x10; jz +4
        assert_eq!(find_relative_branch(&[0x83, 0xec, 0x10, 0x74, 0x04], 5), Some(3));
        // mov eax, [esp + 8]
        assert_eq!(decode(&[0x8b, 0x44, 0x24, 0x08]), Some((4, false)));
        assert_eq!(decode(&[0x0f, 0x84, 0, 0, 0, 0]), Some((6, true)));
    }

    #[test]
    fn install_hook_refuses_short_prologue() {
        let mut patcher = Patcher::new(image_with(0x401000, &[0x55, 0x8b, 0xec]));
        let original = OriginalFn::<extern "C" fn()>::new();
        assert!(patcher
            .install_hook(0x401000, 3, &original, 0x403000)
            .is_err());
    }

    #[test]
    fn restore_all_undoes_every_patch() {
        let prologue = [0x55, 0x8b, 0xec, 0x83, 0xec, 0x10, 0x53, 0x56];
        let mut patcher = Patcher::new(image_with(0x401000, &prologue));
        let original = OriginalFn::<extern "C" fn()>::new();
        patcher.replace_range(0x401006, 0x401008, INST_NOP).unwrap();
        patcher
            .install_hook(0x401000, 6, &original, 0x403000)
            .unwrap();
        assert_eq!(patcher.patch_count(), 2);

        patcher.restore_all().unwrap();
        assert_eq!(patcher.patch_count(), 0);
        let bytes = patcher.memory_accessor().read_vec(0x401000, 8).unwrap();
        assert_eq!(bytes, prologue);
    }
}
