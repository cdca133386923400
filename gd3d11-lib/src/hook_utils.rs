use std::{
    cell::Cell,
    fmt,
    marker::PhantomData,
    mem::{size_of, transmute_copy},
};

use anyhow::{ensure, Result};
use once_cell::sync::OnceCell;
use tracing::{span::EnteredSpan, trace_span};

/// Slot holding the callable original of a hooked host function.
///
/// Captured exactly once at install time and read for the rest of the
/// process lifetime.
pub struct OriginalFn<F> {
    addr: OnceCell<usize>,
    _fn: PhantomData<fn() -> F>,
}

impl<F: Copy> OriginalFn<F> {
    pub const fn new() -> Self {
        Self {
            addr: OnceCell::new(),
            _fn: PhantomData,
        }
    }

    pub fn capture(&self, addr: usize) -> Result<()> {
        ensure!(
            size_of::<F>() == size_of::<usize>(),
            "original slot type is not a function pointer"
        );
        ensure!(addr != 0, "original function address is null");
        self.addr
            .set(addr)
            .map_err(|_| anyhow::anyhow!("original function is already captured"))
    }

    pub fn is_captured(&self) -> bool {
        self.addr.get().is_some()
    }

    pub fn addr(&self) -> Option<usize> {
        self.addr.get().copied()
    }

    /// The original as a typed function pointer, ready to be called with the
    /// host's calling convention.
    pub fn get(&self) -> Option<F> {
        let addr = self.addr.get()?;
        Some(unsafe { transmute_copy::<usize, F>(addr) })
    }
}

impl<F: Copy> Default for OriginalFn<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a replacement does with the host's original behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookPolicy {
    /// The original is never called.
    Suppressed,
    /// The original is called and its result is returned as is.
    Forward,
    /// The original is called first, then the replacement applies its own work.
    ForwardThenOverride,
}

impl fmt::Display for HookPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPolicy::Suppressed => "suppressed",
            HookPolicy::Forward => "forward",
            HookPolicy::ForwardThenOverride => "forward+override",
        };
        f.write_str(name)
    }
}

thread_local! {
    static HOOK_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Entry/exit bookkeeping around the body of a hook function.
pub struct HookScope {
    _span: EnteredSpan,
}

impl HookScope {
    pub fn enter(name: &'static str) -> Self {
        let depth = HOOK_DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        Self {
            _span: trace_span!("hook", hook = name, depth).entered(),
        }
    }

    /// Number of hook bodies currently on the stack of this thread.
    pub fn depth() -> u32 {
        HOOK_DEPTH.with(|d| d.get())
    }
}

impl Drop for HookScope {
    fn drop(&mut self) {
        HOOK_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
