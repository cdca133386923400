pub mod engine;
mod gothic;
pub mod hook_utils;
mod macros;
pub mod memory_accessors;
pub mod patcher;

pub use crate::gothic::*;
pub use hook_utils::{HookPolicy, HookScope, OriginalFn};
