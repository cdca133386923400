pub mod layout;
pub mod memory_locations;
mod z_types;

use anyhow::Result;
use tracing::info;

use crate::{
    hook_function,
    hook_utils::OriginalFn,
    memory_accessors::MemoryAccessor,
    patcher::{Patcher, INST_NOP},
};
use memory_locations::{zcrnd_d3d, zcview, FunctionLocation};
pub use z_types::*;

/// The host executable, seen through the patches this renderer applies to it.
pub struct Gothic {
    patcher: Patcher,
}

impl Gothic {
    #[cfg(windows)]
    pub fn new_hooked_process() -> Self {
        use crate::memory_accessors::HookedProcess;
        Self::new(MemoryAccessor::HookedProcess(HookedProcess::new()))
    }

    pub fn new(memory_accessor: MemoryAccessor) -> Self {
        Self {
            patcher: Patcher::new(memory_accessor),
        }
    }

    pub fn patcher(&self) -> &Patcher {
        &self.patcher
    }

    fn hook<F: Copy>(
        &mut self,
        location: FunctionLocation,
        original: &OriginalFn<F>,
        target: usize,
    ) -> Result<()> {
        self.patcher
            .install_hook(location.addr, location.prologue_len, original, target)?;
        info!("hooked {} at {:#x}", location.name, location.addr);
        Ok(())
    }

    /// Detours `zCView::SetMode` and removes its actual mode change so that
    /// only the UI updates run when the original is called.
    pub fn hook_view_set_mode<F: Copy>(
        &mut self,
        original: &OriginalFn<F>,
        target: usize,
    ) -> Result<()> {
        self.hook(zcview::SET_MODE, original, target)?;
        self.patcher.replace_range(
            zcview::REPL_SET_MODE_MODECHANGE_START,
            zcview::REPL_SET_MODE_MODECHANGE_END,
            INST_NOP,
        )
    }

    hook_function!(zcview::PRINT_CHARS, hook_view_print_chars);
    hook_function!(zcrnd_d3d::BEGIN_FRAME, hook_rnd_begin_frame);
    hook_function!(zcrnd_d3d::END_FRAME, hook_rnd_end_frame);
    hook_function!(zcrnd_d3d::VID_BLIT, hook_rnd_vid_blit);
    hook_function!(zcrnd_d3d::SET_ALPHA_BLEND_FUNC, hook_rnd_set_alpha_blend_func);
    hook_function!(zcrnd_d3d::DRAW_POLY_SIMPLE, hook_rnd_draw_poly_simple);
    hook_function!(
        zcrnd_d3d::VID_GET_FRONT_BUFFER_COPY,
        hook_rnd_vid_get_front_buffer_copy
    );

    /// Restores every byte this renderer has overwritten.
    pub fn unhook_all(&mut self) -> Result<()> {
        self.patcher.restore_all()
    }
}
