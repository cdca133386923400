use gd3d11_lib::{
    engine::{EngineError, GraphicsEngine, Int2, TrackedText},
    HookPolicy, HookScope,
};

/// The mode change itself is patched out at install time; the UI part of
/// the original still has to run.
pub const SET_MODE_POLICY: HookPolicy = HookPolicy::Forward;
pub const PRINT_CHARS_POLICY: HookPolicy = HookPolicy::ForwardThenOverride;

/// `zCView::SetMode`
pub fn set_mode<'e>(
    engine: impl FnOnce() -> Option<&'e mut dyn GraphicsEngine>,
    x: i32,
    y: i32,
    call_original: impl FnOnce(),
) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCView::SetMode");
    call_original();
    let Some(engine) = engine() else {
        return Ok(());
    };
    engine.on_resize(Int2::new(x, y))
}

/// `zCView::PrintChars`
pub fn print_chars<'e>(
    engine: impl FnOnce() -> Option<&'e mut dyn GraphicsEngine>,
    x: i32,
    y: i32,
    text: impl FnOnce() -> String,
    call_original: impl FnOnce(),
) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCView::PrintChars");
    call_original();
    let Some(engine) = engine() else {
        return Ok(());
    };
    let text = text();
    if !text.is_empty() {
        engine.track_text(TrackedText::new(x, y, text));
    }
    Ok(())
}
