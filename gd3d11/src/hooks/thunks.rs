//! Entry points with the host's calling conventions.

use std::{ffi::c_void, slice};

use anyhow::Result;
use gd3d11_lib::{
    engine::{EngineError, GraphicsEngine},
    memory_locations::{zcrnd_d3d, zcview, FunctionLocation},
    Gothic, HookPolicy, OriginalFn, SimpleVertex, ZString,
};
use tracing::{debug, error};

use super::{rnd, view};
use crate::state;

type FnSetMode = extern "C" fn(i32, i32, i32, *mut c_void);
type FnPrintChars = extern "thiscall" fn(*mut c_void, i32, i32, *const ZString);
type FnRndFrame = extern "thiscall" fn(*mut c_void);
type FnVidBlit = extern "thiscall" fn(*mut c_void, i32, *mut c_void, *mut c_void);
type FnSetAlphaBlendFunc = extern "thiscall" fn(*mut c_void, *const i32);
type FnDrawPolySimple = extern "thiscall" fn(*mut c_void, *mut c_void, *const SimpleVertex, i32);
type FnVidGetFrontBufferCopy = extern "thiscall" fn(*mut c_void, *mut c_void) -> i32;

static SET_MODE: OriginalFn<FnSetMode> = OriginalFn::new();
static PRINT_CHARS: OriginalFn<FnPrintChars> = OriginalFn::new();
static BEGIN_FRAME: OriginalFn<FnRndFrame> = OriginalFn::new();
static END_FRAME: OriginalFn<FnRndFrame> = OriginalFn::new();
static VID_BLIT: OriginalFn<FnVidBlit> = OriginalFn::new();
static SET_ALPHA_BLEND_FUNC: OriginalFn<FnSetAlphaBlendFunc> = OriginalFn::new();
static DRAW_POLY_SIMPLE: OriginalFn<FnDrawPolySimple> = OriginalFn::new();
static VID_GET_FRONT_BUFFER_COPY: OriginalFn<FnVidGetFrontBufferCopy> = OriginalFn::new();

/// The host cannot be told about failures.
fn report(location: FunctionLocation, result: Result<(), EngineError>) {
    if let Err(err) = result {
        error!("{}: {}", location.name, err);
    }
}

fn with_engine(
    location: FunctionLocation,
    body: impl FnOnce(&mut dyn GraphicsEngine) -> Result<(), EngineError>,
) {
    if let Some(engine) = state::engine() {
        report(location, body(engine));
    }
}

extern "C" fn hooked_set_mode(x: i32, y: i32, bpp: i32, window: *mut c_void) {
    let Some(original) = SET_MODE.get() else {
        return;
    };
    let result = view::set_mode(state::engine, x, y, || original(x, y, bpp, window));
    report(zcview::SET_MODE, result);
}

extern "thiscall" fn hooked_print_chars(this: *mut c_void, x: i32, y: i32, text: *const ZString) {
    let Some(original) = PRINT_CHARS.get() else {
        return;
    };
    let read_text = || match unsafe { text.as_ref() } {
        Some(text) => unsafe { text.to_string_lossy() },
        None => String::new(),
    };
    let result = view::print_chars(state::engine, x, y, read_text, || {
        original(this, x, y, text)
    });
    report(zcview::PRINT_CHARS, result);
}

extern "thiscall" fn hooked_begin_frame(_this: *mut c_void) {
    with_engine(zcrnd_d3d::BEGIN_FRAME, rnd::begin_frame);
}

extern "thiscall" fn hooked_end_frame(_this: *mut c_void) {
    with_engine(zcrnd_d3d::END_FRAME, rnd::end_frame);
}

extern "thiscall" fn hooked_vid_blit(
    _this: *mut c_void,
    _unknown: i32,
    _src: *mut c_void,
    _dst: *mut c_void,
) {
    with_engine(zcrnd_d3d::VID_BLIT, rnd::vid_blit);
}

extern "thiscall" fn hooked_set_alpha_blend_func(this: *mut c_void, func: *const i32) {
    let Some(original) = SET_ALPHA_BLEND_FUNC.get() else {
        return;
    };
    let Some(&value) = (unsafe { func.as_ref() }) else {
        return original(this, func);
    };
    let result = rnd::set_alpha_blend_func(state::engine, value, || original(this, func));
    report(zcrnd_d3d::SET_ALPHA_BLEND_FUNC, result);
}

extern "thiscall" fn hooked_draw_poly_simple(
    _this: *mut c_void,
    _texture: *mut c_void,
    vertices: *const SimpleVertex,
    num_vertices: i32,
) {
    if vertices.is_null() || num_vertices <= 0 {
        return;
    }
    let polygon = unsafe { slice::from_raw_parts(vertices, num_vertices as usize) };
    with_engine(zcrnd_d3d::DRAW_POLY_SIMPLE, |engine| {
        rnd::draw_poly_simple(engine, polygon)
    });
}

extern "thiscall" fn hooked_vid_get_front_buffer_copy(
    _this: *mut c_void,
    _texture_convert: *mut c_void,
) -> i32 {
    with_engine(
        zcrnd_d3d::VID_GET_FRONT_BUFFER_COPY,
        rnd::vid_get_front_buffer_copy,
    );
    0
}

fn installed(location: FunctionLocation, policy: HookPolicy) {
    debug!("{} policy: {}", location.name, policy);
}

pub fn install_hooks(gothic: &mut Gothic) -> Result<()> {
    gothic.hook_view_set_mode(&SET_MODE, hooked_set_mode as usize)?;
    installed(zcview::SET_MODE, view::SET_MODE_POLICY);
    gothic.hook_view_print_chars(&PRINT_CHARS, hooked_print_chars as usize)?;
    installed(zcview::PRINT_CHARS, view::PRINT_CHARS_POLICY);

    gothic.hook_rnd_begin_frame(&BEGIN_FRAME, hooked_begin_frame as usize)?;
    installed(zcrnd_d3d::BEGIN_FRAME, rnd::BEGIN_FRAME_POLICY);
    gothic.hook_rnd_end_frame(&END_FRAME, hooked_end_frame as usize)?;
    installed(zcrnd_d3d::END_FRAME, rnd::END_FRAME_POLICY);
    gothic.hook_rnd_vid_blit(&VID_BLIT, hooked_vid_blit as usize)?;
    installed(zcrnd_d3d::VID_BLIT, rnd::VID_BLIT_POLICY);
    gothic.hook_rnd_set_alpha_blend_func(
        &SET_ALPHA_BLEND_FUNC,
        hooked_set_alpha_blend_func as usize,
    )?;
    installed(
        zcrnd_d3d::SET_ALPHA_BLEND_FUNC,
        rnd::SET_ALPHA_BLEND_FUNC_POLICY,
    );
    gothic.hook_rnd_draw_poly_simple(&DRAW_POLY_SIMPLE, hooked_draw_poly_simple as usize)?;
    installed(zcrnd_d3d::DRAW_POLY_SIMPLE, rnd::DRAW_POLY_SIMPLE_POLICY);
    gothic.hook_rnd_vid_get_front_buffer_copy(
        &VID_GET_FRONT_BUFFER_COPY,
        hooked_vid_get_front_buffer_copy as usize,
    )?;
    installed(
        zcrnd_d3d::VID_GET_FRONT_BUFFER_COPY,
        rnd::VID_GET_FRONT_BUFFER_COPY_POLICY,
    );
    Ok(())
}
