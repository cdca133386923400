use std::mem::size_of;

use gd3d11_lib::{
    engine::{
        shader_manager::{PS_FIXED_FUNCTION_PIPE, VS_TRANSFORMED_EX},
        EngineError, ExVertex, GraphicsEngine,
    },
    AlphaBlendFunc, HookPolicy, HookScope, SimpleVertex,
};
use tracing::warn;

pub const BEGIN_FRAME_POLICY: HookPolicy = HookPolicy::Suppressed;
pub const END_FRAME_POLICY: HookPolicy = HookPolicy::Suppressed;
pub const VID_BLIT_POLICY: HookPolicy = HookPolicy::Suppressed;
pub const SET_ALPHA_BLEND_FUNC_POLICY: HookPolicy = HookPolicy::ForwardThenOverride;
pub const DRAW_POLY_SIMPLE_POLICY: HookPolicy = HookPolicy::Suppressed;
pub const VID_GET_FRONT_BUFFER_COPY_POLICY: HookPolicy = HookPolicy::Suppressed;

pub fn begin_frame(engine: &mut dyn GraphicsEngine) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCRnd_D3D::BeginFrame");
    engine.on_begin_frame()
}

pub fn end_frame(engine: &mut dyn GraphicsEngine) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCRnd_D3D::EndFrame");
    engine.on_end_frame()
}

pub fn vid_blit(engine: &mut dyn GraphicsEngine) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCRnd_D3D::Vid_Blit");
    engine.present()
}

/// The original keeps the host renderer's own bookkeeping of the blend func.
pub fn set_alpha_blend_func<'e>(
    engine: impl FnOnce() -> Option<&'e mut dyn GraphicsEngine>,
    func: i32,
    call_original: impl FnOnce(),
) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCRnd_D3D::SetAlphaBlendFunc");
    call_original();
    let func = match AlphaBlendFunc::try_from(func) {
        Ok(func) => func,
        Err(err) => {
            warn!("{}", err);
            return Ok(());
        }
    };
    if let Some(engine) = engine() {
        engine.set_alpha_blend_func(func);
    }
    Ok(())
}

/// Triangulates a convex polygon given as a fan into a triangle list.
fn fan_to_list(polygon: &[SimpleVertex]) -> Vec<ExVertex> {
    let Some((first, rest)) = polygon.split_first() else {
        return Vec::new();
    };
    let first = ExVertex::from(first);
    rest.windows(2)
        .flat_map(|edge| [first, ExVertex::from(&edge[0]), ExVertex::from(&edge[1])])
        .collect()
}

/// Screen space polygons, used by the host for its UI.
pub fn draw_poly_simple(
    engine: &mut dyn GraphicsEngine,
    polygon: &[SimpleVertex],
) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCRnd_D3D::DrawPolySimple");
    let vertices = fan_to_list(polygon);
    if vertices.is_empty() {
        return Ok(());
    }
    engine.set_active_vertex_shader(VS_TRANSFORMED_EX)?;
    engine.set_active_pixel_shader(PS_FIXED_FUNCTION_PIPE)?;

    let depth_stencil = engine.fixed_function_state().depth_stencil;
    engine.fixed_function_state().set_z_enable(false);
    let result = engine.draw_vertex_array(
        bytemuck::cast_slice(&vertices),
        vertices.len() as u32,
        0,
        size_of::<ExVertex>() as u32,
    );
    engine.fixed_function_state().depth_stencil = depth_stencil;
    result
}

pub fn vid_get_front_buffer_copy(engine: &mut dyn GraphicsEngine) -> Result<(), EngineError> {
    let _scope = HookScope::enter("zCRnd_D3D::Vid_GetFrontBufferCopy");
    engine.save_screenshot()
}
