use std::mem::{offset_of, size_of};

use super::z_types::{
    BBox3D, Color, HostPtr, Plane, RenderContext, RenderLight, RenderLightContainer,
    SimpleVertex, Vec2, ZString,
};

/// Bumped whenever a mirrored struct changes.
pub const LAYOUT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
#[error("layout v{version}: {name} is {actual} bytes, host expects {expected}")]
pub struct LayoutMismatch {
    pub version: u32,
    pub name: &'static str,
    pub actual: usize,
    pub expected: usize,
}

struct Expectation {
    name: &'static str,
    actual: usize,
    expected: usize,
}

const fn expect(name: &'static str, actual: usize, expected: usize) -> Expectation {
    Expectation {
        name,
        actual,
        expected,
    }
}

fn expectations() -> [Expectation; 17] {
    [
        expect("HostPtr", size_of::<HostPtr<u8>>(), 4),
        expect("zTBBox3D", size_of::<BBox3D>(), 24),
        expect("zTBBox3D::Max", offset_of!(BBox3D, max), 12),
        expect("zTPlane", size_of::<Plane>(), 16),
        expect("zTPlane::Normal", offset_of!(Plane, normal), 4),
        expect("zTRenderContext", size_of::<RenderContext>(), 20),
        expect("zTRenderContext::cam", offset_of!(RenderContext, cam), 12),
        expect("zTRenderContext::distVobToCam", offset_of!(RenderContext, dist_vob_to_cam), 16),
        expect("zCRenderLight", size_of::<RenderLight>(), 76),
        expect("zCRenderLight::Range", offset_of!(RenderLight, range), 40),
        expect("zCRenderLightContainer", size_of::<RenderLightContainer>(), 688),
        expect("zCRenderLightContainer::NumLights", offset_of!(RenderLightContainer, num_lights), 608),
        expect("zColor", size_of::<Color>(), 4),
        expect("zTRndSimpleVertex", size_of::<SimpleVertex>(), 24),
        expect("zTRndSimpleVertex::color", offset_of!(SimpleVertex, color), 20),
        expect("zVEC2", size_of::<Vec2>(), 8),
        expect("zSTRING", size_of::<ZString>(), 20),
    ]
}

/// Compares every mirrored struct against the host's layout.
///
/// Must pass before any pointer from the host is reinterpreted.
pub fn verify_layouts() -> Result<(), LayoutMismatch> {
    match expectations().into_iter().find(|e| e.actual != e.expected) {
        Some(e) => Err(LayoutMismatch {
            version: LAYOUT_VERSION,
            name: e.name,
            actual: e.actual,
            expected: e.expected,
        }),
        None => Ok(()),
    }
}
