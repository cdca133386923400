use bytemuck::{Pod, Zeroable};
use derive_new::new;
use getset::CopyGetters;

use super::device::{
    BufferUsage, Int2, RenderTargetDesc, RenderTargetKind, ResourceId, TextureDesc,
};
use crate::{RenderLight, SimpleVertex, Vec3};

/// Vertex format of every engine draw: position, normal, two uv sets, color.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct ExVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub tex_coord2: [f32; 2],
    pub color: u32,
}

unsafe impl Pod for ExVertex {}
unsafe impl Zeroable for ExVertex {}

impl From<&SimpleVertex> for ExVertex {
    /// Screen space vertex, position is already transformed.
    fn from(vertex: &SimpleVertex) -> Self {
        Self {
            position: [vertex.pos[0], vertex.pos[1], vertex.z],
            normal: [0.0; 3],
            tex_coord: vertex.uv,
            tex_coord2: [0.0; 2],
            color: vertex.color.dword(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters, new)]
pub struct VertexBuffer {
    #[get_copy = "pub"]
    id: ResourceId,
    #[get_copy = "pub"]
    size_in_bytes: usize,
    #[get_copy = "pub"]
    usage: BufferUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters, new)]
pub struct Texture {
    #[get_copy = "pub"]
    id: ResourceId,
    #[get_copy = "pub"]
    desc: TextureDesc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters, new)]
pub struct ConstantBuffer {
    #[get_copy = "pub"]
    id: ResourceId,
    #[get_copy = "pub"]
    size_in_bytes: usize,
}

impl ConstantBuffer {
    /// Constant buffers are sized in whole 16 byte registers.
    pub fn aligned_size(size: usize) -> usize {
        (size.max(1) + 15) & !15
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters, new)]
pub struct RenderTarget {
    #[get_copy = "pub"]
    id: ResourceId,
    #[get_copy = "pub"]
    desc: RenderTargetDesc,
}

impl RenderTarget {
    pub fn kind(&self) -> RenderTargetKind {
        self.desc.kind
    }

    pub fn size(&self) -> Int2 {
        self.desc.size
    }
}

/// Per light constants the lighting shaders read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct VobLightInfo {
    pub position: Vec3,
    pub range: f32,
    pub color: Vec3,
    pub range_inv: f32,
}

unsafe impl Pod for VobLightInfo {}
unsafe impl Zeroable for VobLightInfo {}

impl From<&RenderLight> for VobLightInfo {
    fn from(light: &RenderLight) -> Self {
        Self {
            position: light.position,
            range: light.range,
            color: light.color_diffuse,
            range_inv: light.range_inv,
        }
    }
}

/// A point light with its own shadow cube map. `dynamic` marks lights that
/// move with their vob.
#[derive(Clone, Copy, Debug, PartialEq, CopyGetters, new)]
pub struct ShadowedPointLight {
    #[get_copy = "pub"]
    light: VobLightInfo,
    #[get_copy = "pub"]
    shadow_cube: RenderTarget,
    #[get_copy = "pub"]
    dynamic: bool,
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;
    use crate::Color;

    #[test]
    fn ex_vertex_is_44_bytes() {
        assert_eq!(size_of::<ExVertex>(), 44);
        assert_eq!(size_of::<VobLightInfo>(), 32);
    }

    #[test]
    fn simple_vertex_converts_to_transformed_ex_vertex() {
        let simple = SimpleVertex {
            pos: [10.0, 20.0],
            z: 0.5,
            uv: [0.25, 0.75],
            color: Color::new(1, 2, 3, 4),
        };
        let ex = ExVertex::from(&simple);
        assert_eq!(ex.position, [10.0, 20.0, 0.5]);
        assert_eq!(ex.tex_coord, [0.25, 0.75]);
        assert_eq!(ex.color, 0x04030201);
        assert_eq!(ex.normal, [0.0; 3]);
    }

    #[test]
    fn constant_buffer_sizes_round_up_to_registers() {
        assert_eq!(ConstantBuffer::aligned_size(0), 16);
        assert_eq!(ConstantBuffer::aligned_size(16), 16);
        assert_eq!(ConstantBuffer::aligned_size(17), 32);
        assert_eq!(ConstantBuffer::aligned_size(128), 128);
    }

    #[test]
    fn light_info_copies_host_light() {
        let light = RenderLight {
            color_diffuse: Vec3::new(1.0, 0.5, 0.25),
            position: Vec3::new(100.0, 200.0, 300.0),
            range: 500.0,
            range_inv: 1.0 / 500.0,
            ..Default::default()
        };
        let info = VobLightInfo::from(&light);
        assert_eq!(info.position, light.position);
        assert_eq!(info.color, light.color_diffuse);
        assert_eq!(info.range, 500.0);
    }
}
