use std::{ffi::c_void, fmt, marker::PhantomData, mem::transmute};

use anyhow::{bail, Result};
use bytemuck::{Pod, Zeroable};

/// A 32-bit pointer into host memory.
///
/// Stored as the raw address so that mirrored structs keep the host's layout
/// on every build target.
#[repr(transparent)]
pub struct HostPtr<T>(u32, PhantomData<*const T>);

impl<T> HostPtr<T> {
    pub const NULL: Self = Self(0, PhantomData);

    pub const fn new(addr: u32) -> Self {
        Self(addr, PhantomData)
    }

    pub fn addr(self) -> u32 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// # Safety
    /// The address must point to a live `T` inside the current (host) process.
    pub unsafe fn as_ref<'a>(self) -> Option<&'a T> {
        (self.0 as usize as *const T).as_ref()
    }

    pub fn as_raw(self) -> *const c_void {
        self.0 as usize as *const c_void
    }
}

impl<T> Clone for HostPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for HostPtr<T> {}

impl<T> PartialEq for HostPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> fmt::Debug for HostPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostPtr({:#010x})", self.0)
    }
}

impl<T> Default for HostPtr<T> {
    fn default() -> Self {
        Self::NULL
    }
}

/// D3DXVECTOR3
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn axis(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl TryFrom<i32> for Axis {
    type Error = anyhow::Error;
    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::X),
            1 => Ok(Self::Y),
            2 => Ok(Self::Z),
            _ => bail!("Invalid axis: {}", value),
        }
    }
}

/// zVEC2
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Vec2 {
    pub v: [f32; 2],
}

/// D3DXMATRIX, row major.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Matrix(pub [[f32; 4]; 4]);

impl Matrix {
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub fn transpose(&self) -> Self {
        let m = &self.0;
        Self(std::array::from_fn(|r| std::array::from_fn(|c| m[c][r])))
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

unsafe impl Pod for Vec3 {}
unsafe impl Zeroable for Vec3 {}
unsafe impl Pod for Matrix {}
unsafe impl Zeroable for Matrix {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ClipType {
    In,
    Out,
    Crossing,
}

/// Frustum planes an object still has to be clipped against, one bit each.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct ClipFlags(pub i32);

impl ClipFlags {
    pub const NONE: i32 = 0;
    pub const FULL: i32 = 63;
    pub const NO_FAR: i32 = 15;

    pub fn is_fully_inside(self) -> bool {
        self.0 == Self::NONE
    }

    pub fn tests_far_plane(self) -> bool {
        self.0 & !Self::NO_FAR != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum PlaneClass {
    InFront,
    Behind,
    OnPlane,
    Spanning,
}

/// zTBBox3D
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C, packed)]
pub struct BBox3D {
    pub min: Vec3,
    pub max: Vec3,
}

impl BBox3D {
    /// Classifies the box against an axis aligned plane at `plane_dist`.
    ///
    /// Same test as the host: only the max corner is compared, so a plane
    /// touching the max corner counts as behind and `Spanning` is only
    /// returned for NaN input.
    pub fn classify_to_plane(&self, plane_dist: f32, axis: Axis) -> PlaneClass {
        let max = self.max;
        let corner = max.axis(axis);
        if plane_dist >= corner {
            PlaneClass::Behind
        } else if plane_dist <= corner {
            PlaneClass::InFront
        } else {
            PlaneClass::Spanning
        }
    }
}

/// zTPlane
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C, packed)]
pub struct Plane {
    pub distance: f32,
    pub normal: Vec3,
}

/// Opaque host classes only ever seen behind pointers.
pub enum ZCWorld {}
pub enum ZCVob {}
pub enum ZCCamera {}

/// zTRenderContext, truncated after the fields this renderer reads.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct RenderContext {
    pub clip_flags: ClipFlags,
    pub vob: HostPtr<ZCVob>,
    pub world: HostPtr<ZCWorld>,
    pub cam: HostPtr<ZCCamera>,
    pub dist_vob_to_cam: f32,
}

/// zCRenderLight
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct RenderLight {
    pub light_type: i32,
    pub color_diffuse: Vec3,
    pub position: Vec3,
    pub direction: Vec3,
    pub range: f32,
    pub range_inv: f32,
    pub position_ls: Vec3,
    pub direction_ls: Vec3,
    pub dir_approx_falloff: f32,
}

pub const MAX_RENDER_LIGHTS: usize = 8;

/// zCRenderLightContainer
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct RenderLightContainer {
    pub light_list: [RenderLight; MAX_RENDER_LIGHTS],
    pub num_lights: i32,
    _do_prelight: i32,
    _do_smooth_prelit: i32,
    _pre_light_dist: f32,
    _mat_obj_to_cam: Matrix,
}

impl RenderLightContainer {
    pub fn lights(&self) -> &[RenderLight] {
        let len = (self.num_lights.max(0) as usize).min(MAX_RENDER_LIGHTS);
        &self.light_list[..len]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(i32)]
pub enum AlphaBlendFunc {
    #[default]
    MatDefault,
    None,
    Blend,
    Add,
    Sub,
    Mul,
    Mul2,
    Test,
    BlendTest,
}

impl TryFrom<i32> for AlphaBlendFunc {
    type Error = anyhow::Error;
    fn try_from(value: i32) -> Result<Self> {
        if !(0..9).contains(&value) {
            bail!("Invalid AlphaBlendFunc: {}", value);
        }
        Ok(unsafe { transmute::<i32, AlphaBlendFunc>(value) })
    }
}

/// zColor, stored as BGRA bytes which read as a little endian ARGB dword.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub alpha: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    pub const fn new(b: u8, g: u8, r: u8, alpha: u8) -> Self {
        Self { b, g, r, alpha }
    }

    pub fn from_dword(dword: u32) -> Self {
        let [b, g, r, alpha] = dword.to_le_bytes();
        Self { b, g, r, alpha }
    }

    pub fn dword(self) -> u32 {
        u32::from_le_bytes([self.b, self.g, self.r, self.alpha])
    }

    pub fn is_white(self) -> bool {
        self.dword() == 0xffffffff
    }
}

/// zTRndSimpleVertex
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct SimpleVertex {
    pub pos: [f32; 2],
    pub z: f32,
    pub uv: [f32; 2],
    pub color: Color,
}

/// zSTRING, the host's `std::string` derivative.
#[derive(Debug)]
#[repr(C)]
pub struct ZString {
    _vtbl: u32,
    _allocator: u32,
    ptr: HostPtr<u8>,
    len: u32,
    _res: u32,
}

impl ZString {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0 || self.ptr.is_null()
    }

    /// # Safety
    /// `self` must be a live host string of the current process.
    pub unsafe fn to_string_lossy(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let bytes = std::slice::from_raw_parts(self.ptr.addr() as usize as *const u8, self.len());
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox_with_max(max: f32) -> BBox3D {
        BBox3D {
            min: Vec3::new(-1.0, -1.0, -1.0),
            max: Vec3::new(max, max * 2.0, max * 3.0),
        }
    }

    #[test]
    fn classify_to_plane_matrix() {
        let bbox = bbox_with_max(10.0);
        let cases = [
            // (plane_dist, axis, expected)
            (20.0, Axis::X, PlaneClass::Behind),
            (10.0, Axis::X, PlaneClass::Behind), // touching the max corner
            (9.999, Axis::X, PlaneClass::InFront),
            (-5.0, Axis::X, PlaneClass::InFront), // below min still only checks max
            (0.0, Axis::X, PlaneClass::InFront),  // inside the box is not spanning
            (20.0, Axis::Y, PlaneClass::Behind),
            (19.0, Axis::Y, PlaneClass::InFront),
            (30.0, Axis::Z, PlaneClass::Behind),
            (29.0, Axis::Z, PlaneClass::InFront),
        ];
        for (dist, axis, expected) in cases {
            assert_eq!(
                bbox.classify_to_plane(dist, axis),
                expected,
                "dist={} axis={:?}",
                dist,
                axis
            );
        }
    }

    #[test]
    fn classify_to_plane_spans_only_for_nan() {
        assert_eq!(
            bbox_with_max(10.0).classify_to_plane(f32::NAN, Axis::X),
            PlaneClass::Spanning
        );
        assert_eq!(
            bbox_with_max(f32::NAN).classify_to_plane(1.0, Axis::X),
            PlaneClass::Spanning
        );
    }

    #[test]
    fn axis_comes_from_host_index() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.axis(Axis::try_from(0).unwrap()), 1.0);
        assert_eq!(v.axis(Axis::try_from(2).unwrap()), 3.0);
        assert!(Axis::try_from(3).is_err());
        assert!(Axis::try_from(-1).is_err());
    }

    #[test]
    fn box_on_positive_side_never_spans() {
        let bbox = BBox3D {
            min: Vec3::new(5.0, 5.0, 5.0),
            max: Vec3::new(6.0, 6.0, 6.0),
        };
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            for dist in [-100.0, 0.0, 4.99, 5.0, 5.5, 6.0, 100.0] {
                assert_ne!(bbox.classify_to_plane(dist, axis), PlaneClass::Spanning);
            }
        }
    }

    #[test]
    fn alpha_blend_func_from_host_value() {
        assert_eq!(AlphaBlendFunc::try_from(0).unwrap(), AlphaBlendFunc::MatDefault);
        assert_eq!(AlphaBlendFunc::try_from(3).unwrap(), AlphaBlendFunc::Add);
        assert_eq!(AlphaBlendFunc::try_from(8).unwrap(), AlphaBlendFunc::BlendTest);
        assert!(AlphaBlendFunc::try_from(9).is_err());
        assert!(AlphaBlendFunc::try_from(-1).is_err());
    }

    #[test]
    fn color_dword_is_argb() {
        let color = Color::new(0x11, 0x22, 0x33, 0x44);
        assert_eq!(color.dword(), 0x44332211);
        assert_eq!(Color::from_dword(0x44332211), color);
        assert!(Color::WHITE.is_white());
        assert!(!color.is_white());
    }

    #[test]
    fn clip_flags() {
        assert!(ClipFlags(0).is_fully_inside());
        assert!(ClipFlags(ClipFlags::FULL).tests_far_plane());
        assert!(!ClipFlags(ClipFlags::NO_FAR).tests_far_plane());
    }

    #[test]
    fn render_light_container_clamps_count() {
        let mut container: RenderLightContainer = unsafe { std::mem::zeroed() };
        container.num_lights = 12;
        assert_eq!(container.lights().len(), MAX_RENDER_LIGHTS);
        container.num_lights = -1;
        assert!(container.lights().is_empty());
    }
}
