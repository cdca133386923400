use std::{collections::HashMap, hash::Hash};

use bytemuck::{Pod, Zeroable};

use super::{device::ResourceId, error::DeviceError};
use crate::{AlphaBlendFunc, Matrix};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterizerStateDesc {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub front_counter_clockwise: bool,
    pub depth_clip_enable: bool,
    pub depth_bias: i32,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Solid,
            front_counter_clockwise: false,
            depth_clip_enable: true,
            depth_bias: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blend {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendStateDesc {
    pub blend_enable: bool,
    pub src_blend: Blend,
    pub dest_blend: Blend,
    pub blend_op: BlendOp,
    pub src_blend_alpha: Blend,
    pub dest_blend_alpha: Blend,
    pub blend_op_alpha: BlendOp,
    pub color_write_enable: bool,
}

impl Default for BlendStateDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: Blend::One,
            dest_blend: Blend::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: Blend::One,
            dest_blend_alpha: Blend::Zero,
            blend_op_alpha: BlendOp::Add,
            color_write_enable: true,
        }
    }
}

impl BlendStateDesc {
    fn enabled(src_blend: Blend, dest_blend: Blend, blend_op: BlendOp) -> Self {
        Self {
            blend_enable: true,
            src_blend,
            dest_blend,
            blend_op,
            src_blend_alpha: Blend::One,
            dest_blend_alpha: Blend::Zero,
            blend_op_alpha: BlendOp::Add,
            color_write_enable: true,
        }
    }

    /// The blend preset the host's alpha function stands for.
    pub fn from_alpha_func(func: AlphaBlendFunc) -> Self {
        match func {
            AlphaBlendFunc::MatDefault | AlphaBlendFunc::None | AlphaBlendFunc::Test => {
                Self::default()
            }
            AlphaBlendFunc::Blend | AlphaBlendFunc::BlendTest => {
                Self::enabled(Blend::SrcAlpha, Blend::InvSrcAlpha, BlendOp::Add)
            }
            AlphaBlendFunc::Add => Self::enabled(Blend::SrcAlpha, Blend::One, BlendOp::Add),
            AlphaBlendFunc::Sub => {
                Self::enabled(Blend::SrcAlpha, Blend::One, BlendOp::RevSubtract)
            }
            AlphaBlendFunc::Mul => Self::enabled(Blend::DestColor, Blend::Zero, BlendOp::Add),
            AlphaBlendFunc::Mul2 => {
                Self::enabled(Blend::DestColor, Blend::SrcColor, BlendOp::Add)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilStateDesc {
    pub depth_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: ComparisonFunc,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_enable: true,
            depth_func: ComparisonFunc::LessEqual,
        }
    }
}

/// Device state objects keyed by their description.
///
/// Entries live as long as the engine; there is no eviction.
pub struct StateCache<D> {
    states: HashMap<D, ResourceId>,
    bound: Option<D>,
}

impl<D: Clone + Eq + Hash> StateCache<D> {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            bound: None,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns the state object to bind for `desc`, or `None` when it is
    /// already bound. `create` only runs for descriptions never seen before.
    pub fn resolve(
        &mut self,
        desc: &D,
        create: impl FnOnce(&D) -> Result<ResourceId, DeviceError>,
    ) -> Result<Option<ResourceId>, DeviceError> {
        if self.bound.as_ref() == Some(desc) {
            return Ok(None);
        }
        let id = match self.states.get(desc) {
            Some(&id) => id,
            None => {
                let id = create(desc)?;
                self.states.insert(desc.clone(), id);
                id
            }
        };
        self.bound = Some(desc.clone());
        Ok(Some(id))
    }

    /// Forgets which state is bound so that the next `resolve` rebinds.
    pub fn invalidate(&mut self) {
        self.bound = None;
    }

    pub fn drain(&mut self) -> impl Iterator<Item = ResourceId> + '_ {
        self.bound = None;
        self.states.drain().map(|(_, id)| id)
    }
}

impl<D: Clone + Eq + Hash> Default for StateCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Layout of the transforms constant buffer, column major for the shaders.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct TransformsConstantBuffer {
    pub view: Matrix,
    pub projection: Matrix,
}

unsafe impl Pod for TransformsConstantBuffer {}
unsafe impl Zeroable for TransformsConstantBuffer {}

/// Layout of the per-instance constant buffer: the world matrix of the
/// object being drawn.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct PerInstanceConstantBuffer {
    pub world: Matrix,
}

unsafe impl Pod for PerInstanceConstantBuffer {}
unsafe impl Zeroable for PerInstanceConstantBuffer {}

/// Render state the host sets through its fixed-function renderer.
#[derive(Clone, Debug)]
pub struct FixedFunctionState {
    pub rasterizer: RasterizerStateDesc,
    pub blend: BlendStateDesc,
    pub depth_stencil: DepthStencilStateDesc,
    alpha_func: AlphaBlendFunc,
    world: Matrix,
    view: Matrix,
    projection: Matrix,
    transforms_dirty: bool,
    world_dirty: bool,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            rasterizer: RasterizerStateDesc::default(),
            blend: BlendStateDesc::default(),
            depth_stencil: DepthStencilStateDesc::default(),
            alpha_func: AlphaBlendFunc::default(),
            world: Matrix::IDENTITY,
            view: Matrix::IDENTITY,
            projection: Matrix::IDENTITY,
            transforms_dirty: true,
            world_dirty: true,
        }
    }
}

impl FixedFunctionState {
    pub fn alpha_func(&self) -> AlphaBlendFunc {
        self.alpha_func
    }

    pub fn set_alpha_blend_func(&mut self, func: AlphaBlendFunc) {
        self.alpha_func = func;
        self.blend = BlendStateDesc::from_alpha_func(func);
    }

    pub fn set_z_enable(&mut self, enable: bool) {
        self.depth_stencil.depth_enable = enable;
    }

    pub fn set_z_write(&mut self, enable: bool) {
        self.depth_stencil.depth_write_enable = enable;
    }

    pub fn set_z_compare(&mut self, func: ComparisonFunc) {
        self.depth_stencil.depth_func = func;
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) {
        self.rasterizer.cull_mode = cull_mode;
    }

    pub fn world(&self) -> &Matrix {
        &self.world
    }

    pub fn set_world_transform(&mut self, world: Matrix) {
        if self.world != world {
            self.world = world;
            self.world_dirty = true;
        }
    }

    pub fn set_view_transform(&mut self, view: Matrix) {
        if self.view != view {
            self.view = view;
            self.transforms_dirty = true;
        }
    }

    pub fn set_projection_transform(&mut self, projection: Matrix) {
        if self.projection != projection {
            self.projection = projection;
            self.transforms_dirty = true;
        }
    }

    pub fn transforms_dirty(&self) -> bool {
        self.transforms_dirty
    }

    pub fn world_dirty(&self) -> bool {
        self.world_dirty
    }

    pub fn take_world(&mut self) -> PerInstanceConstantBuffer {
        self.world_dirty = false;
        PerInstanceConstantBuffer {
            world: self.world.transpose(),
        }
    }

    /// Packs view and projection for upload and marks them as uploaded.
    pub fn take_transforms(&mut self) -> TransformsConstantBuffer {
        self.transforms_dirty = false;
        TransformsConstantBuffer {
            view: self.view.transpose(),
            projection: self.projection.transpose(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_funcs_map_to_blend_presets() {
        let blend = BlendStateDesc::from_alpha_func(AlphaBlendFunc::Blend);
        assert!(blend.blend_enable);
        assert_eq!(
            (blend.src_blend, blend.dest_blend),
            (Blend::SrcAlpha, Blend::InvSrcAlpha)
        );

        let add = BlendStateDesc::from_alpha_func(AlphaBlendFunc::Add);
        assert_eq!((add.dest_blend, add.blend_op), (Blend::One, BlendOp::Add));

        let sub = BlendStateDesc::from_alpha_func(AlphaBlendFunc::Sub);
        assert_eq!(sub.blend_op, BlendOp::RevSubtract);

        let mul2 = BlendStateDesc::from_alpha_func(AlphaBlendFunc::Mul2);
        assert_eq!(
            (mul2.src_blend, mul2.dest_blend),
            (Blend::DestColor, Blend::SrcColor)
        );

        for func in [
            AlphaBlendFunc::MatDefault,
            AlphaBlendFunc::None,
            AlphaBlendFunc::Test,
        ] {
            assert!(!BlendStateDesc::from_alpha_func(func).blend_enable);
        }
        assert_eq!(
            BlendStateDesc::from_alpha_func(AlphaBlendFunc::BlendTest),
            BlendStateDesc::from_alpha_func(AlphaBlendFunc::Blend)
        );
    }

    #[test]
    fn state_cache_creates_each_description_once() {
        let mut cache = StateCache::new();
        let mut created = 0;
        let mut next_id = 0;
        let mut resolve = |cache: &mut StateCache<RasterizerStateDesc>, desc| {
            cache
                .resolve(&desc, |_| {
                    created += 1;
                    next_id += 1;
                    Ok(ResourceId(next_id))
                })
                .unwrap()
        };

        let solid = RasterizerStateDesc::default();
        let wire = RasterizerStateDesc {
            fill_mode: FillMode::Wireframe,
            ..solid
        };
        assert_eq!(resolve(&mut cache, solid), Some(ResourceId(1)));
        assert_eq!(resolve(&mut cache, solid), None);
        assert_eq!(resolve(&mut cache, wire), Some(ResourceId(2)));
        assert_eq!(resolve(&mut cache, solid), Some(ResourceId(1)));
        cache.invalidate();
        assert_eq!(resolve(&mut cache, solid), Some(ResourceId(1)));
        drop(resolve);
        assert_eq!(created, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn state_cache_does_not_remember_failed_creation() {
        let mut cache = StateCache::<DepthStencilStateDesc>::new();
        let desc = DepthStencilStateDesc::default();
        let failed = cache.resolve(&desc, |_| {
            Err(DeviceError::CallFailed {
                call: "CreateDepthStencilState",
                reason: "out of memory".into(),
            })
        });
        assert!(failed.is_err());
        assert!(cache.is_empty());
        assert_eq!(
            cache.resolve(&desc, |_| Ok(ResourceId(7))).unwrap(),
            Some(ResourceId(7))
        );
    }

    #[test]
    fn transforms_are_dirty_only_after_a_change() {
        let mut state = FixedFunctionState::default();
        assert!(state.transforms_dirty());
        state.take_transforms();
        assert!(!state.transforms_dirty());

        state.set_view_transform(Matrix::IDENTITY);
        assert!(!state.transforms_dirty());

        let mut view = Matrix::IDENTITY;
        view.0[3][0] = 5.0;
        state.set_view_transform(view);
        assert!(state.transforms_dirty());
        let packed = state.take_transforms();
        assert_eq!(packed.view.0[0][3], 5.0);
    }

    #[test]
    fn world_is_tracked_apart_from_view_and_projection() {
        let mut state = FixedFunctionState::default();
        state.take_transforms();
        state.take_world();
        state.set_world_transform(Matrix::IDENTITY);
        assert!(!state.world_dirty());

        let mut world = Matrix::IDENTITY;
        world.0[3][1] = 7.0;
        state.set_world_transform(world);
        assert!(state.world_dirty());
        assert!(!state.transforms_dirty());
        assert_eq!(state.world(), &world);
        assert_eq!(state.take_world().world.0[1][3], 7.0);
        assert!(!state.world_dirty());
    }
}
