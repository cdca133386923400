use std::{collections::HashMap, rc::Rc};

use derive_new::new;
use getset::CopyGetters;
use tracing::{debug, error, info};

use super::{
    device::{GpuDevice, ResourceId, ShaderDesc, ShaderMacro, ShaderStage},
    error::{DeviceError, EngineError},
};

#[derive(Debug, PartialEq, Eq, CopyGetters, new)]
pub struct Shader {
    #[get_copy = "pub"]
    name: &'static str,
    #[get_copy = "pub"]
    stage: ShaderStage,
    #[get_copy = "pub"]
    id: ResourceId,
}

const fn shader(name: &'static str, stage: ShaderStage) -> ShaderDesc {
    ShaderDesc { name, stage }
}

pub const VS_EX: &str = "VS_Ex";
pub const VS_TRANSFORMED_EX: &str = "VS_TransformedEx";
pub const PS_FIXED_FUNCTION_PIPE: &str = "PS_FixedFunctionPipe";
pub const PS_SIMPLE: &str = "PS_Simple";
pub const PS_DIFFUSE: &str = "PS_Diffuse";
pub const GS_BILLBOARD: &str = "GS_Billboard";
pub const HD_PNAEN_TESSELATION: &str = "PNAEN_Tesselation";

/// Every shader the engine compiles at startup.
pub const DEFAULT_SHADERS: &[ShaderDesc] = &[
    shader(VS_EX, ShaderStage::Vertex),
    shader(VS_TRANSFORMED_EX, ShaderStage::Vertex),
    shader("VS_ExInstancedObj", ShaderStage::Vertex),
    shader(PS_FIXED_FUNCTION_PIPE, ShaderStage::Pixel),
    shader(PS_SIMPLE, ShaderStage::Pixel),
    shader(PS_DIFFUSE, ShaderStage::Pixel),
    shader("PS_DiffuseAlphaTest", ShaderStage::Pixel),
    shader("PS_DiffuseNormalmapped", ShaderStage::Pixel),
    shader("PS_DiffuseNormalmappedAlphaTest", ShaderStage::Pixel),
    shader(GS_BILLBOARD, ShaderStage::Geometry),
    shader(HD_PNAEN_TESSELATION, ShaderStage::HullDomain),
];

/// Owns every compiled shader, keyed by stage and name.
#[derive(Default)]
pub struct ShaderManager {
    shaders: HashMap<ShaderStage, HashMap<&'static str, Rc<Shader>>>,
}

impl ShaderManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shaders.values().map(|by_name| by_name.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn compile(
        &mut self,
        device: &mut impl GpuDevice,
        desc: &ShaderDesc,
        macros: &[ShaderMacro],
    ) -> Result<Rc<Shader>, DeviceError> {
        let id = device.compile_shader(desc, macros)?;
        let shader = Rc::new(Shader::new(desc.name, desc.stage, id));
        let old = self
            .shaders
            .entry(desc.stage)
            .or_default()
            .insert(desc.name, shader.clone());
        if let Some(old) = old {
            device.release(old.id());
        }
        debug!("compiled {:?} shader {}", desc.stage, desc.name);
        Ok(shader)
    }

    /// Compiles `shaders`, continuing past failures. The first failure is
    /// returned after every shader was tried.
    pub fn compile_all(
        &mut self,
        device: &mut impl GpuDevice,
        shaders: &[ShaderDesc],
        macros: &[ShaderMacro],
    ) -> Result<(), DeviceError> {
        let mut first_err = None;
        for desc in shaders {
            if let Err(err) = self.compile(device, desc, macros) {
                error!("{}", err);
                first_err.get_or_insert(err);
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        info!("compiled {} shaders", self.len());
        Ok(())
    }

    pub fn get(&self, stage: ShaderStage, name: &str) -> Result<Rc<Shader>, EngineError> {
        self.shaders
            .get(&stage)
            .and_then(|by_name| by_name.get(name))
            .cloned()
            .ok_or_else(|| EngineError::ShaderNotFound {
                name: name.to_owned(),
                stage,
            })
    }

    pub fn release_all(&mut self, device: &mut impl GpuDevice) {
        for (_, by_name) in self.shaders.drain() {
            for (_, shader) in by_name {
                device.release(shader.id());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HeadlessDevice;

    #[test]
    fn lookup_by_stage_and_name() {
        let mut device = HeadlessDevice::recording();
        let mut manager = ShaderManager::new();
        manager
            .compile_all(&mut device, DEFAULT_SHADERS, &[])
            .unwrap();
        assert_eq!(manager.len(), DEFAULT_SHADERS.len());

        let ps = manager.get(ShaderStage::Pixel, PS_DIFFUSE).unwrap();
        assert_eq!(ps.name(), PS_DIFFUSE);
        assert_eq!(ps.stage(), ShaderStage::Pixel);

        let err = manager.get(ShaderStage::Vertex, PS_DIFFUSE).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ShaderNotFound { stage: ShaderStage::Vertex, .. }
        ));
        assert!(manager.get(ShaderStage::Pixel, "PS_Missing").is_err());
    }

    #[test]
    fn compile_all_keeps_going_after_failure() {
        let mut device = HeadlessDevice::recording();
        device.fail_shader(PS_SIMPLE);
        let mut manager = ShaderManager::new();
        let result = manager.compile_all(&mut device, DEFAULT_SHADERS, &[]);
        assert_eq!(
            result,
            Err(DeviceError::ShaderCompilation(PS_SIMPLE.to_owned()))
        );
        assert_eq!(manager.len(), DEFAULT_SHADERS.len() - 1);
    }

    #[test]
    fn recompiling_releases_the_old_shader() {
        let mut device = HeadlessDevice::recording();
        let mut manager = ShaderManager::new();
        let desc = &DEFAULT_SHADERS[0];
        let first = manager.compile(&mut device, desc, &[]).unwrap();
        manager.compile(&mut device, desc, &[]).unwrap();
        assert!(!device.is_live(first.id()));
        assert_eq!(manager.len(), 1);

        manager.release_all(&mut device);
        assert!(manager.is_empty());
        assert_eq!(device.live_resource_count(), 0);
    }
}
