use super::device::ShaderStage;

/// Failure reported by a [`GpuDevice`](super::GpuDevice) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("{call} failed: {reason}")]
    CallFailed { call: &'static str, reason: String },
    #[error("device removed")]
    DeviceRemoved,
    #[error("shader compilation of {0} failed")]
    ShaderCompilation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No GPU device could be created. The engine has no degraded mode.
    #[error("device creation failed: {0}")]
    DeviceCreation(DeviceError),
    #[error("engine is not initialized")]
    NotInitialized,
    #[error("{stage:?} shader not found: {name}")]
    ShaderNotFound { name: String, stage: ShaderStage },
    #[error("no active {0:?} shader")]
    NoActiveShader(ShaderStage),
    #[error("vertex data too short: {expected} bytes needed, {actual} given")]
    VertexDataTooShort { expected: usize, actual: usize },
    #[error("invalid resolution {0}x{1}")]
    InvalidResolution(i32, i32),
    #[error(transparent)]
    Device(#[from] DeviceError),
}
