use thiserror::Error;

/// Failures that disable an engine. None of these reach the end user; the
/// caller logs them and carries on without the affected layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("request_device failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("no renderable {channels}-channel float format")]
    UnsupportedFormat { channels: u32 },
    #[error("field readback failed: {0}")]
    Readback(String),
    #[error("surface is zero-sized ({width}x{height})")]
    EmptySurface { width: u32, height: u32 },
    #[error("{width}x{height} exceeds the device texture limit of {max}")]
    TooLarge { width: u32, height: u32, max: u32 },
}

/// Errors from loading or saving [`crate::settings::EffectSettings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
