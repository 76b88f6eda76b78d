use wgpu::{Features, TextureFormat, TextureFormatFeatureFlags, TextureUsages};

use crate::error::EngineError;
use crate::fluid::capabilities::FormatSupport;

/// Adapter, device and queue of one headless GPU context.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// Opens the default adapter. `WGPU_BACKEND` narrows the backend choice.
pub async fn request_context() -> Result<GpuContext, EngineError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::from_env().unwrap_or(wgpu::Backends::PRIMARY),
        ..Default::default()
    });
    let adapter = instance.request_adapter(&wgpu::RequestAdapterOptions::default()).await?;

    let wanted = Features::FLOAT32_FILTERABLE | Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("backdrop-fx"),
            required_features: adapter.features() & wanted,
            ..Default::default()
        })
        .await?;

    let info = adapter.get_info();
    log::info!("gpu adapter: {} ({:?})", info.name, info.backend);
    Ok(GpuContext { adapter, device, queue })
}

/// Whether `format` can be rendered to, sampled, and linearly filtered on
/// this device.
pub fn format_support(ctx: &GpuContext, format: TextureFormat) -> FormatSupport {
    let device_features = ctx.device.features();
    let features = if device_features.contains(Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES) {
        ctx.adapter.get_texture_format_features(format)
    } else {
        format.guaranteed_format_features(device_features)
    };

    let full_float = matches!(
        format,
        TextureFormat::R32Float | TextureFormat::Rg32Float | TextureFormat::Rgba32Float
    );
    let filterable = features.flags.contains(TextureFormatFeatureFlags::FILTERABLE)
        && (!full_float || device_features.contains(Features::FLOAT32_FILTERABLE));

    FormatSupport {
        renderable: features
            .allowed_usages
            .contains(TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING),
        filterable,
    }
}

pub fn map_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<(), EngineError> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    let _ = device.poll(wgpu::PollType::wait_indefinitely());
    rx.recv()
        .map_err(|_| EngineError::Readback("map_async channel closed".into()))?
        .map_err(|e| EngineError::Readback(e.to_string()))
}
