use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use super::GpuInit;

/// Owns the wgpu core objects.
///
/// Unlike a windowed context there is no surface: rendering goes to offscreen
/// textures owned by [`WgpuDevice`](super::WgpuDevice).
pub struct Gpu {
    /// Kept alive for the adapter's lifetime.
    _instance: wgpu::Instance,

    /// Selected adapter; reused when the device has to be recreated.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    init: GpuInit,

    /// Set by the device-lost callback of the current device.
    lost: Arc<AtomicBool>,
}

impl Gpu {
    /// Creates a headless GPU context.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new_headless(init: GpuInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: init.force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = request_device(&adapter, &init).await?;
        let lost = watch_device_loss(&device);

        Ok(Gpu {
            _instance: instance,
            adapter,
            device,
            queue,
            init,
            lost,
        })
    }

    /// Requests a fresh device/queue pair from the same adapter.
    ///
    /// Every resource created on the previous device is invalid afterwards.
    pub async fn recreate_device(&mut self) -> Result<()> {
        let (device, queue) = request_device(&self.adapter, &self.init).await?;
        self.lost = watch_device_loss(&device);
        self.device = device;
        self.queue = queue;
        log::info!("wgpu device recreated");
        Ok(())
    }

    /// True once the current device reported a loss.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Destroys the current device; used to exercise loss handling.
    pub fn destroy_device(&self) {
        self.device.destroy();
        self.lost.store(true, Ordering::Release);
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

async fn request_device(adapter: &wgpu::Adapter, init: &GpuInit) -> Result<(wgpu::Device, wgpu::Queue)> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("prism-engine device"),
            required_features: init.required_features,
            required_limits: init.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .context("failed to create wgpu device/queue")
}

fn watch_device_loss(device: &wgpu::Device) -> Arc<AtomicBool> {
    let lost = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&lost);
    device.set_device_lost_callback(move |reason, message| {
        log::warn!("wgpu device lost ({reason:?}): {message}");
        flag.store(true, Ordering::Release);
    });
    lost
}
