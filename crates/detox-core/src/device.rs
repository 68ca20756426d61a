use candle_core::Device;
use tracing::info;
use tracing::warn;

use crate::error::CoreResult;

/// Selects the best available compute device.
///
/// When the `cuda` feature is enabled and `prefer_gpu` is true, attempts to
/// acquire CUDA device `cuda_device_id`. Falls back to CPU on any error.
pub fn select_device(prefer_gpu: bool, #[allow(unused_variables)] cuda_device_id: usize) -> CoreResult<Device> {
    #[cfg(feature = "cuda")]
    if prefer_gpu {
        match Device::new_cuda(cuda_device_id) {
            Ok(dev) => {
                info!(cuda_device_id, "Using CUDA device");
                return Ok(dev);
            }
            Err(e) => {
                warn!(error = %e, "CUDA unavailable, falling back to CPU");
            }
        }
    }

    #[cfg(feature = "metal")]
    if prefer_gpu {
        match Device::new_metal(0) {
            Ok(dev) => {
                info!("Using Metal device");
                return Ok(dev);
            }
            Err(e) => {
                warn!(error = %e, "Metal unavailable, falling back to CPU");
            }
        }
    }

    info!("Using CPU device");
    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    if prefer_gpu {
        warn!(
            "--gpu flag has no effect: binary was not compiled with GPU support. \
             Rebuild with `cargo install --path crates/detox-cli --features cuda` \
             (requires NVIDIA CUDA toolkit)."
        );
    }
    Ok(Device::Cpu)
}

/// Seed the device RNG used for parameter initialisation.
///
/// Candle's CPU backend draws from the thread RNG and refuses `set_seed`, so
/// on CPU only data shuffling (seeded separately) is reproducible.
pub fn seed_device(device: &Device, seed: u64) -> CoreResult<()> {
    if matches!(device, Device::Cpu) {
        warn!(seed, "CPU device RNG cannot be seeded; weight initialisation is not reproducible");
        return Ok(());
    }
    device.set_seed(seed)?;
    info!(seed, device = device_name(device), "Device RNG seeded");
    Ok(())
}

/// Returns a human-readable description of a device.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA",
        Device::Metal(_) => "Metal",
    }
}
