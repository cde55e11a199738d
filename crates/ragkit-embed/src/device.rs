use candle_core::Device;
use tracing::{info, warn};

/// Accelerator when compiled in, CPU otherwise. `APP_DEVICE=cpu` forces the
/// CPU even when an accelerator is available.
pub fn select_device() -> Device {
    if std::env::var("APP_DEVICE").is_ok_and(|v| v.eq_ignore_ascii_case("cpu")) {
        info!("device: CPU (APP_DEVICE)");
        return Device::Cpu;
    }
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(dev) => {
                info!("device: CUDA 0");
                return dev;
            }
            Err(e) => warn!(error = %e, "CUDA unavailable"),
        }
    }
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => {
                info!("device: Metal (MPS)");
                return dev;
            }
            Err(e) => warn!(error = %e, "Metal unavailable"),
        }
    }
    info!("device: CPU");
    Device::Cpu
}
