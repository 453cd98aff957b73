//! Compute-device selection: a discrete accelerator when an index is
//! configured, the integrated accelerator on Apple hardware, otherwise
//! the CPU.

// External imports
use burn_ndarray::NdArrayDevice;

/// Device for the default ndarray backend. The accelerator hint is
/// ignored; ndarray always executes on the host.
pub fn default_device(_gpu: Option<usize>) -> NdArrayDevice {
    NdArrayDevice::Cpu
}

#[cfg(feature = "tch")]
pub use libtorch::select_device;

#[cfg(feature = "tch")]
mod libtorch {
    use burn_tch::LibTorchDevice;

    /// Picks the LibTorch device. An explicit CUDA index wins; without
    /// one, Apple hardware gets Mps and everything else the CPU.
    pub fn select_device(gpu: Option<usize>) -> LibTorchDevice {
        match gpu {
            Some(index) => LibTorchDevice::Cuda(index),
            None if cfg!(target_os = "macos") => LibTorchDevice::Mps,
            None => LibTorchDevice::Cpu,
        }
    }
}
