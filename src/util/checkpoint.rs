// External imports
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use std::fs;
use std::path::{Path, PathBuf};

// Internal imports
use crate::constants::{BEST_PARAMS_STEM, CHECKPOINT_DIR};
use crate::error::{ModelError, Result};

/// Creates (if needed) and returns the `model_ckpt` directory under the
/// resolved save path.
pub fn checkpoint_dir(save_path: &Path) -> Result<PathBuf> {
    let dir = save_path.join(CHECKPOINT_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path stem for the parameters written after epoch `step`.
pub fn epoch_params_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("model_{}_params", step))
}

/// Path stem for the best-epoch parameters.
pub fn best_params_path(dir: &Path) -> PathBuf {
    dir.join(BEST_PARAMS_STEM)
}

/// Persists a module's named parameter tensors with burn's binary file
/// recorder. Returns the path of the written file (stem plus the
/// recorder's `.bin` extension).
pub fn save_params<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<PathBuf> {
    module
        .clone()
        .save_file::<BinFileRecorder<FullPrecisionSettings>, _>(path, &Default::default())
        .map_err(|e| ModelError::Checkpoint {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(path.with_extension("bin"))
}

/// Restores parameters into a freshly constructed module of identical
/// architecture.
pub fn load_params<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    module
        .load_file::<BinFileRecorder<FullPrecisionSettings>, _>(path, &Default::default(), device)
        .map_err(|e| ModelError::Checkpoint {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gru::network::GruNet;
    use burn::tensor::Tensor;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn save_then_load_reproduces_outputs() {
        let device = NdArrayDevice::Cpu;
        let dir = tempdir().unwrap();
        let ckpt = checkpoint_dir(dir.path()).unwrap();

        let net = GruNet::<TestBackend>::new(3, 8, 1, 0.0, &device);
        let written = save_params::<TestBackend, _>(&net, &best_params_path(&ckpt)).unwrap();
        assert!(written.exists());

        let fresh = GruNet::<TestBackend>::new(3, 8, 1, 0.0, &device);
        let restored =
            load_params::<TestBackend, _>(fresh, &best_params_path(&ckpt), &device).unwrap();

        let x = Tensor::<TestBackend, 2>::ones([2, 12], &device);
        let a = net.forward(x.clone()).into_data();
        let b = restored.forward(x).into_data();
        assert_eq!(
            a.as_slice::<f32>().unwrap(),
            b.as_slice::<f32>().unwrap()
        );
    }

    #[test]
    fn epoch_paths_follow_the_step_naming() {
        let dir = Path::new("/tmp/run");
        assert_eq!(
            epoch_params_path(&dir.join(CHECKPOINT_DIR), 7),
            Path::new("/tmp/run/model_ckpt/model_7_params")
        );
    }
}
