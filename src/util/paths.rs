// External imports
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

// Internal imports
use crate::error::Result;

/// Resolves the directory checkpoints are written under, creating it if
/// needed. With no explicit path a timestamped directory under the
/// system temp dir is used, so every unconfigured run gets its own
/// scratch space.
pub fn get_or_create_path(save_path: Option<&Path>) -> Result<PathBuf> {
    let dir = match save_path {
        Some(path) => path.to_path_buf(),
        None => std::env::temp_dir().join(format!(
            "seqcast_{}",
            Local::now().format("%Y%m%d_%H%M%S%3f")
        )),
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_path_is_created_and_returned() {
        let base = tempdir().unwrap();
        let wanted = base.path().join("runs/exp1");
        let resolved = get_or_create_path(Some(&wanted)).unwrap();
        assert_eq!(resolved, wanted);
        assert!(wanted.is_dir());
    }

    #[test]
    fn default_path_lands_in_temp_dir() {
        let resolved = get_or_create_path(None).unwrap();
        assert!(resolved.starts_with(std::env::temp_dir()));
        assert!(resolved.is_dir());
    }
}
