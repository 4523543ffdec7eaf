use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{CONFIG_NAME, LOCK_SUFFIX};

/// Best-effort advisory lock guarding a configuration area against
/// concurrent use by another process. Acquisition failure is informational
/// only; callers continue without the lock. Released on drop.
#[derive(Debug)]
pub struct ConfigLock {
    path: PathBuf,
}

impl ConfigLock {
    pub fn acquire(config_dir: &Path) -> Option<Self> {
        if let Err(err) = fs::create_dir_all(config_dir) {
            log::warn!(
                "unable to prepare configuration area {}: {}",
                config_dir.display(),
                err
            );
            return None;
        }
        let path = config_dir.join(format!("{CONFIG_NAME}{LOCK_SUFFIX}"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Some(Self { path })
            }
            Err(err) => {
                log::warn!(
                    "configuration {} appears to be in use ({}); continuing without lock",
                    config_dir.display(),
                    err
                );
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
