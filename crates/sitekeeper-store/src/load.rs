use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use sitekeeper_registry::Registry;

use crate::document::{ConfigDocument, DocumentError};
use crate::{BAK_SUFFIX, CONFIG_NAME, TEMP_SUFFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Temp,
    Backup,
}

#[derive(Debug)]
pub struct LoadReport {
    pub registry: Registry,
    pub source: LoadSource,
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error while loading configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration document: {0}")]
    Document(#[from] DocumentError),
}

/// Loads the registry from a configuration area, falling back from the
/// primary file to the `.tmp` sibling (a save that crashed before
/// activation) and then the `.bak` sibling (a save that crashed
/// mid-rename). `None` means no existing configuration; the caller
/// bootstraps from the install directory.
pub fn load_registry(config_dir: &Path, install_url: Option<&Url>) -> Option<LoadReport> {
    let primary = config_dir.join(CONFIG_NAME);
    let candidates = [
        (LoadSource::Primary, primary.clone()),
        (LoadSource::Temp, temp_path(&primary)),
        (LoadSource::Backup, backup_path(&primary)),
    ];
    for (source, path) in candidates {
        match load_file(&path, install_url) {
            Ok(registry) => {
                if source != LoadSource::Primary {
                    log::warn!("recovered configuration from {}", path.display());
                }
                return Some(LoadReport {
                    registry,
                    source,
                    path,
                });
            }
            Err(err) => {
                if path.exists() {
                    log::warn!("failed to load {}: {}", path.display(), err);
                } else {
                    log::debug!("no configuration at {}", path.display());
                }
            }
        }
    }
    None
}

pub fn load_file(path: &Path, install_url: Option<&Url>) -> Result<Registry, LoadError> {
    let raw = fs::read_to_string(path)?;
    let document: ConfigDocument = serde_json::from_str(&raw)?;
    Ok(document.into_registry(install_url.cloned())?)
}

pub fn temp_path(primary: &Path) -> PathBuf {
    suffixed(primary, TEMP_SUFFIX)
}

pub fn backup_path(primary: &Path) -> PathBuf {
    suffixed(primary, BAK_SUFFIX)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
