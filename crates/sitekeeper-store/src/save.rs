use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use sitekeeper_registry::Registry;

use crate::document::ConfigDocument;
use crate::load::{backup_path, temp_path};
use crate::{CONFIG_NAME, HISTORY_DIR};

#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Keep a timestamped copy of the replaced configuration under
    /// `history/`.
    pub retain_history: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            retain_history: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub history_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("no location to save configuration to")]
    NoLocation,
    #[error("failed to write configuration to {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    /// The new document was written but could not be made the active one.
    /// The prior state stays recoverable through the `.bak` and `.tmp`
    /// siblings on next load.
    #[error("failed to activate configuration {path:?}: {source}")]
    Activate { path: PathBuf, source: io::Error },
}

/// Writes the registry using the crash-safe protocol: write to `.tmp`, move
/// the current primary aside as `.bak`, rename `.tmp` into place, then drop
/// the `.bak`. At every instant one of primary/tmp/bak is a complete prior
/// or new state; the file believed valid is only ever produced by a rename,
/// never by in-place truncation.
///
/// Refreshes the registry date to the current time (whole seconds) and
/// clears the dirty flag on success.
pub fn save_registry(
    registry: &mut Registry,
    config_dir: Option<&Path>,
    options: &SaveOptions,
) -> Result<SaveReport, SaveError> {
    let dir = config_dir.ok_or(SaveError::NoLocation)?;
    fs::create_dir_all(dir).map_err(|source| SaveError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let primary = dir.join(CONFIG_NAME);

    let history_path = if options.retain_history && primary.exists() {
        preserve_history(dir, &primary)
    } else {
        None
    };

    registry.touch();
    let document = ConfigDocument::from_registry(registry);
    let json = serde_json::to_vec_pretty(&document).map_err(|err| SaveError::Write {
        path: primary.clone(),
        source: io::Error::new(io::ErrorKind::InvalidData, err),
    })?;

    let tmp = temp_path(&primary);
    fs::write(&tmp, &json).map_err(|source| SaveError::Write {
        path: tmp.clone(),
        source,
    })?;

    let bak = backup_path(&primary);
    // may still hold an old .bak from a prior failure
    let _ = fs::remove_file(&bak);
    if primary.exists() {
        fs::rename(&primary, &bak).map_err(|source| SaveError::Activate {
            path: bak.clone(),
            source,
        })?;
    }
    fs::rename(&tmp, &primary).map_err(|source| SaveError::Activate {
        path: primary.clone(),
        source,
    })?;
    let _ = fs::remove_file(&bak);

    registry.set_dirty(false);
    Ok(SaveReport {
        path: primary,
        bytes_written: json.len() as u64,
        history_path,
    })
}

/// Copies the current primary into the history folder, named by its own
/// last-modified timestamp. Best effort; a failed copy is logged and the
/// save continues.
fn preserve_history(dir: &Path, primary: &Path) -> Option<PathBuf> {
    let stamp = fs::metadata(primary)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);
    let history_dir = dir.join(HISTORY_DIR);
    if let Err(err) = fs::create_dir_all(&history_dir) {
        log::warn!("unable to create {}: {}", history_dir.display(), err);
        return None;
    }
    let preserved = history_dir.join(format!("{stamp}.json"));
    match fs::copy(primary, &preserved) {
        Ok(_) => Some(preserved),
        Err(err) => {
            log::warn!("unable to preserve {}: {}", primary.display(), err);
            None
        }
    }
}
