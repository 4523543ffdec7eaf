use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use parking_lot::{Mutex, MutexGuard};
use url::Url;

use sitekeeper_registry::{
    bootstrap, configure_external_links, load_install_defaults, validate_sites, Registry,
};
use sitekeeper_store::{
    load_registry, save_registry, ConfigLock, LoadSource, SaveOptions, SaveReport,
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Configuration area holding the persisted registry.
    pub config_dir: PathBuf,
    /// Installation root the default site and link descriptors live under.
    pub install_dir: PathBuf,
    /// Shared parent configuration consulted on first run.
    pub shared_dir: Option<PathBuf>,
    pub retain_history: bool,
}

impl SessionConfig {
    pub fn new(config_dir: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            install_dir: install_dir.into(),
            shared_dir: None,
            retain_history: true,
        }
    }

    pub fn default_config_dir() -> Result<PathBuf> {
        let mut dir = dirs::config_dir().context("no config directory")?;
        dir.push("sitekeeper");
        Ok(dir)
    }
}

/// One reconciliation run: loads (or bootstraps) the registry at startup,
/// brings it in line with the filesystem, and flushes it at shutdown.
/// Mutating registry operations are serialized through the mutex.
pub struct Session {
    config: SessionConfig,
    registry: Mutex<Registry>,
    // held for the lifetime of the session; informational only
    _lock: Option<ConfigLock>,
}

impl Session {
    pub fn start(config: SessionConfig) -> Result<Self> {
        let lock = ConfigLock::acquire(&config.config_dir);
        let install_url = directory_url(&config.install_dir);

        let mut registry = initial_registry(&config, install_url.clone())?;
        registry.set_install_url(install_url);

        configure_external_links(&mut registry);
        load_install_defaults(&mut registry);
        validate_sites(&mut registry);
        if registry.needs_reconcile() {
            let rescanned = registry.reconcile();
            tracing::info!(rescanned, "filesystem changed since last run, reconciled");
        }

        Ok(Self {
            config,
            registry: Mutex::new(registry),
            _lock: lock,
        })
    }

    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock()
    }

    /// Writes the registry out regardless of the dirty flag.
    pub fn save(&self) -> Result<SaveReport> {
        let mut registry = self.registry.lock();
        let options = SaveOptions {
            retain_history: self.config.retain_history,
        };
        save_registry(&mut registry, Some(&self.config.config_dir), &options)
            .context("failed to save configuration")
    }

    /// Flushes unsaved changes and releases the advisory lock. A failed save
    /// is logged, not fatal; the state is recovered on next startup.
    pub fn shutdown(self) {
        let mut registry = self.registry.into_inner();
        if registry.is_dirty() && !registry.is_transient() {
            let options = SaveOptions {
                retain_history: self.config.retain_history,
            };
            match save_registry(&mut registry, Some(&self.config.config_dir), &options) {
                Ok(report) => {
                    tracing::debug!(path = %report.path.display(), "configuration saved")
                }
                Err(err) => tracing::warn!("unable to save configuration: {err}"),
            }
        }
    }
}

fn initial_registry(config: &SessionConfig, install_url: Option<Url>) -> Result<Registry> {
    if let Some(report) = load_registry(&config.config_dir, install_url.as_ref()) {
        if report.source != LoadSource::Primary {
            tracing::warn!(path = %report.path.display(), "recovered prior configuration");
        }
        return Ok(report.registry);
    }

    // first run against a shared installation: inherit the parent
    // configuration read-only and persist a private copy at shutdown
    if let Some(shared_dir) = &config.shared_dir {
        if let Some(report) = load_registry(shared_dir, install_url.as_ref()) {
            tracing::info!(shared = %shared_dir.display(), "configuration inherited");
            let mut registry = report.registry;
            registry.set_linked_from(directory_url(shared_dir));
            registry.set_dirty(true);
            return Ok(registry);
        }
    }

    if !config.install_dir.is_dir() {
        bail!(
            "no existing configuration and install directory {} does not exist",
            config.install_dir.display()
        );
    }
    let Some(install_url) = install_url else {
        bail!(
            "install directory {} cannot be expressed as a location",
            config.install_dir.display()
        );
    };
    tracing::info!(install = %config.install_dir.display(), "creating default configuration");
    Ok(bootstrap(install_url))
}

fn directory_url(dir: &Path) -> Option<Url> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        env::current_dir().ok()?.join(dir)
    };
    Url::from_directory_path(absolute).ok()
}
