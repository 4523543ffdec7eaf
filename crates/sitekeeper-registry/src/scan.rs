use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::entry::{FeatureEntry, SiteEntry, SitePolicy};
use crate::location::SiteUrl;
use crate::registry::Registry;
use crate::{FEATURES_DIR, PLUGINS_DIR};

/// Manifest file describing a feature, one per feature directory.
pub const FEATURE_MANIFEST: &str = "feature.json";

#[derive(Debug, Deserialize)]
struct FeatureManifest {
    id: Option<String>,
    version: Option<String>,
    plugin_identifier: Option<String>,
    plugin_version: Option<String>,
    application: Option<String>,
    primary: Option<bool>,
    root_urls: Option<Vec<String>>,
}

/// Rebuilds the site's feature and plug-in lists from its on-disk content.
/// Subtrees whose change stamp does not exceed `floor` keep their current
/// entries. Cached stamps are dropped afterwards.
pub fn rescan_site(site: &mut SiteEntry, install_url: Option<&Url>, floor: i64) {
    let Some(root) = site.local_root(install_url) else {
        log::debug!("site {} is not locally inspectable, skipping rescan", site.key());
        return;
    };
    if site.features_change_stamp(install_url) > floor {
        site.features = scan_features(&root.join(FEATURES_DIR));
    }
    if site.plugins_change_stamp(install_url) > floor {
        site.plugins = scan_plugins(&root.join(PLUGINS_DIR));
    }
    site.refresh();
}

/// Synthesizes a fresh registry with one default site scanned from the
/// install directory. The result is dirty so it persists at shutdown.
pub fn bootstrap(install_url: Url) -> Registry {
    let mut registry = Registry::new(Some(install_url));
    let mut site = SiteEntry::new(SiteUrl::default_site(), SitePolicy::default());
    rescan_site(&mut site, registry.install_url(), 0);
    log::debug!(
        "bootstrapped default site with {} features, {} plug-ins",
        site.features.len(),
        site.plugins.len()
    );
    registry.configure_site(site, false);
    registry.set_dirty(true);
    registry
}

fn scan_features(features_dir: &Path) -> BTreeMap<String, FeatureEntry> {
    let mut features = BTreeMap::new();
    let Ok(dir) = fs::read_dir(features_dir) else {
        return features;
    };
    for dir_entry in dir.flatten() {
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        match read_feature(&path) {
            Ok(feature) => {
                features.insert(feature.id.clone(), feature);
            }
            Err(err) => {
                log::warn!("skipping feature at {}: {}", path.display(), err);
            }
        }
    }
    features
}

#[derive(Debug, thiserror::Error)]
enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

fn read_feature(feature_dir: &Path) -> Result<FeatureEntry, ScanError> {
    let raw = fs::read_to_string(feature_dir.join(FEATURE_MANIFEST))?;
    let manifest: FeatureManifest = serde_json::from_str(&raw)?;
    let id = manifest
        .id
        .or_else(|| {
            feature_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| feature_dir.display().to_string());
    let mut entry = FeatureEntry::new(id);
    entry.version = manifest.version;
    entry.plugin_identifier = manifest.plugin_identifier;
    entry.plugin_version = manifest.plugin_version;
    entry.application = manifest.application;
    entry.primary = manifest.primary.unwrap_or(false);
    entry.root_urls = manifest.root_urls.unwrap_or_default();
    Ok(entry)
}

fn scan_plugins(plugins_dir: &Path) -> Vec<String> {
    let mut plugins = Vec::new();
    let Ok(dir) = fs::read_dir(plugins_dir) else {
        return plugins;
    };
    for dir_entry in dir.flatten() {
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            plugins.push(format!("{PLUGINS_DIR}/{name}/"));
        }
    }
    plugins.sort();
    plugins
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir_all, File};
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::location::directory_url;

    fn write_feature(install: &Path, name: &str, manifest: serde_json::Value) {
        let dir = install.join(FEATURES_DIR).join(name);
        create_dir_all(&dir).unwrap();
        let mut file = File::create(dir.join(FEATURE_MANIFEST)).unwrap();
        write!(file, "{manifest}").unwrap();
    }

    #[test]
    fn bootstrap_discovers_features_and_plugins() {
        let dir = tempdir().unwrap();
        write_feature(
            dir.path(),
            "com.example.base_1.0.0",
            serde_json::json!({
                "id": "com.example.base",
                "version": "1.0.0",
                "primary": true
            }),
        );
        create_dir_all(dir.path().join(PLUGINS_DIR).join("com.example.core_1.0.0")).unwrap();

        let registry = bootstrap(directory_url(dir.path()).unwrap());
        assert!(registry.is_dirty());
        assert_eq!(registry.sites().len(), 1);
        let site = &registry.sites()[0];
        assert!(site.enabled);
        assert!(site.url.is_symbolic());
        let feature = registry.find_feature("com.example.base").unwrap();
        assert_eq!(feature.version.as_deref(), Some("1.0.0"));
        assert!(feature.primary);
        assert_eq!(site.plugins, vec!["plugins/com.example.core_1.0.0/".to_string()]);
    }

    #[test]
    fn malformed_manifest_is_skipped() {
        let dir = tempdir().unwrap();
        write_feature(
            dir.path(),
            "good",
            serde_json::json!({ "id": "com.example.good" }),
        );
        let bad = dir.path().join(FEATURES_DIR).join("bad");
        create_dir_all(&bad).unwrap();
        std::fs::write(bad.join(FEATURE_MANIFEST), "not json").unwrap();

        let registry = bootstrap(directory_url(dir.path()).unwrap());
        assert!(registry.find_feature("com.example.good").is_some());
        assert_eq!(registry.feature_entries().count(), 1);
    }

    #[test]
    fn manifest_without_id_falls_back_to_directory_name() {
        let dir = tempdir().unwrap();
        write_feature(dir.path(), "com.example.anon_2.0.0", serde_json::json!({}));
        let registry = bootstrap(directory_url(dir.path()).unwrap());
        assert!(registry.find_feature("com.example.anon_2.0.0").is_some());
    }

    #[test]
    fn rescan_honors_the_floor() {
        let dir = tempdir().unwrap();
        write_feature(dir.path(), "f", serde_json::json!({ "id": "com.example.f" }));
        let install = directory_url(dir.path()).unwrap();
        let mut site = SiteEntry::new(SiteUrl::default_site(), SitePolicy::default());
        // floor far in the future: nothing on disk is newer, keep entries
        rescan_site(&mut site, Some(&install), i64::MAX);
        assert!(site.features.is_empty());
        rescan_site(&mut site, Some(&install), 0);
        assert_eq!(site.features.len(), 1);
    }
}
