use std::fs;

use crate::entry::FeatureEntry;
use crate::props;
use crate::registry::Registry;

/// One-time default-feature seed, shipped at the install root by the
/// packaging process.
pub const INIT_FILE: &str = "install.ini";

const KEY_DEFAULT_FEATURE: &str = "feature.default.id";
const KEY_DEFAULT_PLUGIN: &str = "feature.default.plugin.id";
const KEY_DEFAULT_APPLICATION: &str = "feature.default.application";

/// Applies default settings from `<install-root>/install.ini`. Reloaded on
/// every startup so native updates to the file are picked up. A missing file
/// is not an error.
pub fn load_install_defaults(registry: &mut Registry) {
    let Some(install_url) = registry.install_url() else {
        return;
    };
    if install_url.scheme() != "file" {
        return;
    }
    let Ok(install_root) = install_url.to_file_path() else {
        return;
    };
    let init_file = install_root.join(INIT_FILE);
    let Ok(text) = fs::read_to_string(&init_file) else {
        log::debug!("no initialization defaults at {}", init_file.display());
        return;
    };

    let properties = props::parse(&text);
    let Some(id) = properties.get(KEY_DEFAULT_FEATURE) else {
        return;
    };
    let application = properties.get(KEY_DEFAULT_APPLICATION).cloned();
    let plugin_id = properties
        .get(KEY_DEFAULT_PLUGIN)
        .cloned()
        .unwrap_or_else(|| id.clone());

    if registry.find_feature(id).is_none() {
        let mut entry = FeatureEntry::new(id.clone());
        entry.plugin_identifier = Some(plugin_id);
        entry.application = application;
        entry.primary = true;
        registry.configure_feature(entry);
    }
    if registry.default_feature.as_deref() != Some(id) {
        registry.default_feature = Some(id.clone());
        registry.set_dirty(true);
    }
    log::debug!("default primary feature: {id}");
}

#[cfg(test)]
mod tests {
    use std::fs::create_dir_all;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::entry::{SiteEntry, SitePolicy};
    use crate::location::{directory_url, SiteUrl};

    #[test]
    fn seed_creates_primary_feature_on_default_site() {
        let dir = tempdir().unwrap();
        create_dir_all(dir.path()).unwrap();
        fs::write(
            dir.path().join(INIT_FILE),
            "feature.default.id=com.example.base\nfeature.default.application=com.example.app\n",
        )
        .unwrap();

        let mut registry = Registry::new(Some(directory_url(dir.path()).unwrap()));
        registry.configure_site(
            SiteEntry::new(SiteUrl::default_site(), SitePolicy::default()),
            false,
        );
        load_install_defaults(&mut registry);

        assert_eq!(registry.default_feature.as_deref(), Some("com.example.base"));
        assert!(registry.is_dirty());
        let feature = registry.find_feature("com.example.base").unwrap();
        assert!(feature.primary);
        assert_eq!(feature.application.as_deref(), Some("com.example.app"));
        assert_eq!(
            feature.plugin_identifier.as_deref(),
            Some("com.example.base")
        );
    }

    #[test]
    fn missing_init_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let mut registry = Registry::new(Some(directory_url(dir.path()).unwrap()));
        load_install_defaults(&mut registry);
        assert_eq!(registry.default_feature, None);
        assert!(!registry.is_dirty());
    }

    #[test]
    fn existing_feature_is_not_replaced() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(INIT_FILE), "feature.default.id=com.example.base\n").unwrap();
        let mut registry = Registry::new(Some(directory_url(dir.path()).unwrap()));
        let mut site = SiteEntry::new(SiteUrl::default_site(), SitePolicy::default());
        let mut feature = FeatureEntry::new("com.example.base");
        feature.version = Some("3.1.0".into());
        site.features.insert(feature.id.clone(), feature);
        registry.configure_site(site, false);

        load_install_defaults(&mut registry);
        let feature = registry.find_feature("com.example.base").unwrap();
        assert_eq!(feature.version.as_deref(), Some("3.1.0"));
    }
}
