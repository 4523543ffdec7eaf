use std::collections::BTreeMap;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::location::SiteUrl;
use crate::stamp;
use crate::{FEATURES_DIR, PLUGINS_DIR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Include,
    Exclude,
}

/// Inclusion/exclusion rule set applied to a site's plug-ins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePolicy {
    pub kind: PolicyKind,
    pub list: Vec<String>,
}

impl SitePolicy {
    pub fn include(list: Vec<String>) -> Self {
        Self {
            kind: PolicyKind::Include,
            list,
        }
    }

    pub fn exclude(list: Vec<String>) -> Self {
        Self {
            kind: PolicyKind::Exclude,
            list,
        }
    }

    pub fn permits(&self, plugin: &str) -> bool {
        let listed = self.list.iter().any(|entry| entry == plugin);
        match self.kind {
            PolicyKind::Include => listed,
            PolicyKind::Exclude => !listed,
        }
    }
}

impl Default for SitePolicy {
    fn default() -> Self {
        Self::exclude(Vec::new())
    }
}

/// One discovered feature: a named, versioned unit bundling plug-ins and an
/// optional launch application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_urls: Vec<String>,
}

impl FeatureEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            plugin_identifier: None,
            plugin_version: None,
            application: None,
            primary: false,
            root_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SiteCache {
    resolved: OnceCell<Url>,
    features_stamp: OnceCell<i64>,
    plugins_stamp: OnceCell<i64>,
}

/// One installation root and its discovered content. Resolved location and
/// change stamps are computed lazily and cached until [`SiteEntry::refresh`].
#[derive(Debug, Clone)]
pub struct SiteEntry {
    pub url: SiteUrl,
    pub policy: SitePolicy,
    pub features: BTreeMap<String, FeatureEntry>,
    pub plugins: Vec<String>,
    pub enabled: bool,
    pub updateable: bool,
    /// Path of the link descriptor that created this entry, if any. When that
    /// file disappears the entry is pruned.
    pub link_file: Option<PathBuf>,
    cache: SiteCache,
}

impl SiteEntry {
    pub fn new(url: SiteUrl, policy: SitePolicy) -> Self {
        Self {
            url,
            policy,
            features: BTreeMap::new(),
            plugins: Vec::new(),
            enabled: true,
            updateable: true,
            link_file: None,
            cache: SiteCache::default(),
        }
    }

    /// Canonical key this entry is registered under.
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    pub fn resolved_url(&self, install_url: Option<&Url>) -> Option<&Url> {
        if let Some(resolved) = self.cache.resolved.get() {
            return Some(resolved);
        }
        let resolved = self.url.resolve(install_url)?;
        Some(self.cache.resolved.get_or_init(|| resolved))
    }

    /// Local directory of the site, when its resolved location is a `file:`
    /// URL.
    pub fn local_root(&self, install_url: Option<&Url>) -> Option<PathBuf> {
        self.resolved_url(install_url)
            .and_then(|url| url.to_file_path().ok())
    }

    pub fn features_change_stamp(&self, install_url: Option<&Url>) -> i64 {
        *self.cache.features_stamp.get_or_init(|| {
            self.local_root(install_url)
                .map(|root| stamp::directory_stamp(&root.join(FEATURES_DIR)))
                .unwrap_or(0)
        })
    }

    pub fn plugins_change_stamp(&self, install_url: Option<&Url>) -> i64 {
        *self.cache.plugins_stamp.get_or_init(|| {
            self.local_root(install_url)
                .map(|root| stamp::directory_stamp(&root.join(PLUGINS_DIR)))
                .unwrap_or(0)
        })
    }

    pub fn change_stamp(&self, install_url: Option<&Url>) -> i64 {
        self.features_change_stamp(install_url)
            .max(self.plugins_change_stamp(install_url))
    }

    /// Drops all cached values. They are recomputed on next access.
    pub fn refresh(&mut self) {
        self.cache = SiteCache::default();
    }

    /// Declared plug-in paths permitted by the site policy.
    pub fn plugin_paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.plugins
            .iter()
            .filter(|path| self.policy.permits(path))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn feature_entry_roundtrip() {
        let mut entry = FeatureEntry::new("com.example.base");
        entry.version = Some("1.2.0".into());
        entry.primary = true;
        let json = serde_json::to_string(&entry).unwrap();
        let roundtrip: FeatureEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, entry);
    }

    #[test]
    fn exclude_policy_permits_unlisted_plugins() {
        let policy = SitePolicy::exclude(vec!["plugins/banned/".into()]);
        assert!(policy.permits("plugins/ok/"));
        assert!(!policy.permits("plugins/banned/"));
    }

    #[test]
    fn include_policy_permits_only_listed_plugins() {
        let policy = SitePolicy::include(vec!["plugins/ok/".into()]);
        assert!(policy.permits("plugins/ok/"));
        assert!(!policy.permits("plugins/other/"));
    }

    #[test]
    fn change_stamp_is_cached_until_refresh() {
        use std::fs;

        use tempfile::tempdir;

        use crate::location::directory_url;
        use crate::PLUGINS_DIR;

        let dir = tempdir().unwrap();
        let plugins = dir.path().join(PLUGINS_DIR);
        fs::create_dir_all(plugins.join("com.example.a_1.0.0")).unwrap();
        let install = directory_url(dir.path()).unwrap();
        let mut site = SiteEntry::new(SiteUrl::default_site(), SitePolicy::default());

        let first = site.change_stamp(Some(&install));
        assert!(first > 0);
        fs::create_dir_all(plugins.join("com.example.b_1.0.0")).unwrap();
        // memoized: disk changes are invisible until an explicit refresh
        assert_eq!(site.change_stamp(Some(&install)), first);
        site.refresh();
        assert!(site.change_stamp(Some(&install)) >= first);
    }

    #[test]
    fn plugin_paths_apply_policy() {
        let mut site = SiteEntry::new(SiteUrl::default_site(), SitePolicy::default());
        site.plugins = vec!["plugins/a/".into(), "plugins/b/".into()];
        site.policy = SitePolicy::exclude(vec!["plugins/b/".into()]);
        let paths: Vec<_> = site.plugin_paths().collect();
        assert_eq!(paths, vec!["plugins/a/"]);
    }
}
