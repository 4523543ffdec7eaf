use std::path::PathBuf;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use sitekeeper_registry::{FeatureEntry, Registry, SiteEntry, SitePolicy, SiteUrl};

pub const FORMAT_VERSION: u32 = 1;

/// Serialized form of the registry. Timestamps are whole seconds since the
/// epoch; site URLs are their canonical string form.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub version: u32,
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_feature: Option<String>,
    #[serde(default)]
    pub sites: Vec<SiteDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SiteDocument {
    pub url: String,
    pub policy: SitePolicy,
    pub enabled: bool,
    pub updateable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_file: Option<PathBuf>,
    #[serde(default)]
    pub features: Vec<FeatureEntry>,
    #[serde(default)]
    pub plugins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid site url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

impl ConfigDocument {
    pub fn from_registry(registry: &Registry) -> Self {
        let sites = registry
            .sites()
            .iter()
            .map(|site| SiteDocument {
                url: site.key().to_string(),
                policy: site.policy.clone(),
                enabled: site.enabled,
                updateable: site.updateable,
                link_file: site.link_file.clone(),
                features: site.features.values().cloned().collect(),
                plugins: site.plugins.clone(),
            })
            .collect();
        Self {
            version: FORMAT_VERSION,
            date: registry.date.timestamp(),
            default_feature: registry.default_feature.clone(),
            sites,
        }
    }

    pub fn into_registry(self, install_url: Option<Url>) -> Result<Registry, DocumentError> {
        let mut registry = Registry::new(install_url);
        registry.date = DateTime::from_timestamp(self.date, 0).unwrap_or(DateTime::UNIX_EPOCH);
        registry.default_feature = self.default_feature;
        for site_doc in self.sites {
            let url = SiteUrl::parse(&site_doc.url).map_err(|source| DocumentError::InvalidUrl {
                url: site_doc.url.clone(),
                source,
            })?;
            let mut site = SiteEntry::new(url, site_doc.policy);
            site.enabled = site_doc.enabled;
            site.updateable = site_doc.updateable;
            site.link_file = site_doc.link_file;
            site.features = site_doc
                .features
                .into_iter()
                .map(|feature| (feature.id.clone(), feature))
                .collect();
            site.plugins = site_doc.plugins;
            registry.configure_site(site, true);
        }
        registry.set_dirty(false);
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn document_roundtrip_preserves_sites_and_features() {
        let mut registry = Registry::new(None);
        let mut site = SiteEntry::new(
            SiteUrl::parse("file:///opt/site/").unwrap(),
            SitePolicy::include(vec!["plugins/a/".into()]),
        );
        let mut feature = FeatureEntry::new("com.example.base");
        feature.version = Some("1.0.0".into());
        feature.primary = true;
        site.features.insert(feature.id.clone(), feature);
        site.plugins = vec!["plugins/a/".into(), "plugins/b/".into()];
        site.updateable = false;
        registry.configure_site(site, false);
        registry.default_feature = Some("com.example.base".into());
        registry.touch();

        let doc = ConfigDocument::from_registry(&registry);
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let parsed: ConfigDocument = serde_json::from_str(&json).unwrap();
        let reloaded = parsed.into_registry(None).unwrap();

        assert_eq!(reloaded.date, registry.date);
        assert_eq!(reloaded.default_feature, registry.default_feature);
        assert_eq!(reloaded.sites().len(), 1);
        let site = &reloaded.sites()[0];
        assert_eq!(site.key(), "file:///opt/site/");
        assert_eq!(site.policy, SitePolicy::include(vec!["plugins/a/".into()]));
        assert!(!site.updateable);
        assert_eq!(site.plugins.len(), 2);
        let feature = reloaded.find_feature("com.example.base").unwrap();
        assert_eq!(feature.version.as_deref(), Some("1.0.0"));
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn invalid_site_url_is_a_document_error() {
        let doc = ConfigDocument {
            version: FORMAT_VERSION,
            date: 0,
            default_feature: None,
            sites: vec![SiteDocument {
                url: "not a url".into(),
                policy: SitePolicy::default(),
                enabled: true,
                updateable: true,
                link_file: None,
                features: Vec::new(),
                plugins: Vec::new(),
            }],
        };
        assert!(doc.into_registry(None).is_err());
    }
}
