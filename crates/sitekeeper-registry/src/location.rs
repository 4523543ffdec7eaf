use std::fmt;
use std::path::Path;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

/// Scheme of symbolic, installation-relative site locations.
pub const SYMBOLIC_SCHEME: &str = "install";

const DEFAULT_SITE: &str = "install:/base/";

/// Canonical location of a site. Either a concrete `file:` URL or the
/// symbolic `install:/base/` form that resolves against the install root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteUrl(Url);

impl SiteUrl {
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Url::parse(input).map(Self)
    }

    pub fn from_url(url: Url) -> Self {
        Self(url)
    }

    /// The symbolic URL of the default site at the install root.
    pub fn default_site() -> Self {
        Self(Url::parse(DEFAULT_SITE).expect("default site url"))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn is_symbolic(&self) -> bool {
        self.0.scheme() == SYMBOLIC_SCHEME
    }

    /// Resolves the location to a concrete URL. Symbolic locations resolve to
    /// the install root; everything else resolves to itself.
    pub fn resolve(&self, install_url: Option<&Url>) -> Option<Url> {
        if self.is_symbolic() {
            install_url.cloned()
        } else {
            Some(self.0.clone())
        }
    }

    /// Whether the resolved location can be inspected on the local
    /// filesystem. Network schemes cannot.
    pub fn supports_detection(&self, install_url: Option<&Url>) -> bool {
        self.resolve(install_url)
            .map(|url| url.scheme() == "file")
            .unwrap_or(false)
    }
}

impl fmt::Display for SiteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Percent-decoded variant of a site key, when decoding changes it.
/// Link files and hand-edited configurations are written by different
/// encoders, so lookups retry with the decoded form.
pub fn decoded_key(key: &str) -> Option<String> {
    percent_decode_str(key)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
        .filter(|decoded| decoded != key)
}

/// Canonical `file:` URL for a directory, with a trailing separator.
pub fn directory_url(path: &Path) -> Option<Url> {
    Url::from_directory_path(path).ok()
}

/// Maps a concrete URL back to its symbolic form, when it names the install
/// root itself.
pub fn symbolic_for(url: &Url, install_url: Option<&Url>) -> Option<SiteUrl> {
    let install = install_url?;
    if url == install {
        Some(SiteUrl::default_site())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn symbolic_site_resolves_to_install_root() {
        let install = Url::parse("file:///opt/product/").unwrap();
        let site = SiteUrl::default_site();
        assert!(site.is_symbolic());
        assert_eq!(site.resolve(Some(&install)), Some(install.clone()));
        assert_eq!(site.resolve(None), None);
        assert!(site.supports_detection(Some(&install)));
        assert!(!site.supports_detection(None));
    }

    #[test]
    fn concrete_site_resolves_to_itself() {
        let site = SiteUrl::parse("file:///srv/shared/").unwrap();
        assert_eq!(site.resolve(None), Some(site.as_url().clone()));
        assert!(site.supports_detection(None));
        let remote = SiteUrl::parse("https://example.com/site/").unwrap();
        assert!(!remote.supports_detection(None));
    }

    #[test]
    fn decoded_key_only_reports_changes() {
        assert_eq!(
            decoded_key("file:///opt/my%20product/"),
            Some("file:///opt/my product/".to_string())
        );
        assert_eq!(decoded_key("file:///opt/product/"), None);
    }
}
