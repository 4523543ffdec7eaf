use chrono::{DateTime, Utc};
use url::Url;

use crate::entry::{FeatureEntry, SiteEntry};
use crate::location::{self, SiteUrl, SYMBOLIC_SCHEME};
use crate::scan;

/// Feature assumed primary when the configuration names none.
pub const DEFAULT_FEATURE_ID: &str = "sitekeeper.base";
/// Application launched when the primary feature names none.
pub const DEFAULT_APPLICATION: &str = "sitekeeper.shell";

/// The root aggregate: an ordered collection of configured sites plus the
/// persisted change-stamp and launch defaults.
///
/// Mutating operations read-then-write shared collection state with no other
/// isolation; callers must serialize them (the session wraps the registry in
/// a mutex). Reads during concurrent mutation are undefined without that
/// discipline.
#[derive(Debug, Clone)]
pub struct Registry {
    sites: Vec<SiteEntry>,
    /// Last-saved timestamp, second precision. The authoritative change
    /// stamp the disk state is compared against.
    pub date: DateTime<Utc>,
    pub default_feature: Option<String>,
    transient: bool,
    dirty: bool,
    linked_from: Option<Url>,
    install_url: Option<Url>,
}

impl Registry {
    pub fn new(install_url: Option<Url>) -> Self {
        Self {
            sites: Vec::new(),
            date: now_secs(),
            default_feature: None,
            transient: false,
            dirty: false,
            linked_from: None,
            install_url,
        }
    }

    pub fn install_url(&self) -> Option<&Url> {
        self.install_url.as_ref()
    }

    pub fn set_install_url(&mut self, install_url: Option<Url>) {
        self.install_url = install_url;
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Transient registries are in-memory views built by an external
    /// generator; they are never reconciled and never persisted.
    pub fn set_transient(&mut self, transient: bool) {
        self.transient = transient;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Shared parent configuration this registry was populated from, if any.
    /// The parent is read-only from this registry's perspective.
    pub fn linked_from(&self) -> Option<&Url> {
        self.linked_from.as_ref()
    }

    pub fn set_linked_from(&mut self, source: Option<Url>) {
        self.linked_from = source;
    }

    /// Sets the date to the current time, truncated to whole seconds.
    pub fn touch(&mut self) {
        self.date = now_secs();
    }

    pub fn sites(&self) -> &[SiteEntry] {
        &self.sites
    }

    /// Inserts `entry` keyed by its canonical URL. A collision with
    /// `replace=false` is a no-op. Returns whether the registry changed.
    pub fn configure_site(&mut self, entry: SiteEntry, replace: bool) -> bool {
        match self.position(entry.key()) {
            Some(index) if replace => {
                self.sites[index] = entry;
                true
            }
            Some(_) => false,
            None => {
                self.sites.push(entry);
                true
            }
        }
    }

    /// Removes the site registered under `url`; no-op when absent.
    pub fn unconfigure_site(&mut self, url: &str) -> Option<SiteEntry> {
        let index = self.position(url)?;
        Some(self.sites.remove(index))
    }

    /// Exact key lookup, retried with the percent-decoded key, then (when
    /// `check_alternate_scheme` is set) once more through the symbolic
    /// installation-relative scheme. Returns `None` on miss, never an error.
    pub fn find_site(&self, url: &str, check_alternate_scheme: bool) -> Option<&SiteEntry> {
        self.locate(url, check_alternate_scheme)
            .map(|index| &self.sites[index])
    }

    pub fn find_site_mut(
        &mut self,
        url: &str,
        check_alternate_scheme: bool,
    ) -> Option<&mut SiteEntry> {
        self.locate(url, check_alternate_scheme)
            .map(|index| &mut self.sites[index])
    }

    fn locate(&self, url: &str, check_alternate_scheme: bool) -> Option<usize> {
        if let Some(index) = self.position(url) {
            return Some(index);
        }
        // retry with percent-decoding applied to either side of the match
        let decoded = location::decoded_key(url);
        if let Some(decoded) = &decoded {
            if let Some(index) = self.position(decoded) {
                return Some(index);
            }
        }
        let target = decoded.as_deref().unwrap_or(url);
        if let Some(index) = self
            .sites
            .iter()
            .position(|site| location::decoded_key(site.key()).as_deref() == Some(target))
        {
            return Some(index);
        }
        if check_alternate_scheme {
            if let Ok(parsed) = Url::parse(url) {
                let alternate = if parsed.scheme() == SYMBOLIC_SCHEME {
                    SiteUrl::from_url(parsed).resolve(self.install_url.as_ref())
                } else {
                    location::symbolic_for(&parsed, self.install_url.as_ref())
                        .map(|symbolic| symbolic.as_url().clone())
                };
                if let Some(alternate) = alternate {
                    return self.locate(alternate.as_str(), false);
                }
            }
        }
        None
    }

    fn position(&self, url: &str) -> Option<usize> {
        self.sites.iter().position(|site| site.key() == url)
    }

    /// All enabled sites, in registry order.
    pub fn enabled_sites(&self) -> impl Iterator<Item = &SiteEntry> + '_ {
        self.sites.iter().filter(|site| site.enabled)
    }

    /// Adds or replaces a feature. The feature lands in the site that
    /// already owns it, falling back to the default site. With neither
    /// present this is a silent no-op; a feature needs a site.
    pub fn configure_feature(&mut self, entry: FeatureEntry) {
        if let Some(site) = self
            .sites
            .iter_mut()
            .find(|site| site.features.contains_key(&entry.id))
        {
            site.features.insert(entry.id.clone(), entry);
            return;
        }
        let default_key = SiteUrl::default_site();
        if let Some(site) = self.find_site_mut(default_key.as_str(), false) {
            site.features.insert(entry.id.clone(), entry);
        }
    }

    /// Removes the feature from whichever site owns it; first match wins.
    pub fn unconfigure_feature(&mut self, id: &str) -> bool {
        for site in &mut self.sites {
            if site.features.remove(id).is_some() {
                return true;
            }
        }
        false
    }

    pub fn find_feature(&self, id: &str) -> Option<&FeatureEntry> {
        self.sites.iter().find_map(|site| site.features.get(id))
    }

    pub fn feature_entries(&self) -> impl Iterator<Item = &FeatureEntry> + '_ {
        self.sites.iter().flat_map(|site| site.features.values())
    }

    /// Flattened, best-effort plug-in search path over all enabled sites.
    /// Individual resolution failures are skipped.
    pub fn plugin_search_path(&self) -> Vec<Url> {
        let mut path = Vec::new();
        for site in self.enabled_sites() {
            let Some(base) = site.resolved_url(self.install_url.as_ref()) else {
                log::debug!("site {} has no resolvable location", site.key());
                continue;
            };
            for plugin in site.plugin_paths() {
                match base.join(plugin) {
                    Ok(url) => path.push(url),
                    Err(err) => log::debug!("skipping plug-in path {plugin}: {err}"),
                }
            }
        }
        path
    }

    /// Customized default feature when set, otherwise the hardcoded default;
    /// `None` when the resulting feature is not configured.
    pub fn primary_feature_id(&self) -> Option<String> {
        let id = self
            .default_feature
            .clone()
            .unwrap_or_else(|| DEFAULT_FEATURE_ID.to_string());
        self.find_feature(&id).map(|_| id)
    }

    /// Application of the primary feature, with a hardcoded fallback.
    pub fn application_id(&self) -> String {
        self.primary_feature_id()
            .and_then(|id| self.find_feature(&id))
            .and_then(|feature| feature.application.clone())
            .unwrap_or_else(|| DEFAULT_APPLICATION.to_string())
    }

    /// Drops every site's cached values.
    pub fn refresh(&mut self) {
        for site in &mut self.sites {
            site.refresh();
        }
    }

    pub fn features_change_stamp(&self) -> i64 {
        self.sites
            .iter()
            .map(|site| site.features_change_stamp(self.install_url.as_ref()))
            .max()
            .unwrap_or(0)
    }

    pub fn plugins_change_stamp(&self) -> i64 {
        self.sites
            .iter()
            .map(|site| site.plugins_change_stamp(self.install_url.as_ref()))
            .max()
            .unwrap_or(0)
    }

    /// Current disk-state fingerprint in whole seconds (the per-site stamps
    /// are already second-granular).
    pub fn compute_change_stamp(&self) -> i64 {
        self.features_change_stamp().max(self.plugins_change_stamp())
    }

    pub fn needs_reconcile(&self) -> bool {
        !self.transient && self.compute_change_stamp() > self.date.timestamp()
    }

    /// Rescans every site whose on-disk content is newer than the recorded
    /// date, passing that date as a floor so unchanged subtrees are skipped.
    /// Marks the registry dirty. Returns the number of rescanned sites.
    pub fn reconcile(&mut self) -> usize {
        let floor = self.date.timestamp();
        let install_url = self.install_url.clone();
        let mut rescanned = 0;
        for site in &mut self.sites {
            if site.change_stamp(install_url.as_ref()) > floor {
                scan::rescan_site(site, install_url.as_ref(), floor);
                rescanned += 1;
            }
        }
        self.dirty = true;
        rescanned
    }
}

fn now_secs() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or(DateTime::UNIX_EPOCH)
}
