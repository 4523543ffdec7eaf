use crate::registry::Registry;

/// Prunes sites that no longer exist on disk and linked sites whose link
/// descriptor vanished. Runs after external-link discovery and before
/// reconciliation. Only a vanished link file marks the registry dirty.
///
/// Known gap: a link file whose target path was edited in place, or one
/// listing multiple paths, leaves the stale site behind.
pub fn validate_sites(registry: &mut Registry) -> usize {
    let install_url = registry.install_url().cloned();
    let mut stale = Vec::new();
    let mut dirty = false;

    for site in registry.sites() {
        if site.url.supports_detection(install_url.as_ref()) {
            if let Some(root) = site.local_root(install_url.as_ref()) {
                if !root.exists() {
                    log::debug!("site {} does not exist, removing", site.key());
                    stale.push(site.key().to_string());
                    continue;
                }
            }
        }
        if let Some(link_file) = &site.link_file {
            if !link_file.exists() {
                log::debug!("site {} is no longer linked, removing", site.key());
                stale.push(site.key().to_string());
                dirty = true;
            }
        }
    }

    for key in &stale {
        registry.unconfigure_site(key);
    }
    if dirty {
        registry.set_dirty(true);
    }
    stale.len()
}
