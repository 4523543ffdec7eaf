use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::entry::{SiteEntry, SitePolicy};
use crate::location::{self, SiteUrl};
use crate::props;
use crate::registry::Registry;

/// Subdirectory of the install root holding link descriptors.
pub const LINKS_DIR: &str = "links";
/// Subdirectory appended to every link target; sites are always directories.
pub const SITE_SUBDIR: &str = "sitekeeper";

const LINK_PATH_KEY: &str = "path";
const READ_ONLY_PREFIX: &str = "r ";
const READ_WRITE_PREFIX: &str = "rw ";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no path property")]
    MissingPath,
    #[error("target is not a valid directory location: {0}")]
    BadTarget(PathBuf),
}

/// Discovers link descriptors under `<install-root>/links` and registers a
/// site for each new target. Link files are usually dropped by external
/// installation programs. One malformed link never aborts discovery of the
/// others. Returns the number of sites added.
pub fn configure_external_links(registry: &mut Registry) -> usize {
    let Some(install_url) = registry.install_url() else {
        return 0;
    };
    if install_url.scheme() != "file" {
        return 0;
    }
    let Ok(install_root) = install_url.to_file_path() else {
        return 0;
    };
    let links_dir = install_root.join(LINKS_DIR);
    let Ok(dir) = fs::read_dir(&links_dir) else {
        log::debug!("no links detected in {}", links_dir.display());
        return 0;
    };

    let mut link_files: Vec<PathBuf> = dir
        .flatten()
        .map(|dir_entry| dir_entry.path())
        .filter(|path| path.is_file())
        .collect();
    // directory listing order is platform-dependent; sort so that link
    // precedence is stable
    link_files.sort();

    let mut added = 0;
    for link_file in link_files {
        match configure_link_file(registry, &install_root, &link_file) {
            Ok(true) => added += 1,
            Ok(false) => {}
            Err(err) => log::warn!("skipping link file {}: {}", link_file.display(), err),
        }
    }
    added
}

fn configure_link_file(
    registry: &mut Registry,
    install_root: &Path,
    link_file: &Path,
) -> Result<bool, LinkError> {
    let text = fs::read_to_string(link_file)?;
    let properties = props::parse(&text);
    let Some(value) = properties.get(LINK_PATH_KEY) else {
        return Err(LinkError::MissingPath);
    };

    let (updateable, target) = if let Some(rest) = value.strip_prefix(READ_ONLY_PREFIX) {
        (false, rest.trim())
    } else if let Some(rest) = value.strip_prefix(READ_WRITE_PREFIX) {
        (true, rest.trim())
    } else {
        (true, value.as_str())
    };

    let target = PathBuf::from(target);
    let target = if target.is_absolute() {
        target
    } else {
        install_root.join(target)
    };
    let target = target.join(SITE_SUBDIR);
    let site_url =
        location::directory_url(&target).ok_or_else(|| LinkError::BadTarget(target.clone()))?;

    // first registered site for a location wins; later links are ignored
    if registry.find_site(site_url.as_str(), true).is_some() {
        log::debug!("linked site {site_url} is already known");
        return Ok(false);
    }

    let mut site = SiteEntry::new(SiteUrl::from_url(site_url), SitePolicy::default());
    site.updateable = updateable;
    site.link_file = Some(link_file.to_path_buf());
    log::debug!(
        "{} -> {}",
        if updateable { "R/W" } else { "R/O" },
        site.key()
    );
    registry.configure_site(site, false);
    registry.set_dirty(true);
    Ok(true)
}
