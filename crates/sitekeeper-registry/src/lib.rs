//! Registry of installation sites and the features and plug-ins they contain.

mod entry;
mod links;
mod location;
mod props;
mod registry;
mod scan;
mod seed;
mod stamp;
mod validate;

pub use entry::*;
pub use links::*;
pub use location::*;
pub use registry::*;
pub use scan::*;
pub use seed::*;
pub use stamp::directory_stamp;
pub use validate::*;

/// Subdirectory of a site holding feature directories.
pub const FEATURES_DIR: &str = "features";
/// Subdirectory of a site holding plug-in directories.
pub const PLUGINS_DIR: &str = "plugins";
