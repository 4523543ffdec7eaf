//! Crash-safe persistence for the site registry.

mod document;
mod load;
mod lock;
mod save;

pub use document::*;
pub use load::*;
pub use lock::*;
pub use save::*;

/// Primary configuration file name inside the configuration area.
pub const CONFIG_NAME: &str = "platform.json";
pub const TEMP_SUFFIX: &str = ".tmp";
pub const BAK_SUFFIX: &str = ".bak";
pub const LOCK_SUFFIX: &str = ".lock";
/// Directory holding timestamped copies of replaced configurations.
pub const HISTORY_DIR: &str = "history";
