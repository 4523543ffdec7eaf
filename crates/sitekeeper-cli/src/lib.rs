//! Startup/shutdown orchestration around the site registry.

mod session;

pub use session::*;
