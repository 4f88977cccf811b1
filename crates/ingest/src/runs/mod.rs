//! Scrape run module.
//!
//! The run state machine, its metadata enums, and the audit log port runs
//! are recorded through.

mod log;
mod model;

pub use self::log::{MemoryRunLog, RunLog};
pub use model::{ScrapeRun, ScrapeStatus, ScrapeType};
