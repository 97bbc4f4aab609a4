//! Periodic polling of occupancy sources
//!
//! Calls `metadata` and `state` on every configured source at their own
//! intervals and merges the results by location identity into a shared
//! registry that readers consult without touching the sources.

mod r#loop;
mod registry;

pub use r#loop::{Poller, PollerBuilder, PollerConfig, PollResults};
pub use registry::{LocationEntry, LocationRegistry};
