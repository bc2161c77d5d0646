//! Investigation Stage
//!
//! Collects evidence from every provider for one polling cycle:
//! - Official status and social mentions are fetched concurrently
//! - A deep dive (web search + top page fetch) runs only when those cheap
//!   signals point at a disruption
//!
//! Provider failures degrade the report, they never abort it.

mod investigator;
mod report;
mod window;

pub use investigator::{DeepDiveTrigger, InvestigationConfig, Investigator};
pub use report::InvestigationReport;
