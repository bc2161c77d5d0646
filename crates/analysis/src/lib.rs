//! Analysis Stage
//!
//! Turns an investigation report into a structured verdict using an external
//! reasoning service. The stage owns the contract on both sides: a bounded
//! request payload and strict validation of the reply. Anything it cannot
//! interpret becomes the conservative default verdict.

mod analyzer;
mod reasoner;
mod verdict;

pub use analyzer::{AnalysisConfig, Analyzer};
pub use reasoner::{ConservativeReasoner, GeminiConfig, GeminiReasoner, ReasoningService};
pub use verdict::{Severity, Verdict, VerdictOrigin};

use thiserror::Error;

/// Errors from the reasoning service round trip
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Reasoning service timed out after {0}ms")]
    Timeout(u64),
    #[error("Reasoning service request failed: {0}")]
    Transport(String),
    #[error("Reasoning service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Malformed reasoning reply: {0}")]
    Malformed(String),
    #[error("Reasoning service unavailable: {0}")]
    Unavailable(String),
}
