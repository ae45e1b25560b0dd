//! HTTP client for the vision comparison service.
//!
//! Two call shapes back the two matching strategies: a pairwise tier
//! classification (one candidate per call) and a joint best-match selection
//! (all candidates in one call). Both carry the decision-policy instructions
//! with every request; responses are strictly validated so a malformed reply
//! degrades to a per-candidate classification failure instead of garbage
//! flowing downstream.

mod client;
mod error;
mod instructions;
mod retry;
mod types;

pub use client::VisionClient;
pub use error::VisionError;
pub use types::{SelectionVerdict, TierVerdict};
