//! Privacy filtering for memory content
//!
//! Every piece of content headed for durable storage passes through the
//! [`PrivacyFilter`], which replaces sensitive spans with fixed placeholder
//! labels before anything is written.

mod filter;

pub use filter::{PrivacyFilter, ScrubOutcome};
