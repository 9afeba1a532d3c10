//! # Engine Module
//!
//! The stateful layer of the optimizer. It owns the bounded, diversity-filtered population and
//! turns its traces into language-model prompts.
//!
//! - **Configuration** ([`config`]) - Validated pool, diversity, context and prompt settings
//! - **Population** ([`population`]) - Merge, rank, diversity filtering and train/valid tagging
//! - **Prompts** ([`prompt`]) - Rendering of traces in generation and reconstruction modes
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine-level error type aggregating the layers below
//!
//! Merges are all-or-nothing: a merge that would break a population invariant leaves the
//! population untouched and returns an error.

pub mod config;
pub mod error;
pub mod population;
pub mod progress;
pub mod prompt;
pub(crate) mod utils;
