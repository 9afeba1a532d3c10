//! # Workflows Module
//!
//! High-level entry points that tie the chemistry toolkit, the population manager and the
//! prompt renderer together into complete optimization steps.
//!
//! - **Rounds** ([`round`]) - Canonicalize a batch of scored proposals, annotate them with
//!   neighbors and context, and merge them into the population.
//! - **Generation** ([`generation`]) - Render generation prompts and the train/valid
//!   fine-tuning texts from the current population.
//! - **Output** ([`output`]) - Versioned run directories for persisted artifacts.

pub mod generation;
pub mod output;
pub mod round;
