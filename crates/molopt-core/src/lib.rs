//! # MolOpt Core Library
//!
//! A population manager for language-model-driven molecular optimization. Each round a model
//! proposes molecules, an external oracle scores them, and this library keeps a bounded,
//! diverse, ranked pool of the best candidates together with the prompt texts used to condition
//! and fine-tune the model in the next round.
//!
//! ## Architectural Philosophy
//!
//! - **[`core`]: The Foundation.** Stateless models (`CandidateRecord`, `OptimizationTrace`),
//!   the SMILES toolkit behind the `StructureToolkit` trait, and CSV I/O.
//!
//! - **[`engine`]: The Logic Core.** The `PopulationManager` with its merge, diversity filter
//!   and train/valid tagging, plus the `PromptBuilder` and validated configuration.
//!
//! - **[`workflows`]: The Public API.** Complete steps built from the layers below: running a
//!   scored round, building generation prompts and training texts, and laying out run output.

pub mod core;
pub mod engine;
pub mod workflows;
