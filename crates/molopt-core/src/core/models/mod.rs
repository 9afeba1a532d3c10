//! # Core Models Module
//!
//! Value types that flow through the optimization loop.
//!
//! - [`candidate`] - Scored, canonicalized molecules with their fingerprints and neighbors
//! - [`trace`] - Conditioning units pairing a target candidate with its context and tag
//!
//! ```ignore
//! use molopt::core::chem::toolkit::SmilesToolkit;
//! use molopt::core::models::{candidate::CandidateRecord, trace::OptimizationTrace};
//!
//! let toolkit = SmilesToolkit::new();
//! let record = CandidateRecord::construct("OCC", Some(0.42), &toolkit)?;
//! let trace = OptimizationTrace::new(record);
//! ```

pub mod candidate;
pub mod trace;
