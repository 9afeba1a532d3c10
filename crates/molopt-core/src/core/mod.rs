//! # Core Module
//!
//! Stateless building blocks: the molecular graph and its toolkit operations, the candidate and
//! trace data models, and file formats.
//!
//! - **Chemistry** ([`chem`]) - SMILES parsing, canonical writing, Morgan fingerprints and the
//!   [`StructureToolkit`](chem::toolkit::StructureToolkit) seam
//! - **Data Models** ([`models`]) - Candidate records and optimization traces
//! - **File I/O** ([`io`]) - Scored proposal input and population snapshot output

pub mod chem;
pub mod io;
pub mod models;
