//! Structure handling: element data, molecular graphs, SMILES reading with aromaticity
//! perception, canonical writing, circular fingerprints, and the
//! [`StructureToolkit`](toolkit::StructureToolkit) seam the rest of the crate programs against.

pub mod aromaticity;
pub mod canon;
pub mod elements;
pub mod fingerprint;
pub mod graph;
pub mod smiles;
pub mod toolkit;
