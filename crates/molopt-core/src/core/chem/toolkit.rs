use super::canon;
use super::fingerprint::{Fingerprint, FingerprintConfig, morgan};
use super::smiles;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Malformed structure '{input}': {reason}")]
pub struct MalformedStructure {
    pub input: String,
    pub reason: String,
}

/// A structure in canonical form together with its similarity fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalStructure {
    pub identity: String,
    pub fingerprint: Fingerprint,
}

/// Defines the structure operations the optimization core relies on.
///
/// Implementations must be pure and deterministic: the same raw input always yields the same
/// identity and fingerprint, and two inputs describing the same molecule yield the same identity.
pub trait StructureToolkit: Send + Sync {
    /// Converts a raw structure string into its canonical identity and fingerprint.
    ///
    /// # Arguments
    ///
    /// * `raw` - The structure as supplied by the generator or the oracle.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedStructure`] if the input cannot be parsed into a valid structure.
    fn canonicalize(&self, raw: &str) -> Result<CanonicalStructure, MalformedStructure>;

    /// Computes only the fingerprint of a raw structure.
    fn fingerprint(&self, raw: &str) -> Result<Fingerprint, MalformedStructure> {
        self.canonicalize(raw).map(|structure| structure.fingerprint)
    }

    /// Similarity of two fingerprints in `[0, 1]`.
    fn similarity(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        a.tanimoto(b)
    }
}

/// SMILES-based toolkit: canonical SMILES identities with Morgan fingerprints.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmilesToolkit {
    fingerprint: FingerprintConfig,
}

impl SmilesToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fingerprint_config(fingerprint: FingerprintConfig) -> Self {
        Self { fingerprint }
    }

    pub fn fingerprint_config(&self) -> &FingerprintConfig {
        &self.fingerprint
    }
}

impl StructureToolkit for SmilesToolkit {
    fn canonicalize(&self, raw: &str) -> Result<CanonicalStructure, MalformedStructure> {
        let graph = smiles::parse(raw.trim()).map_err(|e| MalformedStructure {
            input: raw.to_string(),
            reason: e.to_string(),
        })?;
        let identity = canon::write(&graph);
        trace!(input = raw, canonical = %identity, "Canonicalized structure");
        Ok(CanonicalStructure {
            fingerprint: morgan(&graph, &self.fingerprint),
            identity,
        })
    }
}
