use crate::core::chem::fingerprint::Fingerprint;
use crate::core::chem::toolkit::{MalformedStructure, StructureToolkit};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A previously seen candidate attached to a record, with its precomputed similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// The neighboring candidate, stored without its own attachments.
    pub record: CandidateRecord,
    /// Similarity between the owning record and this neighbor, in `[0, 1]`.
    pub similarity: f64,
}

impl Neighbor {
    pub fn new(record: CandidateRecord, similarity: f64) -> Self {
        Self {
            record: record.detached(),
            similarity,
        }
    }
}

/// Optional enrichments carried by a [`CandidateRecord`].
///
/// Every enrichment is a declared field; absence is `None` rather than a missing map key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    /// Most similar known candidates, most similar first.
    pub neighbors: Option<Vec<Neighbor>>,
}

/// Canonical representation of one scored molecule.
///
/// Two records are equal iff their canonical identities are equal. Ranking is defined by
/// [`rank_order`] rather than an `Ord` impl so that equality stays identity-only.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    /// Canonical molecular string; the unique key of the record.
    identity: String,
    /// Oracle score, absent when the candidate was never scored.
    score: Option<f64>,
    /// Fixed-width fingerprint derived from the canonical structure.
    fingerprint: Fingerprint,
    attachments: Attachments,
}

impl CandidateRecord {
    /// Creates a record from a raw structure string.
    ///
    /// # Arguments
    ///
    /// * `raw` - The structure as produced by the generator.
    /// * `score` - The oracle score, if any.
    /// * `toolkit` - Canonicalization and fingerprinting collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedStructure`] if the toolkit cannot parse `raw`.
    pub fn construct<T>(raw: &str, score: Option<f64>, toolkit: &T) -> Result<Self, MalformedStructure>
    where
        T: StructureToolkit + ?Sized,
    {
        let structure = toolkit.canonicalize(raw)?;
        Ok(Self::from_parts(structure.identity, score, structure.fingerprint))
    }

    /// Creates a record from an identity and fingerprint computed elsewhere.
    pub fn from_parts(identity: impl Into<String>, score: Option<f64>, fingerprint: Fingerprint) -> Self {
        Self {
            identity: identity.into(),
            score,
            fingerprint,
            attachments: Attachments::default(),
        }
    }

    pub fn with_neighbors(mut self, neighbors: Vec<Neighbor>) -> Self {
        self.attachments.neighbors = Some(neighbors);
        self
    }

    /// A copy of this record with all attachments cleared.
    pub fn detached(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            score: self.score,
            fingerprint: self.fingerprint.clone(),
            attachments: Attachments::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    /// Attached neighbors, or an empty slice when none were attached.
    pub fn neighbors(&self) -> &[Neighbor] {
        self.attachments.neighbors.as_deref().unwrap_or(&[])
    }
}

impl PartialEq for CandidateRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for CandidateRecord {}

impl Hash for CandidateRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for CandidateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.score {
            Some(score) => write!(f, "smiles: {}, score: {}", self.identity, score),
            None => write!(f, "smiles: {}, score: none", self.identity),
        }
    }
}

/// The ranking order of candidates: score ascending with a missing score lowest, then identity.
///
/// Scores compare by IEEE total order, so NaN ranks deterministically. This is the single
/// comparison used for sorting and tie-breaking throughout the crate.
pub fn rank_order(a: &CandidateRecord, b: &CandidateRecord) -> Ordering {
    let by_score = match (a.score, b.score) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };
    by_score.then_with(|| a.identity.cmp(&b.identity))
}
