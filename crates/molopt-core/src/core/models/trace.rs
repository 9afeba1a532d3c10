use super::candidate::CandidateRecord;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Partition a retained trace belongs to.
///
/// A tag moves out of `Unassigned` at most once; `Train` and `Valid` are never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClassificationTag {
    #[default]
    Unassigned,
    Train,
    Valid,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid classification tag: '{0}'")]
pub struct ParseClassificationTagError(String);

impl FromStr for ClassificationTag {
    type Err = ParseClassificationTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unassigned" => Ok(Self::Unassigned),
            "train" => Ok(Self::Train),
            "valid" => Ok(Self::Valid),
            _ => Err(ParseClassificationTagError(s.to_string())),
        }
    }
}

impl fmt::Display for ClassificationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unassigned => "unassigned",
            Self::Train => "train",
            Self::Valid => "valid",
        };
        write!(f, "{}", name)
    }
}

/// One conditioning unit: a target candidate with the prior candidates used as its context.
///
/// Equality and hashing delegate to the target.
#[derive(Debug, Clone)]
pub struct OptimizationTrace {
    target: CandidateRecord,
    context: Vec<CandidateRecord>,
    tag: ClassificationTag,
}

impl OptimizationTrace {
    pub fn new(target: CandidateRecord) -> Self {
        Self {
            target,
            context: Vec::new(),
            tag: ClassificationTag::Unassigned,
        }
    }

    pub fn target(&self) -> &CandidateRecord {
        &self.target
    }

    pub fn context(&self) -> &[CandidateRecord] {
        &self.context
    }

    pub fn tag(&self) -> ClassificationTag {
        self.tag
    }

    /// Whether a record with the same identity as `candidate` is already in the context.
    pub fn contains_target(&self, candidate: &CandidateRecord) -> bool {
        self.context.iter().any(|record| record == candidate)
    }

    /// Appends a record to the context unless it is the trace's own target or already present.
    ///
    /// Returns `true` when the record was added.
    pub fn push_context(&mut self, record: CandidateRecord) -> bool {
        if record == self.target || self.contains_target(&record) {
            return false;
        }
        self.context.push(record);
        true
    }

    /// Tags an unassigned trace. Already tagged traces keep their tag.
    pub(crate) fn assign(&mut self, tag: ClassificationTag) -> bool {
        if self.tag != ClassificationTag::Unassigned {
            return false;
        }
        self.tag = tag;
        true
    }

    #[cfg(test)]
    pub(crate) fn with_tag(mut self, tag: ClassificationTag) -> Self {
        self.tag = tag;
        self
    }
}

impl PartialEq for OptimizationTrace {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for OptimizationTrace {}

impl Hash for OptimizationTrace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
    }
}
