use crate::core::models::trace::OptimizationTrace;
use itertools::Itertools;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const SMILES_COLUMN: &str = "smiles";
const SCORE_COLUMN: &str = "score";

#[derive(Debug, Error)]
pub enum ScoredFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("Invalid score '{value}' on line {line}")]
    InvalidScore { line: u64, value: String },
}

/// One raw, oracle-scored proposal as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProposal {
    pub raw: String,
    pub score: Option<f64>,
}

/// Reads proposals from CSV with a `smiles` column and an optional `score` column.
///
/// Header names are matched case-insensitively. Blank rows are skipped and an empty score
/// cell reads as `None`.
pub fn read_proposals<R: Read>(reader: R) -> Result<Vec<ScoredProposal>, ScoredFileError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let smiles_index = column(SMILES_COLUMN).ok_or(ScoredFileError::MissingColumn(SMILES_COLUMN))?;
    let score_index = column(SCORE_COLUMN);

    let mut proposals = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let raw = record.get(smiles_index).unwrap_or_default();
        if raw.is_empty() {
            continue;
        }
        let score = match score_index.and_then(|i| record.get(i)).filter(|s| !s.is_empty()) {
            Some(text) => Some(text.parse::<f64>().map_err(|_| ScoredFileError::InvalidScore {
                line: record.position().map_or(0, |p| p.line()),
                value: text.to_string(),
            })?),
            None => None,
        };
        proposals.push(ScoredProposal {
            raw: raw.to_string(),
            score,
        });
    }
    Ok(proposals)
}

pub fn read_proposals_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<ScoredProposal>, ScoredFileError> {
    let file = File::open(path)?;
    read_proposals(BufReader::new(file))
}

#[derive(Serialize)]
struct PopulationRow<'a> {
    rank: usize,
    smiles: &'a str,
    score: Option<f64>,
    tag: String,
    context: String,
}

/// Writes traces as CSV rows `rank,smiles,score,tag,context`, ranked from 1 in iteration order.
///
/// The context column lists the context identities separated by single spaces.
pub fn write_population<'t, W, I>(writer: W, traces: I) -> Result<(), ScoredFileError>
where
    W: Write,
    I: IntoIterator<Item = &'t OptimizationTrace>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (i, trace) in traces.into_iter().enumerate() {
        let context = trace
            .context()
            .iter()
            .map(|record| record.identity())
            .join(" ");
        csv_writer.serialize(PopulationRow {
            rank: i + 1,
            smiles: trace.target().identity(),
            score: trace.target().score(),
            tag: trace.tag().to_string(),
            context,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_population_to_path<'t, P, I>(path: P, traces: I) -> Result<(), ScoredFileError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'t OptimizationTrace>,
{
    let file = File::create(path)?;
    write_population(BufWriter::new(file), traces)
}
