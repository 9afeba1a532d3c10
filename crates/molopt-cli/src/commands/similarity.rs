use crate::cli::SimilarityArgs;
use crate::error::{CliError, Result};
use molopt::core::chem::fingerprint::FingerprintConfig;
use molopt::core::chem::toolkit::{SmilesToolkit, StructureToolkit};
use tracing::debug;

pub fn run(args: SimilarityArgs) -> Result<()> {
    let similarity = compute(&args)?;
    println!("{similarity:.4}");
    Ok(())
}

fn compute(args: &SimilarityArgs) -> Result<f64> {
    if args.width == 0 {
        return Err(CliError::Argument("--width must be at least 1".to_string()));
    }
    let toolkit = SmilesToolkit::with_fingerprint_config(FingerprintConfig {
        radius: args.radius,
        width: args.width,
    });
    let canonicalize = |raw: &str| {
        toolkit
            .canonicalize(raw)
            .map_err(|e| CliError::Argument(e.to_string()))
    };
    let first = canonicalize(&args.first)?;
    let second = canonicalize(&args.second)?;
    debug!(first = %first.identity, second = %second.identity, "Comparing fingerprints.");
    Ok(toolkit.similarity(&first.fingerprint, &second.fingerprint))
}
