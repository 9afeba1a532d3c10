use crate::cli::CanonicalizeArgs;
use crate::error::{CliError, Result};
use molopt::core::chem::toolkit::{SmilesToolkit, StructureToolkit};
use tracing::{info, warn};

pub fn run(args: CanonicalizeArgs) -> Result<()> {
    let toolkit = SmilesToolkit::new();
    let lines = canonical_lines(&args.smiles, &toolkit);
    let failures = lines.iter().filter(|line| line.is_err()).count();

    for line in lines {
        match line {
            Ok(text) => println!("{text}"),
            Err(text) => eprintln!("{text}"),
        }
    }

    info!(inputs = args.smiles.len(), failures, "Canonicalization finished.");
    if failures > 0 {
        warn!(failures, "Some inputs could not be canonicalized.");
        return Err(CliError::Argument(format!(
            "{} of {} inputs could not be parsed",
            failures,
            args.smiles.len()
        )));
    }
    Ok(())
}

/// One output line per input, in input order: the canonical form or the parse error.
fn canonical_lines<T: StructureToolkit + ?Sized>(
    inputs: &[String],
    toolkit: &T,
) -> Vec<std::result::Result<String, String>> {
    inputs
        .iter()
        .map(|raw| {
            toolkit
                .canonicalize(raw)
                .map(|structure| structure.identity)
                .map_err(|e| e.to_string())
        })
        .collect()
}
