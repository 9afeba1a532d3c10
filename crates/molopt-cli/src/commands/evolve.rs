use crate::cli::EvolveArgs;
use crate::config::{PartialRunConfig, RunConfig};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use molopt::core::chem::toolkit::SmilesToolkit;
use molopt::core::io::scored::{read_proposals_from_path, write_population_to_path};
use molopt::core::models::trace::OptimizationTrace;
use molopt::engine::population::PopulationManager;
use molopt::engine::progress::ProgressReporter;
use molopt::workflows::{self, generation, output};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const POPULATION_FILE: &str = "population.csv";
const TRAIN_FILE: &str = "train.csv";
const VALID_FILE: &str = "valid.csv";
const TRAIN_TEXT_FILE: &str = "train.txt";
const VALID_TEXT_FILE: &str = "valid.txt";
const GENERATION_FILE: &str = "generation.txt";

pub fn run(args: EvolveArgs) -> Result<()> {
    let partial_config = match &args.config {
        Some(path) => PartialRunConfig::from_file(path)?,
        None => PartialRunConfig::default(),
    };
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let run_dir = evolve(&args, &config, &reporter)?;
    println!("Run artifacts written to: {}", run_dir.display());
    Ok(())
}

/// Replays every round into a fresh population and writes the run artifacts, returning the
/// run directory.
fn evolve(args: &EvolveArgs, config: &RunConfig, reporter: &ProgressReporter) -> Result<PathBuf> {
    let toolkit = SmilesToolkit::with_fingerprint_config(config.fingerprint);
    let mut population = PopulationManager::new(&config.optimization.pool);
    let mut rng = StdRng::seed_from_u64(config.seed);

    for (i, path) in args.rounds.iter().enumerate() {
        info!("Loading round {} from {:?}", i + 1, path);
        let proposals = read_proposals_from_path(path).map_err(|e| CliError::FileParsing {
            path: path.clone(),
            source: e.into(),
        })?;

        let summary = workflows::round::run(
            &mut population,
            &proposals,
            &toolkit,
            &config.optimization,
            &mut rng,
            reporter,
        )?;
        println!(
            "Round {}: {} proposals, {} malformed, {} duplicates, {} too similar, population {}",
            i + 1,
            summary.proposals,
            summary.malformed,
            summary.merge.duplicates,
            summary.merge.too_similar,
            summary.merge.retained
        );
    }

    match population.best() {
        Some(best) => println!("Best candidate: {}", best.target()),
        None => warn!("No valid candidates were found in any round."),
    }

    let run_dir = output::versioned_dir(&args.output, &args.label)?;
    info!("Writing run artifacts to {:?}", run_dir);
    write_artifacts(&run_dir, &population, config, &mut rng)?;
    Ok(run_dir)
}

fn write_artifacts(
    run_dir: &Path,
    population: &PopulationManager,
    config: &RunConfig,
    rng: &mut StdRng,
) -> Result<()> {
    write_csv(&run_dir.join(POPULATION_FILE), population.traces())?;

    let (train, valid) = population.split()?;
    write_csv(&run_dir.join(TRAIN_FILE), train)?;
    write_csv(&run_dir.join(VALID_FILE), valid)?;

    let texts = generation::training_texts(population, &config.optimization)?;
    write_lines(&run_dir.join(TRAIN_TEXT_FILE), &texts.train)?;
    write_lines(&run_dir.join(VALID_TEXT_FILE), &texts.valid)?;

    let prompts = generation::prompts(
        population,
        config.generation_prompts,
        &config.optimization,
        rng,
    )?;
    write_lines(&run_dir.join(GENERATION_FILE), &prompts)?;
    Ok(())
}

fn write_csv<'t>(path: &Path, traces: impl IntoIterator<Item = &'t OptimizationTrace>) -> Result<()> {
    write_population_to_path(path, traces).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content)?;
    Ok(())
}
