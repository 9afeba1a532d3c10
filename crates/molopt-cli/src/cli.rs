use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "MolOpt Developers",
    version,
    about = "MolOpt CLI - Canonicalize molecules and evolve a diverse, ranked candidate population from oracle-scored rounds.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the canonical SMILES of each input molecule.
    Canonicalize(CanonicalizeArgs),
    /// Print the Tanimoto similarity of two molecules' fingerprints.
    Similarity(SimilarityArgs),
    /// Feed scored rounds into a fresh population and write its snapshot, training texts and prompts.
    Evolve(EvolveArgs),
}

/// Arguments for the `canonicalize` subcommand.
#[derive(Args, Debug)]
pub struct CanonicalizeArgs {
    /// One or more SMILES strings.
    #[arg(required = true, value_name = "SMILES")]
    pub smiles: Vec<String>,
}

/// Arguments for the `similarity` subcommand.
#[derive(Args, Debug)]
pub struct SimilarityArgs {
    #[arg(value_name = "SMILES_A")]
    pub first: String,

    #[arg(value_name = "SMILES_B")]
    pub second: String,

    /// Fingerprint radius in bonds.
    #[arg(long, default_value_t = 2, value_name = "INT")]
    pub radius: usize,

    /// Fingerprint width in bits.
    #[arg(long, default_value_t = 2048, value_name = "INT")]
    pub width: usize,
}

/// Arguments for the `evolve` subcommand.
#[derive(Args, Debug)]
pub struct EvolveArgs {
    /// Scored round files (CSV with a `smiles` and an optional `score` column), in round order.
    #[arg(required = true, value_name = "ROUND_CSV")]
    pub rounds: Vec<PathBuf>,

    /// Path to the run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base directory; each run writes into a fresh versioned subdirectory.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Name of the run subdirectory, suffixed with the first unused version number.
    #[arg(long, default_value = "run", value_name = "NAME")]
    pub label: String,

    // --- Overrides ---
    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the population capacity.
    #[arg(long, value_name = "INT")]
    pub capacity: Option<usize>,

    /// Override the prompt strategy ('default' or 'rej-sample-v2').
    #[arg(long, value_name = "NAME")]
    pub strategy: Option<String>,

    /// Override the number of generation prompts written.
    #[arg(short = 'n', long, value_name = "INT")]
    pub generation_prompts: Option<usize>,

    /// Set a specific configuration value, overriding the config file and other flags.
    /// Can be used multiple times. Example: -S population.diversity-threshold=0.8
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
