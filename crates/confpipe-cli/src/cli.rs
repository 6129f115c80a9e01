use clap::Parser;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "confpipe - A checkpointed batch pipeline for conformer searching and staged geometry optimization of small molecules.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    // --- Core Arguments ---
    /// Path to the input molecule table (CSV with id and smiles columns).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Working directory for job records, scratch areas, and artifacts.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub work_dir: PathBuf,

    // --- Partitioning ---
    /// Index of this task within the partitioned batch.
    #[arg(long, default_value_t = 0, value_name = "INT")]
    pub task_id: usize,

    /// Total number of tasks the input table is partitioned across.
    #[arg(long, default_value_t = 1, value_name = "INT")]
    pub num_tasks: usize,

    // --- Conformer Search ---
    /// Upper bound on trial embeddings per molecule; the actual request is
    /// min(3^rotatable_bonds, this value).
    #[arg(long, default_value_t = 800, value_name = "INT")]
    pub max_n_conf: usize,

    /// Embedding attempt budget per molecule.
    #[arg(long, default_value_t = 2000, value_name = "INT")]
    pub max_embed_attempts: usize,

    /// Heavy-atom RMSD threshold for pruning duplicate embeddings.
    #[arg(long, default_value_t = 0.1, value_name = "FLOAT")]
    pub rms_pre: f64,

    /// Heavy-atom RMSD threshold for post-relaxation deduplication.
    #[arg(long, default_value_t = 0.4, value_name = "FLOAT")]
    pub rms_post: f64,

    /// Energy window as a fraction of |minimum energy|.
    #[arg(long, default_value_t = 0.2, value_name = "FLOAT")]
    pub energy_window: f64,

    /// Number of lowest-energy conformers kept per molecule.
    #[arg(long, default_value_t = 10, value_name = "INT")]
    pub num_keep: usize,

    /// RNG seed for reproducible embedding.
    #[arg(long, default_value_t = 1, value_name = "INT")]
    pub seed: u64,

    // --- Stage Backends ---
    /// External optimizer executable for the semiempirical stage.
    /// Without it, the in-process harmonic backend is used.
    #[arg(long, value_name = "PATH")]
    pub semiempirical_command: Option<PathBuf>,

    /// Extra arguments passed to the semiempirical optimizer.
    #[arg(long, value_name = "ARG", num_args(0..), allow_hyphen_values = true)]
    pub semiempirical_args: Vec<String>,

    /// External optimizer executable for the ab initio stage.
    /// Without it, the in-process harmonic backend is used.
    #[arg(long, value_name = "PATH")]
    pub ab_initio_command: Option<PathBuf>,

    /// Extra arguments passed to the ab initio optimizer.
    #[arg(long, value_name = "ARG", num_args(0..), allow_hyphen_values = true)]
    pub ab_initio_args: Vec<String>,

    // --- Resources ---
    /// Processor count handed to each backend invocation.
    #[arg(long, default_value_t = 1, value_name = "INT")]
    pub procs: usize,

    /// Memory budget per backend invocation, in megabytes.
    #[arg(long, default_value_t = 1000, value_name = "INT")]
    pub memory_mb: usize,

    /// Wall-clock limit per backend invocation, in seconds.
    #[arg(long, default_value_t = 7200, value_name = "INT")]
    pub timeout: u64,

    // --- Stage Selection ---
    /// Skip the conformer-search stage.
    #[arg(long)]
    pub skip_search: bool,

    /// Skip the semiempirical optimization stage.
    #[arg(long)]
    pub skip_semiempirical: bool,

    /// Skip the ab initio optimization stage.
    #[arg(long)]
    pub skip_ab_initio: bool,

    // --- Logging ---
    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation_with_defaults() {
        let cli = Cli::try_parse_from([
            "confpipe",
            "--input",
            "molecules.csv",
            "--work-dir",
            "run1",
        ])
        .unwrap();

        assert_eq!(cli.task_id, 0);
        assert_eq!(cli.num_tasks, 1);
        assert_eq!(cli.max_n_conf, 800);
        assert_eq!(cli.num_keep, 10);
        assert!(!cli.skip_semiempirical);
        assert!(cli.semiempirical_command.is_none());
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        let result = Cli::try_parse_from([
            "confpipe",
            "--input",
            "molecules.csv",
            "--work-dir",
            "run1",
            "-q",
            "-v",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn backend_arguments_accumulate() {
        let cli = Cli::try_parse_from([
            "confpipe",
            "--input",
            "molecules.csv",
            "--work-dir",
            "run1",
            "--semiempirical-command",
            "/usr/bin/xtb",
            "--semiempirical-args",
            "--opt",
            "tight",
        ])
        .unwrap();

        assert_eq!(cli.semiempirical_args, vec!["--opt", "tight"]);
    }
}
