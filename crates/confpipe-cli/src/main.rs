mod cli;
mod error;
mod logging;

use crate::cli::Cli;
use crate::error::Result;
use clap::Parser;
use confpipe::core::io::table::InputTable;
use confpipe::engine::backend::{ExternalBackend, HarmonicBackend, OptimizationBackend};
use confpipe::engine::config::{SearchConfigBuilder, StageResources};
use confpipe::engine::progress::{Progress, ProgressReporter};
use confpipe::pipeline::coordinator::{
    PipelineConfigBuilder, PipelineCoordinator, StageBackends,
};
use confpipe::pipeline::record::Stage;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\nError: {e}");
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    info!("confpipe v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let search = SearchConfigBuilder::new()
        .max_n_conf(cli.max_n_conf)
        .max_embed_attempts(cli.max_embed_attempts)
        .prune_rms_threshold(cli.rms_pre)
        .energy_window_fraction(cli.energy_window)
        .dedup_rms_threshold(cli.rms_post)
        .num_confs_to_keep(cli.num_keep)
        .seed(cli.seed)
        .build()?;

    let table = InputTable::from_path(&cli.input)?;
    let entries: Vec<_> = table
        .partition(cli.task_id, cli.num_tasks)?
        .into_iter()
        .cloned()
        .collect();
    info!(
        total = table.entries().len(),
        assigned = entries.len(),
        task_id = cli.task_id,
        num_tasks = cli.num_tasks,
        "input table partitioned"
    );

    let timeout = Duration::from_secs(cli.timeout);
    let backends = StageBackends {
        conformer_search: Box::new(HarmonicBackend::new()),
        semiempirical: stage_backend("semiempirical", &cli.semiempirical_command, &cli.semiempirical_args, timeout),
        ab_initio: stage_backend("ab_initio", &cli.ab_initio_command, &cli.ab_initio_args, timeout),
    };

    let mut pipeline = PipelineConfigBuilder::new()
        .search(search)
        .work_dir(&cli.work_dir)
        .task_id(cli.task_id)
        .num_tasks(cli.num_tasks)
        .resources(StageResources {
            procs: cli.procs,
            memory_mb: cli.memory_mb,
            timeout,
        });
    for (skip, stage) in [
        (cli.skip_search, Stage::ConformerSearch),
        (cli.skip_semiempirical, Stage::SemiempiricalOpt),
        (cli.skip_ab_initio, Stage::AbInitioOpt),
    ] {
        if skip {
            pipeline = pipeline.skip_stage(stage);
        }
    }

    let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
        Progress::StageStart { name, pending } => {
            println!("== {name}: {pending} molecule(s) pending");
        }
        Progress::MoleculeFailed { id, reason } => {
            eprintln!("   {id}: FAILED ({reason})");
        }
        Progress::Message(message) => println!("   {message}"),
        _ => {}
    }));

    let mut coordinator =
        PipelineCoordinator::new(pipeline.build()?, entries, backends, reporter)?;
    let report = coordinator.run()?;

    for stage in &report.stages {
        info!(
            stage = %stage.stage,
            attempted = stage.attempted,
            succeeded = stage.succeeded,
            failed = stage.failed,
            "stage summary"
        );
        println!(
            "{}: {}/{} succeeded, {} failed",
            stage.stage, stage.succeeded, stage.attempted, stage.failed
        );
    }
    if report.total_failed() > 0 {
        warn!(
            failed = report.total_failed(),
            "some molecules are still pending; rerun to retry them"
        );
    } else {
        info!("All assigned molecules completed.");
    }

    Ok(())
}

/// External backend when a command is configured, otherwise the in-process
/// harmonic fallback.
fn stage_backend(
    name: &str,
    command: &Option<PathBuf>,
    args: &[String],
    timeout: Duration,
) -> Box<dyn OptimizationBackend> {
    match command {
        Some(command) => Box::new(ExternalBackend::new(
            name,
            command.clone(),
            args.to_vec(),
            timeout,
        )),
        None => {
            warn!(stage = name, "no external optimizer configured, using the in-process harmonic backend");
            Box::new(HarmonicBackend::new())
        }
    }
}
