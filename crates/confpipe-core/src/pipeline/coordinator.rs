//! Stage ordering, resumption, and molecule-level error containment.

use crate::core::io::smiles::parse_smiles;
use crate::core::io::table::MoleculeEntry;
use crate::core::io::xyz::{read_conformers, write_conformers};
use crate::core::models::geometry::Geometry;
use crate::core::models::graph::MolecularGraph;
use crate::engine::backend::{OptimizationBackend, Resources};
use crate::engine::config::{ConfigError, SearchConfig, StageResources};
use crate::engine::error::MoleculeError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::pipeline::record::{JobRecord, RecordError, Stage};
use crate::pipeline::search::run_conformer_search;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Fatal pipeline conditions. Everything molecule-level is contained inside
/// the run and reported through [`RunReport`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "job record belongs to partition {record_task_id}/{record_num_tasks} with a different \
         molecule set; refusing to run as {task_id}/{num_tasks}"
    )]
    PartitionMismatch {
        record_task_id: usize,
        record_num_tasks: usize,
        task_id: usize,
        num_tasks: usize,
    },

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("I/O error in work directory: {0}")]
    Io(#[from] std::io::Error),
}

/// One relaxation backend per stage.
pub struct StageBackends {
    pub conformer_search: Box<dyn OptimizationBackend>,
    pub semiempirical: Box<dyn OptimizationBackend>,
    pub ab_initio: Box<dyn OptimizationBackend>,
}

impl StageBackends {
    fn for_stage(&self, stage: Stage) -> &dyn OptimizationBackend {
        match stage {
            Stage::ConformerSearch => self.conformer_search.as_ref(),
            Stage::SemiempiricalOpt => self.semiempirical.as_ref(),
            Stage::AbInitioOpt => self.ab_initio.as_ref(),
        }
    }
}

/// Everything a pipeline run needs, validated up front.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search: SearchConfig,
    pub work_dir: PathBuf,
    pub task_id: usize,
    pub num_tasks: usize,
    pub resources: StageResources,
    pub skip: BTreeSet<Stage>,
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    search: Option<SearchConfig>,
    work_dir: Option<PathBuf>,
    task_id: Option<usize>,
    num_tasks: Option<usize>,
    resources: StageResources,
    skip: BTreeSet<Stage>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, search: SearchConfig) -> Self {
        self.search = Some(search);
        self
    }
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }
    pub fn task_id(mut self, task_id: usize) -> Self {
        self.task_id = Some(task_id);
        self
    }
    pub fn num_tasks(mut self, num_tasks: usize) -> Self {
        self.num_tasks = Some(num_tasks);
        self
    }
    pub fn resources(mut self, resources: StageResources) -> Self {
        self.resources = resources;
        self
    }
    pub fn skip_stage(mut self, stage: Stage) -> Self {
        self.skip.insert(stage);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let config = PipelineConfig {
            search: self.search.ok_or(ConfigError::MissingParameter("search"))?,
            work_dir: self
                .work_dir
                .ok_or(ConfigError::MissingParameter("work_dir"))?,
            task_id: self.task_id.ok_or(ConfigError::MissingParameter("task_id"))?,
            num_tasks: self
                .num_tasks
                .ok_or(ConfigError::MissingParameter("num_tasks"))?,
            resources: self.resources,
            skip: self.skip,
        };
        if config.num_tasks == 0 || config.task_id >= config.num_tasks {
            return Err(ConfigError::InvalidParameter {
                name: "task_id",
                reason: format!(
                    "task_id {} must be < num_tasks {}",
                    config.task_id, config.num_tasks
                ),
            });
        }
        Ok(config)
    }
}

/// Per-stage counts of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }
}

/// Drives one partition of molecules through the fixed stage order.
///
/// The coordinator is the single owner of the job record; it marks and saves
/// after every per-molecule success, so an interrupted run resumes with at
/// most one molecule of repeated work.
pub struct PipelineCoordinator<'a> {
    config: PipelineConfig,
    entries: Vec<MoleculeEntry>,
    backends: StageBackends,
    record: JobRecord,
    reporter: ProgressReporter<'a>,
}

impl<'a> PipelineCoordinator<'a> {
    /// Prepares a run: loads or initializes the job record and lays down the
    /// per-molecule input markers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PartitionMismatch`] before touching any
    /// molecule when an existing record was written by a different partition
    /// of the input table.
    pub fn new(
        config: PipelineConfig,
        entries: Vec<MoleculeEntry>,
        backends: StageBackends,
        reporter: ProgressReporter<'a>,
    ) -> Result<Self, PipelineError> {
        fs::create_dir_all(&config.work_dir)?;

        let id_set: BTreeSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        let record = match JobRecord::load(&config.work_dir, config.task_id) {
            Ok(record) => {
                if !record.is_consistent_with(config.task_id, config.num_tasks, &id_set) {
                    return Err(PipelineError::PartitionMismatch {
                        record_task_id: record.task_id(),
                        record_num_tasks: record.num_tasks(),
                        task_id: config.task_id,
                        num_tasks: config.num_tasks,
                    });
                }
                info!(
                    task_id = config.task_id,
                    "resuming from existing job record"
                );
                record
            }
            Err(RecordError::NotFound { .. }) => {
                let record = JobRecord::initialize(config.task_id, config.num_tasks, id_set);
                record.save(&config.work_dir)?;
                info!(task_id = config.task_id, "initialized new job record");
                record
            }
            Err(e) => return Err(e.into()),
        };

        let inputs_dir = config.work_dir.join("inputs");
        fs::create_dir_all(&inputs_dir)?;
        for entry in &entries {
            if !record.is_done(Stage::ConformerSearch, &entry.id) {
                fs::write(inputs_dir.join(format!("{}.in", entry.id)), &entry.smiles)?;
            }
        }

        Ok(Self {
            config,
            entries,
            backends,
            record,
            reporter,
        })
    }

    /// Runs every non-skipped stage over its pending molecules.
    ///
    /// Molecule failures are logged and counted; they leave the molecule
    /// pending for retry on the next invocation and never abort the run.
    pub fn run(&mut self) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();

        for stage in Stage::ALL {
            if self.config.skip.contains(&stage) {
                info!(stage = %stage, "stage skipped by configuration");
                self.reporter
                    .report(Progress::Message(format!("stage {stage} skipped")));
                continue;
            }

            let gate = self.gate_stage(stage);
            let pending: Vec<MoleculeEntry> = self
                .entries
                .iter()
                .filter(|entry| !self.record.is_done(stage, &entry.id))
                .filter(|entry| gate.is_none_or(|g| self.record.is_done(g, &entry.id)))
                .cloned()
                .collect();
            self.reporter.report(Progress::StageStart {
                name: stage.as_str(),
                pending: pending.len(),
            });
            info!(stage = %stage, pending = pending.len(), "stage started");

            let mut stage_report = StageReport {
                stage,
                attempted: pending.len(),
                succeeded: 0,
                failed: 0,
            };
            for entry in pending {
                self.reporter.report(Progress::MoleculeStart {
                    id: entry.id.clone(),
                });
                match self.run_molecule(stage, &entry) {
                    Ok(()) => {
                        self.record.mark_done(stage, &entry.id);
                        self.record.save(&self.config.work_dir)?;
                        stage_report.succeeded += 1;
                        self.reporter.report(Progress::MoleculeDone {
                            id: entry.id.clone(),
                        });
                    }
                    Err(e) => {
                        warn!(stage = %stage, molecule_id = %entry.id, error = %e, "molecule failed, left pending");
                        stage_report.failed += 1;
                        self.reporter.report(Progress::MoleculeFailed {
                            id: entry.id.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            self.reporter.report(Progress::StageFinish);
            info!(
                stage = %stage,
                succeeded = stage_report.succeeded,
                failed = stage_report.failed,
                "stage finished"
            );
            report.stages.push(stage_report);
        }

        Ok(report)
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    fn run_molecule(&self, stage: Stage, entry: &MoleculeEntry) -> Result<(), MoleculeError> {
        let mut graph = parse_smiles(&entry.smiles)?;
        let resources = Resources {
            procs: self.config.resources.procs,
            memory_mb: self.config.resources.memory_mb,
            charge: entry.charge.unwrap_or_else(|| graph.formal_charge()),
            multiplicity: entry.multiplicity.unwrap_or_else(|| graph.multiplicity()),
        };
        let mol_dir = self
            .config
            .work_dir
            .join(stage.as_str())
            .join(&entry.id);

        match stage {
            Stage::ConformerSearch => {
                let marker = self
                    .config
                    .work_dir
                    .join("inputs")
                    .join(format!("{}.in", entry.id));
                run_conformer_search(
                    &entry.id,
                    &mut graph,
                    &self.config.search,
                    self.backends.for_stage(stage),
                    &resources,
                    &mol_dir,
                    Some(&marker),
                )?;
                Ok(())
            }
            Stage::SemiempiricalOpt | Stage::AbInitioOpt => {
                self.run_optimization(stage, entry, &graph, &resources, &mol_dir)
            }
        }
    }

    /// Re-relaxes every conformer retained by the previous stage.
    fn run_optimization(
        &self,
        stage: Stage,
        entry: &MoleculeEntry,
        graph: &MolecularGraph,
        resources: &Resources,
        mol_dir: &Path,
    ) -> Result<(), MoleculeError> {
        fs::create_dir_all(mol_dir)?;

        let prior = self
            .prior_artifact(stage, &entry.id)
            .ok_or_else(|| {
                MoleculeError::MissingInput(format!(
                    "no prior-stage conformer artifact for '{}'",
                    entry.id
                ))
            })?;
        // Prior artifact is copied into this stage's area before relaxing.
        let local = mol_dir.join(
            prior
                .file_name()
                .ok_or_else(|| MoleculeError::MissingInput(prior.display().to_string()))?,
        );
        fs::copy(&prior, &local)?;

        let frames = read_conformers(&local)?;
        let backend = self.backends.for_stage(stage);
        let mut relaxed: Vec<(f64, Geometry)> = Vec::new();
        for (index, frame) in frames.iter().enumerate() {
            if frame.positions.len() != graph.atoms().len() {
                warn!(molecule_id = %entry.id, index, "frame does not align with the molecule, dropped");
                continue;
            }
            let scratch = mol_dir.join(format!("cand_{index:03}"));
            match backend.relax(graph, &frame.to_geometry(), resources, &scratch) {
                Ok(relaxation) if relaxation.structurally_valid => {
                    relaxed.push((relaxation.energy, relaxation.geometry));
                    let _ = fs::remove_dir_all(&scratch);
                }
                Ok(_) => {
                    tracing::debug!(molecule_id = %entry.id, index, "conformer lost its connectivity, dropped");
                }
                Err(e) => {
                    tracing::debug!(molecule_id = %entry.id, index, error = %e, "conformer relaxation failed, dropped");
                }
            }
        }
        if relaxed.is_empty() {
            return Err(MoleculeError::AllCandidatesFailed);
        }
        relaxed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let all_frames: Vec<(f64, &Geometry)> =
            relaxed.iter().map(|(energy, g)| (*energy, g)).collect();
        write_conformers(
            mol_dir.join(format!("{}_confs_opt.xyz", entry.id)),
            &entry.id,
            graph,
            &all_frames,
        )?;
        write_conformers(
            mol_dir.join(format!("{}_opt.xyz", entry.id)),
            &entry.id,
            graph,
            &all_frames[..1],
        )?;
        Ok(())
    }

    /// Path of the artifact the given stage consumes: the nearest earlier
    /// stage's output that exists on disk. Skipping a stage only skips its
    /// execution; artifacts it produced on an earlier invocation are still
    /// consumed.
    fn prior_artifact(&self, stage: Stage, molecule_id: &str) -> Option<PathBuf> {
        let position = Stage::ALL.iter().position(|s| *s == stage)?;
        Stage::ALL[..position]
            .iter()
            .rev()
            .map(|earlier| self.artifact_path(*earlier, molecule_id))
            .find(|path| path.exists())
    }

    /// The completion gate for a stage: the nearest earlier stage still
    /// being executed. Molecules that have not finished it are left for a
    /// later invocation instead of failing on a missing artifact.
    fn gate_stage(&self, stage: Stage) -> Option<Stage> {
        let position = Stage::ALL.iter().position(|s| *s == stage)?;
        Stage::ALL[..position]
            .iter()
            .rev()
            .find(|earlier| !self.config.skip.contains(earlier))
            .copied()
    }

    fn artifact_path(&self, stage: Stage, molecule_id: &str) -> PathBuf {
        let file_name = match stage {
            Stage::ConformerSearch => format!("{molecule_id}_confs.xyz"),
            Stage::SemiempiricalOpt | Stage::AbInitioOpt => {
                format!("{molecule_id}_confs_opt.xyz")
            }
        };
        self.config
            .work_dir
            .join(stage.as_str())
            .join(molecule_id)
            .join(file_name)
    }
}
