//! Geometry relaxation backends.
//!
//! A backend takes one trial geometry and returns a relaxed geometry with its
//! energy and a structural-validity verdict. Two implementations are
//! provided: [`HarmonicBackend`], a deterministic in-process force-field
//! minimizer used by the conformer-search stage and by tests, and
//! [`ExternalBackend`], which shells out to an optimizer executable (xtb-like
//! conventions) under a wall-clock limit.

use crate::core::models::geometry::Geometry;
use crate::core::models::graph::{BondOrder, MolecularGraph};
use crate::engine::error::BackendError;
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Compute budget and electronic state handed to one backend invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resources {
    pub procs: usize,
    pub memory_mb: usize,
    pub charge: i32,
    pub multiplicity: u32,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            procs: 1,
            memory_mb: 1000,
            charge: 0,
            multiplicity: 1,
        }
    }
}

/// Outcome of a single relaxation.
#[derive(Debug, Clone)]
pub struct Relaxation {
    /// Final energy in the backend's native unit. Only energies from the
    /// same backend are comparable.
    pub energy: f64,
    pub geometry: Geometry,
    /// Whether the relaxed geometry still realizes the molecule's bond graph.
    pub structurally_valid: bool,
}

/// The relaxation contract every optimization stage plugs into.
///
/// Implementations must be deterministic for a given input and must confine
/// all filesystem side effects to `scratch_dir`.
pub trait OptimizationBackend {
    fn name(&self) -> &str;

    fn relax(
        &self,
        graph: &MolecularGraph,
        geometry: &Geometry,
        resources: &Resources,
        scratch_dir: &Path,
    ) -> Result<Relaxation, BackendError>;
}

/// Deterministic in-process minimizer over a harmonic bond potential plus a
/// soft nonbonded repulsion.
///
/// It is not a chemical force field; it exists to give the conformer-search
/// stage a fast, dependency-free scorer whose minima preserve connectivity
/// for reasonable starting geometries.
#[derive(Debug, Clone)]
pub struct HarmonicBackend {
    max_steps: usize,
    step_size: f64,
    gradient_tolerance: f64,
}

impl Default for HarmonicBackend {
    fn default() -> Self {
        Self {
            max_steps: 500,
            step_size: 0.02,
            gradient_tolerance: 1e-4,
        }
    }
}

impl HarmonicBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn equilibrium_length(graph: &MolecularGraph, a: usize, b: usize, order: BondOrder) -> f64 {
        let fallback = 0.75;
        let radius = |i: usize| {
            graph
                .atom(i)
                .and_then(|atom| atom.info())
                .map(|info| info.covalent_radius)
                .unwrap_or(fallback)
        };
        let factor = match order {
            BondOrder::Single => 1.0,
            BondOrder::Double => 0.87,
            BondOrder::Triple => 0.78,
        };
        (radius(a) + radius(b)) * factor
    }

    /// Energy and gradient of the model potential at `positions`.
    fn evaluate(
        graph: &MolecularGraph,
        positions: &[Point3<f64>],
    ) -> (f64, Vec<Vector3<f64>>) {
        let mut energy = 0.0;
        let mut gradient = vec![Vector3::zeros(); positions.len()];

        // Harmonic stretch on every bond.
        for bond in graph.bonds() {
            let (a, b) = (bond.a, bond.b);
            let r0 = Self::equilibrium_length(graph, a, b, bond.order);
            let delta = positions[a] - positions[b];
            let r = delta.norm().max(1e-9);
            let stretch = r - r0;
            energy += stretch * stretch;
            let direction = delta / r;
            gradient[a] += direction * (2.0 * stretch);
            gradient[b] -= direction * (2.0 * stretch);
        }

        // Soft repulsion between nonbonded pairs inside the contact cutoff.
        let n = positions.len();
        for a in 0..n {
            for b in (a + 1)..n {
                if graph.neighbors(a).contains(&b) {
                    continue;
                }
                let cutoff = Self::equilibrium_length(graph, a, b, BondOrder::Single) + 0.7;
                let delta = positions[a] - positions[b];
                let r = delta.norm().max(1e-9);
                if r >= cutoff {
                    continue;
                }
                let overlap = cutoff - r;
                energy += overlap * overlap;
                let direction = delta / r;
                gradient[a] += direction * (-2.0 * overlap);
                gradient[b] -= direction * (-2.0 * overlap);
            }
        }

        (energy, gradient)
    }

    /// Runs the steepest-descent loop and returns the final energy and
    /// coordinates. Also used by the embedder to settle raw trial
    /// geometries before the connectivity gate.
    pub fn minimize(
        &self,
        graph: &MolecularGraph,
        mut positions: Vec<Point3<f64>>,
    ) -> (f64, Vec<Point3<f64>>) {
        let mut energy = 0.0;
        for step in 0..self.max_steps {
            let (e, gradient) = Self::evaluate(graph, &positions);
            energy = e;
            let gradient_norm: f64 = gradient.iter().map(|g| g.norm_squared()).sum::<f64>().sqrt();
            if gradient_norm < self.gradient_tolerance {
                trace!(step, energy, "harmonic minimization converged");
                break;
            }
            for (position, g) in positions.iter_mut().zip(&gradient) {
                *position -= g * self.step_size;
            }
        }
        (energy, positions)
    }
}

impl OptimizationBackend for HarmonicBackend {
    fn name(&self) -> &str {
        "harmonic"
    }

    fn relax(
        &self,
        graph: &MolecularGraph,
        geometry: &Geometry,
        _resources: &Resources,
        _scratch_dir: &Path,
    ) -> Result<Relaxation, BackendError> {
        let (energy, positions) = self.minimize(graph, geometry.positions().to_vec());
        let relaxed = Geometry::new(positions);
        let structurally_valid = graph.matches_connectivity(&relaxed);
        Ok(Relaxation {
            energy,
            geometry: relaxed,
            structurally_valid,
        })
    }
}

/// External optimizer invoked as a child process.
///
/// The backend writes `input.xyz` into a fresh scratch directory, launches
/// `command args... input.xyz --chrg C --uhf U`, redirects stdout to
/// `backend.log`, and kills the child when the wall-clock limit passes. The
/// relaxed geometry is read from `xtbopt.xyz`, the energy from the first
/// `TOTAL ENERGY` line of the log.
#[derive(Debug, Clone)]
pub struct ExternalBackend {
    name: String,
    command: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

/// Poll interval while waiting on the child process.
const WAIT_TICK: Duration = Duration::from_millis(50);

impl ExternalBackend {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            timeout,
        }
    }

    fn write_input(
        path: &Path,
        graph: &MolecularGraph,
        geometry: &Geometry,
        resources: &Resources,
    ) -> Result<(), BackendError> {
        let mut file = File::create(path)?;
        writeln!(file, "{}", graph.atoms().len())?;
        writeln!(
            file,
            "charge={} multiplicity={}",
            resources.charge, resources.multiplicity
        )?;
        for (atom, position) in graph.atoms().iter().zip(geometry.positions()) {
            writeln!(
                file,
                "{} {:.8} {:.8} {:.8}",
                atom.element, position.x, position.y, position.z
            )?;
        }
        Ok(())
    }

    fn wait_with_timeout(
        &self,
        child: &mut std::process::Child,
    ) -> Result<std::process::ExitStatus, BackendError> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= self.timeout {
                child.kill()?;
                let _ = child.wait();
                return Err(BackendError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(WAIT_TICK);
        }
    }

    /// First f64 token on the first line containing `TOTAL ENERGY`.
    fn parse_energy(log_path: &Path) -> Result<f64, BackendError> {
        let file = File::open(log_path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.contains("TOTAL ENERGY") {
                continue;
            }
            if let Some(energy) = line
                .split_whitespace()
                .find_map(|token| token.parse::<f64>().ok())
            {
                return Ok(energy);
            }
            return Err(BackendError::LogParse(format!(
                "TOTAL ENERGY line has no numeric token: '{line}'"
            )));
        }
        Err(BackendError::LogParse(
            "no TOTAL ENERGY line in backend log".to_string(),
        ))
    }

    /// Single-frame XYZ reader for the optimizer's output file.
    fn read_relaxed_geometry(path: &Path, expected_atoms: usize) -> Result<Geometry, BackendError> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let count_line = lines
            .next()
            .transpose()?
            .ok_or_else(|| BackendError::LogParse("empty relaxed-geometry file".to_string()))?;
        let count: usize = count_line.trim().parse().map_err(|_| {
            BackendError::LogParse(format!("bad atom count line: '{count_line}'"))
        })?;
        if count != expected_atoms {
            return Err(BackendError::LogParse(format!(
                "relaxed geometry has {count} atoms, expected {expected_atoms}"
            )));
        }
        lines.next(); // comment line

        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            let line = lines.next().transpose()?.ok_or_else(|| {
                BackendError::LogParse("relaxed-geometry file truncated".to_string())
            })?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(BackendError::LogParse(format!(
                    "bad coordinate line: '{line}'"
                )));
            }
            let coordinate = |field: &str| {
                field.parse::<f64>().map_err(|_| {
                    BackendError::LogParse(format!("bad coordinate '{field}' in '{line}'"))
                })
            };
            positions.push(Point3::new(
                coordinate(fields[1])?,
                coordinate(fields[2])?,
                coordinate(fields[3])?,
            ));
        }
        Ok(Geometry::new(positions))
    }
}

impl OptimizationBackend for ExternalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn relax(
        &self,
        graph: &MolecularGraph,
        geometry: &Geometry,
        resources: &Resources,
        scratch_dir: &Path,
    ) -> Result<Relaxation, BackendError> {
        std::fs::create_dir_all(scratch_dir)?;
        let input_path = scratch_dir.join("input.xyz");
        Self::write_input(&input_path, graph, geometry, resources)?;

        let log_path = scratch_dir.join("backend.log");
        let log_file = File::create(&log_path)?;

        // uhf = number of unpaired electrons = multiplicity - 1.
        let uhf = resources.multiplicity.saturating_sub(1);
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg("input.xyz")
            .arg("--chrg")
            .arg(resources.charge.to_string())
            .arg("--uhf")
            .arg(uhf.to_string())
            .env("OMP_NUM_THREADS", resources.procs.to_string())
            .current_dir(scratch_dir)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::null());

        debug!(backend = %self.name, command = %self.command.display(), "launching external optimizer");
        let mut child = command.spawn().map_err(|source| BackendError::Launch {
            command: self.command.display().to_string(),
            source,
        })?;
        let status = self.wait_with_timeout(&mut child)?;
        if !status.success() {
            return Err(BackendError::Convergence { steps: 0 });
        }

        let energy = Self::parse_energy(&log_path)?;
        let relaxed_path = scratch_dir.join("xtbopt.xyz");
        if !relaxed_path.exists() {
            return Err(BackendError::MissingArtifact("xtbopt.xyz".to_string()));
        }
        let relaxed = Self::read_relaxed_geometry(&relaxed_path, graph.atoms().len())?;
        let structurally_valid = graph.matches_connectivity(&relaxed);

        Ok(Relaxation {
            energy,
            geometry: relaxed,
            structurally_valid,
        })
    }
}
