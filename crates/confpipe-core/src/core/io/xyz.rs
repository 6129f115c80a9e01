//! Multi-frame XYZ files: the per-molecule conformer artifacts.
//!
//! Each completed stage writes one XYZ file per molecule containing the
//! selected geometries in ascending energy order. The comment line of every
//! frame carries the molecule id, the frame index, and an `energy=` tag
//! (minimum-relative after conformer search, backend-reported for later
//! stages), so the next stage can read the file back without any side
//! channel.

use crate::core::models::geometry::Geometry;
use crate::core::models::graph::MolecularGraph;
use nalgebra::Point3;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed XYZ file at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("geometry length {got} does not match atom count {expected}")]
    LengthMismatch { expected: usize, got: usize },
}

/// One frame read back from a conformer artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct XyzFrame {
    pub energy: f64,
    pub symbols: Vec<String>,
    pub positions: Vec<Point3<f64>>,
}

impl XyzFrame {
    /// Converts the frame's coordinates into a [`Geometry`].
    pub fn to_geometry(&self) -> Geometry {
        Geometry::new(self.positions.clone())
    }
}

/// Writes selected conformers as a multi-frame XYZ artifact.
///
/// Frames are written in the order given; the caller is responsible for
/// passing them ascending by energy.
///
/// # Errors
///
/// Returns [`XyzError::LengthMismatch`] when a geometry does not align with
/// the graph's atom list, or an I/O error from the filesystem.
pub fn write_conformers<P: AsRef<Path>>(
    path: P,
    molecule_id: &str,
    graph: &MolecularGraph,
    frames: &[(f64, &Geometry)],
) -> Result<(), XyzError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for (index, (energy, geometry)) in frames.iter().enumerate() {
        if geometry.len() != graph.atoms().len() {
            return Err(XyzError::LengthMismatch {
                expected: graph.atoms().len(),
                got: geometry.len(),
            });
        }
        writeln!(writer, "{}", geometry.len())?;
        writeln!(writer, "{molecule_id} conformer={index} energy={energy}")?;
        // Shortest-round-trip formatting: reading the file back reproduces
        // the written coordinates exactly.
        for (atom, position) in graph.atoms().iter().zip(geometry.positions()) {
            writeln!(
                writer,
                "{} {} {} {}",
                atom.element, position.x, position.y, position.z
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads every frame of a multi-frame XYZ artifact.
///
/// # Errors
///
/// Returns [`XyzError::Malformed`] for truncated frames, unparsable counts,
/// coordinates, or a missing `energy=` tag.
pub fn read_conformers<P: AsRef<Path>>(path: P) -> Result<Vec<XyzFrame>, XyzError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;

    let mut frames = Vec::new();
    let mut cursor = 0;
    while cursor < lines.len() {
        if lines[cursor].trim().is_empty() {
            cursor += 1;
            continue;
        }
        let atom_count: usize = lines[cursor].trim().parse().map_err(|_| XyzError::Malformed {
            line: cursor + 1,
            message: format!("expected atom count, found '{}'", lines[cursor].trim()),
        })?;

        let comment = lines.get(cursor + 1).ok_or(XyzError::Malformed {
            line: cursor + 2,
            message: "missing comment line".to_string(),
        })?;
        let energy = parse_energy_tag(comment).ok_or(XyzError::Malformed {
            line: cursor + 2,
            message: "missing or unparsable 'energy=' tag".to_string(),
        })?;

        let mut symbols = Vec::with_capacity(atom_count);
        let mut positions = Vec::with_capacity(atom_count);
        for offset in 0..atom_count {
            let line_number = cursor + 2 + offset;
            let line = lines.get(line_number).ok_or(XyzError::Malformed {
                line: line_number + 1,
                message: "truncated frame".to_string(),
            })?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(XyzError::Malformed {
                    line: line_number + 1,
                    message: format!("expected 'symbol x y z', found '{line}'"),
                });
            }
            let coordinates: Result<Vec<f64>, _> =
                fields[1..].iter().map(|f| f.parse::<f64>()).collect();
            let coordinates = coordinates.map_err(|_| XyzError::Malformed {
                line: line_number + 1,
                message: format!("unparsable coordinates in '{line}'"),
            })?;
            symbols.push(fields[0].to_string());
            positions.push(Point3::new(coordinates[0], coordinates[1], coordinates[2]));
        }

        frames.push(XyzFrame {
            energy,
            symbols,
            positions,
        });
        cursor += 2 + atom_count;
    }

    Ok(frames)
}

fn parse_energy_tag(comment: &str) -> Option<f64> {
    comment
        .split_whitespace()
        .find_map(|token| token.strip_prefix("energy="))
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::smiles::parse_smiles;

    fn linear_geometry(n: usize) -> Geometry {
        Geometry::new(
            (0..n)
                .map(|i| Point3::new(i as f64 * 1.1, 0.0, 0.0))
                .collect(),
        )
    }

    #[test]
    fn artifact_round_trip_preserves_frames() {
        let graph = parse_smiles("CO").unwrap();
        let n = graph.atoms().len();
        let low = linear_geometry(n);
        let high = linear_geometry(n);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mol1_confs.xyz");
        write_conformers(&path, "mol1", &graph, &[(0.0, &low), (1.25, &high)]).unwrap();

        let frames = read_conformers(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].energy, 0.0);
        assert_eq!(frames[1].energy, 1.25);
        assert_eq!(frames[0].symbols.len(), n);
        assert_eq!(frames[0].positions, low.positions().to_vec());
        assert_eq!(frames[1].to_geometry().len(), n);
    }

    #[test]
    fn misaligned_geometry_is_rejected_on_write() {
        let graph = parse_smiles("CO").unwrap();
        let short = linear_geometry(2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xyz");
        let result = write_conformers(&path, "mol1", &graph, &[(0.0, &short)]);
        assert!(matches!(result, Err(XyzError::LengthMismatch { .. })));
    }

    #[test]
    fn truncated_and_untagged_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let truncated = dir.path().join("truncated.xyz");
        std::fs::write(&truncated, "3\nmol energy=0.0\nC 0.0 0.0 0.0\n").unwrap();
        assert!(matches!(
            read_conformers(&truncated),
            Err(XyzError::Malformed { .. })
        ));

        let untagged = dir.path().join("untagged.xyz");
        std::fs::write(&untagged, "1\nno tag here\nC 0.0 0.0 0.0\n").unwrap();
        assert!(matches!(
            read_conformers(&untagged),
            Err(XyzError::Malformed { .. })
        ));
    }
}
