use nalgebra::Point3;

/// An ordered array of 3D atom positions.
///
/// A geometry is always aligned index-for-index with the atom list of the
/// `MolecularGraph` it belongs to; position `i` is the position of atom `i`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    positions: Vec<Point3<f64>>,
}

impl Geometry {
    /// Creates a geometry from a list of positions.
    pub fn new(positions: Vec<Point3<f64>>) -> Self {
        Self { positions }
    }

    /// Returns the number of atom positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when the geometry holds no positions.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the full position slice.
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Returns the position of atom `index`, if present.
    pub fn position(&self, index: usize) -> Option<&Point3<f64>> {
        self.positions.get(index)
    }

    /// Consumes the geometry, returning the underlying coordinates.
    pub fn into_positions(self) -> Vec<Point3<f64>> {
        self.positions
    }

    /// Extracts the positions at the given atom indices, in order.
    ///
    /// Used to restrict RMSD comparisons to heavy atoms.
    pub fn subset(&self, indices: &[usize]) -> Vec<Point3<f64>> {
        indices
            .iter()
            .filter_map(|&i| self.positions.get(i).copied())
            .collect()
    }
}
