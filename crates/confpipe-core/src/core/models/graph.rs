use super::atom::Atom;
use super::geometry::Geometry;
use super::ids::ConformerId;
use slotmap::SlotMap;

/// Margin in Angstroms added to the covalent-radius sum during bond perception.
const BOND_PERCEPTION_TOLERANCE: f64 = 0.45;

/// Bond order between two atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
}

impl BondOrder {
    /// Returns the number of valence units this bond consumes on each atom.
    pub fn valence(&self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

/// A bond between two atoms, referenced by their indices in the atom list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(a: usize, b: usize, order: BondOrder) -> Self {
        Self { a, b, order }
    }

    /// Returns true when this bond touches the given atom index.
    pub fn contains(&self, index: usize) -> bool {
        self.a == index || self.b == index
    }

    /// Returns the endpoints as an ordered pair, smallest index first.
    pub fn key(&self) -> (usize, usize) {
        if self.a <= self.b {
            (self.a, self.b)
        } else {
            (self.b, self.a)
        }
    }
}

/// A molecular structural graph with an owned arena of conformer geometries.
///
/// The atom and bond lists are fixed once parsing finishes; conformers are
/// attached afterwards and addressed by [`ConformerId`]. All geometric data is
/// aligned index-for-index with the atom list.
#[derive(Debug, Clone, Default)]
pub struct MolecularGraph {
    /// Atoms in insertion order; atom indices are positions in this list.
    atoms: Vec<Atom>,
    /// All bonds of the graph.
    bonds: Vec<Bond>,
    /// Cached adjacency list, indexed by atom index.
    adjacency: Vec<Vec<usize>>,
    /// Arena of conformer geometries owned by this graph.
    conformers: SlotMap<ConformerId, Geometry>,
}

impl MolecularGraph {
    /// Creates a new, empty molecular graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an atom and returns its index.
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    /// Adds a bond between two existing atoms.
    ///
    /// This method is idempotent; adding a bond that already exists succeeds
    /// without creating a duplicate.
    ///
    /// # Return
    ///
    /// Returns `Some(())` if both atoms exist, otherwise `None`.
    pub fn add_bond(&mut self, a: usize, b: usize, order: BondOrder) -> Option<()> {
        if a >= self.atoms.len() || b >= self.atoms.len() || a == b {
            return None;
        }
        if self.adjacency[a].contains(&b) {
            return Some(());
        }
        self.bonds.push(Bond::new(a, b, order));
        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
        Some(())
    }

    /// Returns the atom list.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Retrieves an atom by index.
    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    /// Returns a slice of all bonds.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Returns the bonded neighbors of an atom.
    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.adjacency
            .get(index)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Total formal charge of the molecule.
    pub fn formal_charge(&self) -> i32 {
        self.atoms.iter().map(|a| a.formal_charge as i32).sum()
    }

    /// Total number of unpaired electrons across all atoms.
    pub fn radical_electrons(&self) -> u32 {
        self.atoms.iter().map(|a| a.radical_electrons as u32).sum()
    }

    /// Spin multiplicity derived from the radical electron count.
    pub fn multiplicity(&self) -> u32 {
        self.radical_electrons() + 1
    }

    /// Indices of all non-hydrogen atoms, in atom order.
    pub fn heavy_atom_indices(&self) -> Vec<usize> {
        self.atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| !atom.is_hydrogen())
            .map(|(i, _)| i)
            .collect()
    }

    /// Counts rotatable bonds: acyclic single bonds whose endpoints each have
    /// at least one further heavy-atom neighbor.
    ///
    /// This bounds the combinatorial size of the torsional search space; the
    /// embedder requests `min(3^r, max_n_conf)` trial geometries.
    pub fn num_rotatable_bonds(&self) -> u32 {
        self.bonds
            .iter()
            .filter(|bond| bond.order == BondOrder::Single)
            .filter(|bond| self.has_other_heavy_neighbor(bond.a, bond.b))
            .filter(|bond| self.has_other_heavy_neighbor(bond.b, bond.a))
            .filter(|bond| !self.bond_is_in_ring(bond))
            .count() as u32
    }

    /// Checks that a relaxed geometry preserves this graph's connectivity.
    ///
    /// Bonds are re-perceived from interatomic distances (covalent-radius sum
    /// plus a fixed tolerance) and compared against the declared bond set. A
    /// geometry that gained or lost any bond during relaxation is structurally
    /// invalid and must be discarded by the caller.
    ///
    /// # Arguments
    ///
    /// * `geometry` - A geometry aligned with this graph's atom list.
    ///
    /// # Return
    ///
    /// Returns `true` when the perceived connectivity matches exactly. A
    /// geometry of the wrong length never matches.
    pub fn matches_connectivity(&self, geometry: &Geometry) -> bool {
        if geometry.len() != self.atoms.len() {
            return false;
        }

        let mut declared: Vec<(usize, usize)> = self.bonds.iter().map(|b| b.key()).collect();
        declared.sort_unstable();

        let mut perceived = Vec::new();
        for i in 0..self.atoms.len() {
            let Some(info_i) = self.atoms[i].info() else {
                return false;
            };
            for j in (i + 1)..self.atoms.len() {
                let Some(info_j) = self.atoms[j].info() else {
                    return false;
                };
                let threshold =
                    info_i.covalent_radius + info_j.covalent_radius + BOND_PERCEPTION_TOLERANCE;
                let distance = (geometry.positions()[i] - geometry.positions()[j]).norm();
                if distance <= threshold {
                    perceived.push((i, j));
                }
            }
        }

        declared == perceived
    }

    /// Attaches a conformer geometry to this graph's arena.
    ///
    /// # Return
    ///
    /// The arena id of the stored geometry.
    pub fn add_conformer(&mut self, geometry: Geometry) -> ConformerId {
        self.conformers.insert(geometry)
    }

    /// Retrieves a stored conformer geometry.
    pub fn conformer(&self, id: ConformerId) -> Option<&Geometry> {
        self.conformers.get(id)
    }

    /// Replaces a stored conformer geometry in place.
    ///
    /// # Return
    ///
    /// Returns `Some(())` if the id exists, otherwise `None`.
    pub fn update_conformer(&mut self, id: ConformerId, geometry: Geometry) -> Option<()> {
        self.conformers.get_mut(id).map(|slot| *slot = geometry)
    }

    /// Number of conformers currently attached.
    pub fn num_conformers(&self) -> usize {
        self.conformers.len()
    }

    fn has_other_heavy_neighbor(&self, atom: usize, exclude: usize) -> bool {
        self.adjacency[atom]
            .iter()
            .any(|&n| n != exclude && !self.atoms[n].is_hydrogen())
    }

    /// A bond is in a ring exactly when its endpoints stay connected after
    /// removing it. Molecule graphs are small, so a per-bond BFS is fine.
    fn bond_is_in_ring(&self, bond: &Bond) -> bool {
        let mut visited = vec![false; self.atoms.len()];
        let mut queue = std::collections::VecDeque::new();
        visited[bond.a] = true;
        queue.push_back(bond.a);

        while let Some(current) = queue.pop_front() {
            for &next in &self.adjacency[current] {
                if current == bond.a && next == bond.b {
                    continue;
                }
                if current == bond.b && next == bond.a {
                    continue;
                }
                if !visited[next] {
                    if next == bond.b {
                        return true;
                    }
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn chain(symbols: &[&str]) -> MolecularGraph {
        let mut graph = MolecularGraph::new();
        let indices: Vec<usize> = symbols
            .iter()
            .map(|s| graph.add_atom(Atom::new(s)))
            .collect();
        for pair in indices.windows(2) {
            graph.add_bond(pair[0], pair[1], BondOrder::Single).unwrap();
        }
        graph
    }

    #[test]
    fn add_bond_is_idempotent_and_validated() {
        let mut graph = chain(&["C", "C"]);
        assert_eq!(graph.bonds().len(), 1);
        graph.add_bond(1, 0, BondOrder::Single).unwrap();
        assert_eq!(graph.bonds().len(), 1);
        assert!(graph.add_bond(0, 5, BondOrder::Single).is_none());
        assert!(graph.add_bond(0, 0, BondOrder::Single).is_none());
    }

    #[test]
    fn multiplicity_counts_radical_electrons() {
        let mut graph = MolecularGraph::new();
        let c = graph.add_atom(Atom::new("C"));
        assert_eq!(graph.multiplicity(), 1);
        graph.atoms[c].radical_electrons = 1;
        assert_eq!(graph.multiplicity(), 2);
        graph.atoms[c].radical_electrons = 2;
        assert_eq!(graph.multiplicity(), 3);
    }

    #[test]
    fn rotatable_bonds_skip_terminal_and_ring_bonds() {
        // n-butane heavy skeleton: one rotatable bond (C2-C3).
        let butane = chain(&["C", "C", "C", "C"]);
        assert_eq!(butane.num_rotatable_bonds(), 1);

        // Ethane: every bond is terminal.
        let ethane = chain(&["C", "C"]);
        assert_eq!(ethane.num_rotatable_bonds(), 0);

        // Cyclopropane: all bonds in a ring.
        let mut ring = chain(&["C", "C", "C"]);
        ring.add_bond(2, 0, BondOrder::Single).unwrap();
        assert_eq!(ring.num_rotatable_bonds(), 0);
    }

    #[test]
    fn connectivity_check_accepts_bonded_distances() {
        let graph = chain(&["C", "C"]);
        let bonded = Geometry::new(vec![Point3::origin(), Point3::new(1.54, 0.0, 0.0)]);
        assert!(graph.matches_connectivity(&bonded));

        let dissociated = Geometry::new(vec![Point3::origin(), Point3::new(5.0, 0.0, 0.0)]);
        assert!(!graph.matches_connectivity(&dissociated));

        let wrong_length = Geometry::new(vec![Point3::origin()]);
        assert!(!graph.matches_connectivity(&wrong_length));
    }

    #[test]
    fn connectivity_check_rejects_spurious_contacts() {
        // Three carbons declared as a chain but folded so the ends collide.
        let graph = chain(&["C", "C", "C"]);
        let folded = Geometry::new(vec![
            Point3::origin(),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.2, 0.0, 0.0),
        ]);
        assert!(!graph.matches_connectivity(&folded));
    }

    #[test]
    fn conformer_arena_round_trip() {
        let mut graph = chain(&["C", "C"]);
        let id = graph.add_conformer(Geometry::new(vec![
            Point3::origin(),
            Point3::new(1.5, 0.0, 0.0),
        ]));
        assert_eq!(graph.num_conformers(), 1);
        assert_eq!(graph.conformer(id).unwrap().len(), 2);

        graph
            .update_conformer(id, Geometry::new(vec![Point3::origin(), Point3::origin()]))
            .unwrap();
        assert_eq!(
            graph.conformer(id).unwrap().positions()[1],
            Point3::origin()
        );
    }
}
