use super::ids::ConformerId;

/// One energy-scored conformer candidate.
///
/// The geometry itself lives in the owning graph's arena; candidates carry
/// only the arena id and the backend-reported energy. Energies are
/// backend-defined but internally consistent within one molecule's set, and
/// become minimum-relative after energy filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub energy: f64,
    pub conformer_id: ConformerId,
}

impl Candidate {
    pub fn new(energy: f64, conformer_id: ConformerId) -> Self {
        Self {
            energy,
            conformer_id,
        }
    }
}

/// An ordered set of candidates with unique conformer ids.
///
/// The set is re-sorted ascending by energy at every filtering stage; filters
/// only ever shrink it.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a candidate.
    ///
    /// Conformer ids must be unique within the set; a duplicate id is a logic
    /// error in the caller.
    pub fn push(&mut self, candidate: Candidate) {
        debug_assert!(
            !self
                .candidates
                .iter()
                .any(|c| c.conformer_id == candidate.conformer_id),
            "duplicate conformer id in candidate set"
        );
        self.candidates.push(candidate);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// Sorts the set ascending by energy. Ties keep their previous order.
    pub fn sort_by_energy(&mut self) {
        self.candidates.sort_by(|a, b| {
            a.energy
                .partial_cmp(&b.energy)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Keeps only the first `n` candidates.
    pub fn truncate(&mut self, n: usize) {
        self.candidates.truncate(n);
    }

    /// Consumes the set, returning the underlying candidates.
    pub fn into_vec(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = Candidate>>(iter: T) -> Self {
        let mut set = CandidateSet::new();
        for candidate in iter {
            set.push(candidate);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::geometry::Geometry;
    use crate::core::models::graph::MolecularGraph;

    #[test]
    fn sort_orders_ascending_by_energy() {
        let mut graph = MolecularGraph::new();
        let ids: Vec<_> = (0..3)
            .map(|_| graph.add_conformer(Geometry::default()))
            .collect();

        let mut set: CandidateSet = vec![
            Candidate::new(4.0, ids[0]),
            Candidate::new(-2.0, ids[1]),
            Candidate::new(1.0, ids[2]),
        ]
        .into_iter()
        .collect();
        set.sort_by_energy();

        let energies: Vec<f64> = set.iter().map(|c| c.energy).collect();
        assert_eq!(energies, vec![-2.0, 1.0, 4.0]);
        assert_eq!(set.len(), 3);
    }
}
