use phf::phf_map;

/// Static per-element data used for valence bookkeeping and bond perception.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementInfo {
    /// Atomic number of the element.
    pub atomic_number: u8,
    /// Default valence used to fill implicit hydrogens and derive radicals.
    pub default_valence: u8,
    /// Single-bond covalent radius in Angstroms.
    pub covalent_radius: f64,
}

/// Elements the pipeline understands: H plus the SMILES organic subset.
pub static ELEMENTS: phf::Map<&'static str, ElementInfo> = phf_map! {
    "H" => ElementInfo { atomic_number: 1, default_valence: 1, covalent_radius: 0.31 },
    "B" => ElementInfo { atomic_number: 5, default_valence: 3, covalent_radius: 0.84 },
    "C" => ElementInfo { atomic_number: 6, default_valence: 4, covalent_radius: 0.76 },
    "N" => ElementInfo { atomic_number: 7, default_valence: 3, covalent_radius: 0.71 },
    "O" => ElementInfo { atomic_number: 8, default_valence: 2, covalent_radius: 0.66 },
    "F" => ElementInfo { atomic_number: 9, default_valence: 1, covalent_radius: 0.57 },
    "P" => ElementInfo { atomic_number: 15, default_valence: 3, covalent_radius: 1.07 },
    "S" => ElementInfo { atomic_number: 16, default_valence: 2, covalent_radius: 1.05 },
    "Cl" => ElementInfo { atomic_number: 17, default_valence: 1, covalent_radius: 1.02 },
    "Br" => ElementInfo { atomic_number: 35, default_valence: 1, covalent_radius: 1.20 },
    "I" => ElementInfo { atomic_number: 53, default_valence: 1, covalent_radius: 1.39 },
};

/// Looks up static element data by symbol.
///
/// # Arguments
///
/// * `symbol` - The element symbol (case-sensitive, e.g. "Cl").
///
/// # Return
///
/// Returns `Some(&ElementInfo)` for known elements, otherwise `None`.
pub fn element_info(symbol: &str) -> Option<&'static ElementInfo> {
    ELEMENTS.get(symbol)
}

/// A single atom of a molecular graph.
///
/// Atoms are identified by their index in the graph's atom list; a `Geometry`
/// stores one position per atom at the same index.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Element symbol, e.g. "C" or "Br".
    pub element: String,
    /// Formal charge carried by this atom.
    pub formal_charge: i8,
    /// Number of unpaired electrons on this atom.
    pub radical_electrons: u8,
}

impl Atom {
    /// Creates an uncharged, closed-shell atom of the given element.
    pub fn new(element: &str) -> Self {
        Self {
            element: element.to_string(),
            formal_charge: 0,
            radical_electrons: 0,
        }
    }

    /// Returns the static element data for this atom, if the element is known.
    pub fn info(&self) -> Option<&'static ElementInfo> {
        element_info(&self.element)
    }

    /// Returns true when this atom is a hydrogen.
    pub fn is_hydrogen(&self) -> bool {
        self.element == "H"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_table_covers_organic_subset() {
        for symbol in ["H", "B", "C", "N", "O", "F", "P", "S", "Cl", "Br", "I"] {
            assert!(element_info(symbol).is_some(), "missing element {symbol}");
        }
        assert!(element_info("Xx").is_none());
        assert_eq!(element_info("C").unwrap().atomic_number, 6);
        assert_eq!(element_info("N").unwrap().default_valence, 3);
    }

    #[test]
    fn atom_classification() {
        assert!(Atom::new("H").is_hydrogen());
        assert!(!Atom::new("C").is_hydrogen());
        assert_eq!(Atom::new("O").info().unwrap().default_valence, 2);
    }
}
