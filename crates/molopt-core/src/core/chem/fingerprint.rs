use super::graph::{AtomId, MolGraph};
use slotmap::SecondaryMap;

const WORD_BITS: usize = u64::BITS as usize;

/// Fixed-width bit vector used for structural similarity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint {
    words: Vec<u64>,
    width: usize,
}

impl Fingerprint {
    pub fn zeros(width: usize) -> Self {
        Self {
            words: vec![0; width.div_ceil(WORD_BITS)],
            width,
        }
    }

    /// Builds a fingerprint with the given bits set; indices outside the width are ignored.
    pub fn from_indices(width: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut fingerprint = Self::zeros(width);
        for index in indices {
            fingerprint.set(index);
        }
        fingerprint
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn set(&mut self, index: usize) {
        if index < self.width {
            self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.width && self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).filter(|index| self.contains(*index))
    }

    /// Tanimoto coefficient `|A ∧ B| / |A ∨ B|`, defined as 0.0 when both are empty.
    ///
    /// Vectors of different widths are compared as if the shorter one were zero-padded.
    pub fn tanimoto(&self, other: &Fingerprint) -> f64 {
        let len = self.words.len().max(other.words.len());
        let word = |words: &[u64], i: usize| words.get(i).copied().unwrap_or(0);
        let (mut both, mut either) = (0u32, 0u32);
        for i in 0..len {
            let (a, b) = (word(&self.words, i), word(&other.words, i));
            both += (a & b).count_ones();
            either += (a | b).count_ones();
        }
        if either == 0 {
            0.0
        } else {
            f64::from(both) / f64::from(either)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintConfig {
    pub radius: usize,
    pub width: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            radius: 2,
            width: 2048,
        }
    }
}

fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

fn hash_all(values: impl IntoIterator<Item = u64>) -> u64 {
    values.into_iter().fold(0, hash_combine)
}

/// Morgan-style circular fingerprint of a finalized graph.
///
/// Every atom starts from a hash of its local invariant; each layer folds in the sorted
/// `(bond code, neighbor identifier)` pairs of the previous layer. Identifiers from every layer
/// are folded into the bit vector modulo its width.
pub fn morgan(graph: &MolGraph, config: &FingerprintConfig) -> Fingerprint {
    let mut fingerprint = Fingerprint::zeros(config.width);
    if config.width == 0 {
        return fingerprint;
    }

    let mut identifiers: SecondaryMap<AtomId, u64> = graph
        .atoms_iter()
        .map(|(id, atom)| {
            let invariant = hash_all([
                u64::from(atom.element.atomic_number),
                graph.degree(id) as u64,
                u64::from(atom.hydrogens),
                atom.charge as u64,
                u64::from(atom.isotope),
                u64::from(atom.in_ring),
            ]);
            (id, invariant)
        })
        .collect();

    let fold = |fingerprint: &mut Fingerprint, identifiers: &SecondaryMap<AtomId, u64>| {
        for (_, identifier) in identifiers {
            fingerprint.set((*identifier % config.width as u64) as usize);
        }
    };
    fold(&mut fingerprint, &identifiers);

    for layer in 1..=config.radius {
        let next: SecondaryMap<AtomId, u64> = graph
            .atom_ids()
            .into_iter()
            .map(|id| {
                let mut environment: Vec<(u64, u64)> = graph
                    .neighbors(id)
                    .iter()
                    .map(|(neighbor, order)| (u64::from(order.code()), identifiers[*neighbor]))
                    .collect();
                environment.sort_unstable();
                let seed = hash_combine(layer as u64, identifiers[id]);
                let identifier = environment
                    .into_iter()
                    .fold(seed, |acc, (code, neighbor)| {
                        hash_combine(hash_combine(acc, code), neighbor)
                    });
                (id, identifier)
            })
            .collect();
        identifiers = next;
        fold(&mut fingerprint, &identifiers);
    }
    fingerprint
}

#[cfg(test)]
mod tests {
    use super::super::smiles::parse;
    use super::*;

    fn morgan_of(smiles: &str) -> Fingerprint {
        morgan(&parse(smiles).unwrap(), &FingerprintConfig::default())
    }

    #[test]
    fn set_and_contains_respect_width() {
        let mut fp = Fingerprint::zeros(70);
        fp.set(0);
        fp.set(69);
        fp.set(70);
        assert!(fp.contains(0) && fp.contains(69));
        assert!(!fp.contains(70));
        assert_eq!(fp.count_ones(), 2);
        assert_eq!(fp.iter_ones().collect::<Vec<_>>(), vec![0, 69]);
    }

    #[test]
    fn tanimoto_of_known_vectors() {
        let a = Fingerprint::from_indices(64, 0..10);
        let b = Fingerprint::from_indices(64, 5..15);
        assert!((a.tanimoto(&b) - 5.0 / 15.0).abs() < 1e-12);
        assert_eq!(a.tanimoto(&a), 1.0);
        let empty = Fingerprint::zeros(64);
        assert_eq!(empty.tanimoto(&empty), 0.0);
        assert_eq!(a.tanimoto(&empty), 0.0);
    }

    #[test]
    fn tanimoto_is_symmetric() {
        let a = morgan_of("CCO");
        let b = morgan_of("CCN");
        assert_eq!(a.tanimoto(&b), b.tanimoto(&a));
    }

    #[test]
    fn morgan_is_deterministic_and_order_independent() {
        assert_eq!(morgan_of("CC(=O)O"), morgan_of("OC(C)=O"));
        assert_eq!(morgan_of("c1ccccc1O"), morgan_of("Oc1ccccc1"));
    }

    #[test]
    fn similar_molecules_score_higher_than_dissimilar_ones() {
        let reference = morgan_of("CCCCCCO");
        let close = morgan_of("CCCCCCN");
        let far = morgan_of("c1ccccc1");
        assert!(reference.tanimoto(&close) > reference.tanimoto(&far));
    }

    #[test]
    fn zero_width_yields_empty_fingerprint() {
        let config = FingerprintConfig {
            radius: 2,
            width: 0,
        };
        let fp = morgan(&parse("CCO").unwrap(), &config);
        assert_eq!(fp.count_ones(), 0);
        assert_eq!(fp.width(), 0);
    }
}
