use super::graph::{AtomId, BondOrder, MolGraph, edge_key};
use itertools::Itertools;
use slotmap::SecondaryMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

/// Assigns every atom a distinct canonical rank in `0..atom_count`.
///
/// Atoms start from a local invariant and are refined by their neighbors' ranks until the
/// partition stops splitting. Remaining ties are broken by promoting one atom of the lowest
/// tied class and refining again.
pub fn canonical_ranks(graph: &MolGraph) -> SecondaryMap<AtomId, usize> {
    let ids = graph.atom_ids();
    let index: HashMap<AtomId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let adjacency: Vec<Vec<(usize, u8)>> = ids
        .iter()
        .map(|id| {
            graph
                .neighbors(*id)
                .iter()
                .map(|(neighbor, order)| (index[neighbor], order.code()))
                .collect()
        })
        .collect();

    let invariants: Vec<_> = ids
        .iter()
        .map(|id| {
            let atom = graph.atom(*id);
            (
                graph.degree(*id),
                atom.map_or(0, |a| a.element.atomic_number),
                atom.map_or(0, |a| a.isotope),
                atom.is_some_and(|a| a.aromatic),
                atom.map_or(0, |a| a.charge),
                atom.map_or(0, |a| a.hydrogens),
                atom.is_some_and(|a| a.in_ring),
            )
        })
        .collect();

    let mut ranks = dense_ranks(&invariants);
    refine(&mut ranks, &adjacency);

    while let Some(tied) = lowest_tied_class(&ranks) {
        let promoted = ranks
            .iter()
            .position(|rank| *rank == tied)
            .unwrap_or_default();
        let keys: Vec<(usize, bool)> = ranks
            .iter()
            .enumerate()
            .map(|(i, rank)| (*rank, i != promoted))
            .collect();
        ranks = dense_ranks(&keys);
        refine(&mut ranks, &adjacency);
    }

    ids.into_iter().zip(ranks).collect()
}

fn dense_ranks<K: Ord + Clone>(keys: &[K]) -> Vec<usize> {
    let distinct: Vec<K> = keys
        .iter()
        .cloned()
        .collect::<BTreeSet<K>>()
        .into_iter()
        .collect();
    keys.iter()
        .map(|key| distinct.binary_search(key).unwrap_or_default())
        .collect()
}

fn class_count(ranks: &[usize]) -> usize {
    ranks.iter().collect::<HashSet<_>>().len()
}

fn refine(ranks: &mut Vec<usize>, adjacency: &[Vec<(usize, u8)>]) {
    let mut classes = class_count(ranks);
    loop {
        let keys: Vec<(usize, Vec<(usize, u8)>)> = adjacency
            .iter()
            .enumerate()
            .map(|(atom, neighbors)| {
                let mut environment: Vec<(usize, u8)> = neighbors
                    .iter()
                    .map(|(neighbor, code)| (ranks[*neighbor], *code))
                    .collect();
                environment.sort_unstable();
                (ranks[atom], environment)
            })
            .collect();
        let refined = dense_ranks(&keys);
        let refined_classes = class_count(&refined);
        *ranks = refined;
        if refined_classes == classes {
            return;
        }
        classes = refined_classes;
    }
}

fn lowest_tied_class(ranks: &[usize]) -> Option<usize> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for rank in ranks {
        *counts.entry(*rank).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(rank, _)| rank)
        .min()
}

/// Writes the canonical SMILES of a finalized graph.
pub fn write(graph: &MolGraph) -> String {
    let ranks = canonical_ranks(graph);
    graph
        .components()
        .into_iter()
        .filter_map(|component| {
            let start = component.into_iter().min_by_key(|id| ranks[*id])?;
            Some(ComponentWriter::new(graph, &ranks).write(start))
        })
        .sorted()
        .join(".")
}

struct ComponentWriter<'g> {
    graph: &'g MolGraph,
    ranks: &'g SecondaryMap<AtomId, usize>,
    visited: HashSet<AtomId>,
    closure_edges: HashSet<(AtomId, AtomId)>,
    children: HashMap<AtomId, Vec<AtomId>>,
    ring_opens: HashMap<AtomId, Vec<AtomId>>,
    ring_closes: HashMap<AtomId, Vec<AtomId>>,
    open_digits: HashMap<(AtomId, AtomId), u16>,
    free_digits: BTreeSet<u16>,
    next_digit: u16,
}

impl<'g> ComponentWriter<'g> {
    fn new(graph: &'g MolGraph, ranks: &'g SecondaryMap<AtomId, usize>) -> Self {
        Self {
            graph,
            ranks,
            visited: HashSet::new(),
            closure_edges: HashSet::new(),
            children: HashMap::new(),
            ring_opens: HashMap::new(),
            ring_closes: HashMap::new(),
            open_digits: HashMap::new(),
            free_digits: BTreeSet::new(),
            next_digit: 1,
        }
    }

    fn write(mut self, start: AtomId) -> String {
        self.traverse(start, None);
        let mut out = String::new();
        self.emit(start, None, &mut out);
        out
    }

    fn sorted_neighbors(&self, atom: AtomId) -> Vec<(AtomId, BondOrder)> {
        let mut neighbors = self.graph.neighbors(atom).to_vec();
        neighbors.sort_by_key(|(neighbor, _)| self.ranks[*neighbor]);
        neighbors
    }

    fn traverse(&mut self, atom: AtomId, parent: Option<AtomId>) {
        self.visited.insert(atom);
        for (neighbor, _) in self.sorted_neighbors(atom) {
            if Some(neighbor) == parent {
                continue;
            }
            if self.visited.contains(&neighbor) {
                if self.closure_edges.insert(edge_key(atom, neighbor)) {
                    self.ring_opens.entry(neighbor).or_default().push(atom);
                    self.ring_closes.entry(atom).or_default().push(neighbor);
                }
            } else {
                self.children.entry(atom).or_default().push(neighbor);
                self.traverse(neighbor, Some(atom));
            }
        }
    }

    fn allocate_digit(&mut self) -> u16 {
        match self.free_digits.pop_first() {
            Some(digit) => digit,
            None => {
                let digit = self.next_digit;
                self.next_digit += 1;
                digit
            }
        }
    }

    fn emit(&mut self, atom: AtomId, parent: Option<AtomId>, out: &mut String) {
        if let Some(parent) = parent {
            if let Some(order) = self.graph.bond_between(parent, atom) {
                out.push_str(self.bond_symbol(order, atom, Some(parent)));
            }
        }
        out.push_str(&atom_text(self.graph, atom));

        let mut closing: Vec<u16> = self
            .ring_closes
            .remove(&atom)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|partner| self.open_digits.remove(&edge_key(atom, partner)))
            .collect();
        closing.sort_unstable();
        for digit in &closing {
            push_digit(out, *digit);
        }

        let mut opening = self.ring_opens.remove(&atom).unwrap_or_default();
        opening.sort_by_key(|partner| self.ranks[*partner]);
        for partner in opening {
            let digit = self.allocate_digit();
            if let Some(order) = self.graph.bond_between(atom, partner) {
                out.push_str(self.bond_symbol(order, atom, Some(partner)));
            }
            push_digit(out, digit);
            self.open_digits.insert(edge_key(atom, partner), digit);
        }
        self.free_digits.extend(closing);

        let children = self.children.remove(&atom).unwrap_or_default();
        let last = children.len().saturating_sub(1);
        for (i, child) in children.into_iter().enumerate() {
            if i < last {
                out.push('(');
                self.emit(child, Some(atom), out);
                out.push(')');
            } else {
                self.emit(child, Some(atom), out);
            }
        }
    }

    fn bond_symbol(&self, order: BondOrder, a: AtomId, b: Option<AtomId>) -> &'static str {
        let aromatic = |id: AtomId| self.graph.atom(id).is_some_and(|atom| atom.aromatic);
        let both_aromatic = aromatic(a) && b.is_some_and(aromatic);
        match order {
            BondOrder::Single if both_aromatic => "-",
            BondOrder::Single => "",
            BondOrder::Double => "=",
            BondOrder::Triple => "#",
            BondOrder::Aromatic if both_aromatic => "",
            BondOrder::Aromatic => ":",
        }
    }
}

fn push_digit(out: &mut String, digit: u16) {
    if digit < 10 {
        let _ = write!(out, "{digit}");
    } else {
        let _ = write!(out, "%{digit:02}");
    }
}

fn atom_text(graph: &MolGraph, id: AtomId) -> String {
    let Some(atom) = graph.atom(id) else {
        return String::new();
    };
    let symbol = atom.element.smiles_symbol(atom.aromatic);
    let plain_element =
        atom.element.in_organic_subset() || (atom.element.symbol == "*" && atom.hydrogens == 0);
    let bare = plain_element
        && atom.charge == 0
        && atom.isotope == 0
        && graph.implicit_hydrogens(id) == Some(atom.hydrogens);
    if bare {
        return symbol;
    }

    let mut text = String::from("[");
    if atom.isotope > 0 {
        let _ = write!(text, "{}", atom.isotope);
    }
    text.push_str(&symbol);
    match atom.hydrogens {
        0 => {}
        1 => text.push('H'),
        n => {
            let _ = write!(text, "H{n}");
        }
    }
    match atom.charge {
        0 => {}
        1 => text.push('+'),
        -1 => text.push('-'),
        c if c > 0 => {
            let _ = write!(text, "+{c}");
        }
        c => {
            let _ = write!(text, "-{}", c.unsigned_abs());
        }
    }
    text.push(']');
    text
}

#[cfg(test)]
mod tests {
    use super::super::smiles::parse;
    use super::*;

    fn canonical(input: &str) -> String {
        write(&parse(input).unwrap())
    }

    #[test]
    fn ranks_are_a_permutation() {
        let graph = parse("c1ccccc1CC(=O)O").unwrap();
        let ranks = canonical_ranks(&graph);
        let mut values: Vec<usize> = ranks.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, (0..graph.atom_count()).collect::<Vec<_>>());
    }

    #[test]
    fn writes_simple_molecules() {
        assert_eq!(canonical("OCC"), "CCO");
        assert_eq!(canonical("OC(=O)C"), "CC(=O)O");
        assert_eq!(canonical("c1ccccc1"), "c1ccccc1");
        assert_eq!(canonical("C1=CC=CC=C1"), "c1ccccc1");
        assert_eq!(canonical("C1CCCCC1"), "C1CCCCC1");
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let groups = [
            vec!["CCO", "OCC", "C(O)C"],
            vec!["Cc1ccccc1", "c1ccccc1C", "c1cc(C)ccc1"],
            vec!["CC(=O)Nc1ccc(O)cc1", "Oc1ccc(NC(C)=O)cc1", "c1cc(O)ccc1NC(=O)C"],
            vec!["C1CC2CCC1CC2", "C1CC2CCC1CC2"],
            vec!["O.CC", "CC.O"],
            vec!["c1ccc2ccccc2c1", "C1=CC=C2C=CC=CC2=C1"],
        ];
        for group in groups {
            let expected = canonical(group[0]);
            for input in &group[1..] {
                assert_eq!(canonical(input), expected, "input {input}");
            }
        }
    }

    #[test]
    fn canonical_output_is_a_fixed_point() {
        for input in [
            "CC(=O)Nc1ccc(O)cc1",
            "c1ccc2ccccc2c1",
            "[13CH3][NH3+]",
            "C1CC2CCC1CC2",
            "c1cc[nH]c1",
            "OCC.[Na+].[Cl-]",
            "C=1CCCCC1",
        ] {
            let once = canonical(input);
            assert_eq!(canonical(&once), once, "input {input}");
        }
    }

    #[test]
    fn brackets_only_when_needed() {
        assert_eq!(canonical("[CH4]"), "C");
        assert_eq!(canonical("[NH4+]"), "[NH4+]");
        assert_eq!(canonical("c1cc[nH]c1").matches("[nH]").count(), 1);
        assert_eq!(canonical("[Fe+2]"), "[Fe+2]");
        assert_eq!(canonical("[2H]C"), "[2H]C");
    }

    #[test]
    fn explicit_hydrogens_canonicalize_like_implicit_ones() {
        assert_eq!(canonical("[H]OC([H])([H])C"), canonical("CCO"));
    }

    #[test]
    fn components_are_sorted() {
        assert_eq!(canonical("O.CC"), "CC.O");
    }

    #[test]
    fn ring_closures_reuse_freed_digits() {
        let text = canonical("C1CC1C1CC1");
        assert!(!text.contains('2'), "{text}");
        assert_eq!(text.matches('1').count(), 4);
    }
}
