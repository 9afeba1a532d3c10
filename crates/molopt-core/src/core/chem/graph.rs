use super::elements::Element;
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

new_key_type! {
    pub struct AtomId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to an atom's valence; aromatic bonds count as one here and the
    /// shared pi electron is accounted for per atom.
    pub fn valence(&self) -> u8 {
        match self {
            Self::Single | Self::Aromatic => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }

    /// Stable numeric code used by ranking and hashing.
    pub fn code(&self) -> u8 {
        *self as u8 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1_id: AtomId,
    pub atom2_id: AtomId,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(atom1_id: AtomId, atom2_id: AtomId, order: BondOrder) -> Self {
        Self {
            atom1_id,
            atom2_id,
            order,
        }
    }

    pub fn contains(&self, atom_id: AtomId) -> bool {
        self.atom1_id == atom_id || self.atom2_id == atom_id
    }
}

/// One atom of a parsed structure. Hydrogens are carried as a count, never as nodes,
/// once a graph has been finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element: Element,
    pub aromatic: bool,
    pub charge: i8,
    pub isotope: u16,
    pub hydrogens: u8,
    /// Whether the atom was written inside brackets, i.e. its hydrogen count is explicit.
    pub bracket: bool,
    pub in_ring: bool,
}

impl Atom {
    pub fn new(element: Element, aromatic: bool) -> Self {
        Self {
            element,
            aromatic,
            charge: 0,
            isotope: 0,
            hydrogens: 0,
            bracket: false,
            in_ring: false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("An atom cannot be bonded to itself")]
    SelfBond,
    #[error("Atoms are already bonded")]
    DuplicateBond,
    #[error("Bond references an atom that does not exist")]
    UnknownAtom,
}

#[derive(Debug, Clone, Default)]
pub struct MolGraph {
    atoms: SlotMap<AtomId, Atom>,
    bonds: Vec<Bond>,
    adjacency: SecondaryMap<AtomId, Vec<(AtomId, BondOrder)>>,
}

impl MolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: Atom) -> AtomId {
        let id = self.atoms.insert(atom);
        self.adjacency.insert(id, Vec::new());
        id
    }

    pub fn add_bond(
        &mut self,
        atom1_id: AtomId,
        atom2_id: AtomId,
        order: BondOrder,
    ) -> Result<(), GraphError> {
        if atom1_id == atom2_id {
            return Err(GraphError::SelfBond);
        }
        if !self.atoms.contains_key(atom1_id) || !self.atoms.contains_key(atom2_id) {
            return Err(GraphError::UnknownAtom);
        }
        if self.bond_between(atom1_id, atom2_id).is_some() {
            return Err(GraphError::DuplicateBond);
        }
        self.bonds.push(Bond::new(atom1_id, atom2_id, order));
        self.adjacency[atom1_id].push((atom2_id, order));
        self.adjacency[atom2_id].push((atom1_id, order));
        Ok(())
    }

    /// Removes an atom together with every bond that touches it.
    pub fn remove_atom(&mut self, id: AtomId) -> Option<Atom> {
        let atom = self.atoms.remove(id)?;
        if let Some(neighbors) = self.adjacency.remove(id) {
            for (neighbor, _) in neighbors {
                if let Some(list) = self.adjacency.get_mut(neighbor) {
                    list.retain(|(other, _)| *other != id);
                }
            }
        }
        self.bonds.retain(|bond| !bond.contains(id));
        Some(atom)
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(id)
    }

    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atoms.iter()
    }

    pub fn atom_ids(&self) -> Vec<AtomId> {
        self.atoms.keys().collect()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn neighbors(&self, id: AtomId) -> &[(AtomId, BondOrder)] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bond_between(&self, atom1_id: AtomId, atom2_id: AtomId) -> Option<BondOrder> {
        self.neighbors(atom1_id)
            .iter()
            .find(|(other, _)| *other == atom2_id)
            .map(|(_, order)| *order)
    }

    /// Changes the order of an existing bond; returns `false` when the atoms are not bonded.
    pub fn set_bond_order(
        &mut self,
        atom1_id: AtomId,
        atom2_id: AtomId,
        order: BondOrder,
    ) -> bool {
        let Some(bond) = self
            .bonds
            .iter_mut()
            .find(|bond| bond.contains(atom1_id) && bond.contains(atom2_id))
        else {
            return false;
        };
        bond.order = order;
        for (from, to) in [(atom1_id, atom2_id), (atom2_id, atom1_id)] {
            if let Some(entry) = self
                .adjacency
                .get_mut(from)
                .and_then(|list| list.iter_mut().find(|(other, _)| *other == to))
            {
                entry.1 = order;
            }
        }
        true
    }

    /// Shortest cycle containing the bond `atom1_id-atom2_id`, listed as the atom path from
    /// `atom1_id` around to `atom2_id`, or `None` if no cycle of at most `max_size` atoms exists.
    pub fn smallest_ring_through(
        &self,
        atom1_id: AtomId,
        atom2_id: AtomId,
        max_size: usize,
    ) -> Option<Vec<AtomId>> {
        let mut parent: SecondaryMap<AtomId, AtomId> = SecondaryMap::new();
        parent.insert(atom1_id, atom1_id);
        let mut queue = VecDeque::from([(atom1_id, 1usize)]);

        while let Some((atom, size)) = queue.pop_front() {
            if atom == atom2_id {
                let mut path = vec![atom2_id];
                let mut current = atom2_id;
                while current != atom1_id {
                    current = parent[current];
                    path.push(current);
                }
                path.reverse();
                return Some(path);
            }
            if size >= max_size {
                continue;
            }
            for &(neighbor, _) in self.neighbors(atom) {
                if atom == atom1_id && neighbor == atom2_id {
                    continue;
                }
                if !parent.contains_key(neighbor) {
                    parent.insert(neighbor, atom);
                    queue.push_back((neighbor, size + 1));
                }
            }
        }
        None
    }

    pub fn degree(&self, id: AtomId) -> usize {
        self.neighbors(id).len()
    }

    /// Sum of bond valences around an atom, with one extra unit for the pi electron an
    /// aromatic atom shares with its ring.
    pub fn bond_valence(&self, id: AtomId) -> u8 {
        let bonded: u8 = self
            .neighbors(id)
            .iter()
            .map(|(_, order)| order.valence())
            .sum();
        match self.atom(id) {
            Some(atom) if atom.aromatic => bonded + 1,
            _ => bonded,
        }
    }

    /// The hydrogen count an atom would carry if written without brackets.
    ///
    /// Returns `None` when the bonded valence exceeds every normal valence of a
    /// non-aromatic element.
    pub fn implicit_hydrogens(&self, id: AtomId) -> Option<u8> {
        let atom = self.atom(id)?;
        let valences = atom.element.default_valences();
        let bonded = self.bond_valence(id);
        if valences.is_empty() {
            return Some(0);
        }
        if atom.aromatic {
            return Some(valences[0].saturating_sub(bonded));
        }
        valences
            .iter()
            .find(|&&valence| valence >= bonded)
            .map(|valence| valence - bonded)
    }

    /// Atoms lying on at least one cycle, found as endpoints of non-bridge bonds.
    pub fn ring_atoms(&self) -> HashSet<AtomId> {
        let mut discovery: SecondaryMap<AtomId, usize> = SecondaryMap::new();
        let mut low: SecondaryMap<AtomId, usize> = SecondaryMap::new();
        let mut bridges: HashSet<(AtomId, AtomId)> = HashSet::new();
        let mut timer = 0;

        for id in self.atoms.keys() {
            if !discovery.contains_key(id) {
                self.bridge_search(id, None, &mut timer, &mut discovery, &mut low, &mut bridges);
            }
        }

        self.bonds
            .iter()
            .filter(|bond| !bridges.contains(&edge_key(bond.atom1_id, bond.atom2_id)))
            .flat_map(|bond| [bond.atom1_id, bond.atom2_id])
            .collect()
    }

    fn bridge_search(
        &self,
        atom: AtomId,
        parent: Option<AtomId>,
        timer: &mut usize,
        discovery: &mut SecondaryMap<AtomId, usize>,
        low: &mut SecondaryMap<AtomId, usize>,
        bridges: &mut HashSet<(AtomId, AtomId)>,
    ) {
        discovery.insert(atom, *timer);
        low.insert(atom, *timer);
        *timer += 1;

        for &(neighbor, _) in self.neighbors(atom) {
            if Some(neighbor) == parent {
                continue;
            }
            if let Some(&seen) = discovery.get(neighbor) {
                low[atom] = low[atom].min(seen);
            } else {
                self.bridge_search(neighbor, Some(atom), timer, discovery, low, bridges);
                low[atom] = low[atom].min(low[neighbor]);
                if low[neighbor] > discovery[atom] {
                    bridges.insert(edge_key(atom, neighbor));
                }
            }
        }
    }

    /// Connected components, each listed in breadth-first order from its first atom.
    pub fn components(&self) -> Vec<Vec<AtomId>> {
        let mut seen: HashSet<AtomId> = HashSet::new();
        let mut components = Vec::new();

        for start in self.atoms.keys() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(atom) = queue.pop_front() {
                component.push(atom);
                for &(neighbor, _) in self.neighbors(atom) {
                    if seen.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
            components.push(component);
        }
        components
    }
}

pub(crate) fn edge_key(a: AtomId, b: AtomId) -> (AtomId, AtomId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carbon() -> Atom {
        Atom::new(Element::from_symbol("C").unwrap(), false)
    }

    fn chain(len: usize) -> (MolGraph, Vec<AtomId>) {
        let mut graph = MolGraph::new();
        let ids: Vec<AtomId> = (0..len).map(|_| graph.add_atom(carbon())).collect();
        for pair in ids.windows(2) {
            graph.add_bond(pair[0], pair[1], BondOrder::Single).unwrap();
        }
        (graph, ids)
    }

    #[test]
    fn bond_order_codes_are_distinct() {
        let codes: HashSet<u8> = [
            BondOrder::Single,
            BondOrder::Double,
            BondOrder::Triple,
            BondOrder::Aromatic,
        ]
        .iter()
        .map(BondOrder::code)
        .collect();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn add_bond_rejects_self_and_duplicate_bonds() {
        let (mut graph, ids) = chain(2);
        assert_eq!(
            graph.add_bond(ids[0], ids[0], BondOrder::Single),
            Err(GraphError::SelfBond)
        );
        assert_eq!(
            graph.add_bond(ids[1], ids[0], BondOrder::Double),
            Err(GraphError::DuplicateBond)
        );
    }

    #[test]
    fn remove_atom_drops_its_bonds_and_adjacency() {
        let (mut graph, ids) = chain(3);
        graph.remove_atom(ids[1]).unwrap();
        assert_eq!(graph.atom_count(), 2);
        assert!(graph.bonds().is_empty());
        assert!(graph.neighbors(ids[0]).is_empty());
        assert!(graph.neighbors(ids[2]).is_empty());
    }

    #[test]
    fn implicit_hydrogens_fill_lowest_normal_valence() {
        let (graph, ids) = chain(3);
        assert_eq!(graph.implicit_hydrogens(ids[0]), Some(3));
        assert_eq!(graph.implicit_hydrogens(ids[1]), Some(2));
    }

    #[test]
    fn implicit_hydrogens_reports_exceeded_valence() {
        let mut graph = MolGraph::new();
        let center = graph.add_atom(carbon());
        for _ in 0..5 {
            let leaf = graph.add_atom(carbon());
            graph.add_bond(center, leaf, BondOrder::Single).unwrap();
        }
        assert_eq!(graph.implicit_hydrogens(center), None);
    }

    #[test]
    fn ring_atoms_excludes_bridges_and_substituents() {
        let (mut graph, ids) = chain(6);
        graph.add_bond(ids[0], ids[5], BondOrder::Single).unwrap();
        let methyl = graph.add_atom(carbon());
        graph.add_bond(ids[2], methyl, BondOrder::Single).unwrap();

        let ring = graph.ring_atoms();
        assert_eq!(ring.len(), 6);
        assert!(ids.iter().all(|id| ring.contains(id)));
        assert!(!ring.contains(&methyl));
    }

    #[test]
    fn set_bond_order_updates_bond_list_and_adjacency() {
        let (mut graph, ids) = chain(3);
        assert!(graph.set_bond_order(ids[1], ids[0], BondOrder::Double));
        assert_eq!(graph.bonds()[0].order, BondOrder::Double);
        assert_eq!(graph.bond_between(ids[0], ids[1]), Some(BondOrder::Double));
        assert_eq!(graph.bond_between(ids[1], ids[0]), Some(BondOrder::Double));
        assert!(!graph.set_bond_order(ids[0], ids[2], BondOrder::Double));
    }

    #[test]
    fn smallest_ring_through_finds_the_shorter_cycle_of_a_fused_pair() {
        let (mut graph, ids) = chain(6);
        graph.add_bond(ids[0], ids[5], BondOrder::Single).unwrap();
        let bridge = graph.add_atom(carbon());
        graph.add_bond(ids[0], bridge, BondOrder::Single).unwrap();
        graph.add_bond(bridge, ids[2], BondOrder::Single).unwrap();

        let ring = graph.smallest_ring_through(ids[0], ids[1], 8).unwrap();
        assert_eq!(ring, vec![ids[0], bridge, ids[2], ids[1]]);
        let ring = graph.smallest_ring_through(ids[4], ids[5], 8).unwrap();
        assert_eq!(ring.len(), 6);
        assert!(graph.smallest_ring_through(ids[4], ids[5], 5).is_none());
    }

    #[test]
    fn acyclic_graph_has_no_ring_atoms() {
        let (graph, _) = chain(4);
        assert!(graph.ring_atoms().is_empty());
    }

    #[test]
    fn components_splits_disconnected_fragments() {
        let (mut graph, _) = chain(3);
        graph.add_atom(carbon());
        let components = graph.components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 3);
        assert_eq!(components[1].len(), 1);
    }
}
