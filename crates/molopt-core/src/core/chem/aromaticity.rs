use super::graph::{Atom, AtomId, BondOrder, MolGraph};
use std::collections::{BTreeSet, HashSet};
use tracing::trace;

const MAX_RING_SIZE: usize = 8;

/// Rewrites Kekulé rings that satisfy the 4n+2 rule into aromatic form, so a ring written
/// with alternating bonds yields the same graph as its lowercase spelling.
///
/// Candidate rings are the shortest cycles through each ring bond. Passes repeat until nothing
/// changes: in a fused system a ring whose double bonds sit in its neighbor only qualifies once
/// that neighbor has been converted.
pub fn perceive(graph: &mut MolGraph, ring_atoms: &HashSet<AtomId>) {
    let rings = candidate_rings(graph, ring_atoms);
    let mut pending: Vec<&Vec<AtomId>> = rings.iter().collect();

    loop {
        let before = pending.len();
        pending.retain(|ring| {
            if is_converted(graph, ring) {
                return false;
            }
            if pi_electrons(graph, ring).is_some_and(|count| count % 4 == 2) {
                aromatize(graph, ring);
                return false;
            }
            true
        });
        if pending.len() == before {
            break;
        }
    }
}

fn candidate_rings(graph: &MolGraph, ring_atoms: &HashSet<AtomId>) -> Vec<Vec<AtomId>> {
    let mut seen: HashSet<BTreeSet<AtomId>> = HashSet::new();
    graph
        .bonds()
        .iter()
        .filter(|bond| ring_atoms.contains(&bond.atom1_id) && ring_atoms.contains(&bond.atom2_id))
        .filter_map(|bond| graph.smallest_ring_through(bond.atom1_id, bond.atom2_id, MAX_RING_SIZE))
        .filter(|ring| seen.insert(ring.iter().copied().collect()))
        .collect()
}

fn ring_bonds(ring: &[AtomId]) -> impl Iterator<Item = (AtomId, AtomId)> + '_ {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
}

fn is_converted(graph: &MolGraph, ring: &[AtomId]) -> bool {
    ring_bonds(ring).all(|(a, b)| graph.bond_between(a, b) == Some(BondOrder::Aromatic))
}

/// Total pi electrons the ring would hold, or `None` if any member cannot take part.
fn pi_electrons(graph: &MolGraph, ring: &[AtomId]) -> Option<u32> {
    ring.iter()
        .map(|id| contribution(graph, ring, *id))
        .sum()
}

fn contribution(graph: &MolGraph, ring: &[AtomId], id: AtomId) -> Option<u32> {
    let atom = graph.atom(id)?;
    if !atom.element.can_be_aromatic() {
        return None;
    }
    let neighbors = graph.neighbors(id);
    if neighbors.iter().any(|(_, order)| *order == BondOrder::Triple) {
        return None;
    }
    if atom.aromatic {
        return Some(if donates_lone_pair(graph, id, atom) { 2 } else { 1 });
    }

    let mut doubles = neighbors
        .iter()
        .filter(|(_, order)| *order == BondOrder::Double);
    match (doubles.next(), doubles.next()) {
        (Some((partner, _)), None) => {
            let conjugated = ring.contains(partner)
                || graph.atom(*partner).is_some_and(|other| other.aromatic);
            conjugated.then_some(1)
        }
        (None, _) => donates_lone_pair(graph, id, atom).then_some(2),
        _ => None,
    }
}

/// Pyrrole-type nitrogen and furan-type oxygen or sulfur put a lone pair into the ring.
fn donates_lone_pair(graph: &MolGraph, id: AtomId, atom: &Atom) -> bool {
    if atom.charge != 0 {
        return false;
    }
    let degree = graph.degree(id);
    match atom.element.atomic_number {
        7 | 15 => degree + usize::from(atom.hydrogens) == 3,
        8 | 16 | 34 => degree == 2 && atom.hydrogens == 0,
        _ => false,
    }
}

fn aromatize(graph: &mut MolGraph, ring: &[AtomId]) {
    for (a, b) in ring_bonds(ring).collect::<Vec<_>>() {
        graph.set_bond_order(a, b, BondOrder::Aromatic);
    }
    for id in ring {
        if let Some(atom) = graph.atom_mut(*id) {
            atom.aromatic = true;
        }
    }
    trace!(size = ring.len(), "Perceived aromatic ring");
}
