use super::aromaticity;
use super::elements::Element;
use super::graph::{Atom, AtomId, BondOrder, GraphError, MolGraph};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmilesError {
    #[error("Input contains no atoms")]
    Empty,
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("Unexpected end of input inside bracket atom starting at position {0}")]
    UnterminatedBracket(usize),
    #[error("Invalid bracket atom at position {0}")]
    InvalidBracket(usize),
    #[error("Unknown element symbol '{0}'")]
    UnknownElement(String),
    #[error("Unbalanced branch at position {0}")]
    UnbalancedBranch(usize),
    #[error("Ring bond {0} is never closed")]
    UnclosedRing(u16),
    #[error("Ring bond {0} has conflicting bond orders")]
    ConflictingRingBond(u16),
    #[error("Bond at position {0} is not followed by an atom")]
    DanglingBond(usize),
    #[error("Unsupported bond symbol '{0}'")]
    UnsupportedBond(char),
    #[error("Invalid bond: {0}")]
    Graph(#[from] GraphError),
    #[error("Atom '{symbol}' exceeds its allowed valence (bonded valence {valence})")]
    Valence { symbol: String, valence: u8 },
    #[error("Aromatic atom '{0}' is not part of a ring")]
    AromaticOutsideRing(String),
}

/// Parses a SMILES string into a finalized molecular graph.
///
/// Finalization resolves implicit hydrogens, validates valences, folds explicit
/// `[H]` atoms into their heavy-atom neighbor, marks ring membership and converts Kekulé
/// aromatic rings to aromatic form.
/// Stereo descriptors and atom classes are accepted but not retained.
pub fn parse(input: &str) -> Result<MolGraph, SmilesError> {
    if let Some((position, ch)) = input.char_indices().find(|(_, c)| !c.is_ascii()) {
        return Err(SmilesError::UnexpectedCharacter { ch, position });
    }
    let graph = Parser::new(input).run()?;
    finalize(graph)
}

struct OpenRing {
    atom: AtomId,
    bond: Option<BondOrder>,
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    graph: MolGraph,
    previous: Option<AtomId>,
    pending_bond: Option<(BondOrder, usize)>,
    branches: Vec<AtomId>,
    rings: BTreeMap<u16, OpenRing>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
            graph: MolGraph::new(),
            previous: None,
            pending_bond: None,
            branches: Vec::new(),
            rings: BTreeMap::new(),
        }
    }

    fn run(mut self) -> Result<MolGraph, SmilesError> {
        while let Some(&byte) = self.bytes.get(self.pos) {
            let position = self.pos;
            match byte {
                b'(' => {
                    let parent = self
                        .previous
                        .ok_or(SmilesError::UnbalancedBranch(position))?;
                    self.reject_pending_bond()?;
                    self.branches.push(parent);
                    self.pos += 1;
                }
                b')' => {
                    self.reject_pending_bond()?;
                    let parent = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnbalancedBranch(position))?;
                    self.previous = Some(parent);
                    self.pos += 1;
                }
                b'.' => {
                    self.reject_pending_bond()?;
                    if self.previous.is_none() || !self.branches.is_empty() {
                        return Err(self.unexpected(position));
                    }
                    self.previous = None;
                    self.pos += 1;
                }
                b'-' | b'=' | b'#' | b':' | b'/' | b'\\' => {
                    if self.previous.is_none() || self.pending_bond.is_some() {
                        return Err(SmilesError::DanglingBond(position));
                    }
                    let order = match byte {
                        b'=' => BondOrder::Double,
                        b'#' => BondOrder::Triple,
                        b':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    };
                    self.pending_bond = Some((order, position));
                    self.pos += 1;
                }
                b'$' => return Err(SmilesError::UnsupportedBond('$')),
                b'0'..=b'9' => {
                    self.pos += 1;
                    self.ring_bond(u16::from(byte - b'0'), position)?;
                }
                b'%' => {
                    let digits = self
                        .bytes
                        .get(self.pos + 1..self.pos + 3)
                        .filter(|d| d.iter().all(u8::is_ascii_digit))
                        .ok_or_else(|| self.unexpected(position))?;
                    let ring = u16::from(digits[0] - b'0') * 10 + u16::from(digits[1] - b'0');
                    self.pos += 3;
                    self.ring_bond(ring, position)?;
                }
                b'[' => {
                    let atom = self.bracket_atom()?;
                    self.attach(atom)?;
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.attach(atom)?;
                }
            }
        }

        self.reject_pending_bond()?;
        if !self.branches.is_empty() {
            return Err(SmilesError::UnbalancedBranch(self.bytes.len()));
        }
        if let Some(ring) = self.rings.keys().next() {
            return Err(SmilesError::UnclosedRing(*ring));
        }
        if self.graph.is_empty() {
            return Err(SmilesError::Empty);
        }
        Ok(self.graph)
    }

    fn unexpected(&self, position: usize) -> SmilesError {
        SmilesError::UnexpectedCharacter {
            ch: self.bytes.get(position).map(|b| *b as char).unwrap_or('\0'),
            position,
        }
    }

    fn reject_pending_bond(&self) -> Result<(), SmilesError> {
        match self.pending_bond {
            Some((_, position)) => Err(SmilesError::DanglingBond(position)),
            None => Ok(()),
        }
    }

    fn default_bond(&self, a: AtomId, b: AtomId) -> BondOrder {
        let aromatic = |id| self.graph.atom(id).is_some_and(|atom| atom.aromatic);
        if aromatic(a) && aromatic(b) {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn attach(&mut self, atom: Atom) -> Result<(), SmilesError> {
        let id = self.graph.add_atom(atom);
        if let Some(previous) = self.previous {
            let order = match self.pending_bond.take() {
                Some((order, _)) => order,
                None => self.default_bond(previous, id),
            };
            self.graph.add_bond(previous, id, order)?;
        }
        self.previous = Some(id);
        Ok(())
    }

    fn ring_bond(&mut self, ring: u16, position: usize) -> Result<(), SmilesError> {
        let atom = self.previous.ok_or_else(|| self.unexpected(position))?;
        let bond = self.pending_bond.take().map(|(order, _)| order);

        match self.rings.remove(&ring) {
            Some(open) => {
                let order = match (open.bond, bond) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(SmilesError::ConflictingRingBond(ring));
                    }
                    (Some(order), _) | (None, Some(order)) => order,
                    (None, None) => self.default_bond(open.atom, atom),
                };
                self.graph.add_bond(open.atom, atom, order)?;
            }
            None => {
                self.rings.insert(ring, OpenRing { atom, bond });
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, SmilesError> {
        let position = self.pos;
        let rest = &self.bytes[self.pos..];

        if rest.starts_with(b"Cl") || rest.starts_with(b"Br") {
            let symbol = if rest[0] == b'C' { "Cl" } else { "Br" };
            self.pos += 2;
            return Ok(Atom::new(lookup(symbol)?, false));
        }

        self.pos += 1;
        match rest[0] {
            b'B' | b'C' | b'N' | b'O' | b'P' | b'S' | b'F' | b'I' | b'*' => {
                let symbol = (rest[0] as char).to_string();
                Ok(Atom::new(lookup(&symbol)?, false))
            }
            b'b' | b'c' | b'n' | b'o' | b'p' | b's' => {
                let symbol = (rest[0] as char).to_string();
                let element = Element::from_aromatic_symbol(&symbol)
                    .ok_or(SmilesError::UnknownElement(symbol))?;
                Ok(Atom::new(element, true))
            }
            _ => Err(self.unexpected(position)),
        }
    }

    fn bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let start = self.pos;
        self.pos += 1;

        let isotope = match self.read_number(start)? {
            Some(value) => u16::try_from(value).map_err(|_| SmilesError::InvalidBracket(start))?,
            None => 0,
        };
        let (element, aromatic) = self.bracket_symbol(start)?;
        self.skip_chirality();

        let hydrogens = if self.eat(b'H') {
            match self.read_number(start)? {
                Some(count) => u8::try_from(count).map_err(|_| SmilesError::InvalidBracket(start))?,
                None => 1,
            }
        } else {
            0
        };
        let charge = self.read_charge(start)?;
        if self.eat(b':') && self.read_number(start)?.is_none() {
            return Err(SmilesError::InvalidBracket(start));
        }
        if !self.eat(b']') {
            return Err(match self.bytes.get(self.pos) {
                Some(_) => self.unexpected(self.pos),
                None => SmilesError::UnterminatedBracket(start),
            });
        }

        Ok(Atom {
            isotope,
            hydrogens,
            charge,
            bracket: true,
            ..Atom::new(element, aromatic)
        })
    }

    fn bracket_symbol(&mut self, start: usize) -> Result<(Element, bool), SmilesError> {
        let first = *self
            .bytes
            .get(self.pos)
            .ok_or(SmilesError::UnterminatedBracket(start))?;

        if first == b'*' {
            self.pos += 1;
            return Ok((lookup("*")?, false));
        }

        let two_letters = self
            .bytes
            .get(self.pos..self.pos + 2)
            .and_then(|pair| std::str::from_utf8(pair).ok());

        if first.is_ascii_lowercase() {
            if let Some(element) = two_letters.and_then(Element::from_aromatic_symbol) {
                self.pos += 2;
                return Ok((element, true));
            }
            let symbol = (first as char).to_string();
            let element = Element::from_aromatic_symbol(&symbol)
                .ok_or(SmilesError::UnknownElement(symbol))?;
            self.pos += 1;
            return Ok((element, true));
        }

        if !first.is_ascii_uppercase() {
            return Err(self.unexpected(self.pos));
        }
        if let Some(element) = two_letters
            .filter(|pair| pair.as_bytes()[1].is_ascii_lowercase())
            .and_then(Element::from_symbol)
        {
            self.pos += 2;
            return Ok((element, false));
        }
        let symbol = (first as char).to_string();
        self.pos += 1;
        Ok((lookup(&symbol)?, false))
    }

    fn skip_chirality(&mut self) {
        if !self.eat(b'@') {
            return;
        }
        if self.eat(b'@') {
            return;
        }
        let class = self.bytes.get(self.pos..self.pos + 2);
        if matches!(
            class,
            Some(b"TH") | Some(b"AL") | Some(b"SP") | Some(b"TB") | Some(b"OH")
        ) {
            self.pos += 2;
            while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
                self.pos += 1;
            }
        }
    }

    fn read_charge(&mut self, start: usize) -> Result<i8, SmilesError> {
        let sign: i8 = match self.bytes.get(self.pos) {
            Some(b'+') => 1,
            Some(b'-') => -1,
            _ => return Ok(0),
        };
        let symbol = self.bytes[self.pos];
        self.pos += 1;

        if let Some(magnitude) = self.read_number(start)? {
            let magnitude = i8::try_from(magnitude).map_err(|_| SmilesError::InvalidBracket(start))?;
            return Ok(sign * magnitude);
        }
        let mut magnitude: i8 = 1;
        while self.eat(symbol) {
            magnitude = magnitude
                .checked_add(1)
                .ok_or(SmilesError::InvalidBracket(start))?;
        }
        Ok(sign * magnitude)
    }

    fn read_number(&mut self, start: usize) -> Result<Option<u32>, SmilesError> {
        let begin = self.pos;
        while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        if begin == self.pos {
            return Ok(None);
        }
        std::str::from_utf8(&self.bytes[begin..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .map(Some)
            .ok_or(SmilesError::InvalidBracket(start))
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.bytes.get(self.pos) == Some(&expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

fn lookup(symbol: &str) -> Result<Element, SmilesError> {
    Element::from_symbol(symbol).ok_or_else(|| SmilesError::UnknownElement(symbol.to_string()))
}

fn finalize(mut graph: MolGraph) -> Result<MolGraph, SmilesError> {
    for id in graph.atom_ids() {
        let hydrogens = resolve_hydrogens(&graph, id)?;
        if let Some(atom) = graph.atom_mut(id) {
            atom.hydrogens = hydrogens;
        }
    }

    fold_explicit_hydrogens(&mut graph);

    let ring_atoms = graph.ring_atoms();
    for id in graph.atom_ids() {
        let in_ring = ring_atoms.contains(&id);
        if let Some(atom) = graph.atom_mut(id) {
            if atom.aromatic && !in_ring {
                return Err(SmilesError::AromaticOutsideRing(
                    atom.element.smiles_symbol(true),
                ));
            }
            atom.in_ring = in_ring;
        }
    }

    aromaticity::perceive(&mut graph, &ring_atoms);
    Ok(graph)
}

fn resolve_hydrogens(graph: &MolGraph, id: AtomId) -> Result<u8, SmilesError> {
    let Some(atom) = graph.atom(id) else {
        return Ok(0);
    };
    let valence_error = || SmilesError::Valence {
        symbol: atom.element.smiles_symbol(atom.aromatic),
        valence: graph.bond_valence(id),
    };

    if !atom.bracket {
        return graph.implicit_hydrogens(id).ok_or_else(valence_error);
    }

    let valences = atom.element.default_valences();
    if !atom.aromatic {
        if let Some(max) = valences.iter().max() {
            let total = u16::from(graph.bond_valence(id)) + u16::from(atom.hydrogens);
            let limit = u16::from(*max) + u16::from(atom.charge.unsigned_abs());
            if total > limit {
                return Err(valence_error());
            }
        }
    }
    Ok(atom.hydrogens)
}

/// Removes neutral, unlabeled `[H]` atoms singly bonded to a heavy atom and adds them to
/// that atom's hydrogen count.
fn fold_explicit_hydrogens(graph: &mut MolGraph) {
    let foldable: Vec<(AtomId, AtomId)> = graph
        .atoms_iter()
        .filter(|(_, atom)| {
            atom.element.is_hydrogen()
                && atom.charge == 0
                && atom.isotope == 0
                && atom.hydrogens == 0
        })
        .filter_map(|(id, _)| match graph.neighbors(id) {
            [(heavy, BondOrder::Single)] => graph
                .atom(*heavy)
                .filter(|neighbor| !neighbor.element.is_hydrogen())
                .map(|_| (id, *heavy)),
            _ => None,
        })
        .collect();

    for (hydrogen, heavy) in foldable {
        graph.remove_atom(hydrogen);
        if let Some(atom) = graph.atom_mut(heavy) {
            atom.hydrogens += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom_with_symbol<'g>(graph: &'g MolGraph, symbol: &str) -> &'g Atom {
        graph
            .atoms_iter()
            .map(|(_, atom)| atom)
            .find(|atom| atom.element.symbol == symbol)
            .unwrap()
    }

    #[test]
    fn parses_simple_chain_with_implicit_hydrogens() {
        let graph = parse("CCO").unwrap();
        assert_eq!(graph.atom_count(), 3);
        assert_eq!(graph.bonds().len(), 2);
        let hydrogens: Vec<u8> = graph.atoms_iter().map(|(_, a)| a.hydrogens).collect();
        assert_eq!(hydrogens, vec![3, 2, 1]);
    }

    #[test]
    fn parses_branches_and_double_bonds() {
        let graph = parse("CC(=O)O").unwrap();
        assert_eq!(graph.atom_count(), 4);
        let orders: Vec<BondOrder> = graph.bonds().iter().map(|b| b.order).collect();
        assert_eq!(
            orders,
            vec![BondOrder::Single, BondOrder::Double, BondOrder::Single]
        );
    }

    #[test]
    fn parses_aromatic_ring_with_ring_closure() {
        let graph = parse("c1ccccc1").unwrap();
        assert_eq!(graph.atom_count(), 6);
        assert_eq!(graph.bonds().len(), 6);
        assert!(graph.bonds().iter().all(|b| b.order == BondOrder::Aromatic));
        assert!(
            graph
                .atoms_iter()
                .all(|(_, a)| a.in_ring && a.aromatic && a.hydrogens == 1)
        );
    }

    #[test]
    fn parses_two_digit_ring_labels() {
        let graph = parse("C%12CCCCC%12").unwrap();
        assert_eq!(graph.bonds().len(), 6);
        assert!(graph.atoms_iter().all(|(_, a)| a.in_ring));
    }

    #[test]
    fn ring_bond_order_may_be_given_at_either_end() {
        let opening = parse("C=1CCCCC1").unwrap();
        let closing = parse("C1CCCCC=1").unwrap();
        let doubles = |g: &MolGraph| {
            g.bonds()
                .iter()
                .filter(|b| b.order == BondOrder::Double)
                .count()
        };
        assert_eq!(doubles(&opening), 1);
        assert_eq!(doubles(&closing), 1);
        assert_eq!(
            parse("C=1CCCCC#1").unwrap_err(),
            SmilesError::ConflictingRingBond(1)
        );
    }

    #[test]
    fn parses_bracket_atoms_with_charge_isotope_and_hydrogens() {
        let graph = parse("[13CH3][NH3+]").unwrap();
        let carbon = atom_with_symbol(&graph, "C");
        assert_eq!(carbon.isotope, 13);
        assert_eq!(carbon.hydrogens, 3);
        let nitrogen = atom_with_symbol(&graph, "N");
        assert_eq!(nitrogen.charge, 1);
        assert_eq!(nitrogen.hydrogens, 3);
    }

    #[test]
    fn parses_repeated_and_numeric_charges() {
        let graph = parse("[O--].[Fe+2]").unwrap();
        assert_eq!(atom_with_symbol(&graph, "O").charge, -2);
        assert_eq!(atom_with_symbol(&graph, "Fe").charge, 2);
    }

    #[test]
    fn discards_chirality_and_directional_bonds() {
        let graph = parse("F/C=C/[C@@H](N)O").unwrap();
        assert_eq!(graph.atom_count(), 6);
        assert_eq!(atom_with_symbol(&graph, "F").hydrogens, 0);
        let graph = parse("N[C@TH1H](C)O").unwrap();
        assert_eq!(graph.atom_count(), 4);
    }

    #[test]
    fn folds_explicit_hydrogen_atoms() {
        let graph = parse("[H]C([H])([H])[H]").unwrap();
        assert_eq!(graph.atom_count(), 1);
        assert_eq!(atom_with_symbol(&graph, "C").hydrogens, 4);
    }

    #[test]
    fn keeps_molecular_hydrogen_as_atoms() {
        let graph = parse("[H][H]").unwrap();
        assert_eq!(graph.atom_count(), 2);
    }

    #[test]
    fn two_letter_bracket_symbols_take_precedence() {
        let graph = parse("[Co]").unwrap();
        assert_eq!(atom_with_symbol(&graph, "Co").element.atomic_number, 27);
        let graph = parse("c1cc[se]c1").unwrap();
        assert_eq!(atom_with_symbol(&graph, "Se").element.atomic_number, 34);
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse("").unwrap_err(), SmilesError::Empty);
    }

    #[test]
    fn rejects_unbalanced_branches() {
        assert!(matches!(
            parse("CC(C").unwrap_err(),
            SmilesError::UnbalancedBranch(_)
        ));
        assert!(matches!(
            parse("CC)C").unwrap_err(),
            SmilesError::UnbalancedBranch(_)
        ));
    }

    #[test]
    fn rejects_unclosed_rings() {
        assert_eq!(parse("C1CCC").unwrap_err(), SmilesError::UnclosedRing(1));
    }

    #[test]
    fn rejects_dangling_bonds() {
        assert!(matches!(
            parse("CC=").unwrap_err(),
            SmilesError::DanglingBond(2)
        ));
        assert!(matches!(
            parse("=CC").unwrap_err(),
            SmilesError::DanglingBond(0)
        ));
    }

    #[test]
    fn rejects_unknown_symbols_and_characters() {
        assert!(matches!(
            parse("[Xx]").unwrap_err(),
            SmilesError::UnknownElement(_)
        ));
        assert!(matches!(
            parse("CQC").unwrap_err(),
            SmilesError::UnexpectedCharacter { ch: 'Q', .. }
        ));
        assert!(matches!(
            parse("Cé").unwrap_err(),
            SmilesError::UnexpectedCharacter { ch: 'é', .. }
        ));
    }

    #[test]
    fn rejects_pentavalent_carbon() {
        assert!(matches!(
            parse("C(C)(C)(C)(C)C").unwrap_err(),
            SmilesError::Valence { .. }
        ));
    }

    #[test]
    fn rejects_overloaded_bracket_atom() {
        assert!(matches!(
            parse("[CH4]C").unwrap_err(),
            SmilesError::Valence { .. }
        ));
    }

    #[test]
    fn rejects_aromatic_atoms_outside_rings() {
        assert!(matches!(
            parse("cc").unwrap_err(),
            SmilesError::AromaticOutsideRing(_)
        ));
    }

    #[test]
    fn rejects_self_bonds_via_ring_closure() {
        assert!(matches!(
            parse("C11").unwrap_err(),
            SmilesError::Graph(GraphError::SelfBond)
        ));
    }

    #[test]
    fn rejects_quadruple_bonds() {
        assert_eq!(parse("C$C").unwrap_err(), SmilesError::UnsupportedBond('$'));
    }

    #[test]
    fn rejects_unterminated_bracket() {
        assert_eq!(
            parse("C[NH4").unwrap_err(),
            SmilesError::UnterminatedBracket(1)
        );
    }
}
