use phf::{Map, Set, phf_map, phf_set};

static ATOMIC_NUMBERS: Map<&'static str, u8> = phf_map! {
    "*" => 0,
    "H" => 1, "He" => 2, "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8,
    "F" => 9, "Ne" => 10, "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15,
    "S" => 16, "Cl" => 17, "Ar" => 18, "K" => 19, "Ca" => 20, "Sc" => 21, "Ti" => 22,
    "V" => 23, "Cr" => 24, "Mn" => 25, "Fe" => 26, "Co" => 27, "Ni" => 28, "Cu" => 29,
    "Zn" => 30, "Ga" => 31, "Ge" => 32, "As" => 33, "Se" => 34, "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38, "Y" => 39, "Zr" => 40, "Nb" => 41, "Mo" => 42, "Tc" => 43,
    "Ru" => 44, "Rh" => 45, "Pd" => 46, "Ag" => 47, "Cd" => 48, "In" => 49, "Sn" => 50,
    "Sb" => 51, "Te" => 52, "I" => 53, "Xe" => 54, "Cs" => 55, "Ba" => 56, "La" => 57,
    "Ce" => 58, "Pr" => 59, "Nd" => 60, "Pm" => 61, "Sm" => 62, "Eu" => 63, "Gd" => 64,
    "Tb" => 65, "Dy" => 66, "Ho" => 67, "Er" => 68, "Tm" => 69, "Yb" => 70, "Lu" => 71,
    "Hf" => 72, "Ta" => 73, "W" => 74, "Re" => 75, "Os" => 76, "Ir" => 77, "Pt" => 78,
    "Au" => 79, "Hg" => 80, "Tl" => 81, "Pb" => 82, "Bi" => 83, "Po" => 84, "At" => 85,
    "Rn" => 86, "Fr" => 87, "Ra" => 88, "Ac" => 89, "Th" => 90, "Pa" => 91, "U" => 92,
    "Np" => 93, "Pu" => 94, "Am" => 95, "Cm" => 96, "Bk" => 97, "Cf" => 98, "Es" => 99,
    "Fm" => 100, "Md" => 101, "No" => 102, "Lr" => 103, "Rf" => 104, "Db" => 105,
    "Sg" => 106, "Bh" => 107, "Hs" => 108, "Mt" => 109, "Ds" => 110, "Rg" => 111,
    "Cn" => 112, "Nh" => 113, "Fl" => 114, "Mc" => 115, "Lv" => 116, "Ts" => 117,
    "Og" => 118,
};

/// Symbols that may appear outside brackets.
static ORGANIC_SUBSET: Set<&'static str> = phf_set! {
    "B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I",
};

/// Lowercase aromatic symbols mapped onto their element symbol.
static AROMATIC_SYMBOLS: Map<&'static str, &'static str> = phf_map! {
    "b" => "B", "c" => "C", "n" => "N", "o" => "O", "p" => "P", "s" => "S",
    "se" => "Se", "as" => "As", "te" => "Te",
};

/// A chemical element as it appears in a parsed structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Element {
    pub symbol: &'static str,
    pub atomic_number: u8,
}

impl Element {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        ATOMIC_NUMBERS
            .get_entry(symbol)
            .map(|(symbol, atomic_number)| Self {
                symbol: *symbol,
                atomic_number: *atomic_number,
            })
    }

    /// Resolves a lowercase aromatic symbol (`c`, `se`, ...) to its element.
    pub fn from_aromatic_symbol(symbol: &str) -> Option<Self> {
        AROMATIC_SYMBOLS
            .get(symbol)
            .and_then(|element| Self::from_symbol(element))
    }

    pub fn is_hydrogen(&self) -> bool {
        self.atomic_number == 1
    }

    pub fn in_organic_subset(&self) -> bool {
        ORGANIC_SUBSET.contains(self.symbol)
    }

    pub fn can_be_aromatic(&self) -> bool {
        AROMATIC_SYMBOLS.contains_key(self.symbol.to_ascii_lowercase().as_str())
    }

    /// Normal valences in increasing order; empty for elements without a fixed valence model.
    pub fn default_valences(&self) -> &'static [u8] {
        match self.atomic_number {
            1 => &[1],
            5 => &[3],
            6 => &[4],
            7 => &[3, 5],
            8 => &[2],
            9 => &[1],
            14 => &[4],
            15 => &[3, 5],
            16 => &[2, 4, 6],
            17 => &[1],
            33 => &[3, 5],
            34 => &[2, 4, 6],
            35 => &[1],
            52 => &[2, 4, 6],
            53 => &[1, 3, 5],
            _ => &[],
        }
    }

    /// Symbol as written in SMILES, lowercase for aromatic atoms.
    pub fn smiles_symbol(&self, aromatic: bool) -> String {
        if aromatic {
            self.symbol.to_ascii_lowercase()
        } else {
            self.symbol.to_string()
        }
    }
}
