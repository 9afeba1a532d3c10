pub mod canonicalize;
pub mod evolve;
pub mod similarity;
