//! Character alphabets for aligned sequences.
//!
//! An alphabet fixes the ordered list of states (`ACGT` for DNA) and the two
//! special symbols for gaps and missing data. Ambiguity codes map to a set of
//! state indices. Symbols are matched case-insensitively.

use crate::error::{Result, SplitNetError};

/// How a symbol is read at one site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol<'a> {
    State(usize),
    Ambiguous(&'a [usize]),
    Gap,
    Missing,
}

/// How ambiguity codes enter the frequency matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Spread the site weight over every combination of represented states.
    #[default]
    Average,
    /// Use the literal symbol; it must be a state, gap or missing symbol.
    Ignore,
}

#[derive(Clone, Debug)]
pub struct Alphabet {
    states: Vec<u8>,
    gap: u8,
    missing: u8,
    ambiguity: Vec<(u8, Vec<usize>)>,
}

impl Alphabet {
    /// Creates an alphabet from its state symbols.
    ///
    /// # Errors
    /// Fails on repeated symbols or when gap/missing collide with a state.
    pub fn new(states: &str, gap: u8, missing: u8) -> Result<Self> {
        let states: Vec<u8> = states.bytes().map(|b| b.to_ascii_uppercase()).collect();
        if states.is_empty() {
            return Err(SplitNetError::InvalidInput("alphabet has no states".into()));
        }
        for (i, s) in states.iter().enumerate() {
            if states[..i].contains(s) || *s == gap || *s == missing {
                return Err(SplitNetError::InvalidInput(format!(
                    "symbol '{}' used twice in alphabet",
                    *s as char
                )));
            }
        }
        if gap == missing {
            return Err(SplitNetError::InvalidInput(
                "gap and missing symbols must differ".into(),
            ));
        }
        Ok(Alphabet {
            states,
            gap,
            missing,
            ambiguity: Vec::new(),
        })
    }

    /// Registers an ambiguity code standing for the given state symbols.
    pub fn with_ambiguity(mut self, code: u8, represents: &str) -> Result<Self> {
        let code = code.to_ascii_uppercase();
        let mut indices = Vec::with_capacity(represents.len());
        for b in represents.bytes() {
            let idx = self.state_index(b).ok_or_else(|| {
                SplitNetError::InvalidInput(format!(
                    "ambiguity code '{}' refers to unknown state '{}'",
                    code as char, b as char
                ))
            })?;
            if !indices.contains(&idx) {
                indices.push(idx);
            }
        }
        indices.sort_unstable();
        self.ambiguity.retain(|(c, _)| *c != code);
        self.ambiguity.push((code, indices));
        Ok(self)
    }

    /// Nucleotides `ACGT` with `-` for gaps, `?` for missing data and the
    /// IUPAC ambiguity codes.
    pub fn dna() -> Self {
        let base = Alphabet {
            states: b"ACGT".to_vec(),
            gap: b'-',
            missing: b'?',
            ambiguity: Vec::new(),
        };
        let codes: [(u8, &str); 11] = [
            (b'R', "AG"),
            (b'Y', "CT"),
            (b'K', "GT"),
            (b'M', "AC"),
            (b'S', "CG"),
            (b'W', "AT"),
            (b'B', "CGT"),
            (b'D', "AGT"),
            (b'H', "ACT"),
            (b'V', "ACG"),
            (b'N', "ACGT"),
        ];
        let ambiguity = codes
            .iter()
            .map(|&(code, rep)| {
                let idx = rep
                    .bytes()
                    .filter_map(|b| base.state_index(b))
                    .collect::<Vec<_>>();
                (code, idx)
            })
            .collect();
        Alphabet { ambiguity, ..base }
    }

    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> &[u8] {
        &self.states
    }

    pub fn gap(&self) -> u8 {
        self.gap
    }

    pub fn missing(&self) -> u8 {
        self.missing
    }

    pub fn state_index(&self, symbol: u8) -> Option<usize> {
        let symbol = symbol.to_ascii_uppercase();
        self.states.iter().position(|&s| s == symbol)
    }

    /// Classifies one symbol, `None` if the alphabet does not know it.
    pub fn classify(&self, symbol: u8, policy: AmbiguityPolicy) -> Option<Symbol<'_>> {
        if symbol == self.gap {
            return Some(Symbol::Gap);
        }
        if symbol == self.missing {
            return Some(Symbol::Missing);
        }
        if let Some(i) = self.state_index(symbol) {
            return Some(Symbol::State(i));
        }
        if policy == AmbiguityPolicy::Ignore {
            return None;
        }
        let symbol = symbol.to_ascii_uppercase();
        self.ambiguity
            .iter()
            .find(|(c, _)| *c == symbol)
            .map(|(_, idx)| Symbol::Ambiguous(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dna_symbols() {
        let dna = Alphabet::dna();
        assert_eq!(dna.n_states(), 4);
        assert_eq!(dna.classify(b'g', AmbiguityPolicy::Average), Some(Symbol::State(2)));
        assert_eq!(dna.classify(b'-', AmbiguityPolicy::Average), Some(Symbol::Gap));
        assert_eq!(dna.classify(b'?', AmbiguityPolicy::Average), Some(Symbol::Missing));
        assert_eq!(
            dna.classify(b'R', AmbiguityPolicy::Average),
            Some(Symbol::Ambiguous(&[0, 2]))
        );
        assert_eq!(
            dna.classify(b'n', AmbiguityPolicy::Average),
            Some(Symbol::Ambiguous(&[0, 1, 2, 3]))
        );
        assert_eq!(dna.classify(b'X', AmbiguityPolicy::Average), None);
    }

    #[test]
    fn test_ignore_policy_rejects_ambiguity_codes() {
        let dna = Alphabet::dna();
        assert_eq!(dna.classify(b'R', AmbiguityPolicy::Ignore), None);
        assert_eq!(dna.classify(b'T', AmbiguityPolicy::Ignore), Some(Symbol::State(3)));
    }

    #[test]
    fn test_custom_alphabet() {
        let binary = Alphabet::new("01", b'-', b'?')
            .unwrap()
            .with_ambiguity(b'X', "01")
            .unwrap();
        assert_eq!(binary.n_states(), 2);
        assert_eq!(
            binary.classify(b'x', AmbiguityPolicy::Average),
            Some(Symbol::Ambiguous(&[0, 1]))
        );
        assert!(Alphabet::new("AA", b'-', b'?').is_err());
        assert!(Alphabet::new("A-", b'-', b'?').is_err());
        assert!(Alphabet::new("01", b'-', b'?').unwrap().with_ambiguity(b'X', "02").is_err());
    }
}
