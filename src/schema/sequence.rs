//! Sequence representation shared by the evaluator, the variation operator
//! and checkpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A coding sequence expressed as an ordered list of codons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodonSequence {
    pub codons: Vec<String>,
}

impl CodonSequence {
    /// Create a sequence from codons.
    pub fn new(codons: Vec<String>) -> Self {
        Self { codons }
    }

    /// Split a nucleotide string into codons. Trailing bases that do not
    /// complete a codon are kept as a final short codon.
    pub fn from_nucleotides(seq: &str) -> Self {
        let codons = seq
            .as_bytes()
            .chunks(3)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        Self { codons }
    }

    /// Number of codons.
    pub fn len(&self) -> usize {
        self.codons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codons.is_empty()
    }

    /// Content address of the sequence (the joined nucleotides).
    pub fn key(&self) -> String {
        self.codons.concat()
    }

    /// Number of codon positions that differ from `other`.
    pub fn hamming(&self, other: &Self) -> usize {
        let differing = self
            .codons
            .iter()
            .zip(&other.codons)
            .filter(|(a, b)| a != b)
            .count();
        differing + self.codons.len().abs_diff(other.codons.len())
    }
}

impl fmt::Display for CodonSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for codon in &self.codons {
            f.write_str(codon)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_nucleotides() {
        let seq = CodonSequence::from_nucleotides("AUGGCUUAA");
        assert_eq!(seq.codons, vec!["AUG", "GCU", "UAA"]);
        assert_eq!(seq.key(), "AUGGCUUAA");
        assert_eq!(seq.to_string(), "AUGGCUUAA");
    }

    #[test]
    fn test_hamming() {
        let a = CodonSequence::from_nucleotides("AUGGCUUAA");
        let b = CodonSequence::from_nucleotides("AUGGCCUAG");
        assert_eq!(a.hamming(&b), 2);
        assert_eq!(a.hamming(&a), 0);
    }
}
