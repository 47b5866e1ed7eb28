use crate::error::{MotifError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use phf::phf_map;
use std::collections::BTreeMap;

/// The 20 canonical amino acids, in PWM row order
pub const AMINO_ACIDS: [char; 20] = [
    'A', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'V',
    'W', 'Y',
];

static RESIDUE_INDEX: phf::Map<char, usize> = phf_map! {
    'A' => 0, 'C' => 1, 'D' => 2, 'E' => 3, 'F' => 4,
    'G' => 5, 'H' => 6, 'I' => 7, 'K' => 8, 'L' => 9,
    'M' => 10, 'N' => 11, 'P' => 12, 'Q' => 13, 'R' => 14,
    'S' => 15, 'T' => 16, 'V' => 17, 'W' => 18, 'Y' => 19,
};

/// Row index of a canonical amino acid, case-insensitive
pub fn residue_index(residue: char) -> Option<usize> {
    RESIDUE_INDEX.get(&residue.to_ascii_uppercase()).copied()
}

/// Represents a Position Weight Matrix (PWM)
/// Stored as a 20 x W matrix: one row per amino acid (see `AMINO_ACIDS`),
/// one column per motif position
#[derive(Debug, Clone, PartialEq)]
pub struct Pwm {
    motif_id: String,
    frequencies: Array2<f64>,
}

impl Pwm {
    /// Wraps a frequency matrix. The matrix must have exactly one row per
    /// canonical amino acid and at least one position.
    pub fn new(motif_id: impl Into<String>, frequencies: Array2<f64>) -> Result<Self> {
        let motif_id = motif_id.into();
        if frequencies.nrows() != AMINO_ACIDS.len() {
            return Err(MotifError::malformed_pwm(
                motif_id,
                format!(
                    "expected {} amino acid rows, found {}",
                    AMINO_ACIDS.len(),
                    frequencies.nrows()
                ),
            ));
        }
        if frequencies.ncols() == 0 {
            return Err(MotifError::malformed_pwm(motif_id, "no position columns"));
        }
        Ok(Pwm {
            motif_id,
            frequencies,
        })
    }

    pub fn motif_id(&self) -> &str {
        &self.motif_id
    }

    /// Number of motif positions (W)
    pub fn width(&self) -> usize {
        self.frequencies.ncols()
    }

    pub fn frequencies(&self) -> ArrayView2<'_, f64> {
        self.frequencies.view()
    }

    /// Frequencies of all 20 residues at one position
    pub fn position(&self, position: usize) -> ArrayView1<'_, f64> {
        self.frequencies.column(position)
    }

    pub fn frequency(&self, residue: char, position: usize) -> Option<f64> {
        let row = residue_index(residue)?;
        self.frequencies.get((row, position)).copied()
    }

    /// New PWM carrying this motif id and the given content
    pub(crate) fn with_frequencies(&self, frequencies: Array2<f64>) -> Pwm {
        Pwm {
            motif_id: self.motif_id.clone(),
            frequencies,
        }
    }
}

/// Collection of PWMs indexed by motif ID
pub type PwmCollection = BTreeMap<String, Pwm>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residue_lookup_matches_row_order() {
        for (row, aa) in AMINO_ACIDS.iter().enumerate() {
            assert_eq!(residue_index(*aa), Some(row));
        }
        assert_eq!(residue_index('s'), Some(15));
        assert_eq!(residue_index('X'), None);
        assert_eq!(residue_index('-'), None);
    }

    #[test]
    fn rejects_wrong_row_count() {
        let result = Pwm::new("bad", Array2::from_elem((19, 13), 0.05));
        assert!(matches!(result, Err(MotifError::MalformedPwm { .. })));
        let result = Pwm::new("empty", Array2::from_elem((20, 0), 0.05));
        assert!(result.is_err());
    }

    #[test]
    fn accessors() {
        let mut m = Array2::from_elem((20, 3), 0.05);
        m[[15, 1]] = 0.5;
        let pwm = Pwm::new("Hog1", m).unwrap();
        assert_eq!(pwm.width(), 3);
        assert_eq!(pwm.motif_id(), "Hog1");
        assert_eq!(pwm.frequency('S', 1), Some(0.5));
        assert_eq!(pwm.frequency('S', 3), None);
        assert_eq!(pwm.position(1).len(), 20);
    }
}
