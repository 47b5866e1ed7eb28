//! Symmetric Kullback-Leibler divergence between two PWMs.
//!
//! For query X and comparison Y of width W the score is
//!
//! ```text
//! score(X, Y) = sum_p [ sum_a X[a,p] log2(X[a,p] / Y[a,p]) + sum_a Y[a,p] log2(Y[a,p] / X[a,p]) ]
//! ```
//!
//! i.e. both one-directional divergences summed at every position, without
//! the usual factor of 1/2. FDR thresholds downstream are calibrated to
//! this scaling.

use crate::error::{MotifError, Result};
use crate::types::{Pwm, AMINO_ACIDS};
use ndarray::ArrayView2;

/// A cell that cannot enter a logarithm
#[derive(Debug, Clone, Copy, PartialEq)]
struct InvalidCell {
    row: usize,
    position: usize,
    value: f64,
}

fn check(value: f64, row: usize, position: usize) -> std::result::Result<f64, InvalidCell> {
    // also rejects NaN
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(InvalidCell {
            row,
            position,
            value,
        })
    }
}

/// Scores two matrices of identical shape, row for row.
fn kld_matrix(x: ArrayView2<f64>, y: ArrayView2<f64>) -> std::result::Result<f64, InvalidCell> {
    debug_assert_eq!(x.dim(), y.dim());
    let mut score = 0.0;
    for position in 0..x.ncols() {
        let mut column = 0.0;
        for row in 0..x.nrows() {
            let xa = check(x[[row, position]], row, position)?;
            let ya = check(y[[row, position]], row, position)?;
            column += xa * (xa.log2() - ya.log2()) + ya * (ya.log2() - xa.log2());
        }
        score += column;
    }
    Ok(score)
}

/// Computes the symmetric KL divergence score between `query` and `comparison`.
///
/// Pure and deterministic; `score(x, y) == score(y, x)` exactly.
///
/// # Errors
/// * `MotifError::WidthMismatch` - the PWMs have different widths
/// * `MotifError::InvalidFrequency` - a frequency is zero, negative or not
///   finite (zero cells must be smoothed with a pseudocount beforehand)
pub fn score(query: &Pwm, comparison: &Pwm) -> Result<f64> {
    if query.width() != comparison.width() {
        return Err(MotifError::WidthMismatch {
            query: query.motif_id().to_string(),
            comparison: comparison.motif_id().to_string(),
            query_width: query.width(),
            comparison_width: comparison.width(),
        });
    }

    kld_matrix(query.frequencies(), comparison.frequencies()).map_err(|cell| {
        MotifError::InvalidFrequency {
            query: query.motif_id().to_string(),
            comparison: comparison.motif_id().to_string(),
            residue: AMINO_ACIDS[cell.row],
            position: cell.position,
            value: cell.value,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn skewed(id: &str, width: usize, hot: usize) -> Pwm {
        let mut m = Array2::from_elem((20, width), 0.02);
        for p in 0..width {
            m[[(hot + p) % 20, p]] = 0.62;
        }
        Pwm::new(id, m).unwrap()
    }

    #[test]
    fn two_residue_scenario() {
        let x = array![[0.9], [0.1]];
        let y = array![[0.1], [0.9]];
        let expected = 2.0 * (0.9 * 9f64.log2() + 0.1 * (1.0f64 / 9.0).log2());
        let got = kld_matrix(x.view(), y.view()).unwrap();
        assert!((got - expected).abs() < 1e-12);
        assert!((got - 5.0718).abs() < 1e-3);
    }

    #[test]
    fn symmetric() {
        let x = skewed("Hog1", 13, 3);
        let y = skewed("M1", 13, 11);
        assert_eq!(score(&x, &y).unwrap(), score(&y, &x).unwrap());
        assert!(score(&x, &y).unwrap() > 0.0);
    }

    #[test]
    fn self_divergence_is_zero() {
        let x = skewed("Hog1", 13, 5);
        assert!(score(&x, &x).unwrap().abs() < 1e-12);
    }

    #[test]
    fn width_mismatch() {
        let x = skewed("Hog1", 13, 0);
        let y = skewed("M1", 11, 0);
        match score(&x, &y) {
            Err(MotifError::WidthMismatch {
                query_width,
                comparison_width,
                ..
            }) => {
                assert_eq!(query_width, 13);
                assert_eq!(comparison_width, 11);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn zero_frequency_is_reported() {
        let x = skewed("Hog1", 3, 0);
        let mut m = x.frequencies().to_owned();
        m[[18, 2]] = 0.0;
        let y = Pwm::new("M1", m).unwrap();
        match score(&x, &y) {
            Err(MotifError::InvalidFrequency {
                query,
                comparison,
                residue,
                position,
                value,
            }) => {
                assert_eq!(query, "Hog1");
                assert_eq!(comparison, "M1");
                assert_eq!(residue, 'W');
                assert_eq!(position, 2);
                assert_eq!(value, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
