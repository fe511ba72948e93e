//! Linear least squares with optional ridge penalty
//!
//! The design matrix is passed row-major. Column 0 is treated as the
//! intercept and is never penalised.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Fitted linear model `y = X * coefficients`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeastSquares {
    coefficients: Vec<f64>,
}

impl LeastSquares {
    /// Fit coefficients by solving `(X'X + lambda * I') b = X'y`
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], ridge_lambda: f64) -> Result<Self> {
        if rows.is_empty() {
            return Err(MathError::InsufficientData(
                "Least squares needs at least one row".to_string(),
            ));
        }
        if rows.len() != targets.len() {
            return Err(MathError::InvalidInput(format!(
                "Design matrix has {} rows but target has {} values",
                rows.len(),
                targets.len()
            )));
        }
        if ridge_lambda < 0.0 || !ridge_lambda.is_finite() {
            return Err(MathError::InvalidInput(
                "Ridge penalty must be a non-negative finite number".to_string(),
            ));
        }

        let k = rows[0].len();
        if k == 0 || rows.iter().any(|r| r.len() != k) {
            return Err(MathError::InvalidInput(
                "All design rows must have the same non-zero width".to_string(),
            ));
        }

        // Normal equations
        let mut xtx = vec![vec![0.0; k]; k];
        let mut xty = vec![0.0; k];
        for (row, &y) in rows.iter().zip(targets.iter()) {
            for i in 0..k {
                xty[i] += row[i] * y;
                for j in i..k {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 0..k {
            for j in 0..i {
                xtx[i][j] = xtx[j][i];
            }
            if i > 0 {
                xtx[i][i] += ridge_lambda;
            }
        }

        let coefficients = solve(xtx, xty)?;

        Ok(Self { coefficients })
    }

    /// Predict a single row
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            return Err(MathError::InvalidInput(format!(
                "Row has {} features, model expects {}",
                row.len(),
                self.coefficients.len()
            )));
        }

        Ok(row
            .iter()
            .zip(self.coefficients.iter())
            .map(|(x, b)| x * b)
            .sum())
    }

    /// Fitted coefficients, intercept first
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);

        if a[pivot][col].abs() < 1e-12 {
            return Err(MathError::CalculationError(
                "Design matrix is singular; add a ridge penalty or drop collinear columns"
                    .to_string(),
            ));
        }

        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(MathError::CalculationError(
            "Least squares solution is not finite".to_string(),
        ));
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_exact_line() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0, i as f64]).collect();
        let targets: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();

        let fit = LeastSquares::fit(&rows, &targets, 0.0).unwrap();
        assert_relative_eq!(fit.coefficients()[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(fit.coefficients()[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(fit.predict(&[1.0, 40.0]).unwrap(), 23.0, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_matrix_needs_ridge() {
        // Second and third columns are identical
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![1.0, i as f64, i as f64])
            .collect();
        let targets: Vec<f64> = (0..10).map(|i| i as f64).collect();

        assert!(LeastSquares::fit(&rows, &targets, 0.0).is_err());
        let ridge = LeastSquares::fit(&rows, &targets, 1e-3).unwrap();
        assert_relative_eq!(
            ridge.coefficients()[1],
            ridge.coefficients()[2],
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(LeastSquares::fit(&rows, &[1.0, 2.0], 0.0).is_err());
        let rows = vec![vec![1.0, 0.0], vec![1.0, 1.0], vec![1.0, 2.0]];
        let fit = LeastSquares::fit(&rows, &[1.0, 3.0, 5.0], 0.0).unwrap();
        assert!(fit.predict(&[1.0]).is_err());
    }
}
