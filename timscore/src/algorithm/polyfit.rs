use crate::error::CoreError;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Minimum number of values before bulk evaluation switches to rayon.
const PAR_THRESHOLD: usize = 4096;

/// A least-squares polynomial model over a fixed domain.
///
/// The model is fit once and immutable afterwards. Coefficients are stored
/// over a domain normalized to [-1, 1], which keeps the Vandermonde system
/// well conditioned even for large raw index ranges (TOF indices go into
/// the hundreds of thousands).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyModel {
    coefficients: Vec<f64>,
    domain_min: f64,
    domain_max: f64,
}

/// Fit a polynomial of the given degree to `(xs, ys)` by least squares.
///
/// `xs` must be strictly increasing and the same length as `ys`. At least
/// `degree + 1` grid points are required, otherwise the system is
/// underdetermined and a `DegenerateFit` error is returned.
pub fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Result<PolyModel, CoreError> {
    if degree < 1 {
        return Err(CoreError::Construction(
            "polynomial degree must be at least 1".to_string(),
        ));
    }
    if xs.len() != ys.len() {
        return Err(CoreError::Construction(format!(
            "domain grid has {} points but {} range values were given",
            xs.len(),
            ys.len()
        )));
    }
    if xs.windows(2).any(|w| w[0] >= w[1]) {
        return Err(CoreError::Construction(
            "domain grid must be strictly increasing".to_string(),
        ));
    }
    if xs.len() < degree + 1 {
        return Err(CoreError::DegenerateFit {
            points: xs.len(),
            degree,
        });
    }

    let domain_min = xs[0];
    let domain_max = xs[xs.len() - 1];
    let half_span = 0.5 * (domain_max - domain_min);
    let mid = 0.5 * (domain_max + domain_min);

    let n = xs.len();
    let vandermonde = DMatrix::from_fn(n, degree + 1, |i, j| {
        let t = (xs[i] - mid) / half_span;
        t.powi(j as i32)
    });
    let rhs = DVector::from_column_slice(ys);

    let svd = vandermonde.svd(true, true);
    let solution = svd
        .solve(&rhs, 1e-12)
        .map_err(|e| CoreError::Construction(format!("least-squares solve failed: {}", e)))?;

    Ok(PolyModel {
        coefficients: solution.iter().copied().collect(),
        domain_min,
        domain_max,
    })
}

impl PolyModel {
    pub fn domain(&self) -> (f64, f64) {
        (self.domain_min, self.domain_max)
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Evaluate the model at `x` without a domain check.
    pub fn eval(&self, x: f64) -> f64 {
        let half_span = 0.5 * (self.domain_max - self.domain_min);
        let mid = 0.5 * (self.domain_max + self.domain_min);
        let t = (x - mid) / half_span;
        // Horner scheme over the normalized coordinate.
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * t + c)
    }

    /// Evaluate at `x`, failing with `OutOfDomain` outside the fitted range.
    ///
    /// The fitter never extrapolates silently; callers that want
    /// extrapolation must opt in through `eval`.
    pub fn eval_checked(&self, x: f64) -> Result<f64, CoreError> {
        if x < self.domain_min || x > self.domain_max {
            return Err(CoreError::OutOfDomain {
                value: x,
                lo: self.domain_min,
                hi: self.domain_max,
            });
        }
        Ok(self.eval(x))
    }

    /// Bulk evaluation, parallel for long inputs.
    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        if xs.len() >= PAR_THRESHOLD {
            xs.par_iter().map(|&x| self.eval(x)).collect()
        } else {
            xs.iter().map(|&x| self.eval(x)).collect()
        }
    }

    /// Invert the model by bisection, assuming it is monotone over the
    /// fitted domain (true for all instrument axes this crate models).
    ///
    /// Fails with `OutOfDomain` if `y` lies outside the value range the
    /// model spans over its domain.
    pub fn invert(&self, y: f64) -> Result<f64, CoreError> {
        let f_lo = self.eval(self.domain_min);
        let f_hi = self.eval(self.domain_max);
        let increasing = f_hi >= f_lo;
        let (y_min, y_max) = if increasing { (f_lo, f_hi) } else { (f_hi, f_lo) };
        if y < y_min || y > y_max {
            return Err(CoreError::OutOfDomain {
                value: y,
                lo: y_min,
                hi: y_max,
            });
        }

        let mut lo = self.domain_min;
        let mut hi = self.domain_max;
        for _ in 0..64 {
            let mid = 0.5 * (lo + hi);
            let val = self.eval(mid);
            if (val <= y) == increasing {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(0.5 * (lo + hi))
    }
}
