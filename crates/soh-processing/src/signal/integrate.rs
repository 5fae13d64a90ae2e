//! Cumulative numerical integration.

use crate::error::{ProcessingError, Result};

/// Cumulative trapezoidal integral of `y` over `x`.
///
/// The result has the same length as the inputs and starts at `0.0`. A
/// single sample integrates to `[0.0]`, an empty input to an empty vector.
///
/// # Errors
///
/// Returns [`ProcessingError::LengthMismatch`] if `x` and `y` differ in length.
pub fn cumulative_trapezoid(y: &[f64], x: &[f64]) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        return Err(ProcessingError::LengthMismatch {
            column: "integration abscissa".to_string(),
            expected: y.len(),
            actual: x.len(),
        });
    }

    let mut out = Vec::with_capacity(y.len());
    if y.is_empty() {
        return Ok(out);
    }

    let mut acc = 0.0;
    out.push(acc);
    for k in 1..y.len() {
        acc += (x[k] - x[k - 1]) * (y[k] + y[k - 1]) / 2.0;
        out.push(acc);
    }
    Ok(out)
}

/// Shift every value of a cumulative series by `initial`.
pub fn offset(mut values: Vec<f64>, initial: f64) -> Vec<f64> {
    if initial != 0.0 {
        values.iter_mut().for_each(|v| *v += initial);
    }
    values
}
