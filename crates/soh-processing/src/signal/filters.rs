//! Filter strategies for measurement signals.
//!
//! A filter maps an ordered sequence of samples to a sequence of the same
//! length. The pipeline holds one filter per signal (current, voltage,
//! charge); per-cell voltage columns reuse the voltage filter.
//!
//! # Example
//!
//! ```rust,ignore
//! use soh_processing::signal::{ClosureFilter, MovingAverageFilter};
//! use soh_processing::Pipeline;
//!
//! let pipeline = Pipeline::builder()
//!     .voltage_filter(MovingAverageFilter::new(5)?)
//!     .current_filter(ClosureFilter::new("clip", |values: &[f64]| {
//!         values.iter().map(|v| v.clamp(-400.0, 400.0)).collect()
//!     }))
//!     .build()?;
//! ```

use crate::error::{ProcessingError, Result};

/// Trait for filtering a measurement signal.
///
/// Implementations must be `Send + Sync` so a configured pipeline can be
/// moved to another thread. The returned sequence must have the same length
/// as the input; the pipeline rejects anything else.
pub trait SignalFilter: Send + Sync {
    /// Filter the given samples.
    fn apply(&self, values: &[f64]) -> Vec<f64>;

    /// Short name used in logs and summaries.
    fn name(&self) -> &str;
}

/// Filter that returns its input unchanged. This is the default for every slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilter;

impl SignalFilter for IdentityFilter {
    fn apply(&self, values: &[f64]) -> Vec<f64> {
        values.to_vec()
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// A filter backed by a closure.
pub struct ClosureFilter<F>
where
    F: Fn(&[f64]) -> Vec<f64> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> ClosureFilter<F>
where
    F: Fn(&[f64]) -> Vec<f64> + Send + Sync,
{
    /// Creates a new closure-based filter.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> SignalFilter for ClosureFilter<F>
where
    F: Fn(&[f64]) -> Vec<f64> + Send + Sync,
{
    fn apply(&self, values: &[f64]) -> Vec<f64> {
        (self.func)(values)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Bounds of a centered window of `window` samples around `index`,
/// clipped to `0..len`. Returns a half-open range.
fn centered_window(index: usize, window: usize, len: usize) -> (usize, usize) {
    let half = window / 2;
    let start = index.saturating_sub(half);
    let end = (index + window - half).min(len);
    (start, end)
}

fn check_window(window: usize) -> Result<()> {
    if window == 0 {
        return Err(ProcessingError::InvalidConfig(
            "filter window must be at least 1 sample".to_string(),
        ));
    }
    Ok(())
}

/// Centered moving average. The window shrinks at both ends of the signal.
#[derive(Debug, Clone, Copy)]
pub struct MovingAverageFilter {
    window: usize,
}

impl MovingAverageFilter {
    pub fn new(window: usize) -> Result<Self> {
        check_window(window)?;
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl SignalFilter for MovingAverageFilter {
    fn apply(&self, values: &[f64]) -> Vec<f64> {
        // Each window is summed on its own so a non-finite or huge sample
        // only affects the windows that contain it.
        (0..values.len())
            .map(|i| {
                let (start, end) = centered_window(i, self.window, values.len());
                values[start..end].iter().sum::<f64>() / (end - start) as f64
            })
            .collect()
    }

    fn name(&self) -> &str {
        "moving_average"
    }
}

/// Centered running median. The window shrinks at both ends of the signal.
#[derive(Debug, Clone, Copy)]
pub struct MedianFilter {
    window: usize,
}

impl MedianFilter {
    pub fn new(window: usize) -> Result<Self> {
        check_window(window)?;
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl SignalFilter for MedianFilter {
    fn apply(&self, values: &[f64]) -> Vec<f64> {
        let mut scratch = Vec::with_capacity(self.window);
        (0..values.len())
            .map(|i| {
                let (start, end) = centered_window(i, self.window, values.len());
                scratch.clear();
                scratch.extend_from_slice(&values[start..end]);
                scratch.sort_by(f64::total_cmp);
                let mid = scratch.len() / 2;
                if scratch.len() % 2 == 0 {
                    (scratch[mid - 1] + scratch[mid]) / 2.0
                } else {
                    scratch[mid]
                }
            })
            .collect()
    }

    fn name(&self) -> &str {
        "median"
    }
}
