use crate::error::TimsError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Acquisition mode derived from the frame table's scan mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    DDA,
    DIA,
    Unknown,
}

impl From<i64> for AcquisitionMode {
    fn from(scan_mode: i64) -> Self {
        match scan_mode {
            8 => AcquisitionMode::DDA,
            9 => AcquisitionMode::DIA,
            _ => AcquisitionMode::Unknown,
        }
    }
}

impl Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionMode::DDA => write!(f, "DDA"),
            AcquisitionMode::DIA => write!(f, "DIA"),
            AcquisitionMode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Raw storage backend: per-frame tuple extraction.
///
/// One call per frame, `scan_low..scan_high` half-open. Calls block until
/// the backend returns and are issued strictly sequentially; the binding's
/// per-call translation is not guaranteed re-entrant.
pub trait RawFrameSource {
    /// `(scan, mass index, intensity)` tuples recorded for `frame`.
    fn extract_frame_range(
        &self,
        frame: u32,
        scan_low: u32,
        scan_high: u32,
    ) -> Result<Vec<(u32, u32, u32)>, TimsError>;
}

/// Exact per-frame raw-index transforms supplied by the instrument binding.
///
/// Index-valued outputs stay in `f64`; rounding to the unsigned instrument
/// index domain happens once, at the translator boundary, so chained
/// conversions do not compound rounding error.
pub trait IndexOracle {
    fn mz_index_to_mz(&self, frame: u32, mz_indices: &[u32]) -> Vec<f64>;
    fn mz_to_mz_index(&self, frame: u32, mz_values: &[f64]) -> Vec<f64>;
    fn scan_to_ion_mobility(&self, frame: u32, scans: &[u32]) -> Vec<f64>;
    fn ion_mobility_to_scan(&self, frame: u32, ion_mobilities: &[f64]) -> Vec<f64>;
}

/// Boundary-derived linear oracle.
///
/// m/z follows the square-root law `sqrt(mz) = intercept + slope * index`;
/// ion mobility falls linearly with scan number (scan 0 sits at the upper
/// 1/K0 bound). Frame-independent, so it doubles as the bulk-estimation
/// fallback when no calibrated binding is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearIndexOracle {
    pub tof_intercept: f64,
    pub tof_slope: f64,
    pub scan_intercept: f64,
    pub scan_slope: f64,
}

impl LinearIndexOracle {
    pub fn from_boundaries(
        mz_min: f64,
        mz_max: f64,
        tof_max_index: u32,
        im_min: f64,
        im_max: f64,
        scan_max_index: u32,
    ) -> Self {
        let tof_intercept = mz_min.sqrt();
        let tof_slope = (mz_max.sqrt() - tof_intercept) / tof_max_index as f64;

        let scan_intercept = im_max;
        let scan_slope = (im_min - scan_intercept) / scan_max_index as f64;

        LinearIndexOracle {
            tof_intercept,
            tof_slope,
            scan_intercept,
            scan_slope,
        }
    }
}

impl IndexOracle for LinearIndexOracle {
    fn mz_index_to_mz(&self, _frame: u32, mz_indices: &[u32]) -> Vec<f64> {
        mz_indices
            .iter()
            .map(|&idx| (self.tof_intercept + self.tof_slope * idx as f64).powi(2))
            .collect()
    }

    fn mz_to_mz_index(&self, _frame: u32, mz_values: &[f64]) -> Vec<f64> {
        mz_values
            .iter()
            .map(|&mz| (mz.sqrt() - self.tof_intercept) / self.tof_slope)
            .collect()
    }

    fn scan_to_ion_mobility(&self, _frame: u32, scans: &[u32]) -> Vec<f64> {
        scans
            .iter()
            .map(|&scan| self.scan_intercept + self.scan_slope * scan as f64)
            .collect()
    }

    fn ion_mobility_to_scan(&self, _frame: u32, ion_mobilities: &[f64]) -> Vec<f64> {
        ion_mobilities
            .iter()
            .map(|&im| (im - self.scan_intercept) / self.scan_slope)
            .collect()
    }
}
