use crate::data::handle::IndexOracle;
use crate::data::meta::FrameMeta;
use crate::error::TimsError;
use serde::{Deserialize, Serialize};
use timscore::algorithm::polyfit::{polyfit, PolyModel};
use timscore::error::CoreError;
use tracing::debug;

/// Fit parameters for the three coordinate models.
///
/// Defaults follow the instrument axes: retention time is smooth but long
/// (degree 5 over every frame), ion mobility is nearly linear (degree 4),
/// and m/z follows the square-root law closely (degree 2 over a coarse
/// ~1000-point mass-index grid).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    pub frame_rt_degree: usize,
    pub scan_im_degree: usize,
    pub mz_index_degree: usize,
    pub mz_index_grid_points: usize,
    pub reference_frame: u32,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            frame_rt_degree: 5,
            scan_im_degree: 4,
            mz_index_degree: 2,
            mz_index_grid_points: 1000,
            reference_frame: 1,
        }
    }
}

/// Bidirectional conversion between raw instrument indices and physical
/// units.
///
/// The oracle is the exact, per-frame path; the fitted models are the
/// bulk-estimation path used whenever index-side reasoning must not call
/// into the binding per element. Both are built once and immutable for
/// the session's lifetime.
pub struct CoordinateTranslator {
    oracle: Box<dyn IndexOracle + Send + Sync>,
    rt_by_frame: Vec<f64>,
    min_frame: u32,
    max_frame: u32,
    frame_to_rt_model: PolyModel,
    scan_to_im_model: PolyModel,
    mz_index_to_mz_model: PolyModel,
}

impl CoordinateTranslator {
    /// Fit all three models and wrap the oracle.
    ///
    /// `frames` must be sorted ascending by frame number with ascending
    /// retention times; scan and mass-index grids are sampled through the
    /// oracle at `config.reference_frame`.
    pub fn fit(
        frames: &[FrameMeta],
        max_scan: u32,
        tof_max_index: u32,
        oracle: Box<dyn IndexOracle + Send + Sync>,
        config: &FitConfig,
    ) -> Result<CoordinateTranslator, TimsError> {
        if frames.is_empty() {
            return Err(TimsError::Construction(
                "cannot fit coordinate models without frames".to_string(),
            ));
        }
        let rt_by_frame: Vec<f64> = frames.iter().map(|f| f.rt).collect();
        if rt_by_frame.windows(2).any(|w| w[0] > w[1]) {
            return Err(TimsError::Construction(
                "retention times are not ascending in frame order".to_string(),
            ));
        }
        let min_frame = frames[0].id;
        let max_frame = frames[frames.len() - 1].id;

        let frame_grid: Vec<f64> = frames.iter().map(|f| f.id as f64).collect();
        let frame_to_rt_model = polyfit(&frame_grid, &rt_by_frame, config.frame_rt_degree)?;
        debug!(
            degree = config.frame_rt_degree,
            points = frame_grid.len(),
            "fitted frame -> retention time model"
        );

        let scans: Vec<u32> = (0..=max_scan).collect();
        let scan_grid: Vec<f64> = scans.iter().map(|&s| s as f64).collect();
        let ims = oracle.scan_to_ion_mobility(config.reference_frame, &scans);
        let scan_to_im_model = polyfit(&scan_grid, &ims, config.scan_im_degree)?;
        debug!(
            degree = config.scan_im_degree,
            points = scan_grid.len(),
            "fitted scan -> ion mobility model"
        );

        // Coarse stride over the full mass-index domain; fitting every TOF
        // index would be needlessly expensive.
        let stride = (tof_max_index as usize / config.mz_index_grid_points).max(1);
        let indices: Vec<u32> = (0..=tof_max_index).step_by(stride).collect();
        let index_grid: Vec<f64> = indices.iter().map(|&i| i as f64).collect();
        let mzs = oracle.mz_index_to_mz(config.reference_frame, &indices);
        let mz_index_to_mz_model = polyfit(&index_grid, &mzs, config.mz_index_degree)?;
        debug!(
            degree = config.mz_index_degree,
            points = index_grid.len(),
            "fitted mass index -> m/z model"
        );

        Ok(CoordinateTranslator {
            oracle,
            rt_by_frame,
            min_frame,
            max_frame,
            frame_to_rt_model,
            scan_to_im_model,
            mz_index_to_mz_model,
        })
    }

    pub fn max_rt(&self) -> f64 {
        *self.rt_by_frame.last().unwrap_or(&0.0)
    }

    /// Exact retention time of each frame, from the frame table.
    pub fn frame_to_rt(&self, frames: &[u32]) -> Result<Vec<f64>, TimsError> {
        frames
            .iter()
            .map(|&f| {
                if f < self.min_frame || f > self.max_frame {
                    return Err(CoreError::OutOfDomain {
                        value: f as f64,
                        lo: self.min_frame as f64,
                        hi: self.max_frame as f64,
                    }
                    .into());
                }
                Ok(self.rt_by_frame[(f - self.min_frame) as usize])
            })
            .collect()
    }

    /// Monotone search over the ascending retention-time column.
    ///
    /// Queries outside `[0, max rt]` fail with `OutOfDomain`; nothing is
    /// silently clamped.
    pub fn rt_to_frame(&self, rts: &[f64]) -> Result<Vec<u32>, TimsError> {
        let max_rt = self.max_rt();
        rts.iter()
            .map(|&rt| {
                if !(0.0..=max_rt).contains(&rt) {
                    return Err(CoreError::OutOfDomain {
                        value: rt,
                        lo: 0.0,
                        hi: max_rt,
                    }
                    .into());
                }
                let idx = self.rt_by_frame.partition_point(|&r| r < rt);
                Ok(self.min_frame + idx as u32)
            })
            .collect()
    }

    pub fn scan_to_ion_mobility(&self, frame: u32, scans: &[u32]) -> Vec<f64> {
        self.oracle.scan_to_ion_mobility(frame, scans)
    }

    /// Oracle conversion, rounded to the scan domain at the boundary.
    pub fn ion_mobility_to_scan(&self, frame: u32, ion_mobilities: &[f64]) -> Vec<u32> {
        self.oracle
            .ion_mobility_to_scan(frame, ion_mobilities)
            .into_iter()
            .map(|s| s.round().max(0.0) as u32)
            .collect()
    }

    pub fn mz_index_to_mz(&self, frame: u32, mz_indices: &[u32]) -> Vec<f64> {
        self.oracle.mz_index_to_mz(frame, mz_indices)
    }

    /// Oracle conversion, rounded to the mass-index domain at the boundary.
    pub fn mz_to_mz_index(&self, frame: u32, mz_values: &[f64]) -> Vec<u32> {
        self.oracle
            .mz_to_mz_index(frame, mz_values)
            .into_iter()
            .map(|i| i.round().max(0.0) as u32)
            .collect()
    }

    /// Fitted models: the pure, backend-free estimation path.
    pub fn frame_rt_model(&self) -> &PolyModel {
        &self.frame_to_rt_model
    }

    pub fn scan_im_model(&self) -> &PolyModel {
        &self.scan_to_im_model
    }

    pub fn mz_index_mz_model(&self) -> &PolyModel {
        &self.mz_index_to_mz_model
    }

    /// Model-side m/z to mass-index inversion, without touching the oracle.
    pub fn model_mz_to_mz_index(&self, mz: f64) -> Result<f64, TimsError> {
        Ok(self.mz_index_to_mz_model.invert(mz)?)
    }
}
