use crate::data::handle::{AcquisitionMode, IndexOracle, LinearIndexOracle, RawFrameSource};
use crate::data::meta::{open_tdf_connection, read_frame_meta_sql, read_global_meta_sql, FrameMeta};
use crate::data::select::{normalize, FrameSelector, ScanSelector};
use crate::data::translate::{CoordinateTranslator, FitConfig};
use crate::error::TimsError;
use std::sync::OnceLock;
use timscore::data::table::PeakTable;
use tracing::{debug, info};

/// One acquisition session: frame table, coordinate translator and the
/// raw-extraction backend.
///
/// Everything except the memoized aggregates is built at construction and
/// immutable afterwards; the aggregates are compute-once caches
/// (`OnceLock`), safe to share read-only across threads.
pub struct TimsSession {
    pub frames: Vec<FrameMeta>,
    pub min_frame: u32,
    pub max_frame: u32,
    pub min_scan: u32,
    pub max_scan: u32,
    pub acquisition_mode: AcquisitionMode,
    pub translator: CoordinateTranslator,
    source: Box<dyn RawFrameSource + Send + Sync>,
    total_ion_current: OnceLock<f64>,
    total_peak_count: OnceLock<u64>,
    ms1_frames: OnceLock<Vec<u32>>,
    ms2_frames: OnceLock<Vec<u32>>,
}

impl TimsSession {
    /// Build a session from an already loaded frame table.
    ///
    /// The frame index must be sorted ascending with no gaps and the scan
    /// count must be constant across frames; violations are fatal
    /// construction errors, not coarsened.
    pub fn new(
        frames: Vec<FrameMeta>,
        tof_max_index: u32,
        source: Box<dyn RawFrameSource + Send + Sync>,
        oracle: Box<dyn IndexOracle + Send + Sync>,
        config: &FitConfig,
    ) -> Result<TimsSession, TimsError> {
        if frames.is_empty() {
            return Err(TimsError::Construction("frame table is empty".to_string()));
        }
        let min_frame = frames[0].id;
        let max_frame = frames[frames.len() - 1].id;
        if frames
            .iter()
            .enumerate()
            .any(|(i, f)| f.id != min_frame + i as u32)
        {
            return Err(TimsError::Construction(
                "frame numbers are not contiguous ascending".to_string(),
            ));
        }

        let num_scans = frames[0].num_scans;
        if frames.iter().any(|f| f.num_scans != num_scans) {
            return Err(TimsError::Construction(
                "scan count is not constant across frames".to_string(),
            ));
        }
        let min_scan = 0;
        let max_scan = num_scans;

        let acquisition_mode = AcquisitionMode::from(frames[0].scan_mode);
        let translator =
            CoordinateTranslator::fit(&frames, max_scan, tof_max_index, oracle, config)?;

        info!(
            frames = frames.len(),
            max_scan,
            mode = %acquisition_mode,
            "session constructed"
        );

        Ok(TimsSession {
            frames,
            min_frame,
            max_frame,
            min_scan,
            max_scan,
            acquisition_mode,
            translator,
            source,
            total_ion_current: OnceLock::new(),
            total_peak_count: OnceLock::new(),
            ms1_frames: OnceLock::new(),
            ms2_frames: OnceLock::new(),
        })
    }

    /// Build a session from the `analysis.tdf` metadata of a `.d` folder,
    /// with a boundary-derived linear oracle.
    pub fn from_tdf(
        d_folder: &str,
        source: Box<dyn RawFrameSource + Send + Sync>,
        config: &FitConfig,
    ) -> Result<TimsSession, TimsError> {
        let conn = open_tdf_connection(d_folder)?;
        let frames = read_frame_meta_sql(&conn)?;
        let global = read_global_meta_sql(&conn)?;
        let scan_count = frames.first().map(|f| f.num_scans).unwrap_or(0);
        let oracle = LinearIndexOracle::from_boundaries(
            global.mz_acquisition_range_lower,
            global.mz_acquisition_range_upper,
            global.tof_max_index,
            global.one_over_k0_range_lower,
            global.one_over_k0_range_upper,
            scan_count,
        );
        TimsSession::new(
            frames,
            global.tof_max_index,
            source,
            Box::new(oracle),
            config,
        )
    }

    pub fn frames_no(&self) -> usize {
        self.frames.len()
    }

    pub fn border_frames(&self) -> (u32, u32) {
        (self.min_frame, self.max_frame)
    }

    pub fn border_scans(&self) -> (u32, u32) {
        (self.min_scan, self.max_scan)
    }

    /// Extract a region as one four-column table.
    ///
    /// Backend calls are issued one frame at a time, in selector order;
    /// frames outside the valid span are skipped, a backend failure
    /// propagates as-is. An empty match yields an empty table with all
    /// four columns, never an absent value.
    pub fn select_region(
        &self,
        frame_selector: &FrameSelector,
        scan_selector: &ScanSelector,
    ) -> Result<PeakTable, TimsError> {
        let selection = normalize(
            frame_selector,
            scan_selector,
            &self.frames,
            self.min_scan,
            self.max_scan,
        )?;
        self.extract_frames(&selection.frames, selection.scan_low, selection.scan_high)
    }

    /// Sequentially pull `(scan, mass index, intensity)` tuples for each
    /// eligible frame over one scan bound.
    pub(crate) fn extract_frames(
        &self,
        frames: &[u32],
        scan_low: u32,
        scan_high: u32,
    ) -> Result<PeakTable, TimsError> {
        let mut out = PeakTable::new();
        for &frame in frames {
            if frame < self.min_frame || frame > self.max_frame {
                debug!(frame, "skipping out-of-range frame");
                continue;
            }
            for (scan, mz_index, intensity) in
                self.source.extract_frame_range(frame, scan_low, scan_high)?
            {
                out.push(frame, scan, mz_index, intensity);
            }
        }
        Ok(out)
    }

    /// Total ion current over the whole session, computed once.
    pub fn total_ion_current(&self) -> f64 {
        *self
            .total_ion_current
            .get_or_init(|| self.frames.iter().map(|f| f.summed_intensity).sum())
    }

    /// Total number of recorded peaks, computed once.
    pub fn total_peak_count(&self) -> u64 {
        *self
            .total_peak_count
            .get_or_init(|| self.frames.iter().map(|f| f.num_peaks.max(0) as u64).sum())
    }

    /// Frame numbers acquired with the quadrupole off (MS1).
    pub fn ms1_frame_numbers(&self) -> &[u32] {
        self.ms1_frames.get_or_init(|| {
            self.frames
                .iter()
                .filter(|f| f.ms_ms_type == 0)
                .map(|f| f.id)
                .collect()
        })
    }

    /// Frame numbers of DIA fragment acquisitions (MsMsType 9).
    pub fn ms2_frame_numbers(&self) -> &[u32] {
        self.ms2_frames.get_or_init(|| {
            self.frames
                .iter()
                .filter(|f| f.ms_ms_type == 9)
                .map(|f| f.id)
                .collect()
        })
    }
}
