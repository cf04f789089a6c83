use crate::data::dataset::TimsSession;
use crate::data::handle::{IndexOracle, RawFrameSource};
use crate::data::meta::{
    open_tdf_connection, read_dia_window_group_sql, read_dia_windows_sql, read_frame_meta_sql,
    read_global_meta_sql, FrameMeta, FrameWindowGroup,
};
use crate::data::select::{normalize, FrameSelector, ScanSelector};
use crate::data::translate::FitConfig;
use crate::error::TimsError;
use timscore::data::table::PeakTable;
use timscore::data::window::{IsolationWindow, WindowTable, PRECURSOR_WINDOW_GROUP};
use tracing::{debug, info};

/// A Data-Independent-Acquisition session.
///
/// On top of the base session this carries the frame to window-group
/// assignment and the fully indexed window table, both built once at
/// construction.
pub struct TimsSessionDia {
    pub session: TimsSession,
    pub windows: WindowTable,
}

impl TimsSessionDia {
    pub fn new(
        mut frames: Vec<FrameMeta>,
        window_groups: &[FrameWindowGroup],
        isolation_windows: &[IsolationWindow],
        tof_max_index: u32,
        source: Box<dyn RawFrameSource + Send + Sync>,
        oracle: Box<dyn IndexOracle + Send + Sync>,
        config: &FitConfig,
    ) -> Result<TimsSessionDia, TimsError> {
        if frames.is_empty() {
            return Err(TimsError::Construction("frame table is empty".to_string()));
        }
        let min_frame = frames[0].id;
        let max_frame = frames[frames.len() - 1].id;

        // Frames without an assignment stay in group 0 (quadrupole off).
        for assignment in window_groups {
            if assignment.frame < min_frame || assignment.frame > max_frame {
                debug!(
                    frame = assignment.frame,
                    "window-group assignment references an unknown frame"
                );
                continue;
            }
            frames[(assignment.frame - min_frame) as usize].window_group =
                assignment.window_group;
        }

        let mut session = TimsSession::new(frames, tof_max_index, source, oracle, config)?;

        let reference_frame = config.reference_frame;
        let windows = WindowTable::build(isolation_windows, |scan| {
            session.translator.scan_to_ion_mobility(reference_frame, &[scan])[0]
        })?;

        // The DIA scan borders come from the window description, not from
        // the frame table.
        session.min_scan = windows.min_scan;
        session.max_scan = windows.max_scan;

        info!(
            windows = windows.window_count(),
            groups = windows.group_count(),
            stripes = windows.stripes_no,
            "DIA window index constructed"
        );

        Ok(TimsSessionDia { session, windows })
    }

    /// Build the DIA session from the `analysis.tdf` metadata of a `.d`
    /// folder, with a boundary-derived linear oracle.
    pub fn from_tdf(
        d_folder: &str,
        source: Box<dyn RawFrameSource + Send + Sync>,
        config: &FitConfig,
    ) -> Result<TimsSessionDia, TimsError> {
        let conn = open_tdf_connection(d_folder)?;
        let frames = read_frame_meta_sql(&conn)?;
        let global = read_global_meta_sql(&conn)?;
        let window_groups = read_dia_window_group_sql(&conn)?;
        let isolation_windows = read_dia_windows_sql(&conn)?;
        let scan_count = frames.first().map(|f| f.num_scans).unwrap_or(0);
        let oracle = crate::data::handle::LinearIndexOracle::from_boundaries(
            global.mz_acquisition_range_lower,
            global.mz_acquisition_range_upper,
            global.tof_max_index,
            global.one_over_k0_range_lower,
            global.one_over_k0_range_upper,
            scan_count,
        );
        TimsSessionDia::new(
            frames,
            &window_groups,
            &isolation_windows,
            global.tof_max_index,
            source,
            Box::new(oracle),
            config,
        )
    }

    /// Window-group of a frame; 0 for MS1 frames, `None` outside the span.
    pub fn frame_window_group(&self, frame: u32) -> Option<u32> {
        if frame < self.session.min_frame || frame > self.session.max_frame {
            return None;
        }
        Some(self.session.frames[(frame - self.session.min_frame) as usize].window_group)
    }

    pub fn window_for_scan(&self, scan: u32, window_group: u32) -> Option<u32> {
        self.windows.window_for_scan(scan, window_group)
    }

    pub fn windows_covering_mz_range(&self, min_mz: f64, max_mz: f64) -> Vec<u32> {
        self.windows.windows_covering_mz_range(min_mz, max_mz)
    }

    /// Plain region extraction, same contract as the base session.
    pub fn select_region(
        &self,
        frame_selector: &FrameSelector,
        scan_selector: &ScanSelector,
    ) -> Result<PeakTable, TimsError> {
        self.session.select_region(frame_selector, scan_selector)
    }

    /// Window-aware extraction.
    ///
    /// Frames are filtered to the requested window groups (group 0 selects
    /// the MS1 frames); under a window subselection each eligible frame is
    /// extracted once per matched window row of its group, over that
    /// window's scan bounds. Without either subselection this is a plain
    /// full-scan extraction.
    pub fn select_windows(
        &self,
        frame_selector: &FrameSelector,
        window_groups: Option<&[u32]>,
        window_ids: Option<&[u32]>,
    ) -> Result<PeakTable, TimsError> {
        if window_groups.is_none() && window_ids.is_none() {
            return self.select_region(frame_selector, &ScanSelector::All);
        }

        let selection = normalize(
            frame_selector,
            &ScanSelector::All,
            &self.session.frames,
            self.session.min_scan,
            self.session.max_scan,
        )?;

        let mut out = PeakTable::new();
        for &frame in &selection.frames {
            if frame < self.session.min_frame || frame > self.session.max_frame {
                debug!(frame, "skipping out-of-range frame");
                continue;
            }
            let group = self.session.frames[(frame - self.session.min_frame) as usize]
                .window_group;
            if let Some(groups) = window_groups {
                if !groups.contains(&group) {
                    continue;
                }
            }

            match window_ids {
                Some(ids) => {
                    if group == PRECURSOR_WINDOW_GROUP {
                        // MS1 frames carry no post-quadrupole windows.
                        if ids.contains(&0) {
                            let mut part = self.session.extract_frames(
                                &[frame],
                                selection.scan_low,
                                selection.scan_high,
                            )?;
                            out.append(&mut part);
                        }
                        continue;
                    }
                    for row in self.windows.windows_in_group(group) {
                        if !ids.contains(&row.window) {
                            continue;
                        }
                        let mut part = self.session.extract_frames(
                            &[frame],
                            row.scan_min,
                            row.scan_max,
                        )?;
                        out.append(&mut part);
                    }
                }
                None => {
                    let mut part = self.session.extract_frames(
                        &[frame],
                        selection.scan_low,
                        selection.scan_high,
                    )?;
                    out.append(&mut part);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::testing::{fit_config, SyntheticSource};
    use crate::data::handle::LinearIndexOracle;

    fn dia_frames() -> Vec<FrameMeta> {
        // frame 1: MS1; frames 2 and 3: DIA fragment frames of group 1
        (1..=3)
            .map(|i| FrameMeta {
                id: i,
                rt: 0.1 * i as f64,
                scan_mode: 9,
                ms_ms_type: if i == 1 { 0 } else { 9 },
                num_scans: 10,
                num_peaks: 10,
                summed_intensity: 100.0,
                window_group: 0,
            })
            .collect()
    }

    fn dia_windows() -> Vec<IsolationWindow> {
        vec![
            IsolationWindow {
                window_group: 1,
                scan_min: 0,
                scan_max: 5,
                isolation_mz: 150.0,
                isolation_width: 100.0,
            },
            IsolationWindow {
                window_group: 1,
                scan_min: 5,
                scan_max: 10,
                isolation_mz: 250.0,
                isolation_width: 100.0,
            },
        ]
    }

    fn dia_session() -> TimsSessionDia {
        let assignments = vec![
            FrameWindowGroup {
                frame: 2,
                window_group: 1,
            },
            FrameWindowGroup {
                frame: 3,
                window_group: 1,
            },
        ];
        let oracle = LinearIndexOracle::from_boundaries(100.0, 1700.0, 40_000, 0.6, 1.6, 10);
        TimsSessionDia::new(
            dia_frames(),
            &assignments,
            &dia_windows(),
            40_000,
            Box::new(SyntheticSource),
            Box::new(oracle),
            &fit_config(),
        )
        .unwrap()
    }

    #[test]
    fn test_window_index_layout() {
        let dia = dia_session();
        assert_eq!(dia.windows.windows_per_group, 2);
        assert_eq!(dia.windows.stripes_no, 2);
        assert_eq!(
            dia.windows.grid,
            vec![0.0, 100.0, 200.0, 300.0, f64::INFINITY]
        );
        assert_eq!(dia.window_for_scan(3, 1), Some(1));
        assert_eq!(dia.window_for_scan(7, 1), Some(2));
    }

    #[test]
    fn test_frame_window_groups_after_merge() {
        let dia = dia_session();
        assert_eq!(dia.frame_window_group(1), Some(PRECURSOR_WINDOW_GROUP));
        assert_eq!(dia.frame_window_group(2), Some(1));
        assert_eq!(dia.frame_window_group(3), Some(1));
        assert_eq!(dia.frame_window_group(9), None);
    }

    #[test]
    fn test_select_windows_joins_window_scan_bounds() {
        let dia = dia_session();
        let table = dia
            .select_windows(&FrameSelector::All, Some(&[1]), Some(&[2]))
            .unwrap();

        // frames 2 and 3, window 2 covers scans [5, 10)
        assert_eq!(table.len(), 10);
        assert!(table.frame.iter().all(|&f| f == 2 || f == 3));
        assert!(table.scan.iter().all(|&s| (5..10).contains(&s)));
    }

    #[test]
    fn test_select_windows_group_zero_selects_ms1_frames() {
        let dia = dia_session();
        let table = dia
            .select_windows(&FrameSelector::All, Some(&[PRECURSOR_WINDOW_GROUP]), None)
            .unwrap();
        assert!(!table.is_empty());
        assert!(table.frame.iter().all(|&f| f == 1));
        // full scan bound
        assert_eq!(table.len(), 10);
    }

    #[test]
    fn test_select_windows_without_subselection_is_plain_extraction() {
        let dia = dia_session();
        let all = dia.select_windows(&FrameSelector::All, None, None).unwrap();
        let plain = dia
            .select_region(&FrameSelector::All, &ScanSelector::All)
            .unwrap();
        assert_eq!(all, plain);
    }

    #[test]
    fn test_mz_range_query_spans_groups() {
        let dia = dia_session();
        assert_eq!(dia.windows_covering_mz_range(120.0, 220.0), vec![0, 1, 2]);
        assert_eq!(dia.windows_covering_mz_range(500.0, 600.0), vec![0]);
    }
}
