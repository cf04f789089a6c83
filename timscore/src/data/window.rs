use crate::error::CoreError;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Window group id of the synthetic MS1 pass (quadrupole off).
pub const PRECURSOR_WINDOW_GROUP: u32 = 0;

/// Stripe sentinel assigned to the synthetic MS1 window.
pub const PRECURSOR_STRIPE: i32 = -1;

/// One isolation window as described by the instrument, before indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationWindow {
    pub window_group: u32,
    pub scan_min: u32,
    pub scan_max: u32,
    pub isolation_mz: f64,
    pub isolation_width: f64,
}

/// A fully indexed isolation window.
///
/// `left`/`right` map the window onto the global m/z boundary grid
/// (`right` carries a +1 offset so it can be used as an exclusive slice
/// end). `prev_left`/`prev_right` are the grid indices of the window
/// preceding this one in window-id order, wrapping at the front so that
/// overlap-aware consumers can always look one acquisition step back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRow {
    pub window: u32,
    pub window_group: u32,
    pub scan_min: u32,
    pub scan_max: u32,
    pub mz_left: f64,
    pub mz_right: f64,
    pub left: usize,
    pub right: usize,
    pub prev_left: usize,
    pub prev_right: usize,
    pub stripe: i32,
    pub im_min: f64,
    pub im_max: f64,
}

/// Reverse-lookup entry: closed scan interval to window, per group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanLimit {
    pub window_group: u32,
    pub scan_min: u32,
    pub scan_max: u32,
    pub window: u32,
    pub left: usize,
    pub right: usize,
    pub prev_left: usize,
    pub prev_right: usize,
}

/// The DIA window index: window table, global m/z boundary grid, stripe
/// assignment and the scan-limits interval index.
///
/// Built once per acquisition session and immutable afterwards, so it can
/// be shared read-only across threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowTable {
    pub rows: Vec<WindowRow>,
    pub grid: Vec<f64>,
    pub min_scan: u32,
    pub max_scan: u32,
    pub windows_per_group: usize,
    pub stripes_no: usize,
    scan_limits: Vec<ScanLimit>,
}

impl WindowTable {
    /// Build the index from the instrument's window description.
    ///
    /// `scan_to_im` translates a scan number into its ion mobility; the
    /// caller supplies the session's translator so this crate stays free
    /// of instrument bindings.
    ///
    /// Window groups must all carry the same number of windows; a
    /// non-uniform description is a hard construction error rather than
    /// being coarsened to the maximum group size.
    pub fn build<F>(windows: &[IsolationWindow], scan_to_im: F) -> Result<WindowTable, CoreError>
    where
        F: Fn(u32) -> f64,
    {
        if windows.is_empty() {
            return Err(CoreError::Construction(
                "window description is empty".to_string(),
            ));
        }
        if windows
            .iter()
            .any(|w| w.window_group == PRECURSOR_WINDOW_GROUP)
        {
            return Err(CoreError::Construction(format!(
                "window group {} is reserved for the synthetic MS1 window",
                PRECURSOR_WINDOW_GROUP
            )));
        }
        if let Some(bad) = windows.iter().find(|w| w.scan_min > w.scan_max) {
            return Err(CoreError::Construction(format!(
                "window in group {} has scan_min {} > scan_max {}",
                bad.window_group, bad.scan_min, bad.scan_max
            )));
        }

        let mut sorted: Vec<IsolationWindow> = windows.to_vec();
        sorted.sort_by_key(|w| (w.window_group, w.scan_min));

        let group_counts = sorted.iter().counts_by(|w| w.window_group);
        let per_group: Vec<usize> = group_counts.values().copied().unique().collect();
        if per_group.len() != 1 {
            return Err(CoreError::Construction(format!(
                "window groups carry non-uniform window counts: {:?}",
                group_counts
            )));
        }
        let windows_per_group = per_group[0];
        let max_group = sorted.last().map(|w| w.window_group).unwrap_or(0);

        let min_scan = sorted.iter().map(|w| w.scan_min).min().unwrap_or(0);
        let max_scan = sorted.iter().map(|w| w.scan_max).max().unwrap_or(0);

        // Window 0 is the quadrupole-off MS1 pass over the full scan range.
        let mut rows: Vec<WindowRow> = Vec::with_capacity(sorted.len() + 1);
        rows.push(WindowRow {
            window: 0,
            window_group: PRECURSOR_WINDOW_GROUP,
            scan_min: min_scan,
            scan_max: max_scan,
            mz_left: 0.0,
            mz_right: f64::INFINITY,
            left: 0,
            right: 0,
            prev_left: 0,
            prev_right: 0,
            stripe: PRECURSOR_STRIPE,
            im_min: 0.0,
            im_max: 0.0,
        });
        for (i, w) in sorted.iter().enumerate() {
            rows.push(WindowRow {
                window: (i + 1) as u32,
                window_group: w.window_group,
                scan_min: w.scan_min,
                scan_max: w.scan_max,
                mz_left: w.isolation_mz - w.isolation_width / 2.0,
                mz_right: w.isolation_mz + w.isolation_width / 2.0,
                left: 0,
                right: 0,
                prev_left: 0,
                prev_right: 0,
                stripe: 0,
                im_min: 0.0,
                im_max: 0.0,
            });
        }

        // Stripe assignment in a single pass: the cycle length is known
        // once the full table is assembled.
        let stripes_no = (rows.len() - 1) / max_group as usize;
        if stripes_no == 0 {
            return Err(CoreError::Construction(format!(
                "cannot derive stripe count from {} windows over {} groups",
                rows.len() - 1,
                max_group
            )));
        }
        for row in rows.iter_mut().skip(1) {
            row.stripe = ((row.window as usize - 1) % stripes_no) as i32;
        }

        // Global boundary grid over every mz_left/mz_right, MS1 included.
        let boundaries: BTreeSet<OrderedFloat<f64>> = rows
            .iter()
            .flat_map(|r| [OrderedFloat(r.mz_left), OrderedFloat(r.mz_right)])
            .collect();
        let grid: Vec<f64> = boundaries.into_iter().map(|b| b.into_inner()).collect();

        for row in rows.iter_mut() {
            row.left = grid.partition_point(|&g| g < row.mz_left);
            row.right = grid.partition_point(|&g| g < row.mz_right) + 1;
        }

        // Previous-window grid indices, wrapping at the front: windows 0
        // and 1 both point back to the last window of the cycle.
        let last = rows.len() - 1;
        let prev: Vec<(usize, usize)> = (0..rows.len())
            .map(|i| {
                let p = if i <= 1 { last } else { i - 1 };
                (rows[p].left, rows[p].right)
            })
            .collect();
        for (row, (pl, pr)) in rows.iter_mut().zip(prev) {
            row.prev_left = pl;
            row.prev_right = pr;
        }

        // Physical ion-mobility bounds. Scan number and 1/K0 run in
        // opposite directions, so sort the pair.
        for row in rows.iter_mut() {
            let a = scan_to_im(row.scan_min);
            let b = scan_to_im(row.scan_max);
            row.im_min = a.min(b);
            row.im_max = a.max(b);
        }

        // Reverse lookup over post-quadrupole windows only.
        let mut scan_limits: Vec<ScanLimit> = rows
            .iter()
            .filter(|r| r.window >= 1)
            .map(|r| ScanLimit {
                window_group: r.window_group,
                scan_min: r.scan_min,
                scan_max: r.scan_max,
                window: r.window,
                left: r.left,
                right: r.right,
                prev_left: r.prev_left,
                prev_right: r.prev_right,
            })
            .collect();
        scan_limits.sort_by_key(|s| (s.window_group, s.scan_min));

        Ok(WindowTable {
            rows,
            grid,
            min_scan,
            max_scan,
            windows_per_group,
            stripes_no,
            scan_limits,
        })
    }

    /// Point lookup: which window of `window_group` recorded `scan`?
    ///
    /// Intervals are closed on both ends; `None` means the scan falls in a
    /// gap of the group's coverage.
    pub fn window_for_scan(&self, scan: u32, window_group: u32) -> Option<u32> {
        self.scan_limit_for(scan, window_group).map(|s| s.window)
    }

    /// Full reverse-lookup record for a scan, if any interval contains it.
    pub fn scan_limit_for(&self, scan: u32, window_group: u32) -> Option<&ScanLimit> {
        let start = self
            .scan_limits
            .partition_point(|s| s.window_group < window_group);
        self.scan_limits[start..]
            .iter()
            .take_while(|s| s.window_group == window_group)
            .find(|s| s.scan_min <= scan && scan <= s.scan_max)
    }

    /// All windows whose `[mz_left, mz_right)` intersects `[min_mz, max_mz)`.
    ///
    /// The synthetic MS1 window spans `(0, +inf)` and therefore matches
    /// every non-empty query.
    pub fn windows_covering_mz_range(&self, min_mz: f64, max_mz: f64) -> Vec<u32> {
        self.rows
            .iter()
            .filter(|r| r.mz_left < max_mz && min_mz < r.mz_right)
            .map(|r| r.window)
            .collect()
    }

    /// Windows belonging to one window group, MS1 window excluded.
    pub fn windows_in_group(&self, window_group: u32) -> Vec<&WindowRow> {
        self.rows
            .iter()
            .filter(|r| r.window >= 1 && r.window_group == window_group)
            .collect()
    }

    pub fn window_count(&self) -> usize {
        self.rows.len()
    }

    pub fn group_count(&self) -> usize {
        (self.rows.len() - 1) / self.windows_per_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn im(scan: u32) -> f64 {
        1.5 - 0.1 * scan as f64
    }

    fn two_window_group() -> Vec<IsolationWindow> {
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

    #[test]
    fn test_single_group_layout() {
        let table = WindowTable::build(&two_window_group(), im).unwrap();

        assert_eq!(table.window_count(), 3);
        assert_eq!(table.windows_per_group, 2);
        assert_eq!(table.stripes_no, 2);
        assert_eq!(table.grid, vec![0.0, 100.0, 200.0, 300.0, f64::INFINITY]);

        assert_eq!(table.window_for_scan(3, 1), Some(1));
        assert_eq!(table.window_for_scan(7, 1), Some(2));
        // group 0 has no post-quadrupole intervals
        assert_eq!(table.window_for_scan(3, 0), None);
    }

    #[test]
    fn test_grid_mapping_and_stripes() {
        let table = WindowTable::build(&two_window_group(), im).unwrap();

        let ms1 = &table.rows[0];
        assert_eq!((ms1.left, ms1.right), (0, 5));
        assert_eq!(ms1.stripe, PRECURSOR_STRIPE);
        assert_eq!((ms1.scan_min, ms1.scan_max), (0, 10));
        assert!(ms1.mz_right.is_infinite());

        let w1 = &table.rows[1];
        assert_eq!((w1.left, w1.right), (1, 3));
        assert_eq!(w1.stripe, 0);

        let w2 = &table.rows[2];
        assert_eq!((w2.left, w2.right), (2, 4));
        assert_eq!(w2.stripe, 1);

        // grid strictly ascending, every window left < right
        assert!(table.grid.windows(2).all(|w| w[0] < w[1]));
        assert!(table.rows.iter().all(|r| r.left < r.right));
    }

    #[test]
    fn test_previous_window_wraps_at_front() {
        let table = WindowTable::build(&two_window_group(), im).unwrap();
        let last = table.rows.last().unwrap();
        let (ll, lr) = (last.left, last.right);

        assert_eq!((table.rows[0].prev_left, table.rows[0].prev_right), (ll, lr));
        assert_eq!((table.rows[1].prev_left, table.rows[1].prev_right), (ll, lr));
        assert_eq!(
            (table.rows[2].prev_left, table.rows[2].prev_right),
            (table.rows[1].left, table.rows[1].right)
        );
    }

    #[test]
    fn test_ion_mobility_bounds_are_sorted() {
        let table = WindowTable::build(&two_window_group(), im).unwrap();
        for row in &table.rows {
            assert!(row.im_min <= row.im_max);
        }
        // scan 0 maps to the highest 1/K0 of window 1
        assert!((table.rows[1].im_max - 1.5).abs() < 1e-12);
        assert!((table.rows[1].im_min - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mz_range_queries_are_idempotent_and_complete() {
        let table = WindowTable::build(&two_window_group(), im).unwrap();

        let hit = table.windows_covering_mz_range(150.0, 250.0);
        assert_eq!(hit, vec![0, 1, 2]);
        assert_eq!(table.windows_covering_mz_range(150.0, 250.0), hit);

        // window 1 ends (half-open) at 200
        assert_eq!(table.windows_covering_mz_range(200.0, 250.0), vec![0, 2]);
        // beyond every isolation window, only MS1 remains
        assert_eq!(table.windows_covering_mz_range(300.0, 400.0), vec![0]);
    }

    #[test]
    fn test_non_uniform_groups_rejected() {
        let mut windows = two_window_group();
        windows.push(IsolationWindow {
            window_group: 2,
            scan_min: 0,
            scan_max: 10,
            isolation_mz: 400.0,
            isolation_width: 50.0,
        });
        assert!(matches!(
            WindowTable::build(&windows, im),
            Err(CoreError::Construction(_))
        ));
    }

    #[test]
    fn test_reserved_group_and_empty_input_rejected() {
        assert!(matches!(
            WindowTable::build(&[], im),
            Err(CoreError::Construction(_))
        ));

        let bad = vec![IsolationWindow {
            window_group: PRECURSOR_WINDOW_GROUP,
            scan_min: 0,
            scan_max: 10,
            isolation_mz: 100.0,
            isolation_width: 10.0,
        }];
        assert!(matches!(
            WindowTable::build(&bad, im),
            Err(CoreError::Construction(_))
        ));
    }

    #[test]
    fn test_two_groups_interleave_stripes() {
        let mut windows = two_window_group();
        windows.push(IsolationWindow {
            window_group: 2,
            scan_min: 0,
            scan_max: 5,
            isolation_mz: 350.0,
            isolation_width: 100.0,
        });
        windows.push(IsolationWindow {
            window_group: 2,
            scan_min: 5,
            scan_max: 10,
            isolation_mz: 450.0,
            isolation_width: 100.0,
        });
        let table = WindowTable::build(&windows, im).unwrap();

        assert_eq!(table.windows_per_group, 2);
        assert_eq!(table.group_count(), 2);
        // 4 windows over 2 groups: cycle length 2
        assert_eq!(table.stripes_no, 2);
        let stripes: Vec<i32> = table.rows.iter().map(|r| r.stripe).collect();
        assert_eq!(stripes, vec![PRECURSOR_STRIPE, 0, 1, 0, 1]);

        assert_eq!(table.window_for_scan(7, 2), Some(4));
        assert_eq!(table.windows_in_group(2).len(), 2);
    }
}
