use crate::data::meta::FrameMeta;
use crate::error::TimsError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use timscore::error::CoreError;
use tracing::warn;

/// Heterogeneous frame selection, resolved through `normalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FrameSelector {
    /// Every frame of the session.
    All,
    One(u32),
    /// Half-open `[start, stop)` with optional stride; missing bounds
    /// default to the full valid frame span.
    Range {
        start: Option<u32>,
        stop: Option<u32>,
        step: Option<u32>,
    },
    /// Explicit frame numbers, used in the given order.
    List(Vec<u32>),
    /// Predicate over frame metadata, e.g. `"MsMsType == 0"`.
    Where(String),
}

/// Scan selection. Arbitrary collections are approximated by their
/// `[min, max+1)` span; that coarsening is deliberate and logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanSelector {
    All,
    One(u32),
    Range { start: Option<u32>, stop: Option<u32> },
    List(Vec<u32>),
}

/// Canonical form of a region request: frame numbers plus one half-open
/// scan bound applied to every frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub frames: Vec<u32>,
    pub scan_low: u32,
    pub scan_high: u32,
}

/// Resolve selectors against the session's frame table and scan bounds.
///
/// Frame numbers outside the valid span are kept here and skipped later
/// during iteration; scan bounds are clamped into
/// `[min_scan, max_scan - 1]` / `[min_scan, max_scan]`.
pub fn normalize(
    frame_selector: &FrameSelector,
    scan_selector: &ScanSelector,
    frames: &[FrameMeta],
    min_scan: u32,
    max_scan: u32,
) -> Result<Selection, TimsError> {
    if frames.is_empty() {
        return Err(TimsError::Construction(
            "cannot resolve selectors without a frame table".to_string(),
        ));
    }
    let min_frame = frames[0].id;
    let max_frame = frames[frames.len() - 1].id;

    let frame_numbers = match frame_selector {
        FrameSelector::All => (min_frame..=max_frame).collect(),
        FrameSelector::One(f) => vec![*f],
        FrameSelector::Range { start, stop, step } => {
            let start = start.unwrap_or(min_frame);
            let stop = stop.unwrap_or(max_frame + 1);
            let step = step.unwrap_or(1);
            if step == 0 {
                return Err(CoreError::InvalidSelector(
                    "frame range step must be positive".to_string(),
                )
                .into());
            }
            (start..stop).step_by(step as usize).collect()
        }
        FrameSelector::List(list) => list.clone(),
        FrameSelector::Where(expr) => {
            let predicate = FramePredicate::parse(expr)?;
            frames
                .iter()
                .filter(|f| predicate.matches(f))
                .map(|f| f.id)
                .collect()
        }
    };

    let (scan_low, scan_high) = match scan_selector {
        ScanSelector::All => (min_scan, max_scan),
        ScanSelector::One(s) => (*s, *s + 1),
        ScanSelector::Range { start, stop } => {
            (start.unwrap_or(min_scan), stop.unwrap_or(max_scan))
        }
        ScanSelector::List(list) => {
            if list.is_empty() {
                return Err(CoreError::InvalidSelector(
                    "empty scan collection".to_string(),
                )
                .into());
            }
            let lo = *list.iter().min().unwrap_or(&min_scan);
            let hi = *list.iter().max().unwrap_or(&max_scan);
            if list.len() > 1 {
                warn!(
                    scan_low = lo,
                    scan_high = hi + 1,
                    "scan collection approximated by its min/max span"
                );
            }
            (lo, hi + 1)
        }
    };

    // Safety clamp into the instrument scan domain.
    let scan_low = scan_low.clamp(min_scan, max_scan.saturating_sub(1));
    let scan_high = scan_high.min(max_scan).max(min_scan);

    Ok(Selection {
        frames: frame_numbers,
        scan_low,
        scan_high,
    })
}

/// One comparison of a frame-metadata field against a numeric literal.
#[derive(Debug, Clone)]
struct FramePredicate {
    field: Field,
    op: Op,
    value: f64,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    MsMsType,
    ScanMode,
    NumScans,
    NumPeaks,
    WindowGroup,
    Rt,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

impl FramePredicate {
    fn parse(expr: &str) -> Result<FramePredicate, TimsError> {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^\s*(\w+)\s*(==|!=|<=|>=|<|>)\s*([-+]?\d+(?:\.\d+)?)\s*$")
                .expect("predicate regex is valid")
        });
        let caps = RE.captures(expr).ok_or_else(|| {
            CoreError::InvalidSelector(format!("unparsable frame predicate {:?}", expr))
        })?;

        let field = match &caps[1] {
            "MsMsType" => Field::MsMsType,
            "ScanMode" => Field::ScanMode,
            "NumScans" => Field::NumScans,
            "NumPeaks" => Field::NumPeaks,
            "WindowGroup" => Field::WindowGroup,
            "Time" | "rt" => Field::Rt,
            other => {
                return Err(CoreError::InvalidSelector(format!(
                    "unknown frame field {:?}",
                    other
                ))
                .into())
            }
        };
        let op = match &caps[2] {
            "==" => Op::Eq,
            "!=" => Op::Ne,
            "<=" => Op::Le,
            ">=" => Op::Ge,
            "<" => Op::Lt,
            ">" => Op::Gt,
            _ => unreachable!("regex restricts operators"),
        };
        let value: f64 = caps[3].parse().map_err(|_| {
            CoreError::InvalidSelector(format!("unparsable literal in {:?}", expr))
        })?;

        Ok(FramePredicate { field, op, value })
    }

    fn matches(&self, frame: &FrameMeta) -> bool {
        let lhs = match self.field {
            Field::MsMsType => frame.ms_ms_type as f64,
            Field::ScanMode => frame.scan_mode as f64,
            Field::NumScans => frame.num_scans as f64,
            Field::NumPeaks => frame.num_peaks as f64,
            Field::WindowGroup => frame.window_group as f64,
            Field::Rt => frame.rt,
        };
        match self.op {
            Op::Eq => lhs == self.value,
            Op::Ne => lhs != self.value,
            Op::Le => lhs <= self.value,
            Op::Ge => lhs >= self.value,
            Op::Lt => lhs < self.value,
            Op::Gt => lhs > self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u32) -> Vec<FrameMeta> {
        (1..=n)
            .map(|i| FrameMeta {
                id: i,
                rt: 0.1 * i as f64,
                scan_mode: 9,
                ms_ms_type: if i % 3 == 0 { 9 } else { 0 },
                num_scans: 10,
                num_peaks: i as i64,
                summed_intensity: 1.0,
                window_group: 0,
            })
            .collect()
    }

    #[test]
    fn test_defaults_cover_full_span() {
        let f = frames(5);
        let sel = normalize(&FrameSelector::All, &ScanSelector::All, &f, 0, 10).unwrap();
        assert_eq!(sel.frames, vec![1, 2, 3, 4, 5]);
        assert_eq!((sel.scan_low, sel.scan_high), (0, 10));
    }

    #[test]
    fn test_scalar_selectors() {
        let f = frames(5);
        let sel = normalize(&FrameSelector::One(3), &ScanSelector::One(4), &f, 0, 10).unwrap();
        assert_eq!(sel.frames, vec![3]);
        assert_eq!((sel.scan_low, sel.scan_high), (4, 5));
    }

    #[test]
    fn test_range_with_step() {
        let f = frames(10);
        let sel = normalize(
            &FrameSelector::Range {
                start: Some(2),
                stop: Some(9),
                step: Some(3),
            },
            &ScanSelector::All,
            &f,
            0,
            10,
        )
        .unwrap();
        assert_eq!(sel.frames, vec![2, 5, 8]);

        assert!(normalize(
            &FrameSelector::Range {
                start: None,
                stop: None,
                step: Some(0)
            },
            &ScanSelector::All,
            &f,
            0,
            10
        )
        .is_err());
    }

    #[test]
    fn test_explicit_frame_list_kept_as_given() {
        let f = frames(5);
        let sel = normalize(
            &FrameSelector::List(vec![4, 2, 99]),
            &ScanSelector::All,
            &f,
            0,
            10,
        )
        .unwrap();
        // out-of-range frames survive normalization; iteration skips them
        assert_eq!(sel.frames, vec![4, 2, 99]);
    }

    #[test]
    fn test_scan_bounds_are_clamped() {
        let f = frames(3);
        let sel = normalize(
            &FrameSelector::All,
            &ScanSelector::Range {
                start: Some(50),
                stop: Some(50),
            },
            &f,
            0,
            10,
        )
        .unwrap();
        assert_eq!((sel.scan_low, sel.scan_high), (9, 10));
    }

    #[test]
    fn test_scan_collection_uses_span_and_rejects_empty() {
        let f = frames(3);
        let sel = normalize(
            &FrameSelector::All,
            &ScanSelector::List(vec![7, 2, 5]),
            &f,
            0,
            10,
        )
        .unwrap();
        assert_eq!((sel.scan_low, sel.scan_high), (2, 8));

        assert!(matches!(
            normalize(&FrameSelector::All, &ScanSelector::List(vec![]), &f, 0, 10),
            Err(TimsError::Core(CoreError::InvalidSelector(_)))
        ));
    }

    #[test]
    fn test_predicate_selects_matching_frames() {
        let f = frames(9);
        let sel = normalize(
            &FrameSelector::Where("MsMsType == 9".to_string()),
            &ScanSelector::All,
            &f,
            0,
            10,
        )
        .unwrap();
        assert_eq!(sel.frames, vec![3, 6, 9]);

        let sel = normalize(
            &FrameSelector::Where("rt > 0.55".to_string()),
            &ScanSelector::All,
            &f,
            0,
            10,
        )
        .unwrap();
        assert_eq!(sel.frames, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_bad_predicates_are_invalid_selectors() {
        let f = frames(3);
        for expr in ["Banana == 1", "MsMsType ~ 2", "MsMsType =="] {
            assert!(matches!(
                normalize(
                    &FrameSelector::Where(expr.to_string()),
                    &ScanSelector::All,
                    &f,
                    0,
                    10
                ),
                Err(TimsError::Core(CoreError::InvalidSelector(_)))
            ));
        }
    }
}
