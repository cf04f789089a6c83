use serde::{Deserialize, Serialize};

/// Columnar result of a raw-region extraction.
///
/// Four parallel columns: frame number, scan number, mass index and
/// intensity. An empty selection yields an empty table with all four
/// columns present, never an absent value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakTable {
    pub frame: Vec<u32>,
    pub scan: Vec<u32>,
    pub mz_index: Vec<u32>,
    pub intensity: Vec<u32>,
}

impl PeakTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PeakTable {
            frame: Vec::with_capacity(capacity),
            scan: Vec::with_capacity(capacity),
            mz_index: Vec::with_capacity(capacity),
            intensity: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn push(&mut self, frame: u32, scan: u32, mz_index: u32, intensity: u32) {
        self.frame.push(frame);
        self.scan.push(scan);
        self.mz_index.push(mz_index);
        self.intensity.push(intensity);
    }

    /// Append all rows of `other`, draining it.
    pub fn append(&mut self, other: &mut PeakTable) {
        self.frame.append(&mut other.frame);
        self.scan.append(&mut other.scan);
        self.mz_index.append(&mut other.mz_index);
        self.intensity.append(&mut other.intensity);
    }

    pub fn total_intensity(&self) -> u64 {
        self.intensity.iter().map(|&i| i as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_has_all_columns() {
        let t = PeakTable::new();
        assert!(t.is_empty());
        assert_eq!(t.len(), 0);
        assert_eq!(t.total_intensity(), 0);
    }

    #[test]
    fn test_append_concatenates_in_order() {
        let mut a = PeakTable::new();
        a.push(1, 0, 100, 10);
        let mut b = PeakTable::new();
        b.push(2, 5, 200, 20);
        b.push(2, 6, 201, 30);

        a.append(&mut b);
        assert_eq!(a.len(), 3);
        assert!(b.is_empty());
        assert_eq!(a.frame, vec![1, 2, 2]);
        assert_eq!(a.total_intensity(), 60);
    }
}
