use crate::error::TimsError;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use timscore::data::window::IsolationWindow;

/// Per-frame metadata from the `Frames` table.
///
/// `window_group` is 0 for MS1 frames; DIA sessions fill it in from the
/// `DiaFrameMsMsInfo` table after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub id: u32,
    pub rt: f64,
    pub scan_mode: i64,
    pub ms_ms_type: i64,
    pub num_scans: u32,
    pub num_peaks: i64,
    pub summed_intensity: f64,
    pub window_group: u32,
}

/// Acquisition-wide metadata from the `GlobalMetadata` key/value table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalMetaData {
    pub mz_acquisition_range_lower: f64,
    pub mz_acquisition_range_upper: f64,
    pub one_over_k0_range_lower: f64,
    pub one_over_k0_range_upper: f64,
    pub tof_max_index: u32,
}

/// Frame to DIA window-group assignment from `DiaFrameMsMsInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameWindowGroup {
    pub frame: u32,
    pub window_group: u32,
}

/// Open the `analysis.tdf` database inside a `.d` acquisition folder.
pub fn open_tdf_connection(d_folder: &str) -> Result<Connection, TimsError> {
    let db_path = Path::new(d_folder).join("analysis.tdf");
    Ok(Connection::open(db_path)?)
}

pub fn read_global_meta_sql(conn: &Connection) -> Result<GlobalMetaData, TimsError> {
    let mut stmt = conn.prepare("SELECT Key, Value FROM GlobalMetadata")?;
    let rows: Result<Vec<(String, String)>, _> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect();

    let mut global_meta = GlobalMetaData {
        mz_acquisition_range_lower: -1.0,
        mz_acquisition_range_upper: -1.0,
        one_over_k0_range_lower: -1.0,
        one_over_k0_range_upper: -1.0,
        tof_max_index: 0,
    };

    let parse = |key: &str, value: &str| -> Result<f64, TimsError> {
        value
            .parse::<f64>()
            .map_err(|_| TimsError::Construction(format!("GlobalMetadata {} = {:?}", key, value)))
    };

    for (key, value) in rows? {
        match key.as_str() {
            "MzAcqRangeLower" => global_meta.mz_acquisition_range_lower = parse(&key, &value)?,
            "MzAcqRangeUpper" => global_meta.mz_acquisition_range_upper = parse(&key, &value)?,
            "OneOverK0AcqRangeLower" => global_meta.one_over_k0_range_lower = parse(&key, &value)?,
            "OneOverK0AcqRangeUpper" => global_meta.one_over_k0_range_upper = parse(&key, &value)?,
            "DigitizerNumSamples" => {
                global_meta.tof_max_index = parse(&key, &value)? as u32 + 1;
            }
            _ => (),
        }
    }
    Ok(global_meta)
}

/// Read the frame table, sorted ascending by frame number.
pub fn read_frame_meta_sql(conn: &Connection) -> Result<Vec<FrameMeta>, TimsError> {
    let columns = [
        "Id",
        "Time",
        "ScanMode",
        "MsMsType",
        "NumScans",
        "NumPeaks",
        "SummedIntensities",
    ];
    let query = format!("SELECT {} FROM Frames ORDER BY Id", columns.join(", "));

    let mut stmt = conn.prepare(&query)?;
    let rows: Result<Vec<FrameMeta>, _> = stmt
        .query_map([], |row| {
            Ok(FrameMeta {
                id: row.get(0)?,
                rt: row.get(1)?,
                scan_mode: row.get(2)?,
                ms_ms_type: row.get(3)?,
                num_scans: row.get(4)?,
                num_peaks: row.get(5)?,
                summed_intensity: row.get(6)?,
                window_group: 0,
            })
        })?
        .collect();

    Ok(rows?)
}

pub fn read_dia_window_group_sql(conn: &Connection) -> Result<Vec<FrameWindowGroup>, TimsError> {
    let mut stmt = conn.prepare("SELECT Frame, WindowGroup FROM DiaFrameMsMsInfo")?;
    let rows: Result<Vec<FrameWindowGroup>, _> = stmt
        .query_map([], |row| {
            Ok(FrameWindowGroup {
                frame: row.get(0)?,
                window_group: row.get(1)?,
            })
        })?
        .collect();

    Ok(rows?)
}

pub fn read_dia_windows_sql(conn: &Connection) -> Result<Vec<IsolationWindow>, TimsError> {
    let mut stmt = conn.prepare(
        "SELECT WindowGroup, ScanNumBegin, ScanNumEnd, IsolationMz, IsolationWidth \
         FROM DiaFrameMsMsWindows",
    )?;
    let rows: Result<Vec<IsolationWindow>, _> = stmt
        .query_map([], |row| {
            Ok(IsolationWindow {
                window_group: row.get(0)?,
                scan_min: row.get(1)?,
                scan_max: row.get(2)?,
                isolation_mz: row.get(3)?,
                isolation_width: row.get(4)?,
            })
        })?
        .collect();

    Ok(rows?)
}
