// src/metrics.rs

use crate::error::{Result, ScoreError};
use log::{debug, info, warn};
use ndarray::{Array4, Array5, ArrayView1, ArrayView3, Axis, Zip};
use ndarray_npy::NpzWriter;
use quantiles::ckms::CKMS;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

// --- Data Structures ---

/// Column names of the scored table, in order.
pub const COLUMNS: [&str; 7] = [
    "model_mse",
    "model_p_50",
    "model_p_75",
    "model_p_90",
    "model_p_95",
    "model_p_99",
    "model_std",
];

/// Summary of the squared prediction error of one frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorStats {
    pub mse: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub std: f64,
}

impl ErrorStats {
    fn nan() -> Self {
        Self {
            mse: f64::NAN,
            p50: f64::NAN,
            p75: f64::NAN,
            p90: f64::NAN,
            p95: f64::NAN,
            p99: f64::NAN,
            std: f64::NAN,
        }
    }

    /// Reduces one frame's squared errors. Sorts `values` in place. A single
    /// NaN makes every statistic NaN.
    pub fn from_squared_errors(values: &mut [f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        if values.iter().any(|v| v.is_nan()) {
            return Self::nan();
        }
        values.sort_unstable_by(f64::total_cmp);

        let n = values.len() as f64;
        let mse = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mse).powi(2)).sum::<f64>() / n;

        Self {
            mse,
            p50: percentile(values, 50.0),
            p75: percentile(values, 75.0),
            p90: percentile(values, 90.0),
            p95: percentile(values, 95.0),
            p99: percentile(values, 99.0),
            std: variance.sqrt(),
        }
    }
}

/// Percentile of sorted data with linear interpolation between closest ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Scored statistics, one row per (window, time step), window-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    pub model_mse: Vec<f64>,
    pub model_p_50: Vec<f64>,
    pub model_p_75: Vec<f64>,
    pub model_p_90: Vec<f64>,
    pub model_p_95: Vec<f64>,
    pub model_p_99: Vec<f64>,
    pub model_std: Vec<f64>,
}

impl ScoreTable {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            model_mse: Vec::with_capacity(rows),
            model_p_50: Vec::with_capacity(rows),
            model_p_75: Vec::with_capacity(rows),
            model_p_90: Vec::with_capacity(rows),
            model_p_95: Vec::with_capacity(rows),
            model_p_99: Vec::with_capacity(rows),
            model_std: Vec::with_capacity(rows),
        }
    }

    pub fn push(&mut self, stats: ErrorStats) {
        self.model_mse.push(stats.mse);
        self.model_p_50.push(stats.p50);
        self.model_p_75.push(stats.p75);
        self.model_p_90.push(stats.p90);
        self.model_p_95.push(stats.p95);
        self.model_p_99.push(stats.p99);
        self.model_std.push(stats.std);
    }

    pub fn len(&self) -> usize {
        self.model_mse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model_mse.is_empty()
    }

    #[cfg(test)]
    pub fn row(&self, i: usize) -> ErrorStats {
        ErrorStats {
            mse: self.model_mse[i],
            p50: self.model_p_50[i],
            p75: self.model_p_75[i],
            p90: self.model_p_90[i],
            p95: self.model_p_95[i],
            p99: self.model_p_99[i],
            std: self.model_std[i],
        }
    }

    /// Columns paired with their names, in `COLUMNS` order.
    pub fn columns(&self) -> [(&'static str, &[f64]); 7] {
        [
            (COLUMNS[0], self.model_mse.as_slice()),
            (COLUMNS[1], self.model_p_50.as_slice()),
            (COLUMNS[2], self.model_p_75.as_slice()),
            (COLUMNS[3], self.model_p_90.as_slice()),
            (COLUMNS[4], self.model_p_95.as_slice()),
            (COLUMNS[5], self.model_p_99.as_slice()),
            (COLUMNS[6], self.model_std.as_slice()),
        ]
    }

    /// Writes the table as a compressed `.npz`, one 1-D `f64` array per
    /// column. An existing file is replaced.
    pub fn write_npz(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                info!("Creating output directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        let mut npz = NpzWriter::new_compressed(File::create(path)?);
        for (name, values) in self.columns() {
            npz.add_array(name, &ArrayView1::from(values))?;
        }
        npz.finish()?;
        info!("Saved {} rows to {}", self.len(), path.display());
        Ok(())
    }

    #[cfg(test)]
    pub fn read_npz(path: &Path) -> Result<Self> {
        let mut reader = ndarray_npy::NpzReader::new(File::open(path)?)?;
        let names = reader.names()?;
        let mut column = |wanted: &str| -> Result<Vec<f64>> {
            let raw = names
                .iter()
                .find(|n| n.trim_end_matches(".npy") == wanted)
                .ok_or_else(|| ScoreError::Input(format!("Missing column {}", wanted)))?;
            let array: ndarray::Array1<f64> = reader.by_name(raw)?;
            Ok(array.to_vec())
        };
        Ok(Self {
            model_mse: column(COLUMNS[0])?,
            model_p_50: column(COLUMNS[1])?,
            model_p_75: column(COLUMNS[2])?,
            model_p_90: column(COLUMNS[3])?,
            model_p_95: column(COLUMNS[4])?,
            model_p_99: column(COLUMNS[5])?,
            model_std: column(COLUMNS[6])?,
        })
    }
}

// --- Core Functions ---

/// Squared error per element with the first frame of every window zeroed.
/// Both inputs are `(windows, time, height, width, channels)`.
pub fn squared_errors(inputs: &Array5<f32>, predictions: &Array5<f32>) -> Result<Array5<f32>> {
    if inputs.shape() != predictions.shape() {
        return Err(ScoreError::Model(format!(
            "Prediction shape {:?} does not match input shape {:?}",
            predictions.shape(),
            inputs.shape()
        )));
    }
    let mut errors = Zip::from(inputs)
        .and(predictions)
        .map_collect(|&x, &x_hat| (x - x_hat).powi(2));
    if errors.len_of(Axis(1)) > 0 {
        // First frame has no preceding context.
        errors.index_axis_mut(Axis(1), 0).fill(0.0);
    }
    Ok(errors)
}

/// Reduces every frame's squared error over height, width and channels.
pub fn score_windows(inputs: &Array5<f32>, predictions: &Array5<f32>) -> Result<ScoreTable> {
    let errors = squared_errors(inputs, predictions)?;
    let (n_windows, nt, ..) = errors.dim();
    info!("Scoring {} sequences x {} frames", n_windows, nt);

    let mut table = ScoreTable::with_capacity(n_windows * nt);
    let mut scratch = Vec::new();
    for window in errors.outer_iter() {
        for frame in window.outer_iter() {
            table.push(frame_stats(frame, &mut scratch));
        }
    }
    debug!("Scored {} rows", table.len());
    Ok(table)
}

fn frame_stats(frame: ArrayView3<'_, f32>, scratch: &mut Vec<f64>) -> ErrorStats {
    scratch.clear();
    scratch.extend(frame.iter().map(|&v| f64::from(v)));
    ErrorStats::from_squared_errors(scratch)
}

/// Channel-averaged squared error maps, `(windows, time, height, width)`.
pub fn error_maps(errors: &Array5<f32>) -> Array4<f32> {
    let (n, t, h, w, _) = errors.dim();
    errors
        .mean_axis(Axis(4))
        .unwrap_or_else(|| Array4::zeros((n, t, h, w)))
}

// --- Run Summary ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MseSummary {
    pub p50_approx: f64,
    pub p90_approx: f64,
    pub p99_approx: f64,
    pub max: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub dataset: String,
    pub nt: usize,
    pub sequences: usize,
    pub rows: usize,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_mse: Option<MseSummary>,
}

pub fn summarize(table: &ScoreTable, dataset: &str, nt: usize) -> RunSummary {
    let sequences = if nt == 0 { 0 } else { table.len() / nt };
    let model_mse = if table.is_empty() {
        warn!("Score table is empty, nothing to summarize");
        None
    } else {
        let mut ckms = CKMS::<f64>::new(0.001);
        for value in &table.model_mse {
            ckms.insert(*value);
        }
        let query = |q: f64| ckms.query(q).map(|(_, value)| value).unwrap_or(f64::NAN);
        Some(MseSummary {
            p50_approx: query(0.5),
            p90_approx: query(0.9),
            p99_approx: query(0.99),
            max: table.model_mse.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    };

    if let Some(mse) = &model_mse {
        info!(
            "model_mse across {} rows: p50~{:.6} p90~{:.6} p99~{:.6} max {:.6}",
            table.len(),
            mse.p50_approx,
            mse.p90_approx,
            mse.p99_approx,
            mse.max
        );
    }

    RunSummary {
        dataset: dataset.to_string(),
        nt,
        sequences,
        rows: table.len(),
        columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        model_mse,
    }
}

pub fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(summary)?;
    fs::write(path, content)?;
    info!("Saved run summary to {}", path.display());
    Ok(())
}
