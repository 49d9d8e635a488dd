// src/plot.rs

use crate::error::{Result, ScoreError};
use crate::metrics::ScoreTable;
use log::{debug, info};
use ndarray::{Array4, ArrayView2, Axis};
use plotters::prelude::*;
use plotters::style::full_palette::ORANGE;
use std::fs;
use std::path::{Path, PathBuf};

/// Frames smaller than this (in pixels, longest side) are upscaled.
const MIN_FRAME_EDGE: usize = 256;

/// Plots the per-frame `model_mse`, `model_p_50` and `model_p_99` series of
/// the first `n_plot` sequences, one PNG per sequence.
pub fn plot_sequences(table: &ScoreTable, nt: usize, n_plot: usize, dir: &Path) -> Result<Vec<PathBuf>> {
    let available = if nt == 0 { 0 } else { table.len() / nt };
    let count = n_plot.min(available);
    if count == 0 {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(count);
    for window in 0..count {
        let path = dir.join(format!("window_{:04}.png", window));
        plot_sequence(table, window, nt, &path)?;
        written.push(path);
    }
    info!("Generated {} sequence plots in {}", written.len(), dir.display());
    Ok(written)
}

fn plot_sequence(table: &ScoreTable, window: usize, nt: usize, output_path: &Path) -> Result<()> {
    debug!("Plotting sequence {}: {}", window, output_path.display());
    let rows = window * nt..(window + 1) * nt;
    let series = |column: &[f64]| -> Vec<(u32, f64)> {
        column[rows.clone()]
            .iter()
            .enumerate()
            .map(|(t, v)| (t as u32, *v))
            .collect()
    };
    let mse = series(&table.model_mse[..]);
    let p50 = series(&table.model_p_50[..]);
    let p99 = series(&table.model_p_99[..]);

    let y_max = p99
        .iter()
        .chain(mse.iter())
        .map(|(_, v)| *v)
        .fold(0.0f64, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

    let root = BitMapBackend::new(output_path, (1280, 720)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| ScoreError::Plot(format!("Failed to fill plot background: {}", e)))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Prediction Error, Sequence {}", window), ("sans-serif", 24).into_font())
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(0u32..nt as u32, 0.0..y_max)
        .map_err(|e| ScoreError::Plot(format!("Failed to build chart: {}", e)))?;

    let y_label_format = |y: &f64| format!("{:.4}", y);
    chart
        .configure_mesh()
        .x_desc("Frame")
        .y_desc("Squared Error")
        .y_label_formatter(&y_label_format)
        .axis_desc_style(("sans-serif", 16))
        .label_style(("sans-serif", 14))
        .draw()
        .map_err(|e| ScoreError::Plot(format!("Failed to draw mesh: {:?}", e)))?;

    for (points, label, color) in [(mse, "model_mse", BLUE), (p50, "model_p_50", ORANGE), (p99, "model_p_99", RED)] {
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(|e| ScoreError::Plot(format!("Failed to draw {} series: {:?}", label, e)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .margin(10)
        .label_font(("sans-serif", 12))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| ScoreError::Plot(format!("Failed to draw legend: {:?}", e)))?;

    root.present().map_err(|e| ScoreError::Plot(format!("Failed to save plot: {:?}", e)))?;
    Ok(())
}

/// Writes one grayscale PNG per frame of `maps` (`(windows, time, h, w)`),
/// each window normalized by its own maximum error.
pub fn save_error_frames(maps: &Array4<f32>, dir: &Path) -> Result<usize> {
    let mut written = 0;
    for (window, frames) in maps.outer_iter().enumerate() {
        let window_dir = dir.join(format!("window_{:04}", window));
        fs::create_dir_all(&window_dir)?;

        let peak = frames.iter().copied().fold(0.0f32, f32::max);
        for (t, frame) in frames.outer_iter().enumerate() {
            let path = window_dir.join(format!("frame_{:03}.png", t));
            draw_error_frame(frame, peak, &path)?;
            written += 1;
        }
    }
    info!("Saved {} prediction error frames under {}", written, dir.display());
    Ok(written)
}

fn draw_error_frame(frame: ArrayView2<'_, f32>, peak: f32, output_path: &Path) -> Result<()> {
    let (h, w) = frame.dim();
    let scale = (MIN_FRAME_EDGE / h.max(w).max(1)).max(1);
    let size = ((w * scale) as u32, (h * scale) as u32);

    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&BLACK).map_err(|e| ScoreError::Plot(format!("Failed to fill frame: {}", e)))?;

    for (y, row) in frame.axis_iter(Axis(0)).enumerate() {
        for (x, value) in row.iter().enumerate() {
            let level = if peak > 0.0 { (value / peak).clamp(0.0, 1.0) } else { 0.0 };
            if level == 0.0 {
                continue;
            }
            let shade = (level * 255.0).round() as u8;
            let x0 = (x * scale) as i32;
            let y0 = (y * scale) as i32;
            let cell = scale as i32;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell, y0 + cell)],
                RGBColor(shade, shade, shade).filled(),
            ))
            .map_err(|e| ScoreError::Plot(format!("Failed to draw frame pixel: {:?}", e)))?;
        }
    }

    root.present().map_err(|e| ScoreError::Plot(format!("Failed to save frame: {:?}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_one_image_per_frame() {
        let dir = tempdir().unwrap();
        let mut maps = Array4::<f32>::zeros((2, 3, 4, 5));
        maps[[0, 1, 2, 3]] = 0.5;
        maps[[1, 2, 0, 0]] = 2.0;

        let written = save_error_frames(&maps, dir.path()).unwrap();
        assert_eq!(written, 6);
        assert!(dir.path().join("window_0000").join("frame_000.png").exists());
        assert!(dir.path().join("window_0001").join("frame_002.png").exists());
    }

    #[test]
    fn no_sequences_means_no_plots() {
        let dir = tempdir().unwrap();
        let table = ScoreTable::default();
        let written = plot_sequences(&table, 4, 3, &dir.path().join("plots")).unwrap();
        assert!(written.is_empty());
        assert!(!dir.path().join("plots").exists());
    }
}
