// src/inference.rs

use crate::error::{Result, ScoreError};
use crate::model::{DataFormat, SequencePredictor};
use log::{debug, info};
use ndarray::{Array5, Axis, concatenate};
use std::time::Instant;

/// Runs `predictor` over `windows` in consecutive batches of `batch_size`,
/// keeping window order.
pub fn predict_all(
    predictor: &dyn SequencePredictor,
    windows: &Array5<f32>,
    batch_size: usize,
) -> Result<Array5<f32>> {
    if batch_size == 0 {
        return Err(ScoreError::Config("batch size must be at least 1".to_string()));
    }
    let total = windows.len_of(Axis(0));
    if total == 0 {
        info!("No sequences to predict");
        return Ok(Array5::zeros(windows.raw_dim()));
    }

    info!("Predicting {} sequences in batches of {}", total, batch_size);
    let start_time = Instant::now();
    let mut outputs = Vec::with_capacity(total.div_ceil(batch_size));
    for (i, batch) in windows.axis_chunks_iter(Axis(0), batch_size).enumerate() {
        let predicted = predictor.predict(batch)?;
        if predicted.shape() != batch.shape() {
            return Err(ScoreError::Model(format!(
                "Predictor returned shape {:?} for input batch {:?}",
                predicted.shape(),
                batch.shape()
            )));
        }
        debug!("Batch {} done ({} sequences)", i, batch.len_of(Axis(0)));
        outputs.push(predicted);
    }

    let views: Vec<_> = outputs.iter().map(|a| a.view()).collect();
    let predictions = concatenate(Axis(0), &views)?;
    info!(
        "Prediction finished in {}ms",
        start_time.elapsed().as_millis()
    );
    Ok(predictions)
}

/// Brings a `(windows, time, ..)` array into `(windows, time, h, w, c)` order.
pub fn to_channels_last(array: Array5<f32>, data_format: DataFormat) -> Array5<f32> {
    match data_format {
        DataFormat::ChannelsLast => array,
        DataFormat::ChannelsFirst => array
            .permuted_axes([0, 1, 3, 4, 2])
            .as_standard_layout()
            .into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, ArrayView5};

    /// Predicts `x * 2 + <batch size>` so a batch-dependent bug would show up.
    struct Doubler {
        leak_batch_size: bool,
    }

    impl SequencePredictor for Doubler {
        fn data_format(&self) -> DataFormat {
            DataFormat::ChannelsLast
        }

        fn predict(&self, batch: ArrayView5<'_, f32>) -> Result<Array5<f32>> {
            let offset = if self.leak_batch_size {
                batch.len_of(Axis(0)) as f32
            } else {
                0.0
            };
            Ok(batch.mapv(|v| v * 2.0 + offset))
        }
    }

    struct Truncating;

    impl SequencePredictor for Truncating {
        fn data_format(&self) -> DataFormat {
            DataFormat::ChannelsLast
        }

        fn predict(&self, batch: ArrayView5<'_, f32>) -> Result<Array5<f32>> {
            let (n, t, h, w, c) = batch.dim();
            Ok(Array5::zeros((n, t - 1, h, w, c)))
        }
    }

    fn windows(n: usize) -> Array5<f32> {
        Array::from_shape_fn((n, 3, 2, 2, 1), |(i, t, y, x, _)| {
            (i * 100 + t * 10 + y * 2 + x) as f32
        })
    }

    #[test]
    fn batching_does_not_change_results() {
        let input = windows(7);
        let predictor = Doubler { leak_batch_size: false };
        let single = predict_all(&predictor, &input, 1).unwrap();
        for batch_size in [2, 3, 7, 50] {
            let batched = predict_all(&predictor, &input, batch_size).unwrap();
            assert_eq!(batched, single, "batch size {batch_size}");
        }
        assert_eq!(single, input.mapv(|v| v * 2.0));
    }

    #[test]
    fn keeps_window_order_across_uneven_batches() {
        let input = windows(5);
        let predictor = Doubler { leak_batch_size: true };
        let out = predict_all(&predictor, &input, 2).unwrap();
        // Batches hold 2, 2 and 1 windows.
        assert_eq!(out[[0, 0, 0, 0, 0]], 2.0);
        assert_eq!(out[[3, 0, 0, 0, 0]], 600.0 + 2.0);
        assert_eq!(out[[4, 0, 0, 0, 0]], 800.0 + 1.0);
    }

    #[test]
    fn empty_input_gives_empty_predictions() {
        let input = windows(0);
        let out = predict_all(&Doubler { leak_batch_size: false }, &input, 4).unwrap();
        assert_eq!(out.dim(), (0, 3, 2, 2, 1));
    }

    #[test]
    fn rejects_misshapen_predictions() {
        let err = predict_all(&Truncating, &windows(2), 2).unwrap_err();
        assert!(matches!(err, ScoreError::Model(_)));
    }

    #[test]
    fn channels_first_is_transposed_back() {
        let chw = Array::from_shape_fn((1, 1, 3, 2, 4), |(_, _, c, y, x)| (c * 100 + y * 10 + x) as f32);
        let hwc = to_channels_last(chw.clone(), DataFormat::ChannelsFirst);
        assert_eq!(hwc.dim(), (1, 1, 2, 4, 3));
        assert_eq!(hwc[[0, 0, 1, 3, 2]], chw[[0, 0, 2, 1, 3]]);

        let untouched = to_channels_last(chw.clone(), DataFormat::ChannelsLast);
        assert_eq!(untouched, chw);
    }
}
