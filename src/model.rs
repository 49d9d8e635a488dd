// src/model.rs

use crate::error::{Result, ScoreError};
use log::{debug, info, warn};
use ndarray::{Array5, ArrayD, ArrayView5, Axis};
use ndarray_npy::NpzReader;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

// --- Data Structures ---

/// Position of the channel axis inside a frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// `(height, width, channels)`
    ChannelsLast,
    /// `(channels, height, width)`
    ChannelsFirst,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

/// Saved architecture description of the trained predictive layer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Architecture {
    pub class_name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// `[batch, time, d1, d2, d3]`, `null` for free dimensions.
    pub batch_input_shape: Vec<Option<usize>>,
    #[serde(default)]
    pub weights: Vec<ParamSpec>,
}

impl Architecture {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Reading model architecture: {}", path.display());
        if !path.exists() {
            return Err(ScoreError::Input(format!(
                "Model architecture file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// `data_format` wins over the legacy `dim_ordering` key.
    pub fn data_format(&self) -> Result<DataFormat> {
        if let Some(value) = self.config.get("data_format") {
            return match value.as_str() {
                Some("channels_last") => Ok(DataFormat::ChannelsLast),
                Some("channels_first") => Ok(DataFormat::ChannelsFirst),
                _ => Err(ScoreError::Model(format!("Unknown data_format: {}", value))),
            };
        }
        match self.config.get("dim_ordering") {
            None => Ok(DataFormat::ChannelsLast),
            Some(value) => match value.as_str() {
                Some("tf") => Ok(DataFormat::ChannelsLast),
                Some("th") => Ok(DataFormat::ChannelsFirst),
                _ => Err(ScoreError::Model(format!("Unknown dim_ordering: {}", value))),
            },
        }
    }
}

/// Architecture reconfigured for scoring: prediction output, fixed window length.
#[derive(Debug, Clone)]
pub struct AdaptedModel {
    pub class_name: String,
    pub config: Map<String, Value>,
    pub data_format: DataFormat,
    pub nt: usize,
    /// Per-frame dims in the model's own layout.
    pub frame_dims: [Option<usize>; 3],
    pub params: Vec<ParamSpec>,
}

impl AdaptedModel {
    pub fn output_mode(&self) -> Option<&str> {
        self.config.get("output_mode").and_then(Value::as_str)
    }

    /// Checks channel-last frames of `(height, width, channels)` against the
    /// dimensions the architecture fixes.
    pub fn check_frame_shape(&self, (h, w, c): (usize, usize, usize)) -> Result<()> {
        let actual = match self.data_format {
            DataFormat::ChannelsLast => [h, w, c],
            DataFormat::ChannelsFirst => [c, h, w],
        };
        for (expected, got) in self.frame_dims.iter().zip(actual) {
            if let Some(expected) = expected {
                if *expected != got {
                    return Err(ScoreError::Input(format!(
                        "Frame shape {:?} does not match model input {:?}",
                        actual, self.frame_dims
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Reconfigures the trained layer to emit predicted frames for windows of `nt`.
pub fn adapt(architecture: &Architecture, nt: usize) -> Result<AdaptedModel> {
    let shape = &architecture.batch_input_shape;
    if shape.len() != 5 {
        return Err(ScoreError::Model(format!(
            "Expected a 5-D batch input shape, got {:?}",
            shape
        )));
    }

    let mut config = architecture.config.clone();
    config.insert("output_mode".to_string(), Value::from("prediction"));

    let data_format = architecture.data_format()?;
    debug!(
        "Adapted {}: time steps {:?} -> {}, data format {:?}",
        architecture.class_name, shape[1], nt, data_format
    );

    Ok(AdaptedModel {
        class_name: architecture.class_name.clone(),
        config,
        data_format,
        nt,
        frame_dims: [shape[2], shape[3], shape[4]],
        params: architecture.weights.clone(),
    })
}

// --- Weights ---

/// Named parameter arrays restored from a weights archive.
#[derive(Debug, Clone, Default)]
pub struct WeightSet {
    arrays: HashMap<String, ArrayD<f32>>,
}

impl WeightSet {
    /// Restores `params` by name from a `.npz` archive. Names missing from the
    /// archive, or stored with another dtype or shape, are skipped.
    pub fn restore(path: &Path, params: &[ParamSpec]) -> Result<Self> {
        info!("Reading model weights: {}", path.display());
        if !path.exists() {
            return Err(ScoreError::Input(format!(
                "Model weights file not found: {}",
                path.display()
            )));
        }
        let mut reader = NpzReader::new(File::open(path)?)?;
        let stored: HashMap<String, String> = reader
            .names()?
            .into_iter()
            .map(|raw| (raw.trim_end_matches(".npy").to_string(), raw))
            .collect();

        let mut arrays = HashMap::new();
        for param in params {
            let Some(raw_name) = stored.get(&param.name) else {
                warn!("Skipping weight {}: not present in archive", param.name);
                continue;
            };
            let array: ArrayD<f32> = match reader.by_name(raw_name) {
                Ok(array) => array,
                Err(e) => {
                    warn!("Skipping weight {}: {}", param.name, e);
                    continue;
                }
            };
            if array.shape() != param.shape.as_slice() {
                warn!(
                    "Skipping weight {}: shape {:?} does not match expected {:?}",
                    param.name,
                    array.shape(),
                    param.shape
                );
                continue;
            }
            arrays.insert(param.name.clone(), array);
        }

        info!("Restored {} of {} weights", arrays.len(), params.len());
        Ok(Self { arrays })
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.arrays.get(name)
    }
}

// --- Predictor Interface ---

/// Inference-ready model mapping an input window batch to predicted frames.
pub trait SequencePredictor {
    fn data_format(&self) -> DataFormat;

    /// `batch` is `(windows, time, d1, d2, d3)` in the model's data format; the
    /// result has the same shape, frame `t` predicted from frames `< t`.
    fn predict(&self, batch: ArrayView5<'_, f32>) -> Result<Array5<f32>>;
}

/// Builds predictors for one family of saved architectures.
pub trait PredictorBackend {
    fn name(&self) -> &'static str;

    /// Hardware accelerator the backend will run on, if any.
    fn accelerator(&self) -> Option<String>;

    fn build(&self, model: &AdaptedModel, weights: WeightSet) -> Result<Box<dyn SequencePredictor>>;
}

pub fn backend_for(class_name: &str) -> Result<Box<dyn PredictorBackend>> {
    match class_name {
        "Persistence" => Ok(Box::new(PersistenceBackend)),
        other => Err(ScoreError::Model(format!(
            "No predictor backend for architecture class '{}'",
            other
        ))),
    }
}

/// Loads the saved architecture and weights and returns a predictor for
/// windows of `nt` frames.
pub fn load_predictor(
    architecture_path: &Path,
    weights_path: &Path,
    nt: usize,
) -> Result<(AdaptedModel, Box<dyn SequencePredictor>)> {
    let architecture = Architecture::load(architecture_path)?;
    let model = adapt(&architecture, nt)?;
    let backend = backend_for(&model.class_name)?;
    report_accelerator(backend.as_ref());

    let weights = WeightSet::restore(weights_path, &model.params)?;
    let predictor = backend.build(&model, weights)?;
    info!(
        "Built {} predictor (output_mode={}, nt={})",
        backend.name(),
        model.output_mode().unwrap_or("unset"),
        nt
    );
    Ok((model, predictor))
}

fn report_accelerator(backend: &dyn PredictorBackend) {
    match backend.accelerator() {
        Some(device) => info!("Found accelerator: {}", device),
        None => info!(
            "Did not find GPU, running on CPU with {} logical cores",
            num_cpus::get()
        ),
    }
}

// --- Persistence Baseline ---

pub const PERSISTENCE_GAIN: &str = "persistence/gain";

/// Predicts each frame as the previous one (scaled by an optional gain).
pub struct PersistenceBackend;

impl PredictorBackend for PersistenceBackend {
    fn name(&self) -> &'static str {
        "persistence"
    }

    fn accelerator(&self) -> Option<String> {
        None
    }

    fn build(&self, model: &AdaptedModel, weights: WeightSet) -> Result<Box<dyn SequencePredictor>> {
        let gain = match weights.get(PERSISTENCE_GAIN) {
            Some(array) => *array.iter().next().ok_or_else(|| {
                ScoreError::Model(format!("Weight {} is empty", PERSISTENCE_GAIN))
            })?,
            None => 1.0,
        };
        debug!("Persistence gain: {}", gain);
        Ok(Box::new(PersistencePredictor {
            gain,
            nt: model.nt,
            data_format: model.data_format,
        }))
    }
}

pub struct PersistencePredictor {
    gain: f32,
    nt: usize,
    data_format: DataFormat,
}

impl SequencePredictor for PersistencePredictor {
    fn data_format(&self) -> DataFormat {
        self.data_format
    }

    fn predict(&self, batch: ArrayView5<'_, f32>) -> Result<Array5<f32>> {
        let steps = batch.len_of(Axis(1));
        if steps != self.nt {
            return Err(ScoreError::Model(format!(
                "Predictor built for {} time steps, got {}",
                self.nt, steps
            )));
        }
        let mut predicted = Array5::<f32>::zeros(batch.raw_dim());
        for t in 1..steps {
            let previous = batch.index_axis(Axis(1), t - 1);
            predicted
                .index_axis_mut(Axis(1), t)
                .assign(&previous.mapv(|v| v * self.gain));
        }
        Ok(predicted)
    }
}
