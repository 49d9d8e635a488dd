// src/dataset.rs

use crate::error::{Result, ScoreError};
use log::{debug, info};
use ndarray::{Array4, Axis};
use ndarray_npy::{ReadNpyError, read_npy};
use std::fs;
use std::path::Path;

/// Test frames plus the id of the source video each frame was cut from.
#[derive(Debug, Clone)]
pub struct FrameStream {
    /// `(n_frames, height, width, channels)`, values in `[0, 1]`.
    pub frames: Array4<f32>,
    pub sources: Vec<String>,
}

impl FrameStream {
    pub fn new(frames: Array4<f32>, sources: Vec<String>) -> Result<Self> {
        if frames.len_of(Axis(0)) != sources.len() {
            return Err(ScoreError::Input(format!(
                "Frame count mismatch! Frames: {}, source ids: {}",
                frames.len_of(Axis(0)),
                sources.len()
            )));
        }
        Ok(Self { frames, sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// `(height, width, channels)` of a single frame.
    pub fn frame_shape(&self) -> (usize, usize, usize) {
        let (_, h, w, c) = self.frames.dim();
        (h, w, c)
    }
}

/// Loads the frame array and its parallel source-id list.
pub fn load(frames_path: &Path, sources_path: &Path) -> Result<FrameStream> {
    let frames = load_frames(frames_path)?;
    let sources = load_sources(sources_path)?;
    let stream = FrameStream::new(frames, sources)?;

    let (h, w, c) = stream.frame_shape();
    info!(
        "Loaded {} frames of {}x{}x{} from {}",
        stream.len(),
        h,
        w,
        c,
        frames_path.display()
    );
    Ok(stream)
}

/// Reads a 4-D `.npy` frame array. `uint8` data is rescaled to `[0, 1]`,
/// `float32` data is taken as already normalized.
pub fn load_frames(path: &Path) -> Result<Array4<f32>> {
    info!("Reading frames: {}", path.display());
    if !path.exists() {
        return Err(ScoreError::Input(format!(
            "Frame file not found: {}",
            path.display()
        )));
    }

    match read_npy::<_, Array4<u8>>(path) {
        Ok(raw) => {
            debug!("Frames stored as uint8, scaling by 1/255");
            Ok(raw.mapv(|v| f32::from(v) / 255.0))
        }
        Err(ReadNpyError::WrongDescriptor(descr)) => {
            debug!("Frames not uint8 ({:?}), reading as float32", descr);
            match read_npy::<_, Array4<f32>>(path) {
                Ok(frames) => Ok(frames),
                Err(ReadNpyError::WrongDescriptor(descr)) => Err(ScoreError::Input(format!(
                    "Frames in {} must be uint8 or float32, found {:?}",
                    path.display(),
                    descr
                ))),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Reads the per-frame source ids, a JSON array of strings.
pub fn load_sources(path: &Path) -> Result<Vec<String>> {
    info!("Reading source ids: {}", path.display());
    if !path.exists() {
        return Err(ScoreError::Input(format!(
            "Source id file not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    let sources: Vec<String> = serde_json::from_str(&content)?;
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use ndarray_npy::write_npy;
    use tempfile::tempdir;

    #[test]
    fn scales_uint8_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("X_test.npy");
        let mut raw = Array4::<u8>::zeros((2, 2, 2, 1));
        raw[[1, 0, 0, 0]] = 255;
        raw[[1, 1, 1, 0]] = 51;
        write_npy(&path, &raw).unwrap();

        let frames = load_frames(&path).unwrap();
        assert_eq!(frames.dim(), (2, 2, 2, 1));
        assert_eq!(frames[[1, 0, 0, 0]], 1.0);
        assert!((frames[[1, 1, 1, 0]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn keeps_float_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("X_test.npy");
        let raw = Array4::<f32>::from_elem((3, 1, 1, 3), 0.5);
        write_npy(&path, &raw).unwrap();

        let frames = load_frames(&path).unwrap();
        assert_eq!(frames, raw);
    }

    #[test]
    fn rejects_other_dtypes_as_input_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("X_test.npy");
        write_npy(&path, &Array4::<f64>::zeros((2, 1, 1, 1))).unwrap();

        let err = load_frames(&path).unwrap_err();
        assert!(matches!(err, ScoreError::Input(_)));
    }

    #[test]
    fn rejects_length_mismatch() {
        let dir = tempdir().unwrap();
        let frames_path = dir.path().join("X_test.npy");
        let sources_path = dir.path().join("sources_test.json");
        write_npy(&frames_path, &Array4::<u8>::zeros((3, 1, 1, 1))).unwrap();
        fs::write(&sources_path, r#"["a", "a"]"#).unwrap();

        let err = load(&frames_path, &sources_path).unwrap_err();
        assert!(matches!(err, ScoreError::Input(_)));
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let dir = tempdir().unwrap();
        let err = load_frames(&dir.path().join("nope.npy")).unwrap_err();
        assert!(matches!(err, ScoreError::Input(_)));
    }
}
