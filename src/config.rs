// src/config.rs

use crate::cli::CliArgs;
use crate::error::{Result, ScoreError};
use std::path::PathBuf;

/// Validated, immutable run configuration. All on-disk locations the
/// pipeline touches are derived here.
#[derive(Debug, Clone)]
pub struct Config {
    pub scored_data: PathBuf,
    pub preprocessed_data: PathBuf,
    pub model_path: PathBuf,
    pub dataset: String,
    pub nt: usize,
    pub n_plot: usize,
    pub batch_size: usize,
    pub n_seq: Option<usize>,
    pub save_error_frames: bool,
}

impl Config {
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        if args.nt == 0 {
            return Err(ScoreError::Config("--nt must be at least 1".to_string()));
        }
        if args.batch_size == 0 {
            return Err(ScoreError::Config("--batch-size must be at least 1".to_string()));
        }
        if args.n_seq == Some(0) {
            return Err(ScoreError::Config(
                "--n-seq must be at least 1 when given".to_string(),
            ));
        }
        if args.dataset.is_empty() {
            return Err(ScoreError::Config("--dataset must not be empty".to_string()));
        }

        Ok(Self {
            scored_data: args.scored_data.clone(),
            preprocessed_data: args.preprocessed_data.clone(),
            model_path: args.model_path.clone(),
            dataset: args.dataset.clone(),
            nt: args.nt,
            n_plot: args.n_plot,
            batch_size: args.batch_size,
            n_seq: args.n_seq,
            save_error_frames: args.save_prediction_error_video_frames,
        })
    }

    fn dataset_dir(&self) -> PathBuf {
        self.preprocessed_data.join(&self.dataset)
    }

    pub fn frames_path(&self) -> PathBuf {
        self.dataset_dir().join("X_test.npy")
    }

    pub fn sources_path(&self) -> PathBuf {
        self.dataset_dir().join("sources_test.json")
    }

    pub fn architecture_path(&self) -> PathBuf {
        self.model_path.join("outputs").join("model.json")
    }

    pub fn weights_path(&self) -> PathBuf {
        self.model_path.join("outputs").join("weights.npz")
    }

    /// `<scored_data>/<dataset>/Test`
    pub fn output_dir(&self) -> PathBuf {
        self.scored_data.join(&self.dataset).join("Test")
    }

    /// Table lands at the scored-data root, next to the per-dataset folders.
    pub fn table_path(&self) -> PathBuf {
        self.scored_data.join("df.npz")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir().join("summary.json")
    }

    pub fn plot_dir(&self) -> PathBuf {
        self.output_dir().join("plots")
    }

    pub fn error_frames_dir(&self) -> PathBuf {
        self.output_dir().join("error_frames")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["predscore"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn derives_paths_from_dataset() {
        let config = Config::from_args(&args(&[
            "--scored-data",
            "/out",
            "--preprocessed-data",
            "/pre",
            "--model-path",
            "/model",
            "--dataset",
            "ped2",
        ]))
        .unwrap();

        assert_eq!(config.frames_path(), Path::new("/pre/ped2/X_test.npy"));
        assert_eq!(config.sources_path(), Path::new("/pre/ped2/sources_test.json"));
        assert_eq!(config.architecture_path(), Path::new("/model/outputs/model.json"));
        assert_eq!(config.weights_path(), Path::new("/model/outputs/weights.npz"));
        assert_eq!(config.table_path(), Path::new("/out/df.npz"));
        assert_eq!(config.summary_path(), Path::new("/out/ped2/Test/summary.json"));
    }

    #[test]
    fn rejects_zero_sizes() {
        assert!(matches!(
            Config::from_args(&args(&["--nt", "0"])),
            Err(ScoreError::Config(_))
        ));
        assert!(matches!(
            Config::from_args(&args(&["--batch-size", "0"])),
            Err(ScoreError::Config(_))
        ));
        assert!(matches!(
            Config::from_args(&args(&["--n-seq", "0"])),
            Err(ScoreError::Config(_))
        ));
    }
}
