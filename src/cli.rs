// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Root directory for scored output (written to <DIR>/<dataset>/Test)
    #[arg(long, value_name = "DIR", default_value = "./data/scored_data/")]
    pub scored_data: PathBuf,

    /// Root directory of preprocessed test data (<DIR>/<dataset>/X_test.npy)
    #[arg(long, value_name = "DIR", default_value = "./data/preprocessed/")]
    pub preprocessed_data: PathBuf,

    /// Directory of the trained model (expects outputs/model.json and outputs/weights.npz)
    #[arg(long, value_name = "DIR", default_value = "prednet_path")]
    pub model_path: PathBuf,

    /// Dataset name, selects the subdirectory under the data roots
    #[arg(long, default_value = "UCSDped1")]
    pub dataset: String,

    /// Length of video sequences
    #[arg(long, default_value_t = 200)]
    pub nt: usize,

    /// How many sample sequences to plot
    #[arg(long, default_value_t = 0)]
    pub n_plot: usize,

    /// Number of sequences per inference batch
    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    /// Optional cap on the number of sequences to score
    #[arg(long, value_name = "N")]
    pub n_seq: Option<usize>,

    /// Write per-frame prediction error images for every sequence
    #[arg(long)]
    pub save_prediction_error_video_frames: bool,

    /// Enable logging to file (e.g., predscore_YYYYMMDD_HHMMSS.log)
    #[arg(long)]
    pub log: bool,
}

pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
