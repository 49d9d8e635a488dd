// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read .npy array: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error("Failed to read .npz archive: {0}")]
    NpzRead(#[from] ndarray_npy::ReadNpzError),

    #[error("Failed to write .npz archive: {0}")]
    NpzWrite(#[from] ndarray_npy::WriteNpzError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Plotting error: {0}")]
    Plot(String),
}

// Define a standard Result type for the crate
pub type Result<T> = std::result::Result<T, ScoreError>;
