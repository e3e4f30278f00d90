//! Image classification pipeline over five small image datasets.
//!
//! A run acquires a dataset, preprocesses it for one of three strategies (a random guesser, a
//! dense network or a convolutional network), trains, predicts the test split and reports the
//! share of correct predictions.

#[macro_use]
extern crate derive_new;

/// Feature and label containers, preprocessing and batching.
pub mod data;
/// Supported datasets and their shapes.
pub mod dataset;
/// Error type of the pipeline.
pub mod error;
/// Accuracy scoring.
pub mod evaluation;
/// Running metrics reported during training.
pub mod metric;
/// Network definitions.
pub mod model;
/// End to end orchestration.
pub mod pipeline;
/// Dataset acquisition.
pub mod source;
/// Classification strategies.
pub mod strategy;
/// Training loop and batched inference.
pub mod training;

pub use error::PipelineError;
pub use pipeline::{run, PipelineConfig, Report};
