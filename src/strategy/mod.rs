//! Classification strategies sharing one train/predict contract.
//!
//! - [Guesser](Guesser) picks a class at random without looking at the data.
//! - [DenseStrategy](DenseStrategy) trains a [DenseNet](crate::model::DenseNet) on flat features.
//! - [ConvStrategy](ConvStrategy) trains a [ConvNet](crate::model::ConvNet) on image features.

mod guesser;
mod network;

pub use guesser::*;
pub use network::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::{FeatureMatrix, InputLayout, OneHotMatrix, PreparedSplit};
use crate::error::PipelineError;

/// The three supported strategies.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    #[serde(rename = "guesser")]
    Guesser,
    #[serde(rename = "tf_net")]
    Dense,
    #[serde(rename = "tf_conv")]
    Conv,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 3] = [
        AlgorithmKind::Guesser,
        AlgorithmKind::Dense,
        AlgorithmKind::Conv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Guesser => "guesser",
            AlgorithmKind::Dense => "tf_net",
            AlgorithmKind::Conv => "tf_conv",
        }
    }

    /// Feature layout the strategy consumes.
    pub fn input_layout(&self) -> InputLayout {
        match self {
            AlgorithmKind::Guesser | AlgorithmKind::Dense => InputLayout::Flat,
            AlgorithmKind::Conv => InputLayout::Image,
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guesser" => Ok(AlgorithmKind::Guesser),
            "tf_net" | "dense" => Ok(AlgorithmKind::Dense),
            "tf_conv" | "conv" => Ok(AlgorithmKind::Conv),
            other => Err(PipelineError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Uniform train/predict contract of a strategy.
pub trait Classifier {
    /// Fitted state produced by [train](Classifier::train).
    type Model;

    fn kind(&self) -> AlgorithmKind;

    fn train(&self, train: PreparedSplit) -> Result<Self::Model, PipelineError>;

    fn predict(
        &self,
        model: &Self::Model,
        features: &FeatureMatrix,
    ) -> Result<RawOutput, PipelineError>;
}

/// Row-major `[rows, classes]` class probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMatrix {
    values: Vec<f32>,
    classes: usize,
}

impl ProbabilityMatrix {
    pub fn new(values: Vec<f32>, classes: usize) -> Result<Self, PipelineError> {
        if classes == 0 || values.len() % classes != 0 {
            return Err(PipelineError::ShapeMismatch {
                context: "probability matrix",
                expected: vec![classes],
                actual: vec![values.len()],
            });
        }

        Ok(Self { values, classes })
    }

    pub fn rows(&self) -> usize {
        self.values.len() / self.classes
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows(), self.classes]
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.values[index * self.classes..(index + 1) * self.classes]
    }

    /// One-hot at the arg-max of every row.
    ///
    /// Ties go to the lowest index and NaN never wins. A row of NaN picks index 0.
    pub fn decide(&self) -> Result<OneHotMatrix, PipelineError> {
        let indices = self
            .values
            .chunks_exact(self.classes)
            .map(|row| {
                let mut best: Option<(usize, f32)> = None;
                for (index, &value) in row.iter().enumerate() {
                    if value.is_nan() {
                        continue;
                    }
                    match best {
                        Some((_, max)) if value <= max => {}
                        _ => best = Some((index, value)),
                    }
                }
                best.map(|(index, _)| index).unwrap_or(0)
            })
            .collect();

        OneHotMatrix::from_indices(indices, self.classes)
    }
}

/// What a strategy emits before the decision step.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    OneHot(OneHotMatrix),
    Probabilities(ProbabilityMatrix),
}

impl RawOutput {
    pub fn shape(&self) -> [usize; 2] {
        match self {
            RawOutput::OneHot(matrix) => matrix.shape(),
            RawOutput::Probabilities(matrix) => matrix.shape(),
        }
    }

    /// Turns the output into one-hot predictions; one-hot output passes through.
    pub fn decide(self) -> Result<OneHotMatrix, PipelineError> {
        match self {
            RawOutput::OneHot(matrix) => Ok(matrix),
            RawOutput::Probabilities(matrix) => matrix.decide(),
        }
    }
}
