//! Registry of the supported datasets and their shape metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Identifier of one of the supported datasets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetId {
    /// Handwritten digits (MNIST).
    #[serde(rename = "mnist_d")]
    DigitGrayscale,
    /// Clothing articles (Fashion-MNIST).
    #[serde(rename = "mnist_f")]
    GarmentGrayscale,
    /// CIFAR-10.
    #[serde(rename = "cifar_10")]
    SmallColor10,
    /// CIFAR-100 with its 100 fine labels.
    #[serde(rename = "cifar_100_f")]
    SmallColor100Fine,
    /// CIFAR-100 with its 20 coarse (superclass) labels.
    #[serde(rename = "cifar_100_c")]
    SmallColor100Coarse,
}

/// Which label column of the source file is read.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
    /// The file carries a single label per image.
    Single,
    /// Fine label of a two-level labeled file.
    Fine,
    /// Coarse label of a two-level labeled file.
    Coarse,
}

/// Shape metadata of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSpec {
    pub id: DatasetId,
    pub class_count: usize,
    pub height: usize,
    pub width: usize,
    pub depth: usize,
    pub label_mode: LabelMode,
}

impl DatasetSpec {
    /// Number of values in one flattened image.
    pub fn flattened_size(&self) -> usize {
        self.height * self.width * self.depth
    }

    /// Per image shape, channels last.
    pub fn image_shape(&self) -> [usize; 3] {
        [self.height, self.width, self.depth]
    }
}

impl DatasetId {
    /// Every supported dataset, in registry order.
    pub const ALL: [DatasetId; 5] = [
        DatasetId::DigitGrayscale,
        DatasetId::GarmentGrayscale,
        DatasetId::SmallColor10,
        DatasetId::SmallColor100Fine,
        DatasetId::SmallColor100Coarse,
    ];

    /// Short id used in configuration files and console output.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetId::DigitGrayscale => "mnist_d",
            DatasetId::GarmentGrayscale => "mnist_f",
            DatasetId::SmallColor10 => "cifar_10",
            DatasetId::SmallColor100Fine => "cifar_100_f",
            DatasetId::SmallColor100Coarse => "cifar_100_c",
        }
    }

    pub fn spec(&self) -> DatasetSpec {
        let (class_count, height, width, depth, label_mode) = match self {
            DatasetId::DigitGrayscale => (10, 28, 28, 1, LabelMode::Single),
            DatasetId::GarmentGrayscale => (10, 28, 28, 1, LabelMode::Single),
            DatasetId::SmallColor10 => (10, 32, 32, 3, LabelMode::Single),
            DatasetId::SmallColor100Fine => (100, 32, 32, 3, LabelMode::Fine),
            DatasetId::SmallColor100Coarse => (20, 32, 32, 3, LabelMode::Coarse),
        };

        DatasetSpec {
            id: *self,
            class_count,
            height,
            width,
            depth,
            label_mode,
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mnist_d" | "digit-grayscale" => Ok(DatasetId::DigitGrayscale),
            "mnist_f" | "garment-grayscale" => Ok(DatasetId::GarmentGrayscale),
            "cifar_10" | "small-color-10" => Ok(DatasetId::SmallColor10),
            "cifar_100_f" | "small-color-100-fine" => Ok(DatasetId::SmallColor100Fine),
            "cifar_100_c" | "small-color-100-coarse" => Ok(DatasetId::SmallColor100Coarse),
            other => Err(PipelineError::UnknownDataset(other.to_string())),
        }
    }
}

/// Looks up the shape metadata of a dataset by its id.
pub fn lookup(id: &str) -> Result<DatasetSpec, PipelineError> {
    id.parse::<DatasetId>().map(|id| id.spec())
}
