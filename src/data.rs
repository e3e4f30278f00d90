//! Raw and prepared dataset splits, preprocessing and batching.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};

use crate::dataset::DatasetSpec;
use crate::error::PipelineError;

/// How a strategy expects its input features to be laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// One row of `flattened_size` raw intensities per image.
    Flat,
    /// `[height, width, depth]` intensities rescaled to `[0, 1]` per image.
    Image,
}

/// Images and integer labels of one partition, as produced by a dataset source.
///
/// Pixels are stored contiguously, one image after the other, channels last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSplit {
    pixels: Vec<u8>,
    image_shape: [usize; 3],
    labels: Vec<usize>,
}

impl RawSplit {
    /// Creates a split without checking that pixels and labels agree.
    /// The check happens in [preprocess](preprocess).
    pub fn new(pixels: Vec<u8>, image_shape: [usize; 3], labels: Vec<usize>) -> Self {
        Self {
            pixels,
            image_shape,
            labels,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn image_shape(&self) -> [usize; 3] {
        self.image_shape
    }

    fn image_len(&self) -> usize {
        self.image_shape.iter().product()
    }

    /// Number of complete images in the pixel buffer.
    pub fn image_count(&self) -> usize {
        match self.image_len() {
            0 => 0,
            len => self.pixels.len() / len,
        }
    }

    /// Iterates over the images, one pixel slice per image.
    pub fn images(&self) -> impl Iterator<Item = &[u8]> {
        self.pixels.chunks_exact(self.image_len().max(1))
    }

    /// `[count, height, width, depth]` of the image buffer.
    pub fn shape(&self) -> [usize; 4] {
        let [h, w, d] = self.image_shape;
        [self.image_count(), h, w, d]
    }
}

/// Row-major `f32` features; the first dimension is the example count.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    values: Vec<f32>,
    shape: Vec<usize>,
}

impl FeatureMatrix {
    pub fn new(values: Vec<f32>, shape: Vec<usize>) -> Result<Self, PipelineError> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || values.len() != expected {
            return Err(PipelineError::ShapeMismatch {
                context: "feature buffer",
                expected: shape,
                actual: vec![values.len()],
            });
        }

        Ok(Self { values, shape })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Shape of a single example.
    pub fn row_shape(&self) -> &[usize] {
        &self.shape[1..]
    }

    pub fn row_len(&self) -> usize {
        self.row_shape().iter().product()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let len = self.row_len();
        &self.values[index * len..(index + 1) * len]
    }

    /// Contiguous values of the rows in `start..end`.
    pub fn rows_slice(&self, start: usize, end: usize) -> &[f32] {
        let len = self.row_len();
        &self.values[start * len..end * len]
    }
}

/// `[rows, classes]` matrix with exactly one 1 per row.
///
/// Stored as the hot index of each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHotMatrix {
    indices: Vec<usize>,
    classes: usize,
}

impl OneHotMatrix {
    pub fn from_indices(indices: Vec<usize>, classes: usize) -> Result<Self, PipelineError> {
        if let Some(&label) = indices.iter().find(|&&index| index >= classes) {
            return Err(PipelineError::LabelOutOfRange {
                label,
                class_count: classes,
            });
        }

        Ok(Self { indices, classes })
    }

    /// Reads a dense row-major 0/1 buffer.
    pub fn from_dense(values: &[f32], classes: usize) -> Result<Self, PipelineError> {
        if classes == 0 || values.len() % classes != 0 {
            return Err(PipelineError::ShapeMismatch {
                context: "one-hot buffer",
                expected: vec![classes],
                actual: vec![values.len()],
            });
        }

        let indices = values
            .chunks_exact(classes)
            .enumerate()
            .map(|(row, chunk)| {
                let ones = chunk.iter().filter(|&&v| v == 1.0).count();
                let zeros = chunk.iter().filter(|&&v| v == 0.0).count();
                match (ones, zeros) {
                    (1, z) if z == classes - 1 => chunk
                        .iter()
                        .position(|&v| v == 1.0)
                        .ok_or(PipelineError::InvalidOneHot { row }),
                    _ => Err(PipelineError::InvalidOneHot { row }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { indices, classes })
    }

    pub fn rows(&self) -> usize {
        self.indices.len()
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows(), self.classes]
    }

    /// Hot index of every row.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn row(&self, index: usize) -> Vec<f32> {
        let mut row = vec![0.0; self.classes];
        row[self.indices[index]] = 1.0;
        row
    }

    pub fn to_dense(&self) -> Vec<f32> {
        let mut values = vec![0.0; self.rows() * self.classes];
        for (row, &index) in self.indices.iter().enumerate() {
            values[row * self.classes + index] = 1.0;
        }
        values
    }
}

/// Features and one-hot labels ready for a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSplit {
    pub features: FeatureMatrix,
    pub labels: OneHotMatrix,
}

impl PreparedSplit {
    pub fn new(features: FeatureMatrix, labels: OneHotMatrix) -> Result<Self, PipelineError> {
        if features.rows() != labels.rows() {
            return Err(PipelineError::ShapeMismatch {
                context: "feature and label rows",
                expected: vec![features.rows()],
                actual: vec![labels.rows()],
            });
        }

        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.features.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reshapes, rescales and one-hot encodes a raw split.
///
/// The flat layout keeps raw intensities; only the image layout divides them by 255.
pub fn preprocess(
    raw: &RawSplit,
    spec: &DatasetSpec,
    layout: InputLayout,
) -> Result<PreparedSplit, PipelineError> {
    if raw.image_shape() != spec.image_shape() {
        return Err(PipelineError::ShapeMismatch {
            context: "image shape",
            expected: spec.image_shape().to_vec(),
            actual: raw.image_shape().to_vec(),
        });
    }

    let image_len = spec.flattened_size();
    if raw.pixels().len() % image_len != 0 {
        return Err(PipelineError::ShapeMismatch {
            context: "pixel buffer",
            expected: vec![image_len],
            actual: vec![raw.pixels().len()],
        });
    }

    let count = raw.image_count();
    if count != raw.labels().len() {
        return Err(PipelineError::ShapeMismatch {
            context: "image and label count",
            expected: vec![count],
            actual: vec![raw.labels().len()],
        });
    }

    let features = match layout {
        InputLayout::Flat => FeatureMatrix::new(
            raw.pixels().iter().map(|&p| p as f32).collect(),
            vec![count, image_len],
        )?,
        InputLayout::Image => FeatureMatrix::new(
            raw.pixels().iter().map(|&p| p as f32 / 255.0).collect(),
            vec![count, spec.height, spec.width, spec.depth],
        )?,
    };
    let labels = OneHotMatrix::from_indices(raw.labels().to_vec(), spec.class_count)?;

    PreparedSplit::new(features, labels)
}

/// One example of a prepared split.
#[derive(Clone, Debug)]
pub struct PreparedItem {
    pub features: Vec<f32>,
    pub target: Vec<f32>,
}

impl Dataset<PreparedItem> for PreparedSplit {
    fn get(&self, index: usize) -> Option<PreparedItem> {
        if index >= self.len() {
            return None;
        }

        Some(PreparedItem {
            features: self.features.row(index).to_vec(),
            target: self.labels.row(index),
        })
    }

    fn len(&self) -> usize {
        self.features.rows()
    }
}

/// Stacks prepared items into rank `D` feature tensors and one-hot targets.
#[derive(Clone, Debug)]
pub struct FeatureBatcher<B: Backend, const D: usize> {
    device: B::Device,
    row_shape: Vec<usize>,
    classes: usize,
}

#[derive(Clone, Debug)]
pub struct FeatureBatch<B: Backend, const D: usize> {
    pub features: Tensor<B, D>,
    pub targets: Tensor<B, 2>,
}

impl<B: Backend, const D: usize> FeatureBatcher<B, D> {
    /// Fails when the features of `split` are not of rank `D`.
    pub fn new(device: B::Device, split: &PreparedSplit) -> Result<Self, PipelineError> {
        Self::for_features(device, &split.features, split.labels.classes())
    }

    pub fn for_features(
        device: B::Device,
        features: &FeatureMatrix,
        classes: usize,
    ) -> Result<Self, PipelineError> {
        if features.rank() != D {
            return Err(PipelineError::ShapeMismatch {
                context: "feature rank",
                expected: vec![D],
                actual: vec![features.rank()],
            });
        }

        Ok(Self {
            device,
            row_shape: features.row_shape().to_vec(),
            classes,
        })
    }

    /// Builds a `[rows, ..row_shape]` tensor from contiguous row values.
    pub fn features(&self, values: Vec<f32>, rows: usize) -> Tensor<B, D> {
        let mut shape = Vec::with_capacity(D);
        shape.push(rows);
        shape.extend_from_slice(&self.row_shape);

        let data = TensorData::new(values, shape);
        Tensor::<B, D>::from_data(data.convert::<B::FloatElem>(), &self.device)
    }
}

impl<B: Backend, const D: usize> Batcher<PreparedItem, FeatureBatch<B, D>>
    for FeatureBatcher<B, D>
{
    fn batch(&self, items: Vec<PreparedItem>) -> FeatureBatch<B, D> {
        let rows = items.len();
        let mut features = Vec::with_capacity(rows * self.row_shape.iter().product::<usize>());
        let mut targets = Vec::with_capacity(rows * self.classes);

        for item in items {
            features.extend(item.features);
            targets.extend(item.target);
        }

        let targets = TensorData::new(targets, [rows, self.classes]);

        FeatureBatch {
            features: self.features(features, rows),
            targets: Tensor::<B, 2>::from_data(targets.convert::<B::FloatElem>(), &self.device),
        }
    }
}
