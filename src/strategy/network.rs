use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};

use super::{AlgorithmKind, Classifier, RawOutput};
use crate::data::{FeatureMatrix, PreparedSplit};
use crate::dataset::DatasetSpec;
use crate::error::PipelineError;
use crate::model::{ConvNet, ConvNetConfig, DenseNet, DenseNetConfig};
use crate::training::{fit, predict_probabilities, TrainingConfig};

/// Trains a [DenseNet](DenseNet) on flat features.
#[derive(new)]
pub struct DenseStrategy<B: AutodiffBackend> {
    spec: DatasetSpec,
    config: TrainingConfig,
    seed: u64,
    inference_batch_size: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> Classifier for DenseStrategy<B> {
    type Model = DenseNet<B>;

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Dense
    }

    fn train(&self, train: PreparedSplit) -> Result<Self::Model, PipelineError> {
        println!("Building and training the dense network.");
        B::seed(self.seed);

        let model = DenseNetConfig::new(self.spec.flattened_size(), self.spec.class_count)
            .init::<B>(&self.device);

        fit::<B, _, 2>(model, train, &self.config, self.seed, &self.device)
    }

    fn predict(
        &self,
        model: &Self::Model,
        features: &FeatureMatrix,
    ) -> Result<RawOutput, PipelineError> {
        println!("Testing the dense network.");
        let model = model.valid();

        predict_probabilities::<B::InnerBackend, _, 2>(
            &model,
            features,
            self.spec.class_count,
            self.inference_batch_size,
            &self.device,
        )
        .map(RawOutput::Probabilities)
    }
}

/// Trains a [ConvNet](ConvNet) on `[N, h, w, d]` image features.
#[derive(new)]
pub struct ConvStrategy<B: AutodiffBackend> {
    spec: DatasetSpec,
    config: TrainingConfig,
    dropout: f64,
    seed: u64,
    inference_batch_size: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> ConvStrategy<B> {
    fn network_config(&self) -> ConvNetConfig {
        ConvNetConfig::new(
            self.spec.height,
            self.spec.width,
            self.spec.depth,
            self.spec.class_count,
        )
        .with_dropout(self.dropout)
    }
}

impl<B: AutodiffBackend> Classifier for ConvStrategy<B> {
    type Model = ConvNet<B>;

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Conv
    }

    fn train(&self, train: PreparedSplit) -> Result<Self::Model, PipelineError> {
        println!("Building and training the convolutional network.");
        B::seed(self.seed);

        let model = self.network_config().init::<B>(&self.device);

        fit::<B, _, 4>(model, train, &self.config, self.seed, &self.device)
    }

    fn predict(
        &self,
        model: &Self::Model,
        features: &FeatureMatrix,
    ) -> Result<RawOutput, PipelineError> {
        println!("Testing the convolutional network.");
        let model = model.valid();

        predict_probabilities::<B::InnerBackend, _, 4>(
            &model,
            features,
            self.spec.class_count,
            self.inference_batch_size,
            &self.device,
        )
        .map(RawOutput::Probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{preprocess, InputLayout, RawSplit};
    use crate::dataset::DatasetId;
    use burn::backend::{Autodiff, NdArray};

    type TestAutodiffBackend = Autodiff<NdArray>;

    fn raw_split(spec: &DatasetSpec, count: usize) -> RawSplit {
        let pixels = (0..count * spec.flattened_size())
            .map(|i| (i % 251) as u8)
            .collect();
        let labels = (0..count).map(|i| i % spec.class_count).collect();

        RawSplit::new(pixels, spec.image_shape(), labels)
    }

    #[test]
    fn dense_strategy_predicts_one_row_per_example() {
        let spec = DatasetId::GarmentGrayscale.spec();
        let split = preprocess(&raw_split(&spec, 6), &spec, InputLayout::Flat).unwrap();
        let strategy = DenseStrategy::<TestAutodiffBackend>::new(
            spec,
            TrainingConfig::new(1).with_batch_size(4),
            1618,
            4,
            Default::default(),
        );

        let model = strategy.train(split.clone()).unwrap();
        let output = strategy.predict(&model, &split.features).unwrap();

        assert!(matches!(output, RawOutput::Probabilities(_)));
        assert_eq!(output.shape(), [6, 10]);
    }

    #[test]
    fn conv_strategy_output_width_is_class_count() {
        let spec = DatasetId::SmallColor100Coarse.spec();
        let split = preprocess(&raw_split(&spec, 3), &spec, InputLayout::Image).unwrap();
        let strategy = ConvStrategy::<TestAutodiffBackend>::new(
            spec,
            TrainingConfig::new(1).with_track_accuracy(true).with_batch_size(2),
            0.3,
            1618,
            2,
            Default::default(),
        );

        let model = strategy.train(split.clone()).unwrap();
        let output = strategy.predict(&model, &split.features).unwrap();

        assert_eq!(output.shape(), [3, 20]);
    }

    #[test]
    fn conv_strategy_rejects_flat_features() {
        let spec = DatasetId::DigitGrayscale.spec();
        let split = preprocess(&raw_split(&spec, 2), &spec, InputLayout::Flat).unwrap();
        let strategy = ConvStrategy::<TestAutodiffBackend>::new(
            spec,
            TrainingConfig::new(1).with_track_accuracy(true),
            0.3,
            0,
            2,
            Default::default(),
        );

        let result = strategy.train(split);

        assert!(matches!(result, Err(PipelineError::ShapeMismatch { .. })));
    }
}
