//! End to end run: acquire, preprocess, train, predict, decide and score.

use burn::{config::Config, tensor::backend::AutodiffBackend};

use crate::data::{preprocess, OneHotMatrix, PreparedSplit};
use crate::dataset::DatasetId;
use crate::error::PipelineError;
use crate::evaluation::score;
use crate::source::{acquire, DatasetSource};
use crate::strategy::{AlgorithmKind, Classifier, ConvStrategy, DenseStrategy, Guesser};
use crate::training::TrainingConfig;

#[derive(Config)]
pub struct PipelineConfig {
    pub dataset: DatasetId,
    pub algorithm: AlgorithmKind,
    #[config(default = 1618)]
    pub seed: u64,
    /// Let the guesser draw from every class instead of the first ten.
    #[config(default = false)]
    pub guess_all_classes: bool,
    #[config(default = "TrainingConfig::dense()")]
    pub dense: TrainingConfig,
    #[config(default = "TrainingConfig::conv()")]
    pub conv: TrainingConfig,
    #[config(default = 0.3)]
    pub dropout: f64,
    #[config(default = 32)]
    pub inference_batch_size: usize,
}

impl PipelineConfig {
    /// Parses both ids before anything runs.
    pub fn from_ids(dataset: &str, algorithm: &str) -> Result<Self, PipelineError> {
        Ok(Self::new(dataset.parse()?, algorithm.parse()?))
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub dataset: DatasetId,
    pub algorithm: AlgorithmKind,
    pub test_examples: usize,
    /// Share of correct predictions, in `[0, 1]`.
    pub accuracy: f64,
    pub predictions: OneHotMatrix,
}

/// Runs the whole pipeline once.
pub fn run<B: AutodiffBackend>(
    config: &PipelineConfig,
    source: &dyn DatasetSource,
    device: &B::Device,
) -> Result<Report, PipelineError> {
    let spec = config.dataset.spec();
    let layout = config.algorithm.input_layout();

    let (train, test) = acquire(source, &spec)?;
    let train = preprocess(&train, &spec, layout)?;
    let test = preprocess(&test, &spec, layout)?;

    println!("New shape of train features: {:?}.", train.features.shape());
    println!("New shape of train labels: {:?}.", train.labels.shape());
    println!("New shape of test features: {:?}.", test.features.shape());
    println!("New shape of test labels: {:?}.", test.labels.shape());

    let predictions = match config.algorithm {
        AlgorithmKind::Guesser => evaluate(
            &Guesser::new(spec.class_count, config.seed, config.guess_all_classes),
            train,
            &test,
        )?,
        AlgorithmKind::Dense => evaluate(
            &DenseStrategy::<B>::new(
                spec,
                config.dense.clone(),
                config.seed,
                config.inference_batch_size,
                device.clone(),
            ),
            train,
            &test,
        )?,
        AlgorithmKind::Conv => evaluate(
            &ConvStrategy::<B>::new(
                spec,
                config.conv.clone(),
                config.dropout,
                config.seed,
                config.inference_batch_size,
                device.clone(),
            ),
            train,
            &test,
        )?,
    };

    let accuracy = score(&predictions, &test.labels)?;

    println!("Classifier: {}", config.algorithm);
    println!("Accuracy: {:.2}%", accuracy * 100.0);

    Ok(Report {
        dataset: config.dataset,
        algorithm: config.algorithm,
        test_examples: test.len(),
        accuracy,
        predictions,
    })
}

fn evaluate<C: Classifier>(
    classifier: &C,
    train: PreparedSplit,
    test: &PreparedSplit,
) -> Result<OneHotMatrix, PipelineError> {
    log::info!(
        "Fitting {} on {} examples",
        classifier.kind(),
        train.len()
    );
    let model = classifier.train(train)?;

    log::info!("Predicting {} examples", test.len());
    let output = classifier.predict(&model, &test.features)?;
    if output.shape() != test.labels.shape() {
        return Err(PipelineError::ShapeMismatch {
            context: "strategy output",
            expected: test.labels.shape().to_vec(),
            actual: output.shape().to_vec(),
        });
    }

    output.decide()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_reference_setup() {
        let config = PipelineConfig::new(DatasetId::SmallColor10, AlgorithmKind::Conv);

        assert_eq!(config.seed, 1618);
        assert!(!config.guess_all_classes);
        assert_eq!(config.dense.num_epochs, 6);
        assert_eq!(config.conv.num_epochs, 30);
        assert!(config.conv.track_accuracy);
        assert_eq!(config.dropout, 0.3);
        assert_eq!(config.inference_batch_size, 32);
    }

    #[test]
    fn ids_are_parsed_before_running() {
        let config = PipelineConfig::from_ids("cifar_100_f", "tf_conv").unwrap();
        assert_eq!(config.dataset, DatasetId::SmallColor100Fine);
        assert_eq!(config.algorithm, AlgorithmKind::Conv);

        assert!(matches!(
            PipelineConfig::from_ids("imagenet", "tf_conv"),
            Err(PipelineError::UnknownDataset(_))
        ));
        assert!(matches!(
            PipelineConfig::from_ids("mnist_d", "forest"),
            Err(PipelineError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn config_json_uses_short_ids() {
        let config = PipelineConfig::new(DatasetId::GarmentGrayscale, AlgorithmKind::Dense);

        let json = config.to_string();

        assert!(json.contains("\"mnist_f\""), "{json}");
        assert!(json.contains("\"tf_net\""), "{json}");
    }
}
