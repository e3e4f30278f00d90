use std::time::Instant;

use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, loss::cross_entropy_with_logits},
};

use crate::data::{FeatureBatcher, FeatureMatrix, PreparedSplit};
use crate::error::PipelineError;
use crate::metric::{AccuracyMetric, ClassificationOutput, LossMetric, RunningMetric};
use crate::model::ClassifierNetwork;
use crate::strategy::ProbabilityMatrix;

#[derive(Config)]
pub struct TrainingConfig {
    pub num_epochs: usize,
    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Report the running accuracy next to the loss after every epoch.
    #[config(default = false)]
    pub track_accuracy: bool,
    #[config(default = "AdamConfig::new().with_epsilon(1e-7)")]
    pub optimizer: AdamConfig,
}

impl TrainingConfig {
    /// 6 epochs of batch size 100, loss only, Adam epsilon 1e-8.
    pub fn dense() -> Self {
        Self::new(6).with_optimizer(AdamConfig::new().with_epsilon(1e-8))
    }

    /// 30 epochs of batch size 100, accuracy tracked.
    pub fn conv() -> Self {
        Self::new(30).with_track_accuracy(true)
    }
}

/// Trains `model` on `split` with categorical cross-entropy and Adam.
///
/// The split is shuffled with `seed` at the start of every epoch.
pub fn fit<B, M, const D: usize>(
    model: M,
    split: PreparedSplit,
    config: &TrainingConfig,
    seed: u64,
    device: &B::Device,
) -> Result<M, PipelineError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ClassifierNetwork<B, D>,
{
    let batcher = FeatureBatcher::<B, D>::new(device.clone(), &split)?;
    let num_items = split.len();
    let dataloader = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size.max(1))
        .shuffle(seed)
        .build(split);

    let mut model = model;
    let mut optim = config.optimizer.init::<B, M>();
    let mut loss_metric = LossMetric::new();
    let mut accuracy_metric = AccuracyMetric::new();

    log::info!(
        "Training on {num_items} examples for {} epochs",
        config.num_epochs
    );

    for epoch in 1..=config.num_epochs {
        let now = Instant::now();
        let mut loss = None;
        let mut accuracy = None;

        for batch in dataloader.iter() {
            let output = model.logits(batch.features);
            let item = ClassificationOutput::new(
                cross_entropy_with_logits(output.clone(), batch.targets.clone()),
                output,
                batch.targets,
            );

            // Gradients for the current backward pass
            let grads = item.loss.backward();
            // Gradients linked to each parameter of the model.
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.learning_rate, model, grads);

            loss = Some(loss_metric.update(&item));
            if config.track_accuracy {
                accuracy = Some(accuracy_metric.update(&item));
            }
        }

        let elapsed = now.elapsed().as_secs_f32();
        match (loss, accuracy) {
            (Some(loss), Some(accuracy)) => log::info!(
                "Epoch {epoch}/{} ({elapsed:.1}s) - {}: {} - {}: {}",
                config.num_epochs,
                loss.name,
                loss.formatted,
                accuracy.name,
                accuracy.formatted
            ),
            (Some(loss), None) => log::info!(
                "Epoch {epoch}/{} ({elapsed:.1}s) - {}: {}",
                config.num_epochs,
                loss.name,
                loss.formatted
            ),
            _ => log::info!("Epoch {epoch}/{} had no batch", config.num_epochs),
        }

        RunningMetric::<ClassificationOutput<B>>::clear(&mut loss_metric);
        RunningMetric::<ClassificationOutput<B>>::clear(&mut accuracy_metric);
    }

    Ok(model)
}

/// Runs the softmax output of `model` over `features`, `batch_size` rows at a time.
pub fn predict_probabilities<B, M, const D: usize>(
    model: &M,
    features: &FeatureMatrix,
    num_classes: usize,
    batch_size: usize,
    device: &B::Device,
) -> Result<ProbabilityMatrix, PipelineError>
where
    B: Backend,
    M: ClassifierNetwork<B, D>,
{
    let batcher = FeatureBatcher::<B, D>::for_features(device.clone(), features, num_classes)?;
    let rows = features.rows();
    let mut values = Vec::with_capacity(rows * num_classes);

    for start in (0..rows).step_by(batch_size.max(1)) {
        let end = (start + batch_size.max(1)).min(rows);
        let input = batcher.features(features.rows_slice(start, end).to_vec(), end - start);

        let probabilities = model.probabilities(input).into_data().convert::<f32>();
        let probabilities = probabilities
            .to_vec::<f32>()
            .map_err(|err| PipelineError::Tensor(format!("{err:?}")))?;
        values.extend(probabilities);
    }

    ProbabilityMatrix::new(values, num_classes)
}
