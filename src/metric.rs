//! Running metrics reported while a network trains.

use burn::prelude::*;

/// Output of one training step.
#[derive(new, Debug, Clone)]
pub struct ClassificationOutput<B: Backend> {
    /// Mean loss of the batch, `[1]`.
    pub loss: Tensor<B, 1>,
    /// Class logits, `[batch_size, num_classes]`.
    pub output: Tensor<B, 2>,
    /// One-hot targets, `[batch_size, num_classes]`.
    pub targets: Tensor<B, 2>,
}

impl<B: Backend> ClassificationOutput<B> {
    pub fn batch_size(&self) -> usize {
        self.output.dims()[0]
    }
}

/// A metric aggregated over the batches of an epoch.
pub trait RunningMetric<T> {
    fn update(&mut self, item: &T) -> MetricEntry;
    fn clear(&mut self);
}

#[derive(new, Debug, Clone, PartialEq)]
pub struct MetricEntry {
    pub name: String,
    pub formatted: String,
    pub running: f64,
    pub current: f64,
}

/// Mean loss, weighted by batch size.
#[derive(Default, Debug)]
pub struct LossMetric {
    total: f64,
    count: usize,
}

impl LossMetric {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> RunningMetric<ClassificationOutput<B>> for LossMetric {
    fn update(&mut self, item: &ClassificationOutput<B>) -> MetricEntry {
        let batch_size = item.batch_size();
        let current = item.loss.clone().into_scalar().elem::<f64>();

        self.total += current * batch_size as f64;
        self.count += batch_size;
        let running = self.total / self.count.max(1) as f64;

        MetricEntry::new(
            "Loss".to_string(),
            format!("running {running:.4} current {current:.4}"),
            running,
            current,
        )
    }

    fn clear(&mut self) {
        self.total = 0.0;
        self.count = 0;
    }
}

/// Share of examples whose arg-max logit is the target class.
#[derive(Default, Debug)]
pub struct AccuracyMetric {
    correct: usize,
    count: usize,
}

impl AccuracyMetric {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> RunningMetric<ClassificationOutput<B>> for AccuracyMetric {
    fn update(&mut self, item: &ClassificationOutput<B>) -> MetricEntry {
        let batch_size = item.batch_size();
        let predictions = item.output.clone().argmax(1);
        let targets = item.targets.clone().argmax(1);
        let correct = predictions
            .equal(targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize;

        self.correct += correct;
        self.count += batch_size;
        let current = correct as f64 / batch_size.max(1) as f64;
        let running = self.correct as f64 / self.count.max(1) as f64;

        MetricEntry::new(
            "Accuracy".to_string(),
            format!(
                "running {:.2}% current {:.2}%",
                running * 100.0,
                current * 100.0
            ),
            running,
            current,
        )
    }

    fn clear(&mut self) {
        self.correct = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn output(
        logits: [[f32; 3]; 2],
        targets: [[f32; 3]; 2],
        loss: f32,
    ) -> ClassificationOutput<TestBackend> {
        let device = Default::default();
        ClassificationOutput::new(
            Tensor::from_floats([loss], &device),
            Tensor::from_floats(logits, &device),
            Tensor::from_floats(targets, &device),
        )
    }

    #[test]
    fn accuracy_counts_argmax_hits() {
        let mut metric = AccuracyMetric::new();

        let entry = metric.update(&output(
            [[0.1, 0.7, 0.2], [0.9, 0.05, 0.05]],
            [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            1.0,
        ));
        assert_eq!(entry.current, 0.5);

        let entry = metric.update(&output(
            [[0.1, 0.7, 0.2], [0.0, 0.1, 0.9]],
            [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            1.0,
        ));
        assert_eq!(entry.current, 1.0);
        assert_eq!(entry.running, 0.75);

        RunningMetric::<ClassificationOutput<TestBackend>>::clear(&mut metric);
        assert_eq!(metric.count, 0);
    }

    #[test]
    fn loss_is_weighted_by_batch_size() {
        let mut metric = LossMetric::new();
        let targets = [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];

        metric.update(&output([[0.0; 3]; 2], targets, 2.0));
        let entry = metric.update(&output([[0.0; 3]; 2], targets, 1.0));

        assert_eq!(entry.current, 1.0);
        assert_eq!(entry.running, 1.5);
    }
}
