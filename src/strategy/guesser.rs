use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{AlgorithmKind, Classifier, RawOutput};
use crate::data::{FeatureMatrix, OneHotMatrix, PreparedSplit};
use crate::error::PipelineError;

/// Upper bound (exclusive) of the legacy guess range.
const LEGACY_GUESS_RANGE: usize = 10;

/// Baseline that answers a uniformly drawn class for every example.
///
/// By default the draw stays in `[0, 9]` whatever the class count; with
/// `all_classes` it covers `[0, class_count - 1]`.
#[derive(new, Debug, Clone)]
pub struct Guesser {
    class_count: usize,
    seed: u64,
    all_classes: bool,
}

impl Guesser {
    fn guess_range(&self) -> usize {
        if self.all_classes {
            self.class_count
        } else {
            LEGACY_GUESS_RANGE.min(self.class_count)
        }
    }
}

impl Classifier for Guesser {
    type Model = ();

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Guesser
    }

    fn train(&self, _train: PreparedSplit) -> Result<Self::Model, PipelineError> {
        Ok(())
    }

    fn predict(
        &self,
        _model: &Self::Model,
        features: &FeatureMatrix,
    ) -> Result<RawOutput, PipelineError> {
        if !self.all_classes && self.class_count != LEGACY_GUESS_RANGE {
            log::warn!(
                "Guessing among the first {} of {} classes",
                self.guess_range(),
                self.class_count
            );
        }

        let range = self.guess_range();
        if range == 0 {
            return Err(PipelineError::EmptySplit("guesser classes"));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let indices = (0..features.rows())
            .map(|_| rng.gen_range(0..range))
            .collect();

        OneHotMatrix::from_indices(indices, self.class_count).map(RawOutput::OneHot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(rows: usize) -> FeatureMatrix {
        FeatureMatrix::new(vec![0.0; rows * 4], vec![rows, 4]).unwrap()
    }

    fn guesses(guesser: &Guesser, rows: usize) -> OneHotMatrix {
        guesser.predict(&(), &features(rows)).unwrap().decide().unwrap()
    }

    #[test]
    fn every_row_is_one_hot() {
        let guesser = Guesser::new(10, 1618, false);

        let predictions = guesses(&guesser, 50);
        let dense = predictions.to_dense();

        assert_eq!(predictions.shape(), [50, 10]);
        for row in dense.chunks_exact(10) {
            assert_eq!(row.iter().filter(|&&v| v == 1.0).count(), 1);
            assert_eq!(row.iter().filter(|&&v| v == 0.0).count(), 9);
        }
    }

    #[test]
    fn ten_classes_are_covered_uniformly() {
        let guesser = Guesser::new(10, 7, false);

        let predictions = guesses(&guesser, 10_000);
        let mut counts = [0usize; 10];
        for &index in predictions.indices() {
            counts[index] += 1;
        }

        for count in counts {
            assert!((800..1200).contains(&count), "{counts:?}");
        }
    }

    #[test]
    fn same_seed_same_guesses() {
        let first = guesses(&Guesser::new(10, 3, false), 100);
        let second = guesses(&Guesser::new(10, 3, false), 100);

        assert_eq!(first, second);
    }

    #[test]
    fn legacy_range_ignores_extra_classes() {
        let predictions = guesses(&Guesser::new(100, 11, false), 2_000);

        assert_eq!(predictions.classes(), 100);
        assert!(predictions.indices().iter().all(|&index| index < 10));
    }

    #[test]
    fn all_classes_range_reaches_past_ten() {
        let predictions = guesses(&Guesser::new(20, 11, true), 2_000);

        assert!(predictions.indices().iter().any(|&index| index >= 10));
        assert!(predictions.indices().iter().all(|&index| index < 20));
    }

    #[test]
    fn training_is_a_no_op() {
        let split = PreparedSplit::new(
            features(2),
            OneHotMatrix::from_indices(vec![0, 1], 10).unwrap(),
        )
        .unwrap();

        Guesser::new(10, 0, false).train(split).unwrap();
    }
}
