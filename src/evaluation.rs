use crate::data::OneHotMatrix;
use crate::error::PipelineError;

/// Share of rows whose predicted one-hot vector equals the true one.
///
/// Both matrices must have the same `[rows, classes]` shape and at least one row.
pub fn score(predictions: &OneHotMatrix, truth: &OneHotMatrix) -> Result<f64, PipelineError> {
    if predictions.shape() != truth.shape() {
        return Err(PipelineError::ShapeMismatch {
            context: "predictions and truth",
            expected: truth.shape().to_vec(),
            actual: predictions.shape().to_vec(),
        });
    }

    if truth.rows() == 0 {
        return Err(PipelineError::EmptySplit("scored predictions"));
    }

    let matches = predictions
        .indices()
        .iter()
        .zip(truth.indices())
        .filter(|(predicted, expected)| predicted == expected)
        .count();

    Ok(matches as f64 / truth.rows() as f64)
}
