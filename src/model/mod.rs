pub mod conv;
pub mod dense;

pub use conv::*;
pub use dense::*;

use burn::prelude::*;

/// A network mapping a rank `D` feature batch to one row of class logits per example.
pub trait ClassifierNetwork<B: Backend, const D: usize> {
    /// Unnormalized class scores, `[batch, classes]`.
    fn logits(&self, features: Tensor<B, D>) -> Tensor<B, 2>;

    /// Softmax output layer, `[batch, classes]`.
    fn probabilities(&self, features: Tensor<B, D>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.logits(features), 1)
    }
}
