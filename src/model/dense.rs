use burn::{
    nn::{Linear, LinearConfig, Relu},
    prelude::*,
};

use super::ClassifierNetwork;

/// Widths of the hidden layers, input side first.
pub const DENSE_HIDDEN: [usize; 3] = [64, 128, 256];

#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Length of a flattened input image.
    pub input_size: usize,
    pub num_classes: usize,
}

/// Feed-forward network: three ReLU hidden layers and a softmax output layer.
#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl DenseNetConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseNet<B> {
        let mut hidden = Vec::with_capacity(DENSE_HIDDEN.len());
        let mut d_input = self.input_size;

        for d_output in DENSE_HIDDEN {
            hidden.push(LinearConfig::new(d_input, d_output).init(device));
            d_input = d_output;
        }

        DenseNet {
            hidden,
            output: LinearConfig::new(d_input, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> DenseNet<B> {
    /// # Shapes
    ///   - Features [batch_size, input_size]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = features;

        for linear in self.hidden.iter() {
            x = linear.forward(x);
            x = self.activation.forward(x);
        }

        // Flatten is the identity on [batch_size, 256].
        let x: Tensor<B, 2> = x.flatten(1, 1);
        self.output.forward(x)
    }
}

impl<B: Backend> ClassifierNetwork<B, 2> for DenseNet<B> {
    fn logits(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn output_width_follows_class_count() {
        let device = Default::default();
        let model = DenseNetConfig::new(3072, 10).init::<TestBackend>(&device);

        let output = model.forward(Tensor::zeros([4, 3072], &device));

        assert_eq!(output.dims(), [4, 10]);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let device = Default::default();
        let model = DenseNetConfig::new(784, 10).init::<TestBackend>(&device);

        let probabilities = model.probabilities(Tensor::ones([2, 784], &device));
        let sums = probabilities
            .sum_dim(1)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-4, "{sum}");
        }
    }

    #[test]
    fn hidden_layers_follow_fixed_topology() {
        let device = Default::default();
        let model = DenseNetConfig::new(784, 20).init::<TestBackend>(&device);

        let widths: Vec<_> = model
            .hidden
            .iter()
            .map(|linear| linear.weight.dims()[1])
            .collect();

        assert_eq!(widths, DENSE_HIDDEN.to_vec());
        assert_eq!(model.output.weight.dims(), [256, 20]);
    }
}
