use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    prelude::*,
};

use super::ClassifierNetwork;

/// Output channels of the four convolution blocks.
pub const CONV_CHANNELS: [usize; 4] = [32, 64, 128, 256];
/// Width of the dense layer after the convolution tower.
pub const CONV_DENSE: usize = 512;

// Keras defaults: epsilon 1e-3 and a running average keeping 99% of the previous statistics.
const NORM_EPSILON: f64 = 1e-3;
const NORM_MOMENTUM: f64 = 0.01;

#[derive(Config, Debug)]
pub struct ConvNetConfig {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub num_classes: usize,
    #[config(default = 0.3)]
    pub dropout: f64,
}

/// Convolution 3x3 (same padding) + ReLU, max pool 2x2, batch norm and dropout.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    norm: BatchNorm<B, 2>,
    dropout: Dropout,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels: [usize; 2], dropout: f64, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            norm: BatchNormConfig::new(channels[1])
                .with_epsilon(NORM_EPSILON)
                .with_momentum(NORM_MOMENTUM)
                .init(device),
            dropout: DropoutConfig::new(dropout).init(),
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        let x = self.norm.forward(x);

        self.dropout.forward(x)
    }
}

/// Convolutional network: four [ConvBlock](ConvBlock)s, then
/// flatten, batch norm, dense 512 + ReLU, dropout and a softmax output layer.
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    norm: BatchNorm<B, 0>,
    dense: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    activation: Relu,
}

impl ConvNetConfig {
    /// Number of features left after the convolution tower.
    ///
    /// Every block halves the spatial size, rounding down.
    pub fn flattened_size(&self) -> usize {
        let halve = |size: usize| (0..CONV_CHANNELS.len()).fold(size, |size, _| size / 2);
        let channels = CONV_CHANNELS[CONV_CHANNELS.len() - 1];

        channels * halve(self.height) * halve(self.width)
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvNet<B> {
        let mut blocks = Vec::with_capacity(CONV_CHANNELS.len());
        let mut channels_in = self.channels;

        for channels_out in CONV_CHANNELS {
            blocks.push(ConvBlock::new([channels_in, channels_out], self.dropout, device));
            channels_in = channels_out;
        }

        let flattened = self.flattened_size();

        ConvNet {
            blocks,
            norm: BatchNormConfig::new(flattened)
                .with_epsilon(NORM_EPSILON)
                .with_momentum(NORM_MOMENTUM)
                .init(device),
            dense: LinearConfig::new(flattened, CONV_DENSE).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(CONV_DENSE, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ConvNet<B> {
    /// # Shapes
    ///   - Images [batch_size, height, width, channels]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // [B, H, W, C] -> [B, C, H, W]
        let mut x = images.swap_dims(3, 2).swap_dims(2, 1);

        for block in self.blocks.iter() {
            x = block.forward(x);
        }

        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.norm.forward(x);
        let x = self.dense.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.output.forward(x)
    }
}

impl<B: Backend> ClassifierNetwork<B, 4> for ConvNet<B> {
    fn logits(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(features)
    }
}
