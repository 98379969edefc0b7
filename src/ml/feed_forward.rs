// ============================================================
// Layer 5 — Point-Wise Feed-Forward Block
// ============================================================
// Two per-position projections (hidden → hidden), equivalent to
// 1x1 convolutions over the sequence axis:
//
//   out = dropout2(linear2(relu(dropout1(linear1(x))))) + x
//
// No normalisation inside; the encoder layer-normalises the
// input before calling this block.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct PointWiseFeedForwardConfig {
    pub hidden_units: usize,
    #[config(default = 0.2)]
    pub dropout_rate: f64,
}

impl PointWiseFeedForwardConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PointWiseFeedForward<B> {
        PointWiseFeedForward {
            linear1:  LinearConfig::new(self.hidden_units, self.hidden_units).init(device),
            dropout1: DropoutConfig::new(self.dropout_rate).init(),
            linear2:  LinearConfig::new(self.hidden_units, self.hidden_units).init(device),
            dropout2: DropoutConfig::new(self.dropout_rate).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct PointWiseFeedForward<B: Backend> {
    linear1:  Linear<B>,
    dropout1: Dropout,
    linear2:  Linear<B>,
    dropout2: Dropout,
}

impl<B: Backend> PointWiseFeedForward<B> {
    /// inputs: [batch, seq, hidden] → [batch, seq, hidden]
    pub fn forward(&self, inputs: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.linear1.forward(inputs.clone());
        let x = relu(self.dropout1.forward(x));
        let x = self.dropout2.forward(self.linear2.forward(x));
        x + inputs
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, nn::Initializer};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_shape_is_preserved() {
        let device = Default::default();
        let ffn    = PointWiseFeedForwardConfig::new(8).init::<TestBackend>(&device);
        let x      = Tensor::<TestBackend, 3>::random(
            [2, 5, 8], burn::tensor::Distribution::Default, &device,
        );
        assert_eq!(ffn.forward(x).dims(), [2, 5, 8]);
    }

    #[test]
    fn test_zero_projections_leave_only_the_residual() {
        let device = Default::default();
        let zeros  = || LinearConfig::new(4, 4)
            .with_initializer(Initializer::Zeros)
            .init::<TestBackend>(&device);
        let ffn = PointWiseFeedForward {
            linear1:  zeros(),
            dropout1: DropoutConfig::new(0.0).init(),
            linear2:  zeros(),
            dropout2: DropoutConfig::new(0.0).init(),
        };

        let x   = Tensor::<TestBackend, 3>::from_floats([[[1.0, -2.0, 3.0, 0.5]]], &device);
        let out = ffn.forward(x.clone());
        assert_eq!(out.into_data(), x.into_data());
    }

    #[test]
    fn test_positions_are_independent() {
        let device = Default::default();
        let ffn    = PointWiseFeedForwardConfig::new(4)
            .with_dropout_rate(0.0)
            .init::<TestBackend>(&device);

        let a = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 2.0, 3.0, 4.0], [0.1, 0.2, 0.3, 0.4]]], &device,
        );
        let b = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 2.0, 3.0, 4.0], [9.0, 9.0, 9.0, 9.0]]], &device,
        );
        let first = |t: Tensor<TestBackend, 3>| {
            ffn.forward(t).slice([0..1, 0..1, 0..4]).into_data().to_vec::<f32>().unwrap()
        };
        assert_eq!(first(a), first(b));
    }
}
