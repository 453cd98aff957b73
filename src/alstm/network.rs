// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};
use std::str::FromStr;

// Internal imports
use crate::alstm::cell::RnnEncoder;
use crate::error::ModelError;

/// Cell family of the attention network's recurrent encoder, resolved
/// from the configuration string when the regressor is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RnnKind {
    Gru,
    Lstm,
}

impl FromStr for RnnKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gru" => Ok(RnnKind::Gru),
            "lstm" => Ok(RnnKind::Lstm),
            other => Err(ModelError::UnsupportedRnnType(other.to_string())),
        }
    }
}

/// The attention regression network.
///
/// Per-step features are projected into the hidden width, encoded by a
/// recurrent stack, and scored by a small attention subnet whose softmax
/// over the time axis weights each step's hidden state. The head sees
/// the final hidden state concatenated with the attention-weighted sum.
#[derive(Module, Debug)]
pub struct AlstmNet<B: Backend> {
    d_feat: usize,
    fc_in: Linear<B>,
    encoder: RnnEncoder<B>,
    att_fc_in: Linear<B>,
    att_dropout: Dropout,
    att_fc_out: Linear<B>,
    fc_out: Linear<B>,
}

impl<B: Backend> AlstmNet<B> {
    pub fn new(
        d_feat: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        rnn_kind: RnnKind,
        device: &B::Device,
    ) -> Self {
        let encoder = match rnn_kind {
            RnnKind::Gru => RnnEncoder::gru(hidden_size, hidden_size, num_layers, dropout, device),
            RnnKind::Lstm => {
                RnnEncoder::lstm(hidden_size, hidden_size, num_layers, dropout, device)
            }
        };
        Self {
            d_feat,
            fc_in: LinearConfig::new(d_feat, hidden_size).init(device),
            encoder,
            att_fc_in: LinearConfig::new(hidden_size, hidden_size / 2).init(device),
            att_dropout: DropoutConfig::new(dropout).init(),
            att_fc_out: LinearConfig::new(hidden_size / 2, 1)
                .with_bias(false)
                .init(device),
            fc_out: LinearConfig::new(hidden_size * 2, 1).init(device),
        }
    }

    pub fn d_feat(&self) -> usize {
        self.d_feat
    }

    /// `[N, T, d_feat]` -> `[N]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 1> {
        self.forward_with_attention(x).0
    }

    /// Forward pass that also exposes the per-step attention weights as
    /// `[N, T]` (each row sums to one).
    pub fn forward_with_attention(&self, x: Tensor<B, 3>) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let [batch_size, seq_len, _] = x.dims();
        let hidden_size = self.encoder.hidden_size();

        let projected = activation::tanh(self.fc_in.forward(x));
        let encoded = self.encoder.forward(projected);

        // [N, T, H] -> [N, T, 1], softmax over the time axis.
        let scores = self
            .att_fc_out
            .forward(activation::tanh(
                self.att_dropout.forward(self.att_fc_in.forward(encoded.clone())),
            ));
        let attention = activation::softmax(scores, 1);

        let weighted_sum = (encoded.clone() * attention.clone()).sum_dim(1).reshape([
            batch_size,
            hidden_size,
        ]);
        let last = encoded
            .narrow(1, seq_len - 1, 1)
            .reshape([batch_size, hidden_size]);

        let out = self
            .fc_out
            .forward(Tensor::cat(vec![last, weighted_sum], 1))
            .reshape([batch_size]);
        (out, attention.reshape([batch_size, seq_len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn rnn_kind_parses_known_names() {
        assert_eq!("gru".parse::<RnnKind>().unwrap(), RnnKind::Gru);
        assert_eq!("LSTM".parse::<RnnKind>().unwrap(), RnnKind::Lstm);
        assert!(matches!(
            "transformer".parse::<RnnKind>(),
            Err(ModelError::UnsupportedRnnType(_))
        ));
    }

    #[test]
    fn forward_produces_one_scalar_per_sample() {
        let device = NdArrayDevice::Cpu;
        let net = AlstmNet::<TestBackend>::new(5, 16, 2, 0.0, RnnKind::Gru, &device);
        let x = Tensor::<TestBackend, 3>::ones([3, 8, 5], &device);

        let out = net.forward(x);
        assert_eq!(out.dims(), [3]);
        for val in out.to_data().as_slice::<f32>().unwrap() {
            assert!(val.is_finite());
        }
    }

    #[test]
    fn attention_weights_sum_to_one_over_time() {
        let device = NdArrayDevice::Cpu;
        let net = AlstmNet::<TestBackend>::new(4, 8, 1, 0.0, RnnKind::Lstm, &device);
        let x = Tensor::<TestBackend, 3>::random(
            [2, 6, 4],
            burn::tensor::Distribution::Default,
            &device,
        );

        let (_, attention) = net.forward_with_attention(x);
        assert_eq!(attention.dims(), [2, 6]);
        let sums = attention.sum_dim(1).into_data();
        for sum in sums.as_slice::<f32>().unwrap() {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }
}
