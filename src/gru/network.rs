// External imports
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};

// Internal imports
use crate::gru::cell::GruEncoder;

/// The GRU regression network.
///
/// Takes flat `[batch, d_feat * T]` rows (feature-major: all of one
/// feature's steps, then the next feature), rebuilds the per-step view,
/// runs the recurrent encoder and projects the final step's hidden
/// state to one scalar per example.
#[derive(Module, Debug)]
pub struct GruNet<B: Backend> {
    d_feat: usize,
    encoder: GruEncoder<B>,
    fc_out: Linear<B>,
}

impl<B: Backend> GruNet<B> {
    pub fn new(
        d_feat: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            d_feat,
            encoder: GruEncoder::new(d_feat, hidden_size, num_layers, dropout, device),
            fc_out: LinearConfig::new(hidden_size, 1).init(device),
        }
    }

    pub fn d_feat(&self) -> usize {
        self.d_feat
    }

    /// `[N, d_feat * T]` -> `[N]`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch_size, flat] = x.dims();
        let seq_len = flat / self.d_feat;

        // [N, F*T] -> [N, F, T] -> [N, T, F]
        let x = x
            .reshape([batch_size, self.d_feat, seq_len])
            .permute([0, 2, 1]);

        let hidden = self.encoder.forward(x);
        let last = hidden
            .narrow(1, seq_len - 1, 1)
            .reshape([batch_size, self.encoder.hidden_size()]);

        self.fc_out.forward(last).reshape([batch_size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn forward_produces_one_scalar_per_row() {
        let device = NdArrayDevice::Cpu;
        let net = GruNet::<TestBackend>::new(6, 16, 2, 0.0, &device);
        let x = Tensor::<TestBackend, 2>::ones([4, 6 * 10], &device);

        let out = net.forward(x);
        assert_eq!(out.dims(), [4]);
        for val in out.to_data().as_slice::<f32>().unwrap() {
            assert!(val.is_finite());
        }
    }
}
