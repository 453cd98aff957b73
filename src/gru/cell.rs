// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

/// One GRU layer.
///
/// Gates for input x_t and previous hidden state h_(t-1):
///
/// 1. Update gate: z_t = σ(W_z · x_t + U_z · h_(t-1))
/// 2. Reset gate: r_t = σ(W_r · x_t + U_r · h_(t-1))
/// 3. Candidate state: n_t = tanh(W_n · x_t + r_t ∘ (U_n · h_(t-1)))
/// 4. New hidden state: h_t = (1 - z_t) ∘ n_t + z_t ∘ h_(t-1)
///
/// The three input projections and the three hidden projections are each
/// fused into a single `Linear` of width `3 * hidden_size`.
#[derive(Module, Debug)]
pub struct GruLayer<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    input_weights: Linear<B>,
    hidden_weights: Linear<B>,
}

impl<B: Backend> GruLayer<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let gate_size = 3 * hidden_size;
        Self {
            input_size,
            hidden_size,
            input_weights: LinearConfig::new(input_size, gate_size).init(device),
            hidden_weights: LinearConfig::new(hidden_size, gate_size).init(device),
        }
    }

    /// Processes a `[batch, seq_len, input_size]` sequence, returning
    /// every step's hidden state as `[batch, seq_len, hidden_size]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let device = x.device();
        let [batch_size, seq_len, _] = x.dims();

        let mut h = Tensor::zeros([batch_size, self.hidden_size], &device);
        let mut output = Tensor::zeros([batch_size, seq_len, self.hidden_size], &device);

        for t in 0..seq_len {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, self.input_size]);

            let input_gates = self
                .input_weights
                .forward(x_t)
                .reshape([batch_size, 3, self.hidden_size]);
            let hidden_gates = self
                .hidden_weights
                .forward(h.clone())
                .reshape([batch_size, 3, self.hidden_size]);

            let gate = |gates: &Tensor<B, 3>, at: usize| {
                gates
                    .clone()
                    .narrow(1, at, 1)
                    .reshape([batch_size, self.hidden_size])
            };

            let z = activation::sigmoid(gate(&input_gates, 0) + gate(&hidden_gates, 0));
            let r = activation::sigmoid(gate(&input_gates, 1) + gate(&hidden_gates, 1));
            let n = activation::tanh(gate(&input_gates, 2) + r * gate(&hidden_gates, 2));

            h = (Tensor::ones_like(&z) - z.clone()) * n + z * h;

            output = output.slice_assign(
                [0..batch_size, t..t + 1, 0..self.hidden_size],
                h.clone().reshape([batch_size, 1, self.hidden_size]),
            );
        }

        output
    }
}

/// A stack of GRU layers with dropout applied between consecutive
/// layers (never after the last one).
#[derive(Module, Debug)]
pub struct GruEncoder<B: Backend> {
    layers: Vec<GruLayer<B>>,
    dropout: Dropout,
    hidden_size: usize,
}

impl<B: Backend> GruEncoder<B> {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers.max(1))
            .map(|i| {
                let in_size = if i == 0 { input_size } else { hidden_size };
                GruLayer::new(in_size, hidden_size, device)
            })
            .collect();
        Self {
            layers,
            dropout: DropoutConfig::new(dropout).init(),
            hidden_size,
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// `[batch, seq_len, input_size]` -> `[batch, seq_len, hidden_size]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let depth = self.layers.len();
        let mut hidden = x;
        for (i, layer) in self.layers.iter().enumerate() {
            hidden = layer.forward(hidden);
            if i + 1 < depth {
                hidden = self.dropout.forward(hidden);
            }
        }
        hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn encoder_keeps_batch_and_time_dims() {
        let device = NdArrayDevice::Cpu;
        let encoder = GruEncoder::<TestBackend>::new(4, 5, 2, 0.0, &device);
        let input = Tensor::<TestBackend, 3>::ones([2, 3, 4], &device);

        let output = encoder.forward(input);
        assert_eq!(output.dims(), [2, 3, 5]);

        let data = output.to_data();
        for val in data.as_slice::<f32>().unwrap() {
            assert!(!val.is_nan(), "output contains NaN values");
        }
    }

    #[test]
    fn zero_layers_falls_back_to_a_single_layer() {
        let device = NdArrayDevice::Cpu;
        let encoder = GruEncoder::<TestBackend>::new(4, 5, 0, 0.0, &device);
        let output = encoder.forward(Tensor::<TestBackend, 3>::ones([1, 2, 4], &device));
        assert_eq!(output.dims(), [1, 2, 5]);
    }
}
