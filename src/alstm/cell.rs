// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

// Internal imports
use crate::gru::cell::GruEncoder;

/// One LSTM layer.
///
/// Gates for input x_t, previous hidden state h_(t-1) and cell state
/// c_(t-1):
///
/// 1. Input gate: i_t = σ(W_i · x_t + U_i · h_(t-1))
/// 2. Forget gate: f_t = σ(W_f · x_t + U_f · h_(t-1))
/// 3. Candidate cell: g_t = tanh(W_g · x_t + U_g · h_(t-1))
/// 4. Output gate: o_t = σ(W_o · x_t + U_o · h_(t-1))
/// 5. New cell state: c_t = f_t ∘ c_(t-1) + i_t ∘ g_t
/// 6. New hidden state: h_t = o_t ∘ tanh(c_t)
///
/// As with the GRU layer, the four input projections and the four hidden
/// projections are each fused into a single `Linear` of width
/// `4 * hidden_size`.
#[derive(Module, Debug)]
pub struct LstmLayer<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    input_weights: Linear<B>,
    hidden_weights: Linear<B>,
}

impl<B: Backend> LstmLayer<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let gate_size = 4 * hidden_size;
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
        let mut c = Tensor::zeros([batch_size, self.hidden_size], &device);
        let mut output = Tensor::zeros([batch_size, seq_len, self.hidden_size], &device);

        for t in 0..seq_len {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, self.input_size]);

            let input_gates = self
                .input_weights
                .forward(x_t)
                .reshape([batch_size, 4, self.hidden_size]);
            let hidden_gates = self
                .hidden_weights
                .forward(h.clone())
                .reshape([batch_size, 4, self.hidden_size]);

            let gate = |gates: &Tensor<B, 3>, at: usize| {
                gates
                    .clone()
                    .narrow(1, at, 1)
                    .reshape([batch_size, self.hidden_size])
            };

            let i = activation::sigmoid(gate(&input_gates, 0) + gate(&hidden_gates, 0));
            let f = activation::sigmoid(gate(&input_gates, 1) + gate(&hidden_gates, 1));
            let g = activation::tanh(gate(&input_gates, 2) + gate(&hidden_gates, 2));
            let o = activation::sigmoid(gate(&input_gates, 3) + gate(&hidden_gates, 3));

            c = f * c + i * g;
            h = o * activation::tanh(c.clone());

            output = output.slice_assign(
                [0..batch_size, t..t + 1, 0..self.hidden_size],
                h.clone().reshape([batch_size, 1, self.hidden_size]),
            );
        }

        output
    }
}

/// A stack of LSTM layers with dropout between consecutive layers.
#[derive(Module, Debug)]
pub struct LstmEncoder<B: Backend> {
    layers: Vec<LstmLayer<B>>,
    dropout: Dropout,
    hidden_size: usize,
}

impl<B: Backend> LstmEncoder<B> {
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
                LstmLayer::new(in_size, hidden_size, device)
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

/// Recurrent encoder with a configurable cell family. Exactly one of the
/// variants is populated, fixed at construction.
#[derive(Module, Debug)]
pub struct RnnEncoder<B: Backend> {
    gru: Option<GruEncoder<B>>,
    lstm: Option<LstmEncoder<B>>,
}

impl<B: Backend> RnnEncoder<B> {
    pub fn gru(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            gru: Some(GruEncoder::new(
                input_size,
                hidden_size,
                num_layers,
                dropout,
                device,
            )),
            lstm: None,
        }
    }

    pub fn lstm(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            gru: None,
            lstm: Some(LstmEncoder::new(
                input_size,
                hidden_size,
                num_layers,
                dropout,
                device,
            )),
        }
    }

    pub fn hidden_size(&self) -> usize {
        match (&self.gru, &self.lstm) {
            (Some(encoder), _) => encoder.hidden_size(),
            (_, Some(encoder)) => encoder.hidden_size(),
            // Both constructors populate a variant.
            (None, None) => unreachable!("encoder constructed without a cell"),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match (&self.gru, &self.lstm) {
            (Some(encoder), _) => encoder.forward(x),
            (_, Some(encoder)) => encoder.forward(x),
            (None, None) => unreachable!("encoder constructed without a cell"),
        }
    }
}
