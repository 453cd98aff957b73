// External imports
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Internal imports
use crate::alstm::network::{AlstmNet, RnnKind};
use crate::constants::{ARTIFACT_MODELS_DIR, GRAD_CLIP_VALUE};
use crate::data::reweight::Reweighter;
use crate::data::sequence::SequenceSlice;
use crate::data::{DataKey, FillStrategy, Prediction, Segment, SequenceSource};
use crate::error::{ModelError, Result};
use crate::training::{
    batch_chunks, index_tensor, masked_weighted_mse, scalar_f64, EvalsResult, ModelState,
    OptimizerKind,
};
use crate::util::checkpoint;
use crate::util::paths::get_or_create_path;
use crate::util::recorder::{NullRecorder, Recorder};

/// Hyperparameters of the attention regressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlstmRegressorConfig {
    pub d_feat: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout: f64,
    pub n_epochs: usize,
    pub lr: f64,
    /// "" , "loss" and "mse" all select the negated masked MSE.
    pub metric: String,
    pub batch_size: usize,
    pub early_stop: usize,
    pub loss: String,
    /// "adam" or "gd".
    pub optimizer: String,
    /// Cell family of the recurrent encoder, "gru" or "lstm".
    pub rnn_type: String,
    pub gpu: Option<usize>,
    pub seed: Option<u64>,
    pub init_model_path: Option<PathBuf>,
    pub save_path: Option<PathBuf>,
}

impl Default for AlstmRegressorConfig {
    fn default() -> Self {
        Self {
            d_feat: 20,
            hidden_size: 64,
            num_layers: 2,
            dropout: 0.0,
            n_epochs: 200,
            lr: 0.001,
            metric: String::new(),
            batch_size: 800,
            early_stop: 20,
            loss: "mse".to_string(),
            optimizer: "adam".to_string(),
            rnn_type: "gru".to_string(),
            gpu: None,
            seed: None,
            init_model_path: None,
            save_path: None,
        }
    }
}

/// Attention regressor over per-step sequences, with optional per-sample
/// loss reweighting. Missing feature values are repaired by
/// forward/backward filling along the time axis; missing labels stay NaN
/// and are masked out of the loss.
pub struct AlstmRegressor<B: AutodiffBackend> {
    config: AlstmRegressorConfig,
    optimizer_kind: OptimizerKind,
    rnn_kind: RnnKind,
    net: AlstmNet<B>,
    device: B::Device,
    state: ModelState,
    rng: StdRng,
    recorder: Box<dyn Recorder>,
}

impl<B: AutodiffBackend> AlstmRegressor<B> {
    pub fn new(config: AlstmRegressorConfig, device: B::Device) -> Result<Self> {
        let optimizer_kind: OptimizerKind = config.optimizer.parse()?;
        let rnn_kind: RnnKind = config.rnn_type.parse()?;

        info!(
            "ALSTM parameters setting: d_feat {}, hidden_size {}, num_layers {}, dropout {}, \
             n_epochs {}, lr {}, metric `{}`, batch_size {}, early_stop {}, loss `{}`, \
             optimizer `{}`, rnn_type `{}`, seed {:?}",
            config.d_feat,
            config.hidden_size,
            config.num_layers,
            config.dropout,
            config.n_epochs,
            config.lr,
            config.metric,
            config.batch_size,
            config.early_stop,
            config.loss,
            config.optimizer,
            config.rnn_type,
            config.seed,
        );

        let rng = match config.seed {
            Some(seed) => {
                B::seed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_os_rng(),
        };

        let mut net = AlstmNet::new(
            config.d_feat,
            config.hidden_size,
            config.num_layers,
            config.dropout,
            rnn_kind,
            &device,
        );

        let mut state = ModelState::Uninit;
        if let Some(path) = &config.init_model_path {
            if path.exists() {
                info!("loading model weights from {}", path.display());
                net = checkpoint::load_params::<B, _>(net, path, &device)?;
                state = ModelState::Loaded;
            }
        }

        Ok(Self {
            config,
            optimizer_kind,
            rnn_kind,
            net,
            device,
            state,
            rng,
            recorder: Box::new(NullRecorder),
        })
    }

    pub fn with_recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn config(&self) -> &AlstmRegressorConfig {
        &self.config
    }

    pub fn rnn_kind(&self) -> RnnKind {
        self.rnn_kind
    }

    pub fn network(&self) -> &AlstmNet<B> {
        &self.net
    }

    pub fn loss_fn<B2: Backend>(
        &self,
        pred: Tensor<B2, 1>,
        label: Tensor<B2, 1>,
        weight: Tensor<B2, 1>,
    ) -> Result<Tensor<B2, 1>> {
        match self.config.loss.as_str() {
            "mse" => Ok(masked_weighted_mse(pred, label, Some(weight), false)),
            other => Err(ModelError::UnknownLoss(other.to_string())),
        }
    }

    /// Early-stopping score over finite labels, unweighted. Higher is
    /// better.
    pub fn metric_fn<B2: Backend>(
        &self,
        pred: Tensor<B2, 1>,
        label: Tensor<B2, 1>,
    ) -> Result<Tensor<B2, 1>> {
        match self.config.metric.as_str() {
            "" | "loss" | "mse" => match self.config.loss.as_str() {
                "mse" => Ok(masked_weighted_mse(pred, label, None, true).neg()),
                other => Err(ModelError::UnknownLoss(other.to_string())),
            },
            other => Err(ModelError::UnknownMetric(other.to_string())),
        }
    }

    fn train_epoch<O: Optimizer<AlstmNet<B>, B>>(
        &mut self,
        mut net: AlstmNet<B>,
        optimizer: &mut O,
        x: &Tensor<B, 3>,
        y: &Tensor<B, 1>,
        w: &Tensor<B, 1>,
    ) -> Result<AlstmNet<B>> {
        let n = x.dims()[0];
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut self.rng);

        for chunk in batch_chunks(&indices, self.config.batch_size, true) {
            let idx = index_tensor::<B>(chunk, &self.device);
            let feature = x.clone().select(0, idx.clone());
            let label = y.clone().select(0, idx.clone());
            let weight = w.clone().select(0, idx);

            let pred = net.forward(feature);
            let loss = self.loss_fn(pred, label, weight)?;

            let grads = GradientsParams::from_grads(loss.backward(), &net);
            net = optimizer.step(self.config.lr, net, grads);
        }
        Ok(net)
    }

    /// Forward-only pass over a split; returns (mean loss, mean score)
    /// across full batches. The loss is weighted, the score is not.
    fn test_epoch(
        &self,
        net: &AlstmNet<B>,
        x: &Tensor<B::InnerBackend, 3>,
        y: &Tensor<B::InnerBackend, 1>,
        w: &Tensor<B::InnerBackend, 1>,
    ) -> Result<(f64, f64)> {
        let eval_net = net.valid();
        let n = x.dims()[0];
        let indices: Vec<usize> = (0..n).collect();

        let mut losses = Vec::new();
        let mut scores = Vec::new();
        for chunk in batch_chunks(&indices, self.config.batch_size, true) {
            let idx = index_tensor::<B::InnerBackend>(chunk, &self.device);
            let feature = x.clone().select(0, idx.clone());
            let label = y.clone().select(0, idx.clone());
            let weight = w.clone().select(0, idx);

            let pred = eval_net.forward(feature);
            losses.push(scalar_f64(self.loss_fn(
                pred.clone(),
                label.clone(),
                weight,
            )?));
            scores.push(scalar_f64(self.metric_fn(pred, label)?));
        }

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        Ok((mean(&losses), mean(&scores)))
    }

    /// Trains on the train split, early-stopping on the valid split's
    /// score. Both splits are required and must be non-empty. When a
    /// reweighter is supplied it assigns each split's per-sample loss
    /// weights; otherwise every sample weighs one.
    pub fn fit<D: SequenceSource>(
        &mut self,
        dataset: &D,
        evals_result: &mut EvalsResult,
        save_path: Option<&Path>,
        reweighter: Option<&dyn Reweighter>,
    ) -> Result<()> {
        let save_path = save_path
            .map(Path::to_path_buf)
            .or_else(|| self.config.save_path.clone());

        let segments = dataset.segments();
        if !segments.contains(&Segment::Train) {
            return Err(ModelError::EmptySplit("train"));
        }
        if !segments.contains(&Segment::Valid) {
            return Err(ModelError::EmptySplit("valid"));
        }

        let mut train = dataset.prepare(&Segment::Train, DataKey::Learn)?;
        if train.is_empty() {
            return Err(ModelError::EmptySplit("train"));
        }
        let mut valid = dataset.prepare(&Segment::Valid, DataKey::Learn)?;
        if valid.is_empty() {
            return Err(ModelError::EmptySplit("valid"));
        }
        train.fill_na(FillStrategy::FfillBfill)?;
        valid.fill_na(FillStrategy::FfillBfill)?;

        let w_train = self.split_weights(&train, reweighter)?;
        let w_valid = self.split_weights(&valid, reweighter)?;

        let (x_train, y_train) = self.sequence_tensors::<B>(&train)?;
        let w_train = Tensor::<B, 1>::from_floats(w_train.as_slice(), &self.device);
        let (x_valid, y_valid) = self.sequence_tensors::<B::InnerBackend>(&valid)?;
        let w_valid = Tensor::<B::InnerBackend, 1>::from_floats(w_valid.as_slice(), &self.device);

        let save_dir = get_or_create_path(save_path.as_deref())?;
        let ckpt_dir = checkpoint::checkpoint_dir(&save_dir)?;
        info!("fit params save_path: {}", save_dir.display());

        self.state = ModelState::Fitting;
        let clipping = GradientClippingConfig::Value(GRAD_CLIP_VALUE);
        let outcome = match self.optimizer_kind {
            OptimizerKind::Adam => {
                let optimizer = AdamConfig::new()
                    .with_grad_clipping(Some(clipping))
                    .init();
                self.run_fit(
                    optimizer,
                    x_train,
                    y_train,
                    w_train,
                    (x_valid, y_valid, w_valid),
                    &ckpt_dir,
                    evals_result,
                )
            }
            OptimizerKind::Gd => {
                let optimizer = SgdConfig::new()
                    .with_gradient_clipping(Some(clipping))
                    .init();
                self.run_fit(
                    optimizer,
                    x_train,
                    y_train,
                    w_train,
                    (x_valid, y_valid, w_valid),
                    &ckpt_dir,
                    evals_result,
                )
            }
        };

        match outcome {
            Ok(()) => {
                self.state = ModelState::Fitted;
                Ok(())
            }
            Err(e) => {
                self.state = ModelState::Failed;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_fit<O: Optimizer<AlstmNet<B>, B>>(
        &mut self,
        mut optimizer: O,
        x_train: Tensor<B, 3>,
        y_train: Tensor<B, 1>,
        w_train: Tensor<B, 1>,
        valid: (
            Tensor<B::InnerBackend, 3>,
            Tensor<B::InnerBackend, 1>,
            Tensor<B::InnerBackend, 1>,
        ),
        ckpt_dir: &Path,
        evals_result: &mut EvalsResult,
    ) -> Result<()> {
        let (x_valid, y_valid, w_valid) = valid;
        let mut net = self.net.clone();
        let mut best_net = net.clone();
        let mut best_score = f64::NEG_INFINITY;
        let mut best_epoch = 0usize;
        let mut stop_steps = 0usize;

        let x_eval = x_train.clone().inner();
        let y_eval = y_train.clone().inner();
        let w_eval = w_train.clone().inner();

        info!("training...");
        for step in 0..self.config.n_epochs {
            info!("Epoch {}: training...", step);
            net = self.train_epoch(net, &mut optimizer, &x_train, &y_train, &w_train)?;

            info!("evaluating...");
            let (train_loss, train_score) = self.test_epoch(&net, &x_eval, &y_eval, &w_eval)?;
            let (val_loss, val_score) = self.test_epoch(&net, &x_valid, &y_valid, &w_valid)?;
            info!("train {:.6}, valid {:.6}", train_score, val_score);
            evals_result.train.push(train_score);
            evals_result.valid.push(val_score);
            self.recorder.log_metrics(
                step,
                &[
                    ("train_loss", train_loss),
                    ("val_loss", val_loss),
                    ("train_score", train_score),
                    ("val_score", val_score),
                ],
            );

            let step_path = checkpoint::save_params::<B, _>(
                &net,
                &checkpoint::epoch_params_path(ckpt_dir, step),
            )?;
            self.recorder.log_artifact(&step_path, ARTIFACT_MODELS_DIR)?;

            if val_score > best_score {
                best_score = val_score;
                stop_steps = 0;
                best_epoch = step;
                best_net = net.clone();
            } else {
                stop_steps += 1;
                if stop_steps >= self.config.early_stop {
                    info!("early stop");
                    break;
                }
            }
        }

        self.net = best_net;
        info!("best score: {:.6} @ {}", best_score, best_epoch);

        let best_path =
            checkpoint::save_params::<B, _>(&self.net, &checkpoint::best_params_path(ckpt_dir))?;
        self.recorder.log_artifact(&best_path, ARTIFACT_MODELS_DIR)?;
        Ok(())
    }

    /// Batched forward inference over a prepared split. The final
    /// under-sized batch is kept so every sample receives a prediction.
    pub fn predict<D: SequenceSource>(
        &self,
        dataset: &D,
        segment: &Segment,
    ) -> Result<Prediction> {
        if !self.state.can_predict() {
            return Err(ModelError::NotFitted);
        }

        let mut slice = dataset.prepare(segment, DataKey::Infer)?;
        slice.fill_na(FillStrategy::FfillBfill)?;
        self.check_feature_dim(&slice)?;
        let eval_net = self.net.valid();

        let n = slice.len();
        let rows: Vec<usize> = (0..n).collect();
        let mut values = Vec::with_capacity(n);
        for chunk in batch_chunks(&rows, self.config.batch_size, false) {
            let batch = self.batch_tensor::<B::InnerBackend>(&slice, chunk);
            let pred = eval_net.forward(batch);
            let data = pred.to_data();
            values.extend(
                data.as_slice::<f32>()
                    .map_err(|e| ModelError::Data(format!("{:?}", e)))?
                    .iter()
                    .map(|&v| v as f64),
            );
        }

        Ok(Prediction {
            index: slice.index().to_vec(),
            values,
        })
    }

    fn split_weights(
        &self,
        slice: &SequenceSlice,
        reweighter: Option<&dyn Reweighter>,
    ) -> Result<Vec<f32>> {
        let weights = match reweighter {
            Some(r) => r.reweight(slice)?,
            None => vec![1.0; slice.len()],
        };
        if weights.len() != slice.len() {
            return Err(ModelError::Data(format!(
                "reweighter produced {} weights for {} samples",
                weights.len(),
                slice.len()
            )));
        }
        Ok(weights)
    }

    fn check_feature_dim(&self, slice: &SequenceSlice) -> Result<()> {
        if slice.feature_dim() != self.config.d_feat {
            return Err(ModelError::Data(format!(
                "slice has {} feature channels, d_feat is {}",
                slice.feature_dim(),
                self.config.d_feat
            )));
        }
        Ok(())
    }

    fn sequence_tensors<B2: Backend<Device = B::Device>>(
        &self,
        slice: &SequenceSlice,
    ) -> Result<(Tensor<B2, 3>, Tensor<B2, 1>)> {
        self.check_feature_dim(slice)?;
        let rows: Vec<usize> = (0..slice.len()).collect();
        let x = self.batch_tensor::<B2>(slice, &rows);
        let y = Tensor::<B2, 1>::from_floats(slice.labels(&rows).as_slice(), &self.device);
        Ok((x, y))
    }

    fn batch_tensor<B2: Backend<Device = B::Device>>(
        &self,
        slice: &SequenceSlice,
        rows: &[usize],
    ) -> Tensor<B2, 3> {
        let features = slice.features_flat(rows);
        Tensor::<B2, 1>::from_floats(features.as_slice(), &self.device).reshape([
            rows.len(),
            slice.seq_len(),
            slice.feature_dim(),
        ])
    }
}
