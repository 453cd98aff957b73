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
use crate::constants::{ARTIFACT_MODELS_DIR, GRAD_CLIP_VALUE};
use crate::data::tabular::TabularSlice;
use crate::data::{DataKey, Prediction, Segment, TabularSource};
use crate::error::{ModelError, Result};
use crate::gru::network::GruNet;
use crate::training::{
    batch_chunks, index_tensor, masked_weighted_mse, scalar_f64, EvalsResult, ModelState,
    OptimizerKind,
};
use crate::util::checkpoint;
use crate::util::paths::get_or_create_path;
use crate::util::recorder::{NullRecorder, Recorder};

/// Hyperparameters of the GRU regressor. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruRegressorConfig {
    /// Input feature dimension per time step.
    pub d_feat: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout: f64,
    pub n_epochs: usize,
    pub lr: f64,
    /// Evaluation metric used for early stopping; "" and "loss" select
    /// the negated loss.
    pub metric: String,
    pub batch_size: usize,
    /// Number of consecutive non-improving epochs before stopping.
    pub early_stop: usize,
    pub loss: String,
    /// "adam" or "gd".
    pub optimizer: String,
    /// Discrete accelerator index, consumed by the device helpers.
    pub gpu: Option<usize>,
    pub seed: Option<u64>,
    /// Restore weights from this checkpoint at construction when the
    /// file exists.
    pub init_model_path: Option<PathBuf>,
    /// Default save location for `fit` when none is passed.
    pub save_path: Option<PathBuf>,
}

impl Default for GruRegressorConfig {
    fn default() -> Self {
        Self {
            d_feat: 6,
            hidden_size: 64,
            num_layers: 2,
            dropout: 0.0,
            n_epochs: 200,
            lr: 0.001,
            metric: String::new(),
            batch_size: 2000,
            early_stop: 20,
            loss: "mse".to_string(),
            optimizer: "adam".to_string(),
            gpu: None,
            seed: None,
            init_model_path: None,
            save_path: None,
        }
    }
}

/// GRU regressor: forecasts one scalar per flat `[d_feat * T]` feature
/// row, trained with masked MSE, gradient value clipping and early
/// stopping on the validation score.
pub struct GruRegressor<B: AutodiffBackend> {
    config: GruRegressorConfig,
    optimizer_kind: OptimizerKind,
    net: GruNet<B>,
    device: B::Device,
    state: ModelState,
    rng: StdRng,
    recorder: Box<dyn Recorder>,
}

impl<B: AutodiffBackend> GruRegressor<B> {
    pub fn new(config: GruRegressorConfig, device: B::Device) -> Result<Self> {
        let optimizer_kind: OptimizerKind = config.optimizer.parse()?;

        info!(
            "GRU parameters setting: d_feat {}, hidden_size {}, num_layers {}, dropout {}, \
             n_epochs {}, lr {}, metric `{}`, batch_size {}, early_stop {}, loss `{}`, \
             optimizer `{}`, seed {:?}",
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
            config.seed,
        );

        let rng = match config.seed {
            Some(seed) => {
                B::seed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_os_rng(),
        };

        let mut net = GruNet::new(
            config.d_feat,
            config.hidden_size,
            config.num_layers,
            config.dropout,
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
            net,
            device,
            state,
            rng,
            recorder: Box::new(NullRecorder),
        })
    }

    /// Injects an experiment-tracking recorder; the default discards
    /// everything.
    pub fn with_recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn config(&self) -> &GruRegressorConfig {
        &self.config
    }

    pub fn network(&self) -> &GruNet<B> {
        &self.net
    }

    /// Masked MSE over the non-NaN labels. Any other loss identifier is
    /// rejected here, on first invocation.
    pub fn loss_fn<B2: Backend>(
        &self,
        pred: Tensor<B2, 1>,
        label: Tensor<B2, 1>,
    ) -> Result<Tensor<B2, 1>> {
        match self.config.loss.as_str() {
            "mse" => Ok(masked_weighted_mse(pred, label, None, false)),
            other => Err(ModelError::UnknownLoss(other.to_string())),
        }
    }

    /// Early-stopping score: the negated loss restricted to finite
    /// labels. Higher is better.
    pub fn metric_fn<B2: Backend>(
        &self,
        pred: Tensor<B2, 1>,
        label: Tensor<B2, 1>,
    ) -> Result<Tensor<B2, 1>> {
        match self.config.metric.as_str() {
            "" | "loss" => match self.config.loss.as_str() {
                "mse" => Ok(masked_weighted_mse(pred, label, None, true).neg()),
                other => Err(ModelError::UnknownLoss(other.to_string())),
            },
            other => Err(ModelError::UnknownMetric(other.to_string())),
        }
    }

    fn train_epoch<O: Optimizer<GruNet<B>, B>>(
        &mut self,
        mut net: GruNet<B>,
        optimizer: &mut O,
        x: &Tensor<B, 2>,
        y: &Tensor<B, 1>,
    ) -> Result<GruNet<B>> {
        let n = x.dims()[0];
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut self.rng);

        for chunk in batch_chunks(&indices, self.config.batch_size, true) {
            let idx = index_tensor::<B>(chunk, &self.device);
            let feature = x.clone().select(0, idx.clone());
            let label = y.clone().select(0, idx);

            let pred = net.forward(feature);
            let loss = self.loss_fn(pred, label)?;

            let grads = GradientsParams::from_grads(loss.backward(), &net);
            net = optimizer.step(self.config.lr, net, grads);
        }
        Ok(net)
    }

    /// Forward-only pass over a split; returns (mean loss, mean score)
    /// across full batches.
    fn test_epoch(
        &self,
        net: &GruNet<B>,
        x: &Tensor<B::InnerBackend, 2>,
        y: &Tensor<B::InnerBackend, 1>,
    ) -> Result<(f64, f64)> {
        let eval_net = net.valid();
        let n = x.dims()[0];
        let indices: Vec<usize> = (0..n).collect();

        let mut losses = Vec::new();
        let mut scores = Vec::new();
        for chunk in batch_chunks(&indices, self.config.batch_size, true) {
            let idx = index_tensor::<B::InnerBackend>(chunk, &self.device);
            let feature = x.clone().select(0, idx.clone());
            let label = y.clone().select(0, idx);

            let pred = eval_net.forward(feature);
            losses.push(scalar_f64(self.loss_fn(pred.clone(), label.clone())?));
            scores.push(scalar_f64(self.metric_fn(pred, label)?));
        }

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        Ok((mean(&losses), mean(&scores)))
    }

    /// Trains until `n_epochs` or until the validation score has not
    /// improved for `early_stop` consecutive epochs. Every epoch's
    /// parameters and the best epoch's parameters are checkpointed under
    /// `model_ckpt/` of the resolved save path.
    pub fn fit<D: TabularSource>(
        &mut self,
        dataset: &D,
        evals_result: &mut EvalsResult,
        save_path: Option<&Path>,
    ) -> Result<()> {
        let save_path = save_path
            .map(Path::to_path_buf)
            .or_else(|| self.config.save_path.clone());

        let segments = dataset.segments();
        if !segments.contains(&Segment::Train) {
            return Err(ModelError::EmptySplit("train"));
        }
        let train = dataset.prepare(&Segment::Train, DataKey::Learn)?;
        if train.is_empty() {
            return Err(ModelError::EmptySplit("train"));
        }
        let train = train.drop_na()?;
        if train.is_empty() {
            return Err(ModelError::EmptySplit("train"));
        }

        let valid = if segments.contains(&Segment::Valid) {
            let slice = dataset.prepare(&Segment::Valid, DataKey::Learn)?.drop_na()?;
            if slice.is_empty() {
                None
            } else {
                Some(slice)
            }
        } else {
            None
        };

        let x_train = self.feature_tensor::<B>(&train)?;
        let y_train =
            Tensor::<B, 1>::from_floats(train.labels()?.as_slice(), &self.device);
        let valid_tensors = match &valid {
            Some(slice) => {
                let x = self.feature_tensor::<B::InnerBackend>(slice)?;
                let y = Tensor::<B::InnerBackend, 1>::from_floats(
                    slice.labels()?.as_slice(),
                    &self.device,
                );
                Some((x, y))
            }
            None => None,
        };

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
                self.run_fit(optimizer, x_train, y_train, valid_tensors, &ckpt_dir, evals_result)
            }
            OptimizerKind::Gd => {
                let optimizer = SgdConfig::new()
                    .with_gradient_clipping(Some(clipping))
                    .init();
                self.run_fit(optimizer, x_train, y_train, valid_tensors, &ckpt_dir, evals_result)
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

    fn run_fit<O: Optimizer<GruNet<B>, B>>(
        &mut self,
        mut optimizer: O,
        x_train: Tensor<B, 2>,
        y_train: Tensor<B, 1>,
        valid: Option<(Tensor<B::InnerBackend, 2>, Tensor<B::InnerBackend, 1>)>,
        ckpt_dir: &Path,
        evals_result: &mut EvalsResult,
    ) -> Result<()> {
        let mut net = self.net.clone();
        let mut best_net = net.clone();
        let mut best_score = f64::NEG_INFINITY;
        let mut best_epoch = 0usize;
        let mut stop_steps = 0usize;

        let x_eval = x_train.clone().inner();
        let y_eval = y_train.clone().inner();

        info!("training...");
        for step in 0..self.config.n_epochs {
            info!("Epoch {}: training...", step);
            net = self.train_epoch(net, &mut optimizer, &x_train, &y_train)?;

            info!("evaluating...");
            let (_, train_score) = self.test_epoch(&net, &x_eval, &y_eval)?;
            evals_result.train.push(train_score);

            let step_path =
                checkpoint::save_params::<B, _>(&net, &checkpoint::epoch_params_path(ckpt_dir, step))?;
            self.recorder.log_artifact(&step_path, ARTIFACT_MODELS_DIR)?;

            if let Some((x_valid, y_valid)) = &valid {
                let (_, val_score) = self.test_epoch(&net, x_valid, y_valid)?;
                info!("train {:.6}, valid {:.6}", train_score, val_score);
                evals_result.valid.push(val_score);

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
        }

        // Without a validation split there is no best epoch to restore;
        // the final parameters stand.
        self.net = if valid.is_some() { best_net } else { net };
        info!("best score: {:.6} @ {}", best_score, best_epoch);

        let best_path =
            checkpoint::save_params::<B, _>(&self.net, &checkpoint::best_params_path(ckpt_dir))?;
        self.recorder.log_artifact(&best_path, ARTIFACT_MODELS_DIR)?;

        for (i, v) in evals_result.train.iter().enumerate() {
            self.recorder.log_metrics(i, &[("train", *v)]);
        }
        for (i, v) in evals_result.valid.iter().enumerate() {
            self.recorder.log_metrics(i, &[("valid", *v)]);
        }
        Ok(())
    }

    /// Batched forward inference over a prepared split. Keeps a final
    /// under-sized batch so every input row receives a prediction, in
    /// input order.
    pub fn predict<D: TabularSource>(
        &self,
        dataset: &D,
        segment: &Segment,
    ) -> Result<Prediction> {
        if !self.state.can_predict() {
            return Err(ModelError::NotFitted);
        }

        let slice = dataset.prepare(segment, DataKey::Infer)?;
        let x = self.feature_tensor::<B::InnerBackend>(&slice)?;
        let eval_net = self.net.valid();

        let n = slice.len();
        let mut values = Vec::with_capacity(n);
        let mut begin = 0;
        while begin < n {
            let len = self.config.batch_size.min(n - begin);
            let batch = x.clone().narrow(0, begin, len);
            let pred = eval_net.forward(batch);
            let data = pred.to_data();
            values.extend(
                data.as_slice::<f32>()
                    .map_err(|e| ModelError::Data(format!("{:?}", e)))?
                    .iter()
                    .map(|&v| v as f64),
            );
            begin += len;
        }

        Ok(Prediction {
            index: slice.index().to_vec(),
            values,
        })
    }

    fn feature_tensor<B2: Backend<Device = B::Device>>(
        &self,
        slice: &TabularSlice,
    ) -> Result<Tensor<B2, 2>> {
        let dim = slice.feature_dim();
        if dim == 0 || dim % self.config.d_feat != 0 {
            return Err(ModelError::Data(format!(
                "feature dimension {} is not a multiple of d_feat {}",
                dim, self.config.d_feat
            )));
        }
        let features = slice.features()?;
        Ok(Tensor::<B2, 1>::from_floats(features.as_slice(), &self.device)
            .reshape([slice.len(), dim]))
    }
}
