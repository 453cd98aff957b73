// External imports
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

// Internal imports
use seqcast::alstm::regressor::{AlstmRegressor, AlstmRegressorConfig};
use seqcast::data::memory::{sequence_windows, InMemoryDataset};
use seqcast::data::reweight::{HalfLifeReweighter, Reweighter};
use seqcast::data::sequence::SequenceSlice;
use seqcast::data::Segment;
use seqcast::error::ModelError;
use seqcast::training::{EvalsResult, ModelState};

type TrainBackend = Autodiff<NdArray<f32>>;

const D_FEAT: usize = 3;
const SEQ_LEN: usize = 5;

fn series(n: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..D_FEAT).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect();
    let labels: Vec<f64> = rows
        .iter()
        .map(|r| r.iter().sum::<f64>() / D_FEAT as f64)
        .collect();
    let index = (0..n).map(|i| format!("row_{:03}", i)).collect();
    (rows, labels, index)
}

fn dataset(train_n: usize, valid_n: usize, test_n: usize) -> InMemoryDataset {
    let (rows, labels, index) = series(train_n + valid_n + test_n, 23);
    let mut dataset = InMemoryDataset::new();
    let bounds = [
        (Segment::Train, 0, train_n),
        (Segment::Valid, train_n, train_n + valid_n),
        (Segment::Test, train_n + valid_n, train_n + valid_n + test_n),
    ];
    for (segment, begin, end) in bounds {
        let slice =
            sequence_windows(&rows[begin..end], &labels[begin..end], &index[begin..end], SEQ_LEN)
                .unwrap();
        dataset = dataset.with_sequence(segment, slice);
    }
    dataset
}

fn config() -> AlstmRegressorConfig {
    AlstmRegressorConfig {
        d_feat: D_FEAT,
        hidden_size: 8,
        num_layers: 1,
        n_epochs: 3,
        batch_size: 8,
        early_stop: 2,
        seed: Some(42),
        ..Default::default()
    }
}

#[test]
fn fit_then_predict_covers_the_partial_tail_batch() {
    let device = NdArrayDevice::Cpu;
    let data = dataset(40, 20, 17);
    let save = tempdir().unwrap();

    let mut model = AlstmRegressor::<TrainBackend>::new(config(), device).unwrap();
    let mut evals = EvalsResult::default();
    model.fit(&data, &mut evals, Some(save.path()), None).unwrap();

    assert_eq!(model.state(), ModelState::Fitted);
    assert_eq!(evals.train.len(), evals.valid.len());

    let pred = model.predict(&data, &Segment::Test).unwrap();
    assert_eq!(pred.len(), 13);
    for value in &pred.values {
        assert!(value.is_finite());
    }
}

#[test]
fn valid_split_is_required() {
    let device = NdArrayDevice::Cpu;
    let (rows, labels, index) = series(40, 3);
    let data = InMemoryDataset::new().with_sequence(
        Segment::Train,
        sequence_windows(&rows, &labels, &index, SEQ_LEN).unwrap(),
    );

    let mut model = AlstmRegressor::<TrainBackend>::new(config(), device).unwrap();
    let mut evals = EvalsResult::default();
    let err = model.fit(&data, &mut evals, None, None);
    assert!(matches!(err, Err(ModelError::EmptySplit("valid"))));
}

#[test]
fn early_stop_runs_exactly_one_plus_patience_epochs() {
    let device = NdArrayDevice::Cpu;
    let data = dataset(40, 20, 10);
    let save = tempdir().unwrap();

    let mut cfg = config();
    cfg.lr = 0.0;
    cfg.n_epochs = 50;
    cfg.early_stop = 2;

    let mut model = AlstmRegressor::<TrainBackend>::new(cfg, device).unwrap();
    let mut evals = EvalsResult::default();
    model.fit(&data, &mut evals, Some(save.path()), None).unwrap();

    assert_eq!(evals.valid.len(), 3);
}

#[test]
fn unknown_rnn_type_is_rejected_at_construction() {
    let device = NdArrayDevice::Cpu;
    let mut cfg = config();
    cfg.rnn_type = "transformer".to_string();
    assert!(matches!(
        AlstmRegressor::<TrainBackend>::new(cfg, device),
        Err(ModelError::UnsupportedRnnType(_))
    ));
}

#[test]
fn lstm_cell_family_trains_too() {
    let device = NdArrayDevice::Cpu;
    let data = dataset(40, 20, 10);
    let save = tempdir().unwrap();

    let mut cfg = config();
    cfg.rnn_type = "lstm".to_string();
    cfg.n_epochs = 2;

    let mut model = AlstmRegressor::<TrainBackend>::new(cfg, device).unwrap();
    let mut evals = EvalsResult::default();
    model.fit(&data, &mut evals, Some(save.path()), None).unwrap();
    assert_eq!(model.state(), ModelState::Fitted);
}

#[test]
fn reweighter_weights_are_applied() {
    let device = NdArrayDevice::Cpu;
    let data = dataset(40, 20, 10);
    let save = tempdir().unwrap();
    let reweighter = HalfLifeReweighter::new(10).unwrap();

    let mut model = AlstmRegressor::<TrainBackend>::new(config(), device).unwrap();
    let mut evals = EvalsResult::default();
    model
        .fit(&data, &mut evals, Some(save.path()), Some(&reweighter))
        .unwrap();
    assert_eq!(model.state(), ModelState::Fitted);
    for score in &evals.valid {
        assert!(score.is_finite());
    }
}

#[test]
fn misbehaving_reweighter_is_rejected() {
    struct ShortWeights;
    impl Reweighter for ShortWeights {
        fn reweight(&self, _slice: &SequenceSlice) -> seqcast::Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    let device = NdArrayDevice::Cpu;
    let data = dataset(40, 20, 10);

    let mut model = AlstmRegressor::<TrainBackend>::new(config(), device).unwrap();
    let mut evals = EvalsResult::default();
    let err = model.fit(&data, &mut evals, None, Some(&ShortWeights));
    assert!(matches!(err, Err(ModelError::Data(_))));
    assert_eq!(model.state(), ModelState::Uninit);
}

#[test]
fn nan_features_are_filled_before_batching() {
    let device = NdArrayDevice::Cpu;
    let (mut rows, labels, index) = series(80, 9);
    for row in rows.iter_mut().step_by(3) {
        row[1] = f64::NAN;
    }
    let n = rows.len();
    let train = sequence_windows(&rows[..n / 2], &labels[..n / 2], &index[..n / 2], SEQ_LEN)
        .unwrap();
    let valid = sequence_windows(&rows[n / 2..], &labels[n / 2..], &index[n / 2..], SEQ_LEN)
        .unwrap();
    let data = InMemoryDataset::new()
        .with_sequence(Segment::Train, train)
        .with_sequence(Segment::Valid, valid);
    let save = tempdir().unwrap();

    let mut model = AlstmRegressor::<TrainBackend>::new(config(), device).unwrap();
    let mut evals = EvalsResult::default();
    model.fit(&data, &mut evals, Some(save.path()), None).unwrap();
    for score in &evals.valid {
        assert!(score.is_finite());
    }

    let pred = model.predict(&data, &Segment::Valid).unwrap();
    for value in &pred.values {
        assert!(value.is_finite());
    }
}

#[test]
fn seeded_runs_reproduce_predictions() {
    let device = NdArrayDevice::Cpu;
    let data = dataset(40, 20, 10);

    let mut first_pred = None;
    for _ in 0..2 {
        let save = tempdir().unwrap();
        let mut model = AlstmRegressor::<TrainBackend>::new(config(), device).unwrap();
        let mut evals = EvalsResult::default();
        model.fit(&data, &mut evals, Some(save.path()), None).unwrap();
        let pred = model.predict(&data, &Segment::Test).unwrap();
        match &first_pred {
            None => first_pred = Some(pred),
            Some(previous) => assert_eq!(previous.values, pred.values),
        }
    }
}
