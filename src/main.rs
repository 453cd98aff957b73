// External imports
use anyhow::Result;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Internal imports
use seqcast::alstm::regressor::{AlstmRegressor, AlstmRegressorConfig};
use seqcast::data::memory::{sequence_windows, tabular_windows, InMemoryDataset};
use seqcast::data::Segment;
use seqcast::gru::regressor::{GruRegressor, GruRegressorConfig};
use seqcast::training::EvalsResult;
use seqcast::util::device::default_device;
use seqcast::util::recorder::FileRecorder;

type TrainBackend = Autodiff<NdArray<f32>>;

const D_FEAT: usize = 4;
const SEQ_LEN: usize = 10;

/// Random-walk features whose next-step drift drives the label, so both
/// regressors have a learnable signal.
fn synthetic_series(n: usize, rng: &mut StdRng) -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
    let mut level = vec![0.0_f64; D_FEAT];
    let mut rows = Vec::with_capacity(n);
    for _ in 0..n {
        for value in level.iter_mut() {
            *value += rng.random_range(-0.5..0.5);
        }
        rows.push(level.clone());
    }
    let labels: Vec<f64> = (0..n)
        .map(|i| {
            let drift: f64 = rows[i].iter().sum::<f64>() / D_FEAT as f64;
            drift * 0.1 + rng.random_range(-0.05..0.05)
        })
        .collect();
    let index = (0..n).map(|i| format!("row_{:04}", i)).collect();
    (rows, labels, index)
}

fn build_dataset(rows: &[Vec<f64>], labels: &[f64], index: &[String]) -> Result<InMemoryDataset> {
    let n = rows.len();
    let (train_end, valid_end) = (n * 6 / 10, n * 8 / 10);
    let mut dataset = InMemoryDataset::new();

    for (segment, range) in [
        (Segment::Train, 0..train_end),
        (Segment::Valid, train_end..valid_end),
        (Segment::Test, valid_end..n),
    ] {
        let tabular = tabular_windows(
            &rows[range.clone()],
            &labels[range.clone()],
            &index[range.clone()],
            SEQ_LEN,
        )?;
        let sequence = sequence_windows(
            &rows[range.clone()],
            &labels[range.clone()],
            &index[range.clone()],
            SEQ_LEN,
        )?;
        dataset = dataset
            .with_tabular(segment.clone(), tabular)
            .with_sequence(segment, sequence);
    }
    Ok(dataset)
}

fn main() -> Result<()> {
    env_logger::init();
    let device = default_device(None);

    let mut rng = StdRng::seed_from_u64(7);
    let (rows, labels, index) = synthetic_series(600, &mut rng);
    let dataset = build_dataset(&rows, &labels, &index)?;

    let run_dir = std::env::temp_dir().join("seqcast_demo");
    let recorder = FileRecorder::new(run_dir.join("tracking"))?;

    println!("training the GRU regressor...");
    let gru_config = GruRegressorConfig {
        d_feat: D_FEAT,
        hidden_size: 16,
        num_layers: 1,
        n_epochs: 10,
        batch_size: 64,
        early_stop: 5,
        seed: Some(7),
        save_path: Some(run_dir.join("gru")),
        ..Default::default()
    };
    let mut gru = GruRegressor::<TrainBackend>::new(gru_config, device)?
        .with_recorder(Box::new(recorder.clone()));
    let mut gru_evals = EvalsResult::default();
    gru.fit(&dataset, &mut gru_evals, None)?;
    let gru_pred = gru.predict(&dataset, &Segment::Test)?;
    println!(
        "GRU: {} epochs, last valid score {:.6}",
        gru_evals.train.len(),
        gru_evals.valid.last().copied().unwrap_or(f64::NAN)
    );

    println!("training the attention regressor...");
    let alstm_config = AlstmRegressorConfig {
        d_feat: D_FEAT,
        hidden_size: 16,
        num_layers: 1,
        n_epochs: 10,
        batch_size: 64,
        early_stop: 5,
        seed: Some(7),
        save_path: Some(run_dir.join("alstm")),
        ..Default::default()
    };
    let mut alstm = AlstmRegressor::<TrainBackend>::new(alstm_config, device)?
        .with_recorder(Box::new(recorder));
    let mut alstm_evals = EvalsResult::default();
    alstm.fit(&dataset, &mut alstm_evals, None, None)?;
    let alstm_pred = alstm.predict(&dataset, &Segment::Test)?;
    println!(
        "ALSTM: {} epochs, last valid score {:.6}",
        alstm_evals.train.len(),
        alstm_evals.valid.last().copied().unwrap_or(f64::NAN)
    );

    println!("\ntest-set head:");
    println!("{:>10} {:>12} {:>12}", "row", "gru", "alstm");
    for i in 0..5.min(gru_pred.len()) {
        println!(
            "{:>10} {:>12.6} {:>12.6}",
            gru_pred.index[i], gru_pred.values[i], alstm_pred.values[i]
        );
    }
    println!("\nrun artifacts under {}", run_dir.display());
    Ok(())
}
