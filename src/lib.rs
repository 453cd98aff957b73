//! Sequence forecasting with recurrent networks on burn.
//!
//! Two regressors share the batching, masking and checkpointing
//! machinery: [`gru::regressor::GruRegressor`] consumes flat tabular
//! windows, [`alstm::regressor::AlstmRegressor`] consumes per-step
//! sequences and adds a temporal attention head plus optional
//! per-sample loss reweighting.

pub mod alstm;
pub mod constants;
pub mod data;
pub mod error;
pub mod gru;
pub mod training;

pub mod util {
    pub mod checkpoint;
    pub mod device;
    pub mod paths;
    pub mod recorder;
}

pub use error::{ModelError, Result};
pub use training::{EvalsResult, ModelState};
