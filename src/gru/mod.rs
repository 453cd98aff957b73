pub mod cell;
pub mod network;
pub mod regressor;
