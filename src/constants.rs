// Gradient clipping
pub const GRAD_CLIP_VALUE: f32 = 3.0; // elementwise clip applied before every optimizer step

// Checkpoint layout under the resolved save path
pub const CHECKPOINT_DIR: &str = "model_ckpt";
pub const BEST_PARAMS_STEM: &str = "base_model_params";

// Recorder artifact subdirectory for parameter files
pub const ARTIFACT_MODELS_DIR: &str = "models";

// Column name carrying the regression target in tabular slices
pub const LABEL_COLUMN: &str = "label";
