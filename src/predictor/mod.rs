pub mod batch;
pub mod engine;
pub mod form;
pub mod reasoning;

pub use batch::{BatchConfig, BatchMode, BatchReport, BatchRunner, CancelToken};
pub use engine::{EngineParams, PredictionEngine};
