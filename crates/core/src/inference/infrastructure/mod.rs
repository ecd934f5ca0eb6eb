pub mod engine_factory;
pub mod execution_provider;
pub mod model_runner;
pub mod ort_engine;
pub mod preprocess;
pub mod presets;
