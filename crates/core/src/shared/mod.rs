pub mod config_bag;
pub mod constants;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod model_source;
