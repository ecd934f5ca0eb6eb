pub mod alignment;
pub mod capability;
pub mod classifiers;
pub mod engine_session;
pub mod face_pipeline;
pub mod session_logger;
