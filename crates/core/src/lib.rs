//! On-device face detection, tracking and per-face analysis.
//!
//! [`EngineSession`](pipeline::engine_session::EngineSession) is the entry
//! point: it owns a [`FaceTracker`](detection::infrastructure::face_tracker::FaceTracker)
//! and a [`FacePipeline`](pipeline::face_pipeline::FacePipeline) whose models
//! run on a backend chosen at runtime.

pub mod detection;
pub mod inference;
pub mod pipeline;
pub mod shared;
pub mod video;

#[cfg(test)]
pub(crate) mod test_support;
