pub mod face_detector;
pub mod face_tracker;
pub mod landmark_predictor;
pub mod refine_scorer;
