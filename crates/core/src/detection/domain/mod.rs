pub mod face_landmarks;
pub mod nms;
pub mod tracked_face;
