/// At most this many faces are tracked at once unless configured otherwise.
pub const DEFAULT_MAX_DETECTED_FACES: usize = 2;
/// Frames between forced detection passes.
pub const DEFAULT_DETECTION_INTERVAL: usize = 1;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.5;
pub const DEFAULT_REFINE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.5;
/// Margin added on each side of a tracked box before cropping, as a
/// fraction of the box's long side.
pub const DEFAULT_TRACK_MARGIN: f32 = 0.2;

pub const ALIGNED_FACE_SIZE: u32 = 112;

pub const MASK_THRESHOLD: f32 = 0.95;
pub const RGB_LIVENESS_THRESHOLD: f32 = 0.88;
pub const INTERACTION_THRESHOLD: f32 = 0.5;
pub const LIVENESS_BOX_SCALE: f32 = 2.7;
pub const AGE_SCALE: f32 = 100.0;

pub const MANIFEST_FILENAME: &str = "manifest.json";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
