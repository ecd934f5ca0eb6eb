use std::fmt;

use crate::inference::domain::tensor_engine::BackendKind;
use crate::shared::config_bag::ConfigBag;

/// The neural stages the engine knows how to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelRole {
    Detect,
    Landmark,
    Refine,
    Mask,
    RgbLiveness,
    Age,
    Gender,
    InteractionLiveness,
}

impl ModelRole {
    pub const ALL: [ModelRole; 8] = [
        ModelRole::Detect,
        ModelRole::Landmark,
        ModelRole::Refine,
        ModelRole::Mask,
        ModelRole::RgbLiveness,
        ModelRole::Age,
        ModelRole::Gender,
        ModelRole::InteractionLiveness,
    ];

    /// Name under which the model source stores this role's weights.
    pub fn model_name(self) -> &'static str {
        match self {
            ModelRole::Detect => "face_detect",
            ModelRole::Landmark => "landmark",
            ModelRole::Refine => "refine_net",
            ModelRole::Mask => "mask_detect",
            ModelRole::RgbLiveness => "rgb_anti_spoofing",
            ModelRole::Age => "age_predict",
            ModelRole::Gender => "gender_predict",
            ModelRole::InteractionLiveness => "interaction_liveness",
        }
    }

    /// Archive index of the role's model.
    pub fn index(self) -> usize {
        ModelRole::ALL
            .iter()
            .position(|&r| r == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

// Keys understood by `ModelRunner`.
pub const KEY_INPUT_LAYER: &str = "input_layer";
pub const KEY_OUTPUT_LAYERS: &str = "outputs_layers";
/// `[width, height]` of the image input.
pub const KEY_INPUT_SIZE: &str = "input_size";
pub const KEY_INPUT_CHANNEL: &str = "input_channel";
pub const KEY_MEAN: &str = "mean";
pub const KEY_NORM: &str = "norm";
/// Swap R and B of a BGR frame before feeding it. RGB frames invert the flag.
pub const KEY_SWAP_COLOR: &str = "swap_color";
pub const KEY_INPUT_TENSOR_TYPE: &str = "input_tensor_type";
pub const KEY_OUTPUT_TENSOR_TYPE: &str = "output_tensor_type";
/// Position of the score of interest in a classifier's output.
pub const KEY_SCORE_INDEX: &str = "score_index";
pub const KEY_LANDMARK_COUNT: &str = "landmark_count";
/// Indices of left eye, right eye, nose, left/right mouth corner.
pub const KEY_KEY_POINTS: &str = "key_points";
pub const KEY_CONFIDENCE: &str = "confidence_threshold";

/// Default stage configuration for `role` on `backend`.
///
/// Model-provided configuration overrides these key by key.
pub fn preset(role: ModelRole, backend: BackendKind) -> ConfigBag {
    let base = match role {
        ModelRole::Detect => image_preset("input", &["output"], 160, [0.0; 3], 1.0 / 255.0, true)
            .with(KEY_CONFIDENCE, 0.5f64),
        ModelRole::Landmark => {
            image_preset("input", &["landmarks"], 112, [127.5; 3], 1.0 / 128.0, true)
                .with(KEY_LANDMARK_COUNT, 5i64)
                .with(KEY_KEY_POINTS, vec![0i64, 1, 2, 3, 4])
        }
        ModelRole::Refine => {
            image_preset("data", &["prob"], 24, [127.5; 3], 1.0 / 128.0, false)
                .with(KEY_SCORE_INDEX, 1i64)
        }
        ModelRole::Mask => {
            image_preset("input_1", &["activation_1/Softmax"], 96, [0.0; 3], 1.0 / 255.0, true)
                .with(KEY_SCORE_INDEX, 0i64)
        }
        ModelRole::RgbLiveness => image_preset("data", &["softmax"], 112, [0.0; 3], 1.0, true)
            .with(KEY_SCORE_INDEX, 1i64),
        ModelRole::Age => image_preset("data", &["age"], 112, [127.5; 3], 1.0 / 128.0, true)
            .with(KEY_SCORE_INDEX, 0i64),
        ModelRole::Gender => image_preset("data", &["gender"], 112, [127.5; 3], 1.0 / 128.0, true)
            .with(KEY_SCORE_INDEX, 0i64),
        ModelRole::InteractionLiveness => {
            image_preset("data", &["eyes"], 112, [127.5; 3], 1.0 / 128.0, true)
                .with(KEY_SCORE_INDEX, 1i64)
        }
    };

    match backend {
        BackendKind::Portable | BackendKind::Platform => base,
        BackendKind::Npu => npu_overrides(role, base),
    }
}

fn image_preset(
    input: &str,
    outputs: &[&str],
    size: i64,
    mean: [f64; 3],
    norm: f64,
    swap_color: bool,
) -> ConfigBag {
    ConfigBag::new()
        .with(KEY_INPUT_LAYER, input)
        .with(
            KEY_OUTPUT_LAYERS,
            outputs.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .with(KEY_INPUT_SIZE, vec![size, size])
        .with(KEY_INPUT_CHANNEL, 3i64)
        .with(KEY_MEAN, mean.to_vec())
        .with(KEY_NORM, vec![norm; 3])
        .with(KEY_SWAP_COLOR, swap_color)
        .with(KEY_INPUT_TENSOR_TYPE, "fp32")
        .with(KEY_OUTPUT_TENSOR_TYPE, "fp32")
}

/// NPU models take raw uint8 pixels; normalization is baked into the graph.
fn npu_overrides(role: ModelRole, base: ConfigBag) -> ConfigBag {
    let bag = base
        .with(KEY_MEAN, vec![0.0f64; 3])
        .with(KEY_NORM, vec![1.0f64; 3])
        .with(KEY_INPUT_TENSOR_TYPE, "uint8");
    match role {
        ModelRole::RgbLiveness => bag
            .with(KEY_OUTPUT_LAYERS, vec!["556".to_string()])
            .with(KEY_INPUT_SIZE, vec![80i64, 80])
            .with(KEY_SWAP_COLOR, false),
        _ => bag,
    }
}
