use serde::{Deserialize, Serialize};

use crate::shared::error::{FaceError, Result};
use crate::shared::frame::{Frame, PixelFormat};

/// Element type of a tensor as the model declares it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorType {
    #[default]
    Fp32,
    Uint8,
}

impl TensorType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "fp32" | "float32" | "float" => Ok(TensorType::Fp32),
            "uint8" | "u8" => Ok(TensorType::Uint8),
            other => Err(FaceError::Configuration(format!(
                "unknown tensor type `{other}`"
            ))),
        }
    }
}

/// How the payload of an input is laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataType {
    /// 8-bit pixels, converted/resized/normalized by the engine.
    #[default]
    Image,
    BlobNchw,
    BlobNhwc,
}

/// Source pixel buffer description for an image input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub is_bgr: bool,
    /// Swap R and B while converting.
    pub swap_color: bool,
    pub crop_x: u32,
    pub crop_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
}

impl ImageInfo {
    pub fn crop_is_full_image(&self) -> bool {
        self.crop_x == 0
            && self.crop_y == 0
            && self.crop_width == self.width
            && self.crop_height == self.height
    }
}

/// Per-channel `(pixel - mean) * norm`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub norm: [f32; 3],
}

impl Default for Normalize {
    fn default() -> Self {
        Self {
            mean: [0.0; 3],
            norm: [1.0; 3],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum InputPayload {
    #[default]
    Empty,
    Pixels(Vec<u8>),
    F32(Vec<f32>),
    U8(Vec<u8>),
}

/// Declared input tensor. `dims` is the logical `[N, C, H, W]` shape
/// regardless of the backend's native layout; empty means "take it from
/// the model".
#[derive(Clone, Debug, Default)]
pub struct InputTensorInfo {
    pub name: String,
    pub tensor_type: TensorType,
    pub dims: Vec<i64>,
    pub data_type: DataType,
    pub image_info: ImageInfo,
    pub normalize: Normalize,
    pub payload: InputPayload,
}

impl InputTensorInfo {
    pub fn new(name: impl Into<String>, tensor_type: TensorType) -> Self {
        Self {
            name: name.into(),
            tensor_type,
            ..Default::default()
        }
    }

    pub fn with_dims(mut self, dims: Vec<i64>) -> Self {
        self.dims = dims;
        self
    }

    pub fn is_shape_set(&self) -> bool {
        !self.dims.is_empty()
    }

    fn dim(&self, i: usize) -> Result<usize> {
        match self.dims.get(i) {
            Some(&d) if d > 0 => Ok(d as usize),
            _ => Err(FaceError::Configuration(format!(
                "input `{}` has no positive dimension {i} in {:?}",
                self.name, self.dims
            ))),
        }
    }

    pub fn channels(&self) -> Result<usize> {
        self.dim(1)
    }

    pub fn height(&self) -> Result<usize> {
        self.dim(2)
    }

    pub fn width(&self) -> Result<usize> {
        self.dim(3)
    }

    /// Attaches a frame as the image payload, with a crop covering it all.
    pub fn set_image(&mut self, frame: &Frame) {
        self.data_type = DataType::Image;
        self.image_info.width = frame.width();
        self.image_info.height = frame.height();
        self.image_info.channels = frame.channels();
        self.image_info.is_bgr = frame.format() == PixelFormat::Bgr;
        self.image_info.crop_x = 0;
        self.image_info.crop_y = 0;
        self.image_info.crop_width = frame.width();
        self.image_info.crop_height = frame.height();
        self.payload = InputPayload::Pixels(frame.data().to_vec());
    }
}

/// Declared output tensor. `dims` is filled in from the model at
/// initialization and refreshed after every `process`.
#[derive(Clone, Debug, Default)]
pub struct OutputTensorInfo {
    pub name: String,
    pub tensor_type: TensorType,
    pub dims: Vec<i64>,
    /// Dequantization for uint8 outputs: `(q - zero_point) * scale`.
    pub quant_scale: f32,
    pub quant_zero_point: i32,
}

impl OutputTensorInfo {
    pub fn new(name: impl Into<String>, tensor_type: TensorType) -> Self {
        Self {
            name: name.into(),
            tensor_type,
            dims: Vec::new(),
            quant_scale: 1.0,
            quant_zero_point: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputData {
    F32(Vec<f32>),
    U8(Vec<u8>),
}

/// A copy of one output retained by the engine after `process`.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputTensor {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: OutputData,
    pub quant_scale: f32,
    pub quant_zero_point: i32,
}

impl OutputTensor {
    pub fn tensor_type(&self) -> TensorType {
        match self.data {
            OutputData::F32(_) => TensorType::Fp32,
            OutputData::U8(_) => TensorType::Uint8,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            OutputData::F32(v) => v.len(),
            OutputData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as floats, dequantizing uint8 data.
    pub fn to_f32(&self) -> Vec<f32> {
        match &self.data {
            OutputData::F32(v) => v.clone(),
            OutputData::U8(v) => v
                .iter()
                .map(|&q| (q as i32 - self.quant_zero_point) as f32 * self.quant_scale)
                .collect(),
        }
    }
}
