//! Input conversion shared by the ort-backed engines.
//!
//! Turns an [`InputTensorInfo`] payload into an owned tensor in the layout
//! and element type the backend feeds to the runtime.

use ndarray::{Array4, ArrayD};

use crate::inference::domain::tensor_engine::BackendKind;
use crate::inference::domain::tensor_info::{DataType, InputPayload, InputTensorInfo, TensorType};
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::{resize_pixels, PixelFormat};

/// A backend-ready input tensor.
#[derive(Clone, Debug, PartialEq)]
pub enum PreparedTensor {
    F32(ArrayD<f32>),
    U8(ArrayD<u8>),
}

impl PreparedTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            PreparedTensor::F32(a) => a.shape(),
            PreparedTensor::U8(a) => a.shape(),
        }
    }
}

pub fn prepare_input(info: &InputTensorInfo, backend: BackendKind) -> Result<PreparedTensor> {
    match info.data_type {
        DataType::Image => prepare_image(info, backend),
        DataType::BlobNchw | DataType::BlobNhwc => prepare_blob(info, backend.is_nhwc()),
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn prepare_image(info: &InputTensorInfo, backend: BackendKind) -> Result<PreparedTensor> {
    let InputPayload::Pixels(pixels) = &info.payload else {
        return Err(FaceError::Configuration(format!(
            "input `{}` expects image pixels",
            info.name
        )));
    };
    let img = &info.image_info;
    if !img.crop_is_full_image() {
        return Err(FaceError::Unsupported {
            backend,
            operation: "cropping during pre-processing",
        });
    }
    let expected = img.width as usize * img.height as usize * img.channels;
    if pixels.len() != expected {
        return Err(FaceError::Configuration(format!(
            "input `{}` holds {} bytes, expected {expected}",
            info.name,
            pixels.len()
        )));
    }

    let channels = info.channels()?;
    let height = info.height()?;
    let width = info.width()?;

    let converted = convert_color(pixels, img.channels, img.is_bgr, channels, img.swap_color)?;
    let resized = if (img.width as usize, img.height as usize) == (width, height) {
        converted
    } else {
        let format = match channels {
            1 => PixelFormat::Gray,
            _ => PixelFormat::Rgb,
        };
        resize_pixels(
            &converted,
            img.width,
            img.height,
            format,
            width as u32,
            height as u32,
        )?
    };

    let norm = &info.normalize;
    let value = |y: usize, x: usize, c: usize| -> f32 {
        let p = resized[(y * width + x) * channels + c] as f32;
        (p - norm.mean[c.min(2)]) * norm.norm[c.min(2)]
    };

    let nhwc = backend.is_nhwc();
    match info.tensor_type {
        TensorType::Fp32 => {
            let arr = if nhwc {
                Array4::from_shape_fn((1, height, width, channels), |(_, y, x, c)| value(y, x, c))
            } else {
                Array4::from_shape_fn((1, channels, height, width), |(_, c, y, x)| value(y, x, c))
            };
            Ok(PreparedTensor::F32(arr.into_dyn()))
        }
        TensorType::Uint8 => {
            let q = |v: f32| v.round().clamp(0.0, 255.0) as u8;
            let arr = if nhwc {
                Array4::from_shape_fn((1, height, width, channels), |(_, y, x, c)| {
                    q(value(y, x, c))
                })
            } else {
                Array4::from_shape_fn((1, channels, height, width), |(_, c, y, x)| {
                    q(value(y, x, c))
                })
            };
            Ok(PreparedTensor::U8(arr.into_dyn()))
        }
    }
}

/// Channel conversion between interleaved 8-bit buffers.
///
/// Supported: 3→3 (optionally swapping R/B), 1→1, 3→1 (luma), 1→3.
pub fn convert_color(
    pixels: &[u8],
    src_channels: usize,
    is_bgr: bool,
    dst_channels: usize,
    swap: bool,
) -> Result<Vec<u8>> {
    match (src_channels, dst_channels) {
        (3, 3) if swap => Ok(pixels
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect()),
        (3, 3) | (1, 1) => Ok(pixels.to_vec()),
        (3, 1) => Ok(pixels
            .chunks_exact(3)
            .map(|p| {
                let (r, g, b) = if is_bgr {
                    (p[2], p[1], p[0])
                } else {
                    (p[0], p[1], p[2])
                };
                (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
            })
            .collect()),
        (1, 3) => Ok(pixels.iter().flat_map(|&v| [v, v, v]).collect()),
        (s, d) => Err(FaceError::Configuration(format!(
            "unsupported color conversion {s} -> {d} channels"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Blobs
// ---------------------------------------------------------------------------

fn prepare_blob(info: &InputTensorInfo, nhwc: bool) -> Result<PreparedTensor> {
    let channels = info.channels()?;
    let height = info.height()?;
    let width = info.width()?;
    let expected = channels * height * width;

    let src_nhwc = info.data_type == DataType::BlobNhwc;
    let src_shape = if src_nhwc {
        (1, height, width, channels)
    } else {
        (1, channels, height, width)
    };

    let values: Vec<f32> = match &info.payload {
        InputPayload::F32(v) => v.clone(),
        InputPayload::U8(v) | InputPayload::Pixels(v) => v.iter().map(|&b| b as f32).collect(),
        InputPayload::Empty => Vec::new(),
    };
    if values.len() != expected {
        return Err(FaceError::Configuration(format!(
            "input `{}` holds {} elements, expected {expected}",
            info.name,
            values.len()
        )));
    }

    let src = Array4::from_shape_vec(src_shape, values).map_err(FaceError::configuration)?;
    let arranged = match (src_nhwc, nhwc) {
        (false, true) => src.permuted_axes([0, 2, 3, 1]),
        (true, false) => src.permuted_axes([0, 3, 1, 2]),
        _ => src,
    }
    .as_standard_layout()
    .into_owned();

    Ok(match info.tensor_type {
        TensorType::Fp32 => PreparedTensor::F32(arranged.into_dyn()),
        TensorType::Uint8 => PreparedTensor::U8(
            arranged
                .mapv(|v| v.round().clamp(0.0, 255.0) as u8)
                .into_dyn(),
        ),
    })
}
