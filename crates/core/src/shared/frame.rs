use image::{imageops, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::shared::error::{FaceError, Result};
use crate::shared::geometry::{AffineTransform, Point, Rect};

/// Channel order of an 8-bit interleaved pixel buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgb,
    Bgr,
    Gray,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Gray => 1,
        }
    }
}

/// A single camera/image frame: contiguous 8-bit pixels in row-major order.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    index: usize,
}

impl Frame {
    /// Fails when `data` does not hold exactly `width * height * channels`
    /// bytes.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        index: usize,
    ) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * format.channels();
        if data.len() != expected {
            return Err(FaceError::Configuration(format!(
                "{width}x{height} {format:?} frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            index,
        })
    }

    /// Black frame of the given size.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            data: vec![0; len],
            width,
            height,
            format,
            index: 0,
        }
    }

    pub fn from_rgb_image(img: RgbImage, index: usize) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
            format: PixelFormat::Rgb,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> Result<ArrayView3<'_, u8>> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, self.channels()),
            &self.data,
        )
        .map_err(FaceError::configuration)
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    /// Sets every pixel inside `rect` (clipped to the frame) to `value`.
    pub fn fill_rect(&mut self, rect: &Rect, value: u8) {
        let r = rect.clip(self.width as f32, self.height as f32);
        if r.is_empty() {
            return;
        }
        let ch = self.channels();
        let x0 = r.x.floor() as usize;
        let y0 = r.y.floor() as usize;
        let x1 = (r.right().ceil() as usize).min(self.width as usize);
        let y1 = (r.bottom().ceil() as usize).min(self.height as usize);
        let stride = self.width as usize * ch;
        for y in y0..y1 {
            self.data[y * stride + x0 * ch..y * stride + x1 * ch].fill(value);
        }
    }

    /// Bilinear sample of channel `c` at a sub-pixel position; `None` outside.
    fn sample(&self, x: f32, y: f32, c: usize) -> Option<f32> {
        let (w, h) = (self.width as i64, self.height as i64);
        if x < -0.5 || y < -0.5 || x > w as f32 - 0.5 || y > h as f32 - 0.5 {
            return None;
        }
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let ch = self.channels();
        let px = |xi: i64, yi: i64| -> f32 {
            let xi = xi.clamp(0, w - 1) as usize;
            let yi = yi.clamp(0, h - 1) as usize;
            self.data[(yi * self.width as usize + xi) * ch + c] as f32
        };
        let top = px(x0, y0) * (1.0 - fx) + px(x0 + 1, y0) * fx;
        let bottom = px(x0, y0 + 1) * (1.0 - fx) + px(x0 + 1, y0 + 1) * fx;
        Some(top * (1.0 - fy) + bottom * fy)
    }
}

/// Image access the tracker and pipeline need from a camera frame.
pub trait ImageSource {
    fn frame_width(&self) -> u32;

    fn frame_height(&self) -> u32;

    /// The image resized by `scale`. With `keep_aspect` the result is padded
    /// (bottom/right, black) to a square whose side is the scaled long side,
    /// so coordinates map back by dividing by `scale`.
    fn scaled_image(&self, scale: f32, keep_aspect: bool) -> Result<Frame>;

    /// Warps the image through `transform` (source → destination) into a
    /// `width` x `height` frame. Pixels mapping outside the source are black.
    fn affine_crop(&self, transform: &AffineTransform, width: u32, height: u32) -> Result<Frame>;
}

impl ImageSource for Frame {
    fn frame_width(&self) -> u32 {
        self.width
    }

    fn frame_height(&self) -> u32 {
        self.height
    }

    fn scaled_image(&self, scale: f32, keep_aspect: bool) -> Result<Frame> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(FaceError::Configuration(format!(
                "scale must be positive, got {scale}"
            )));
        }
        let nw = ((self.width as f32 * scale).round() as u32).max(1);
        let nh = ((self.height as f32 * scale).round() as u32).max(1);
        let resized = resize_pixels(&self.data, self.width, self.height, self.format, nw, nh)?;
        let scaled = Frame::new(resized, nw, nh, self.format, self.index)?;
        if !keep_aspect || nw == nh {
            return Ok(scaled);
        }

        let side = nw.max(nh);
        let ch = self.channels();
        let mut canvas = Frame::blank(side, side, self.format);
        canvas.index = self.index;
        let src_stride = nw as usize * ch;
        let dst_stride = side as usize * ch;
        for y in 0..nh as usize {
            canvas.data[y * dst_stride..y * dst_stride + src_stride]
                .copy_from_slice(&scaled.data[y * src_stride..(y + 1) * src_stride]);
        }
        Ok(canvas)
    }

    fn affine_crop(&self, transform: &AffineTransform, width: u32, height: u32) -> Result<Frame> {
        if width == 0 || height == 0 {
            return Err(FaceError::Configuration(format!(
                "crop size must be positive, got {width}x{height}"
            )));
        }
        let inverse = transform.invert().ok_or_else(|| {
            FaceError::Configuration("affine transform is not invertible".into())
        })?;

        let ch = self.channels();
        let mut out = Frame::blank(width, height, self.format);
        out.index = self.index;
        for y in 0..height {
            for x in 0..width {
                let src = inverse.apply(Point::new(x as f32, y as f32));
                let offset = (y as usize * width as usize + x as usize) * ch;
                for c in 0..ch {
                    if let Some(v) = self.sample(src.x, src.y, c) {
                        out.data[offset + c] = v.round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
        Ok(out)
    }
}

pub(crate) fn resize_pixels(
    data: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    new_width: u32,
    new_height: u32,
) -> Result<Vec<u8>> {
    let bad_buffer = || FaceError::Configuration("frame buffer does not match its dimensions".into());
    // Rgb<u8> is used for BGR too; the filter does not care about channel meaning.
    match format {
        PixelFormat::Rgb | PixelFormat::Bgr => {
            let img = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data.to_vec())
                .ok_or_else(bad_buffer)?;
            Ok(imageops::resize(&img, new_width, new_height, imageops::FilterType::Triangle)
                .into_raw())
        }
        PixelFormat::Gray => {
            let img = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.to_vec())
                .ok_or_else(bad_buffer)?;
            Ok(imageops::resize(&img, new_width, new_height, imageops::FilterType::Triangle)
                .into_raw())
        }
    }
}
