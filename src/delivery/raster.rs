//! # 像素缓冲与解码
//!
//! ## 设计思路
//!
//! `RasterImage` 是不可变值：固定 RGB8 通道顺序、连续存储，
//! 构造时校验 `pixels.len() == width * height * 3`，之后任何变换都产生新值。
//!
//! ## 实现思路
//!
//! 解码前先读取 header 尺寸做像素上限检查，再进行完整解码，
//! 降低异常输入触发高内存开销的风险。

use image::{DynamicImage, ImageReader};
use std::io::Cursor;

use super::{DeliveryError, DeliveryFormat};

/// 每个像素的通道数（RGB8）。
pub const CHANNELS: usize = 3;

/// 不可变的 RGB8 像素缓冲。
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl RasterImage {
    /// 由原始 RGB8 数据构造，校验尺寸与缓冲长度。
    pub fn from_rgb8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DeliveryError> {
        if width == 0 || height == 0 {
            return Err(DeliveryError::MalformedParameter(format!(
                "图片尺寸非法：{}x{}",
                width, height
            )));
        }

        let expected = Self::buffer_len(width, height)?;
        if pixels.len() != expected {
            return Err(DeliveryError::MalformedParameter(format!(
                "像素缓冲长度异常：{}（期望 {}）",
                pixels.len(),
                expected
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_dynamic(image: DynamicImage) -> Result<Self, DeliveryError> {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self::from_rgb8(width, height, rgb.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// 单行字节数。
    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.stride();
        let start = y as usize * stride;
        Some(&self.pixels[start..start + stride])
    }

    fn buffer_len(width: u32, height: u32) -> Result<usize, DeliveryError> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(CHANNELS))
            .ok_or_else(|| DeliveryError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))
    }
}

/// 将下载到的字节按已判定的格式解码为 `RasterImage`。
pub fn decode(
    bytes: &[u8],
    format: DeliveryFormat,
    max_decoded_pixels: u64,
) -> Result<RasterImage, DeliveryError> {
    let (header_width, header_height) = inspect_dimensions(bytes, format)?;
    validate_pixel_limits(header_width, header_height, max_decoded_pixels)?;

    let decoded = image::load_from_memory_with_format(bytes, format.image_format())
        .map_err(|e| DeliveryError::Decode(format!("图片解码失败：{}", e)))?;

    let raster = RasterImage::from_dynamic(decoded)?;
    validate_pixel_limits(raster.width(), raster.height(), max_decoded_pixels)?;

    log::debug!(
        "🖼️ 解码完成 - 格式: {:?} 尺寸: {}x{}",
        format,
        raster.width(),
        raster.height()
    );

    Ok(raster)
}

/// 仅通过图片头信息读取宽高。
fn inspect_dimensions(bytes: &[u8], format: DeliveryFormat) -> Result<(u32, u32), DeliveryError> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    reader.set_format(format.image_format());

    reader
        .into_dimensions()
        .map_err(|e| DeliveryError::Decode(format!("无法读取图片尺寸：{}", e)))
}

fn validate_pixel_limits(width: u32, height: u32, max_pixels: u64) -> Result<(), DeliveryError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| DeliveryError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > max_pixels {
        return Err(DeliveryError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, max_pixels
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn from_rgb8_rejects_length_mismatch() {
        let result = RasterImage::from_rgb8(4, 4, vec![0; 4 * 4 * 3 - 1]);
        assert!(matches!(result, Err(DeliveryError::MalformedParameter(_))));
    }

    #[test]
    fn from_rgb8_rejects_zero_dimensions() {
        assert!(matches!(
            RasterImage::from_rgb8(0, 4, Vec::new()),
            Err(DeliveryError::MalformedParameter(_))
        ));
        assert!(matches!(
            RasterImage::from_rgb8(4, 0, Vec::new()),
            Err(DeliveryError::MalformedParameter(_))
        ));
    }

    #[test]
    fn row_accessor_returns_contiguous_slice() {
        let pixels: Vec<u8> = (0..2 * 3 * 3).map(|v| v as u8).collect();
        let raster = RasterImage::from_rgb8(2, 3, pixels).expect("valid raster");

        assert_eq!(raster.stride(), 6);
        assert_eq!(raster.row(1), Some(&[6u8, 7, 8, 9, 10, 11][..]));
        assert_eq!(raster.row(3), None);
    }

    #[test]
    fn decode_png_keeps_dimensions() {
        let png = create_png_bytes(37, 23);
        let raster = decode(&png, DeliveryFormat::Png, 40_000_000).expect("decode should succeed");

        assert_eq!(raster.width(), 37);
        assert_eq!(raster.height(), 23);
        assert_eq!(raster.as_bytes().len(), 37 * 23 * CHANNELS);
    }

    #[test]
    fn decode_rejects_too_many_pixels_before_full_decode() {
        let png = create_png_bytes(200, 200);
        let result = decode(&png, DeliveryFormat::Png, 10_000);

        assert!(matches!(result, Err(DeliveryError::ResourceLimit(_))));
    }

    #[test]
    fn decode_rejects_wrong_container() {
        let png = create_png_bytes(8, 8);
        let result = decode(&png, DeliveryFormat::Jpeg, 40_000_000);

        assert!(matches!(result, Err(DeliveryError::Decode(_))));
    }
}
