//! # 交付编码
//!
//! ## 设计思路
//!
//! - 透传路径：原始字节原样返回，只按已判定格式打上 MIME 类型。
//! - 重新编码路径：一律编码为配置中的规范输出格式，客户端只需处理一种容器。
//!   有损格式使用固定质量；PNG 与 WebP 为无损输出。
//!
//! 编码只产生内存中的字节，不写文件。

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::source::{DeliveredImage, DeliveryRoute, FetchedImage};
use super::{DeliveryConfig, DeliveryError, DeliveryFormat, RasterImage};

/// 编码阶段输入。
#[derive(Debug)]
pub enum DeliveryPayload {
    /// 原样透传的下载结果。
    Raw(FetchedImage),
    /// 解码后未经重组的图片。
    Reencoded(RasterImage),
    /// 已完成分段重组的图片。
    Reconstructed(RasterImage),
}

/// 将载荷序列化为响应体。
pub fn encode(payload: DeliveryPayload, config: &DeliveryConfig) -> Result<DeliveredImage, DeliveryError> {
    let (image, route) = match payload {
        DeliveryPayload::Raw(fetched) => {
            return Ok(DeliveredImage {
                bytes: fetched.bytes,
                content_type: fetched.format.mime_type(),
                route: DeliveryRoute::Passthrough,
            });
        }
        DeliveryPayload::Reencoded(image) => (image, DeliveryRoute::Reencoded),
        DeliveryPayload::Reconstructed(image) => (image, DeliveryRoute::Reconstructed),
    };

    let bytes = encode_raster(&image, config.output_format, config.jpeg_quality)?;

    Ok(DeliveredImage {
        bytes,
        content_type: config.output_format.mime_type(),
        route,
    })
}

/// 按指定格式序列化像素缓冲。
pub fn encode_raster(
    image: &RasterImage,
    format: DeliveryFormat,
    quality: u8,
) -> Result<Vec<u8>, DeliveryError> {
    let (width, height) = (image.width(), image.height());
    let pixels = image.as_bytes();
    let mut output = Vec::with_capacity(pixels.len() / 4);

    let result = match format {
        DeliveryFormat::Jpeg => JpegEncoder::new_with_quality(&mut output, quality).write_image(
            pixels,
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
        DeliveryFormat::Png => PngEncoder::new(&mut output).write_image(
            pixels,
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
        DeliveryFormat::Webp => WebPEncoder::new_lossless(&mut output).write_image(
            pixels,
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
        DeliveryFormat::Gif => {
            return Err(DeliveryError::Encode("不支持编码为 GIF".to_string()));
        }
    };

    result.map_err(|e| DeliveryError::Encode(format!("{:?} 编码失败：{}", format, e)))?;

    log::debug!(
        "📦 编码完成 - 格式: {:?} 尺寸: {}x{} 输出: {} bytes",
        format,
        width,
        height,
        output.len()
    );

    Ok(output)
}
