//! # 交付格式
//!
//! ## 设计思路
//!
//! 以穷举枚举 `DeliveryFormat` 取代散落各处的后缀字符串判断。
//! 格式只在下载阶段判定一次，之后的分支全部基于枚举匹配。
//!
//! 判定顺序：
//! 1. 文件签名（magic bytes，`infer`）
//! 2. 资源地址的文件后缀
//! 3. 响应头 `Content-Type`
//!
//! 三者都无法识别时返回 `UnsupportedFormat`，不再静默回退为 JPEG。

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use super::DeliveryError;

/// 可交付的图片容器格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl DeliveryFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    /// 动图类格式不做分段重组，始终原样透传。
    pub fn is_passthrough(self) -> bool {
        matches!(self, Self::Gif)
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Webp => ImageFormat::WebP,
        }
    }

    /// 按文件后缀识别（大小写不敏感，可带前导点）。
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// 从资源地址的路径部分提取后缀，忽略 query 与 fragment。
    pub fn from_locator(locator: &str) -> Option<Self> {
        let path = locator
            .split(['?', '#'])
            .next()
            .unwrap_or(locator);
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file_name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// 从 `Content-Type` 识别，忽略参数部分。
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let base = content_type.split(';').next()?.trim().to_ascii_lowercase();
        match base.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" | "image/apng" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// 按文件签名识别。
    ///
    /// 签名属于非图片类型、或属于四种交付格式之外的图片（BMP、TIFF 等）时直接报错；
    /// 无法识别签名时返回 `Ok(None)`，交由后缀与 content-type 兜底。
    pub fn sniff(bytes: &[u8]) -> Result<Option<Self>, DeliveryError> {
        let Some(kind) = infer::get(bytes) else {
            return Ok(None);
        };

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(DeliveryError::UnsupportedFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Self::from_mime(kind.mime_type()).map(Some).ok_or_else(|| {
            DeliveryError::UnsupportedFormat(format!("不支持的图片格式：{}", kind.mime_type()))
        })
    }

    /// 下载完成后一次性判定格式。
    pub fn detect(
        bytes: &[u8],
        locator: &str,
        content_type: Option<&str>,
    ) -> Result<Self, DeliveryError> {
        if bytes.is_empty() {
            return Err(DeliveryError::UnsupportedFormat("图片内容为空".to_string()));
        }

        if let Some(format) = Self::sniff(bytes)? {
            return Ok(format);
        }

        Self::from_locator(locator)
            .or_else(|| content_type.and_then(Self::from_mime))
            .ok_or_else(|| {
                DeliveryError::UnsupportedFormat(format!(
                    "无法识别图片类型（content-type：{}）",
                    content_type.unwrap_or("<none>")
                ))
            })
    }
}
