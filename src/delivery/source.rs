//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `ImageResource` 表示待交付的资源（地址 + 内容标识）
//! - `FetchedImage` 表示已下载但未解码的字节
//! - `ScrambleParams` 表示解析出的混淆参数
//! - `DeliveredImage` 表示可直接作为 HTTP 响应体的结果

use super::{BandCount, DeliveryFormat};

/// 内容标识：本子 / 章节 / 页序号，以及源站提供的混淆标记。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentRef {
    pub album_id: String,
    pub photo_id: Option<String>,
    pub page_index: Option<usize>,
    /// 源站提供的混淆标记；`None` 表示源站未声明混淆。
    pub scramble_id: Option<u64>,
}

/// 待交付的图片资源。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    pub locator: String,
    pub content: ContentRef,
}

impl ImageResource {
    /// 章节内的一页。
    pub fn page(
        locator: impl Into<String>,
        album_id: impl Into<String>,
        photo_id: impl Into<String>,
        page_index: usize,
        scramble_id: Option<u64>,
    ) -> Self {
        Self {
            locator: locator.into(),
            content: ContentRef {
                album_id: album_id.into(),
                photo_id: Some(photo_id.into()),
                page_index: Some(page_index),
                scramble_id,
            },
        }
    }

    /// 本子封面：无章节、无混淆标记。
    pub fn cover(locator: impl Into<String>, album_id: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            content: ContentRef {
                album_id: album_id.into(),
                ..ContentRef::default()
            },
        }
    }

    /// 仅有地址、无内容标识的资源（命令行与测试使用）。
    pub fn bare(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            content: ContentRef::default(),
        }
    }
}

/// 下载阶段输出：原始字节与判定后的格式。
///
/// 原始 `Content-Type` 只参与格式判定，透传时以 `format` 的 MIME 类型为准。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub format: DeliveryFormat,
}

/// 解析阶段输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrambleParams {
    pub num: BandCount,
    pub requires_decode: bool,
}

impl ScrambleParams {
    /// 正常的“无需解混淆”结果，不是错误。
    pub const fn not_required() -> Self {
        Self {
            num: BandCount::NONE,
            requires_decode: false,
        }
    }

    pub const fn scrambled(num: BandCount) -> Self {
        Self {
            num,
            requires_decode: true,
        }
    }
}

/// 实际走过的交付路径。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRoute {
    /// 原始字节原样返回。
    Passthrough,
    /// 解码后直接重新编码为规范格式，未做分段重组。
    Reencoded,
    /// 经过分段重组后编码。
    Reconstructed,
}

/// 交付结果：响应体字节与 MIME 类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub route: DeliveryRoute,
}
