//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载交付链路中的所有失败来源（下载 / 参数解析 / 重组 / 编解码），
//! 避免字符串拼接式错误处理。通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 所有错误都只作用于单次请求：出错时绝不返回“部分重组”的图片。

/// 图片交付统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("网络错误：{0}")]
    Transport(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源不存在：{0}")]
    NotFound(String),

    #[error("分段参数解析失败：{0}")]
    Resolution(String),

    #[error("分段参数非法：{0}")]
    MalformedParameter(String),

    #[error("格式错误：{0}")]
    UnsupportedFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),
}

impl DeliveryError {
    /// 稳定的机器可读错误码，供边界层输出。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Resolution(_) => "E_RESOLUTION",
            Self::MalformedParameter(_) => "E_MALFORMED_PARAMETER",
            Self::UnsupportedFormat(_) => "E_UNSUPPORTED_FORMAT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Decode(_) => "E_DECODE",
            Self::Encode(_) => "E_ENCODE",
        }
    }

    /// 映射为对外的 HTTP 状态码。
    ///
    /// 失败一律以显式错误响应返回，不回退为占位图。
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Transport(_) | Self::Timeout(_) => 502,
            Self::NotFound(_) => 404,
            Self::MalformedParameter(_) | Self::UnsupportedFormat(_) => 422,
            Self::ResourceLimit(_) => 413,
            Self::Resolution(_) | Self::Decode(_) | Self::Encode(_) => 500,
        }
    }
}
