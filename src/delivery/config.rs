//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `DeliveryConfig`：下载阶段的体积与超时上限、
//! 解码阶段的像素上限、以及重新编码的规范输出格式与质量。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置（JPEG / 质量 92）。
//! - `#[serde(default)]` 允许 JSON 配置只写需要覆盖的字段。
//! - `validate` 在流水线构建时统一校验取值范围。

use serde::{Deserialize, Serialize};

use super::{DeliveryError, DeliveryFormat};

/// 图片交付配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 整体请求超时（秒）。
    pub download_timeout: u64,
    /// 建立连接超时（秒）。
    pub connect_timeout: u64,
    /// 首包超时（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 分块读取超时（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭）。
    pub allow_private_network: bool,
    /// 请求头 `User-Agent`。
    pub user_agent: String,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 重新编码的规范输出格式。
    pub output_format: DeliveryFormat,
    /// 有损格式的固定质量。
    pub jpeg_quality: u8,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            max_decoded_pixels: 40_000_000,
            output_format: DeliveryFormat::Jpeg,
            jpeg_quality: 92,
        }
    }
}

impl DeliveryConfig {
    /// 从 JSON 文本解析，缺省字段取默认值。
    pub fn from_json_str(content: &str) -> Result<Self, DeliveryError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| DeliveryError::MalformedParameter(format!("解析配置失败：{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.max_file_size == 0 {
            return Err(invalid("max_file_size 不能为 0"));
        }
        if !(1..=600).contains(&self.download_timeout) {
            return Err(invalid("download_timeout 必须在 1~600 秒之间"));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(invalid("connect_timeout 必须在 1~120 秒之间"));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(invalid("stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间"));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(invalid("stream_chunk_timeout_ms 必须在 500~120000 毫秒之间"));
        }
        if self.max_redirects > 20 {
            return Err(invalid("max_redirects 不能超过 20"));
        }
        if self.max_decoded_pixels == 0 {
            return Err(invalid("max_decoded_pixels 不能为 0"));
        }
        if self.output_format.is_passthrough() {
            return Err(invalid("output_format 不能是动图格式"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(invalid("jpeg_quality 必须在 1~100 之间"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> DeliveryError {
    DeliveryError::MalformedParameter(format!("配置非法：{}", message))
}
