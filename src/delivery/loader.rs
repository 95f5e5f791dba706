//! # 原始字节加载
//!
//! ## 设计思路
//!
//! `RawFetcher` 是流水线的下载协作者，只负责“资源地址 → 原始字节 + 格式”。
//! 重试与缓存不在这一层（由更外层的网络客户端自行决定），失败直接上抛。
//!
//! ## 实现思路
//!
//! - `HttpFetcher`：协议 + 主机安全校验（域名先解析再逐个校验地址，并把解析结果钉到请求客户端）、
//!   逐跳重定向校验、状态码映射、
//!   内容类型与体积校验、带首包/分块超时的流式下载、签名探测。
//! - `FileFetcher`：本地路径或 `file://` 地址，存在性 + 体积校验后读取。
//! - 格式在这里一次性判定（`DeliveryFormat::detect`），后续阶段不再解析字符串。

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use super::source::{FetchedImage, ImageResource};
use super::{DeliveryConfig, DeliveryError, DeliveryFormat};

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const STREAM_SIGNATURE_PROBE_BYTES: usize = 64;

/// 下载协作者。
pub trait RawFetcher: Send + Sync {
    fn fetch(
        &self,
        resource: &ImageResource,
    ) -> impl Future<Output = Result<FetchedImage, DeliveryError>> + Send;
}

/// 基于 `reqwest` 的网络下载器。
///
/// 内部 `reqwest::Client` 自带连接池，可在并发请求间共享。
pub struct HttpFetcher {
    client: reqwest::Client,
    config: DeliveryConfig,
}

impl HttpFetcher {
    pub fn new(config: DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = client_builder(&config)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { client, config })
    }

    /// 选择本跳使用的客户端。
    ///
    /// 禁止内网访问时，域名主机先解析并校验全部地址，再用 `resolve_to_addrs`
    /// 把校验过的地址固定到专用客户端，连接阶段不会再次查询 DNS。
    async fn client_for(&self, url: &reqwest::Url) -> Result<reqwest::Client, DeliveryError> {
        let config = &self.config;
        if config.allow_private_network {
            return Ok(self.client.clone());
        }

        let Some(host) = url.host_str() else {
            return Err(DeliveryError::UnsupportedFormat("URL 缺少主机地址".to_string()));
        };

        // IP 字面量已在 validate_url_safety 中校验
        if host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().is_ok() {
            return Ok(self.client.clone());
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| DeliveryError::UnsupportedFormat("URL 缺少端口信息".to_string()))?;

        let pinned = resolve_public_socket_addrs(host, port).await?;
        if pinned.is_empty() {
            return Err(DeliveryError::Transport(format!("主机未解析到任何地址：{}", host)));
        }

        client_builder(config)
            .resolve_to_addrs(host, &pinned)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("无法创建 DNS 绑定客户端：{}", e)))
    }

    async fn download(&self, locator: &str) -> Result<(Vec<u8>, reqwest::Url, Option<String>), DeliveryError> {
        let config = &self.config;
        let mut current_url = validate_url_safety(locator, config)?;

        for redirect_count in 0..=config.max_redirects {
            let referer = format!("{}://{}/", current_url.scheme(), current_url.host_str().unwrap_or(""));
            let client = self.client_for(&current_url).await?;
            let response = client
                .get(current_url.clone())
                .header(reqwest::header::USER_AGENT, config.user_agent.as_str())
                .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
                .header(reqwest::header::REFERER, referer)
                .send()
                .await
                .map_err(|e| map_reqwest_error(e, current_url.as_str(), config))?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(DeliveryError::Transport(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| DeliveryError::Transport("重定向响应缺少 Location 头".to_string()))?
                    .to_str()
                    .map_err(|e| DeliveryError::Transport(format!("重定向地址无效：{}", e)))?;

                let next_url = current_url
                    .join(location)
                    .map_err(|e| DeliveryError::Transport(format!("重定向 URL 解析失败：{}", e)))?;

                current_url = validate_url_safety(next_url.as_str(), config)?;
                log::debug!("↪️ 跳转到: {}", redact_url_for_log(current_url.as_str()));
                continue;
            }

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DeliveryError::NotFound(format!(
                    "HTTP 404：{}",
                    redact_url_for_log(current_url.as_str())
                )));
            }
            if !status.is_success() {
                return Err(DeliveryError::Transport(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status_message(status.as_u16())
                )));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|ct| ct.to_str().ok())
                .map(str::to_string);

            if let Some(ct) = content_type.as_deref() {
                if !is_acceptable_content_type(ct) {
                    return Err(DeliveryError::UnsupportedFormat(format!("不是图片类型：{}", ct)));
                }
            }

            let total_len = response.content_length();
            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(too_large(size, config.max_file_size));
                }
            }

            let bytes = self.read_body(response, total_len).await?;
            return Ok((bytes, current_url, content_type));
        }

        Err(DeliveryError::Transport("下载流程异常结束".to_string()))
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
        total_len: Option<u64>,
    ) -> Result<Vec<u8>, DeliveryError> {
        let config = &self.config;
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut signature_checked = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        DeliveryError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        DeliveryError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk.map_err(|e| DeliveryError::Transport(format!("下载失败：{}", e)))? else {
                break;
            };
            received_first_chunk = true;

            if (buffer.len() + chunk.len()) as u64 > config.max_file_size {
                return Err(DeliveryError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            // 尽早拒绝已识别的非图片内容
            if !signature_checked && buffer.len() >= STREAM_SIGNATURE_PROBE_BYTES {
                DeliveryFormat::sniff(&buffer)?;
                signature_checked = true;
            }
        }

        log::debug!("✅ 下载完成 - {} bytes", buffer.len());
        Ok(buffer)
    }
}

impl RawFetcher for HttpFetcher {
    async fn fetch(&self, resource: &ImageResource) -> Result<FetchedImage, DeliveryError> {
        log::info!("🌐 开始下载图片 - URL: {}", redact_url_for_log(&resource.locator));

        let (bytes, final_url, content_type) = self.download(&resource.locator).await?;
        let format = DeliveryFormat::detect(&bytes, final_url.path(), content_type.as_deref())?;

        Ok(FetchedImage { bytes, format })
    }
}

/// 本地文件读取器。
pub struct FileFetcher {
    max_file_size: u64,
}

impl FileFetcher {
    pub fn new(config: &DeliveryConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
        }
    }

    fn resolve_path(locator: &str) -> PathBuf {
        PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
    }
}

impl RawFetcher for FileFetcher {
    async fn fetch(&self, resource: &ImageResource) -> Result<FetchedImage, DeliveryError> {
        let path = Self::resolve_path(&resource.locator);
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeliveryError::NotFound(format!("文件不存在：{}", path.display())));
            }
            Err(e) => {
                return Err(DeliveryError::Transport(format!("无法读取文件信息：{}", e)));
            }
        };

        if metadata.len() > self.max_file_size {
            return Err(too_large(metadata.len(), self.max_file_size));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| DeliveryError::Transport(format!("无法读取图片文件：{}", e)))?;
        let format = DeliveryFormat::detect(&bytes, &resource.locator, None)?;

        Ok(FetchedImage { bytes, format })
    }
}

/// 校验 URL 协议与主机，默认阻止本地/内网目标。
fn validate_url_safety(url: &str, config: &DeliveryConfig) -> Result<reqwest::Url, DeliveryError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| DeliveryError::UnsupportedFormat(format!("URL 格式错误：{}", e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(DeliveryError::UnsupportedFormat("仅支持 HTTP/HTTPS".to_string()));
    }

    if config.allow_private_network {
        return Ok(parsed);
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| DeliveryError::UnsupportedFormat("URL 缺少主机地址".to_string()))?;

    if is_local_hostname(host) {
        return Err(DeliveryError::UnsupportedFormat(format!("禁止访问本地网络地址：{}", host)));
    }

    let bare_host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare_host.parse::<IpAddr>() {
        if is_private_or_local_ip(ip) {
            return Err(DeliveryError::UnsupportedFormat(format!("禁止访问内网 IP：{}", ip)));
        }
    }

    Ok(parsed)
}

fn client_builder(config: &DeliveryConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.download_timeout))
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
}

/// 解析主机并拒绝任何落在内网 / 本地范围的地址。
async fn resolve_public_socket_addrs(host: &str, port: u16) -> Result<Vec<SocketAddr>, DeliveryError> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| DeliveryError::Transport(format!("主机解析失败：{}：{}", host, e)))?;

    let mut result = Vec::new();
    for addr in addrs {
        if is_private_or_local_ip(addr.ip()) {
            return Err(DeliveryError::UnsupportedFormat(format!(
                "主机 {} 解析到内网地址：{}",
                host,
                addr.ip()
            )));
        }
        result.push(addr);
    }

    Ok(result)
}

fn is_local_hostname(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host.eq_ignore_ascii_case("localhost.") || host.ends_with(".local")
}

fn is_private_or_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.is_multicast()
                || v4.octets()[0] == 0
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0b1100_0000) == 0b0100_0000)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
        }
    }
}

/// 源站偶尔以 `application/octet-stream` 返回图片，放行交给签名判定。
fn is_acceptable_content_type(content_type: &str) -> bool {
    let base = content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase())
        .unwrap_or_default();

    base.starts_with("image/") || base == "application/octet-stream" || base == "binary/octet-stream"
}

fn map_reqwest_error(e: reqwest::Error, url: &str, config: &DeliveryConfig) -> DeliveryError {
    let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

    if e.is_timeout() {
        DeliveryError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
    } else if e.is_connect() {
        DeliveryError::Transport(format!("无法连接：{}", err_msg))
    } else {
        DeliveryError::Transport(format!("请求失败：{}", err_msg))
    }
}

fn too_large(size: u64, limit: u64) -> DeliveryError {
    DeliveryError::ResourceLimit(format!(
        "文件过大：{:.2} MB（限制：{:.2} MB）",
        size as f64 / 1024.0 / 1024.0,
        limit as f64 / 1024.0 / 1024.0
    ))
}

fn status_message(code: u16) -> &'static str {
    match code {
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

/// 去掉 query 与 fragment，避免日志泄露签名参数。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return url.split(['?', '#']).next().unwrap_or("<invalid-url>").to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}
