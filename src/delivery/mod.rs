//! # 图片解混淆与交付模块（delivery）
//!
//! ## 设计思路
//!
//! 源站会把章节图片切成若干横带并打乱顺序，阻止直接下载。
//! 本模块把“下载 → 参数解析 → 分段重组 / 透传 → 编码”按职责拆分为多个子模块：
//!
//! - `loader`：`RawFetcher` 协作者接口与 HTTP / 本地文件实现
//! - `resolver`：`ScrambleResolver` 协作者接口（横带数量策略可插拔）
//! - `band`：分段重组引擎（纯函数）
//! - `raster`：不可变像素缓冲与带上限的解码
//! - `encoder`：透传或编码为规范输出格式
//! - `pipeline`：编排整条流水线与跳过策略
//! - `config/error/format/source`：配置、错误、交付格式、中间数据模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! DeliveryPipeline::deliver
//!    ├─ RawFetcher::fetch        （下载 + 格式判定）
//!    ├─ ScrambleResolver::resolve（横带数量 / 是否需要解码）
//!    ├─ band::reconstruct        （仅在需要时）
//!    └─ encoder::encode          （透传或重新编码）
//!    ↓
//! DeliveredImage { bytes, content_type }
//! ```
//!
//! 各阶段均无跨请求状态；下载器与解析器通过构造参数注入。

pub mod band;
mod config;
pub mod encoder;
mod error;
mod format;
mod loader;
mod pipeline;
pub mod raster;
mod resolver;
mod source;

pub use band::{BandCount, BandPlan, BandSegment, reconstruct, scramble};
pub use config::DeliveryConfig;
pub use encoder::{DeliveryPayload, encode};
pub use error::DeliveryError;
pub use format::DeliveryFormat;
pub use loader::{FileFetcher, HttpFetcher, RawFetcher};
pub use pipeline::DeliveryPipeline;
pub use raster::RasterImage;
pub use resolver::{FixedBandResolver, ScrambleIdGate, ScrambleResolver};
pub use source::{ContentRef, DeliveredImage, DeliveryRoute, FetchedImage, ImageResource, ScrambleParams};
