//! # 漫画图片中转 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            外层 HTTP / 命令行（目录、搜索等为透传）         │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↓ ImageResource（地址 + 本子/章节/页标识）
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↓             交付流水线 (Rust)                     │
//! │                                                          │
//! │  ┌─ delivery ──── DeliveryPipeline                        │
//! │  │   ├─ loader    RawFetcher（HTTP / 本地文件）           │
//! │  │   ├─ resolver  ScrambleResolver（横带数量策略）        │
//! │  │   ├─ band      分段重组引擎                            │
//! │  │   └─ encoder   透传 / 规范格式编码                      │
//! │  │                                                       │
//! │  ├─ cli ───────── 命令行解析（deliver / scramble）        │
//! │  ├─ settings ──── JSON 配置加载                           │
//! │  └─ error ─────── AppError（命令行统一错误类型）          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`delivery`] | 下载、解混淆、重新编码并输出可直接响应的图片字节 |
//! | [`cli`] | `deliver` / `scramble` 子命令参数解析 |
//! | [`settings`] | 从 JSON 文件 / 环境变量加载 `DeliveryConfig` |
//! | [`error`] | 统一错误类型 `AppError` |

pub mod cli;
pub mod delivery;
pub mod error;
pub mod settings;
