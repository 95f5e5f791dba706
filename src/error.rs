//! 统一错误类型模块
//!
//! 定义应用级 `AppError`，命令行入口统一返回 `Result<T, AppError>`。
//! 为 `DeliveryError` 与 `std::io::Error` 提供 `From` 转换，无需手动 map。

use crate::delivery::DeliveryError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片交付流水线错误（下载 / 解析 / 重组 / 编码）
    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件不可用或内容非法
    #[error("配置错误: {0}")]
    Config(String),

    /// 命令行参数组合非法
    #[error("参数错误: {0}")]
    Usage(String),

    /// 后台阻塞任务 panic 或被取消
    #[error("后台任务异常: {0}")]
    Task(String),
}

impl AppError {
    /// 进程退出码：交付失败沿用 HTTP 状态语义的粗分类。
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Delivery(err) if err.http_status() == 502 => 3,
            Self::Delivery(_) => 4,
            Self::Io(_) => 5,
            Self::Config(_) | Self::Usage(_) => 2,
            Self::Task(_) => 1,
        }
    }
}
