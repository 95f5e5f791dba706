//! 配置加载
//!
//! 优先使用显式传入的配置文件路径，其次读取环境变量 `COMIC_RELAY_CONFIG`，
//! 都没有时使用 `DeliveryConfig::default()`。

use std::fs;
use std::path::{Path, PathBuf};

use crate::delivery::DeliveryConfig;
use crate::error::AppError;

pub const CONFIG_ENV_VAR: &str = "COMIC_RELAY_CONFIG";

fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
}

pub fn load_config(explicit: Option<&Path>) -> Result<DeliveryConfig, AppError> {
    let Some(path) = config_file_path(explicit) else {
        log::debug!("未指定配置文件，使用默认配置");
        return Ok(DeliveryConfig::default());
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| AppError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;

    let config = DeliveryConfig::from_json_str(&content)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;

    log::info!("⚙️ 已加载配置文件: {}", path.display());
    Ok(config)
}
