//! # 混淆参数解析
//!
//! ## 设计思路
//!
//! “内容标识 → 横带数量”的映射随源站策略与内容年代变化，不属于本模块。
//! 这里只定义可插拔的 `ScrambleResolver` 接口与几种组合方式：
//!
//! - `FixedBandResolver`：固定横带数量（命令行、测试、已知参数的场景）
//! - `ScrambleIdGate`：按源站混淆标记做前置判断，再把计算交给外部策略
//! - 任意 `Fn(&ImageResource, DeliveryFormat) -> Result<ScrambleParams, DeliveryError>` 闭包
//!
//! 重组引擎不关心 `num` 从何而来。

use super::source::{ImageResource, ScrambleParams};
use super::{BandCount, DeliveryError, DeliveryFormat};

/// 外部混淆参数解析器。
///
/// 返回 `ScrambleParams::not_required()` 表示无需解混淆（正常结果）；
/// 返回 `Err` 表示无法确定参数，流水线将以失败结束。
pub trait ScrambleResolver: Send + Sync {
    fn resolve(
        &self,
        resource: &ImageResource,
        format: DeliveryFormat,
    ) -> Result<ScrambleParams, DeliveryError>;
}

impl<F> ScrambleResolver for F
where
    F: Fn(&ImageResource, DeliveryFormat) -> Result<ScrambleParams, DeliveryError> + Send + Sync,
{
    fn resolve(
        &self,
        resource: &ImageResource,
        format: DeliveryFormat,
    ) -> Result<ScrambleParams, DeliveryError> {
        self(resource, format)
    }
}

/// 固定横带数量。
#[derive(Debug, Clone, Copy)]
pub struct FixedBandResolver {
    num: BandCount,
}

impl FixedBandResolver {
    pub fn new(num: impl Into<BandCount>) -> Self {
        Self { num: num.into() }
    }
}

impl ScrambleResolver for FixedBandResolver {
    fn resolve(
        &self,
        _resource: &ImageResource,
        format: DeliveryFormat,
    ) -> Result<ScrambleParams, DeliveryError> {
        if format.is_passthrough() || !self.num.is_scrambled() {
            return Ok(ScrambleParams::not_required());
        }
        Ok(ScrambleParams::scrambled(self.num))
    }
}

/// 基于源站混淆标记的前置判断。
///
/// 资源没有混淆标记（含标记为 `0`）、或属于动图类格式时直接判定无需解混淆；
/// 否则调用外部策略 `policy(scramble_id, resource)` 计算横带数量。
/// 策略返回 `0` 时仍需解码（重新编码为规范格式），但不做重组。
pub struct ScrambleIdGate<P> {
    policy: P,
}

impl<P> ScrambleIdGate<P>
where
    P: Fn(u64, &ImageResource) -> Result<BandCount, DeliveryError> + Send + Sync,
{
    pub fn new(policy: P) -> Self {
        Self { policy }
    }
}

impl<P> ScrambleResolver for ScrambleIdGate<P>
where
    P: Fn(u64, &ImageResource) -> Result<BandCount, DeliveryError> + Send + Sync,
{
    fn resolve(
        &self,
        resource: &ImageResource,
        format: DeliveryFormat,
    ) -> Result<ScrambleParams, DeliveryError> {
        let Some(scramble_id) = resource.content.scramble_id.filter(|id| *id != 0) else {
            return Ok(ScrambleParams::not_required());
        };

        if format.is_passthrough() {
            return Ok(ScrambleParams::not_required());
        }

        let num = (self.policy)(scramble_id, resource)?;
        log::debug!(
            "🧮 混淆参数 - album={} photo={:?} page={:?} num={}",
            resource.content.album_id,
            resource.content.photo_id,
            resource.content.page_index,
            num
        );

        Ok(ScrambleParams::scrambled(num))
    }
}
