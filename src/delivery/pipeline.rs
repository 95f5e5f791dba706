//! # 交付流水线编排
//!
//! ## 设计思路
//!
//! `DeliveryPipeline` 只负责阶段编排与跳过策略，下载与参数解析都由注入的协作者完成：
//!
//! ```text
//! Fetching → Resolving → (Transforming | Skipping) → Encoding → Done
//!     └──────────┴───────────────┴───────────────────────┴──→ Failed
//! ```
//!
//! ## 实现思路
//!
//! - 每次 `deliver` 都是独立请求，阶段状态只存在于局部的 `PipelineRun`。
//! - 解码 / 重组 / 编码为 CPU 密集操作，放到 `spawn_blocking` 中执行，避免阻塞异步工作线程。
//! - 记录各阶段耗时；失败时记录失败阶段与错误码。

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::encoder::{self, DeliveryPayload};
use super::loader::{RawFetcher, redact_url_for_log};
use super::resolver::ScrambleResolver;
use super::source::{DeliveredImage, DeliveryRoute, FetchedImage, ImageResource, ScrambleParams};
use super::{BandCount, DeliveryConfig, DeliveryError, DeliveryFormat, band, raster};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineStage {
    Fetching,
    Resolving,
    Transforming,
    Skipping,
    Encoding,
}

/// 单次请求的阶段记录。
struct PipelineRun {
    started_at: Instant,
    stage: PipelineStage,
    stage_started_at: Instant,
    timings: Vec<(PipelineStage, Duration)>,
}

impl PipelineRun {
    fn start() -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            stage: PipelineStage::Fetching,
            stage_started_at: now,
            timings: Vec::with_capacity(4),
        }
    }

    fn enter(&mut self, next: PipelineStage) {
        self.timings.push((self.stage, self.stage_started_at.elapsed()));
        log::debug!("🔀 阶段切换：{:?} → {:?}", self.stage, next);
        self.stage = next;
        self.stage_started_at = Instant::now();
    }

    /// 阻塞线程内失败时，把失败阶段同步回本次记录。
    fn fail_at(&mut self, stage: PipelineStage) {
        if self.stage != stage {
            self.enter(stage);
        }
    }

    fn finish(&mut self) {
        self.timings.push((self.stage, self.stage_started_at.elapsed()));
    }

    /// 阻塞线程内的编码耗时从当前阶段中拆出。
    fn finish_with_encoding(&mut self, encode_elapsed: Duration) {
        let total = self.stage_started_at.elapsed();
        self.timings.push((self.stage, total.saturating_sub(encode_elapsed)));
        self.timings.push((PipelineStage::Encoding, encode_elapsed));
        self.stage = PipelineStage::Encoding;
    }

    fn summary(&self) -> String {
        self.timings
            .iter()
            .map(|(stage, elapsed)| format!("{:?}={}ms", stage, elapsed.as_millis()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 图片交付流水线。
///
/// 持有下载器、解析器与不可变配置，本身无跨请求状态，可放在 `Arc` 中并发复用。
pub struct DeliveryPipeline<F, R> {
    fetcher: F,
    resolver: R,
    config: Arc<DeliveryConfig>,
}

impl<F, R> DeliveryPipeline<F, R>
where
    F: RawFetcher,
    R: ScrambleResolver,
{
    pub fn new(fetcher: F, resolver: R, config: DeliveryConfig) -> Result<Self, DeliveryError> {
        config.validate()?;
        Ok(Self {
            fetcher,
            resolver,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// 处理主入口：下载 → 解析 → 重组或透传 → 编码。
    pub async fn deliver(&self, resource: &ImageResource) -> Result<DeliveredImage, DeliveryError> {
        let mut run = PipelineRun::start();
        let result = self.run_stages(resource, &mut run).await;

        match &result {
            Ok(delivered) => {
                log::info!(
                    "✅ 图片交付完成 - URL: {} route={:?} type={} size={}B {} total={}ms",
                    redact_url_for_log(&resource.locator),
                    delivered.route,
                    delivered.content_type,
                    delivered.bytes.len(),
                    run.summary(),
                    run.started_at.elapsed().as_millis()
                );
            }
            Err(err) => {
                log::warn!(
                    "❌ 图片交付失败 - URL: {} stage={:?} code={} {}",
                    redact_url_for_log(&resource.locator),
                    run.stage,
                    err.code(),
                    err
                );
            }
        }

        result
    }

    async fn run_stages(
        &self,
        resource: &ImageResource,
        run: &mut PipelineRun,
    ) -> Result<DeliveredImage, DeliveryError> {
        let fetched = self.fetcher.fetch(resource).await?;

        run.enter(PipelineStage::Resolving);
        let params = self.resolver.resolve(resource, fetched.format)?;
        let route = select_route(fetched.format, params, self.config.output_format);
        log::debug!(
            "🧭 交付路径 - format={:?} num={} requires_decode={} route={:?}",
            fetched.format,
            params.num,
            params.requires_decode,
            route
        );

        if route == DeliveryRoute::Passthrough {
            run.enter(PipelineStage::Skipping);
            run.enter(PipelineStage::Encoding);
            let delivered = encoder::encode(DeliveryPayload::Raw(fetched), &self.config)?;
            run.finish();
            return Ok(delivered);
        }

        run.enter(PipelineStage::Transforming);
        let config = Arc::clone(&self.config);
        let outcome =
            tokio::task::spawn_blocking(move || transform_and_encode(fetched, params.num, route, &config))
                .await
                .map_err(|e| DeliveryError::Encode(format!("编码线程执行失败：{}", e)))?;
        let (delivered, encode_elapsed) = outcome.map_err(|(stage, err)| {
            run.fail_at(stage);
            err
        })?;
        run.finish_with_encoding(encode_elapsed);

        Ok(delivered)
    }
}

/// 跳过策略：
/// - 动图类格式或解析器声明无需解码 → 透传
/// - 有横带数量 → 重组
/// - 无横带且源格式已是规范格式 → 透传
/// - 其他 → 仅重新编码
fn select_route(format: DeliveryFormat, params: ScrambleParams, output_format: DeliveryFormat) -> DeliveryRoute {
    if format.is_passthrough() || !params.requires_decode {
        DeliveryRoute::Passthrough
    } else if params.num.is_scrambled() {
        DeliveryRoute::Reconstructed
    } else if format == output_format {
        DeliveryRoute::Passthrough
    } else {
        DeliveryRoute::Reencoded
    }
}

/// 阻塞线程内执行：解码 → 重组 → 编码。返回结果与编码耗时；失败时附带失败阶段。
fn transform_and_encode(
    fetched: FetchedImage,
    num: BandCount,
    route: DeliveryRoute,
    config: &DeliveryConfig,
) -> Result<(DeliveredImage, Duration), (PipelineStage, DeliveryError)> {
    let transforming = |err| (PipelineStage::Transforming, err);

    let image = raster::decode(&fetched.bytes, fetched.format, config.max_decoded_pixels).map_err(transforming)?;
    drop(fetched);

    let payload = match route {
        DeliveryRoute::Reconstructed => {
            DeliveryPayload::Reconstructed(band::reconstruct(image, num).map_err(transforming)?)
        }
        _ => DeliveryPayload::Reencoded(image),
    };

    let encode_started_at = Instant::now();
    let delivered = encoder::encode(payload, config).map_err(|err| (PipelineStage::Encoding, err))?;
    Ok((delivered, encode_started_at.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{FixedBandResolver, RasterImage};
    use image::GenericImageView;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFetcher {
        bytes: Vec<u8>,
        format: DeliveryFormat,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(bytes: Vec<u8>, format: DeliveryFormat) -> Self {
            Self {
                bytes,
                format,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RawFetcher for StaticFetcher {
        async fn fetch(&self, _resource: &ImageResource) -> Result<FetchedImage, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedImage {
                bytes: self.bytes.clone(),
                format: self.format,
            })
        }
    }

    struct FailingFetcher;

    impl RawFetcher for FailingFetcher {
        async fn fetch(&self, _resource: &ImageResource) -> Result<FetchedImage, DeliveryError> {
            Err(DeliveryError::Transport("connection refused".to_string()))
        }
    }

    fn striped(width: u32, height: u32) -> RasterImage {
        let stride = width as usize * 3;
        let mut pixels = Vec::with_capacity(stride * height as usize);
        for y in 0..height {
            pixels.extend(std::iter::repeat_n((y * 7 % 256) as u8, stride));
        }
        RasterImage::from_rgb8(width, height, pixels).expect("valid raster")
    }

    fn png_bytes(image: &RasterImage) -> Vec<u8> {
        encoder::encode_raster(image, DeliveryFormat::Png, 92).expect("png fixture")
    }

    fn resource() -> ImageResource {
        ImageResource::page("https://cdn.example.com/media/photos/1/00001.png", "1", "1", 0, Some(1))
    }

    fn png_config() -> DeliveryConfig {
        DeliveryConfig {
            output_format: DeliveryFormat::Png,
            ..DeliveryConfig::default()
        }
    }

    #[test]
    fn route_selection_covers_skip_policy() {
        let jpeg = DeliveryFormat::Jpeg;
        let scrambled = ScrambleParams::scrambled(BandCount::new(10));
        let zero = ScrambleParams::scrambled(BandCount::NONE);

        assert_eq!(select_route(DeliveryFormat::Gif, scrambled, jpeg), DeliveryRoute::Passthrough);
        assert_eq!(select_route(jpeg, ScrambleParams::not_required(), jpeg), DeliveryRoute::Passthrough);
        assert_eq!(select_route(DeliveryFormat::Webp, scrambled, jpeg), DeliveryRoute::Reconstructed);
        assert_eq!(select_route(jpeg, zero, jpeg), DeliveryRoute::Passthrough);
        assert_eq!(select_route(DeliveryFormat::Webp, zero, jpeg), DeliveryRoute::Reencoded);
    }

    #[tokio::test]
    async fn scrambled_page_is_reconstructed() {
        let original = striped(16, 100);
        let scrambled = band::scramble(original.clone(), BandCount::new(7)).expect("scramble");
        let fetcher = StaticFetcher::new(png_bytes(&scrambled), DeliveryFormat::Png);

        let pipeline = DeliveryPipeline::new(fetcher, FixedBandResolver::new(7), png_config())
            .expect("pipeline init failed");
        let delivered = pipeline.deliver(&resource()).await.expect("deliver should succeed");

        assert_eq!(delivered.route, DeliveryRoute::Reconstructed);
        assert_eq!(delivered.content_type, "image/png");

        let decoded = image::load_from_memory(&delivered.bytes).expect("output decodes");
        let restored = RasterImage::from_dynamic(decoded).expect("valid raster");
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn passthrough_returns_original_bytes_without_touching_engine() {
        let bytes = png_bytes(&striped(4, 3));
        let fetcher = StaticFetcher::new(bytes.clone(), DeliveryFormat::Png);
        // num 远大于高度：若进入重组必然报错
        let resolver = |_: &ImageResource, _: DeliveryFormat| -> Result<ScrambleParams, DeliveryError> {
            Ok(ScrambleParams {
                num: BandCount::new(10_000),
                requires_decode: false,
            })
        };

        let pipeline = DeliveryPipeline::new(fetcher, resolver, DeliveryConfig::default())
            .expect("pipeline init failed");
        let delivered = pipeline.deliver(&resource()).await.expect("deliver should succeed");

        assert_eq!(delivered.route, DeliveryRoute::Passthrough);
        assert_eq!(delivered.bytes, bytes);
        assert_eq!(delivered.content_type, "image/png");
    }

    #[tokio::test]
    async fn unscrambled_foreign_container_is_reencoded_to_canonical_format() {
        let fetcher = StaticFetcher::new(png_bytes(&striped(10, 12)), DeliveryFormat::Png);
        let resolver = |_: &ImageResource, _: DeliveryFormat| -> Result<ScrambleParams, DeliveryError> {
            Ok(ScrambleParams::scrambled(BandCount::NONE))
        };

        let pipeline = DeliveryPipeline::new(fetcher, resolver, DeliveryConfig::default())
            .expect("pipeline init failed");
        let delivered = pipeline.deliver(&resource()).await.expect("deliver should succeed");

        assert_eq!(delivered.route, DeliveryRoute::Reencoded);
        assert_eq!(delivered.content_type, "image/jpeg");
        let decoded = image::load_from_memory_with_format(&delivered.bytes, image::ImageFormat::Jpeg)
            .expect("output decodes as jpeg");
        assert_eq!(decoded.dimensions(), (10, 12));
    }

    #[tokio::test]
    async fn too_many_bands_fails_instead_of_partial_output() {
        let fetcher = StaticFetcher::new(png_bytes(&striped(4, 5)), DeliveryFormat::Png);
        let pipeline = DeliveryPipeline::new(fetcher, FixedBandResolver::new(6), DeliveryConfig::default())
            .expect("pipeline init failed");

        let result = pipeline.deliver(&resource()).await;
        assert!(matches!(result, Err(DeliveryError::MalformedParameter(_))));
    }

    #[tokio::test]
    async fn fetch_failure_propagates_without_retry() {
        let pipeline = DeliveryPipeline::new(FailingFetcher, FixedBandResolver::new(3), DeliveryConfig::default())
            .expect("pipeline init failed");

        let result = pipeline.deliver(&resource()).await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }

    #[tokio::test]
    async fn resolver_failure_is_not_treated_as_unscrambled() {
        let fetcher = StaticFetcher::new(png_bytes(&striped(4, 5)), DeliveryFormat::Png);
        let resolver = |_: &ImageResource, _: DeliveryFormat| -> Result<ScrambleParams, DeliveryError> {
            Err(DeliveryError::Resolution("policy unavailable".to_string()))
        };

        let pipeline = DeliveryPipeline::new(fetcher, resolver, DeliveryConfig::default())
            .expect("pipeline init failed");
        let result = pipeline.deliver(&resource()).await;

        assert!(matches!(result, Err(DeliveryError::Resolution(_))));
    }

    #[tokio::test]
    async fn corrupt_bytes_fail_at_decode() {
        let fetcher = StaticFetcher::new(b"\x89PNG\r\n\x1a\nnot really a png".to_vec(), DeliveryFormat::Png);
        let pipeline = DeliveryPipeline::new(fetcher, FixedBandResolver::new(2), DeliveryConfig::default())
            .expect("pipeline init failed");

        let result = pipeline.deliver(&resource()).await;
        assert!(matches!(result, Err(DeliveryError::Decode(_))));
    }

    #[test]
    fn blocking_failures_report_their_stage() {
        let corrupt = FetchedImage {
            bytes: b"\x89PNG\r\n\x1a\nnot really a png".to_vec(),
            format: DeliveryFormat::Png,
        };
        let result = transform_and_encode(corrupt, BandCount::new(2), DeliveryRoute::Reconstructed, &DeliveryConfig::default());
        assert!(matches!(result, Err((PipelineStage::Transforming, DeliveryError::Decode(_)))));

        // JPEG 单边上限 65535 像素
        let tall = FetchedImage {
            bytes: png_bytes(&striped(1, 70_000)),
            format: DeliveryFormat::Png,
        };
        let result = transform_and_encode(tall, BandCount::NONE, DeliveryRoute::Reencoded, &DeliveryConfig::default());
        assert!(matches!(result, Err((PipelineStage::Encoding, DeliveryError::Encode(_)))));
    }

    #[test]
    fn failed_stage_is_recorded_once() {
        let mut run = PipelineRun::start();
        run.enter(PipelineStage::Resolving);
        run.enter(PipelineStage::Transforming);

        run.fail_at(PipelineStage::Transforming);
        assert_eq!(run.stage, PipelineStage::Transforming);
        assert_eq!(run.timings.len(), 2);

        run.fail_at(PipelineStage::Encoding);
        assert_eq!(run.stage, PipelineStage::Encoding);
        assert_eq!(run.timings.len(), 3);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = DeliveryConfig {
            jpeg_quality: 0,
            ..DeliveryConfig::default()
        };
        let result = DeliveryPipeline::new(FailingFetcher, FixedBandResolver::new(1), config);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let original = striped(8, 64);
        let scrambled = band::scramble(original.clone(), BandCount::new(5)).expect("scramble");
        let fetcher = StaticFetcher::new(png_bytes(&scrambled), DeliveryFormat::Png);
        let pipeline = Arc::new(
            DeliveryPipeline::new(fetcher, FixedBandResolver::new(5), png_config()).expect("pipeline init failed"),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move { pipeline.deliver(&resource()).await }));
        }

        let mut outputs = Vec::new();
        for handle in handles {
            let delivered = handle
                .await
                .expect("task should not panic")
                .expect("deliver should succeed");
            outputs.push(delivered.bytes);
        }

        assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(pipeline.fetcher.calls.load(Ordering::SeqCst), 8);

        let restored = RasterImage::from_dynamic(image::load_from_memory(&outputs[0]).expect("decodes"))
            .expect("valid raster");
        assert_eq!(restored, original);
    }
}
