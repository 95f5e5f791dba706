//! # 漫画图片中转 — 命令行入口
//!
//! 本文件仅负责日志初始化、参数解析与子命令分发。
//! 业务逻辑分布在 `delivery` 模块中，详见 `lib.rs` 架构文档。

use std::env::args_os;
use std::io::Write;
use std::path::Path;

use comic_relay::cli::{CliParser, DeliverArgs, Invocation, ScrambleArgs};
use comic_relay::delivery::{
    self, BandCount, DeliveredImage, DeliveryFormat, DeliveryPipeline, FileFetcher,
    FixedBandResolver, HttpFetcher, ImageResource, RawFetcher,
};
use comic_relay::error::AppError;
use comic_relay::settings;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut cli_parser = CliParser::default();
    let invocation = match cli_parser.parse(args_os()) {
        Ok(invocation) => invocation,
        Err(err) => err.exit(),
    };

    let result = match invocation {
        Invocation::Deliver(args) => run_deliver(args).await,
        Invocation::Scramble(args) => run_scramble(args).await,
    };

    if let Err(err) = result {
        log::error!("❌ {}", err);
        std::process::exit(err.exit_code());
    }
}

fn is_remote(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn run_deliver(args: DeliverArgs) -> Result<(), AppError> {
    let config = settings::load_config(args.config.as_deref())?;
    let resolver = FixedBandResolver::new(args.bands);
    let resource = ImageResource::bare(args.locator.clone());

    let delivered = if is_remote(&args.locator) {
        let fetcher = HttpFetcher::new(config.clone())?;
        deliver_with(fetcher, resolver, config, &resource).await?
    } else {
        let fetcher = FileFetcher::new(&config);
        deliver_with(fetcher, resolver, config, &resource).await?
    };

    log::info!(
        "📦 交付完成: route={:?}, content_type={}, size={} bytes",
        delivered.route,
        delivered.content_type,
        delivered.bytes.len()
    );
    write_output(args.output.as_deref(), &delivered.bytes).await
}

async fn deliver_with<F: RawFetcher>(
    fetcher: F,
    resolver: FixedBandResolver,
    config: delivery::DeliveryConfig,
    resource: &ImageResource,
) -> Result<DeliveredImage, AppError> {
    let pipeline = DeliveryPipeline::new(fetcher, resolver, config)?;
    Ok(pipeline.deliver(resource).await?)
}

async fn run_scramble(args: ScrambleArgs) -> Result<(), AppError> {
    let config = settings::load_config(args.config.as_deref())?;
    let bytes = tokio::fs::read(&args.input).await?;
    let locator = args.input.to_string_lossy().into_owned();
    let num = BandCount::new(args.bands);

    let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, AppError> {
        let format = DeliveryFormat::detect(&bytes, &locator, None)?;
        let image = delivery::raster::decode(&bytes, format, config.max_decoded_pixels)?;
        let scrambled = delivery::scramble(image, num)?;
        Ok(delivery::encoder::encode_raster(&scrambled, DeliveryFormat::Png, 100)?)
    })
    .await
    .map_err(|e| AppError::Task(e.to_string()))??;

    log::info!("🔀 已按 {} 条横带混淆: {}", num, args.output.display());
    write_output(Some(&args.output), &encoded).await
}

async fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<(), AppError> {
    match path {
        Some(path) => tokio::fs::write(path, bytes).await?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
