//! 命令行参数解析
//!
//! 两个子命令：
//! - `deliver <LOCATOR>`：走完整交付流水线，输出到文件或标准输出
//! - `scramble <INPUT>`：正向混淆本地图片，生成测试样本（PNG 无损输出）

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{
    Arg, ArgMatches, Command, arg, crate_description, crate_name, crate_version, value_parser,
};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverArgs {
    pub locator: String,
    pub bands: u32,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrambleArgs {
    pub input: PathBuf,
    pub bands: u32,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Deliver(DeliverArgs),
    Scramble(ScrambleArgs),
}

pub struct CliParser {
    command: Command,
}

impl CliParser {
    pub fn new() -> Self {
        let command = Self::create_base_command()
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(Self::create_deliver_command())
            .subcommand(Self::create_scramble_command());
        CliParser { command }
    }

    /// 解析失败时返回 `clap::Error`，由调用方决定 `exit()`。
    pub fn parse<I, T>(&mut self, itr: I) -> Result<Invocation, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.try_get_matches_from_mut(itr)?;
        Self::extract_invocation(&matches).map_err(|e| {
            self.command
                .error(clap::error::ErrorKind::MissingRequiredArgument, e.to_string())
        })
    }

    fn create_base_command() -> Command {
        Command::new(crate_name!())
            .version(crate_version!())
            .about(crate_description!())
    }

    fn create_deliver_command() -> Command {
        Command::new("deliver")
            .about("下载并交付一张图片（必要时还原横带顺序）")
            .arg(
                Arg::new("locator")
                    .help("图片地址：http(s) URL、file:// 或本地路径")
                    .required(true),
            )
            .arg(Self::create_bands_argument().default_value("0"))
            .arg(
                arg!(output: -o --out <FILE> "输出文件，缺省写到标准输出")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(Self::create_config_argument())
    }

    fn create_scramble_command() -> Command {
        Command::new("scramble")
            .about("按横带数量正向混淆本地图片，输出 PNG")
            .arg(
                Arg::new("input")
                    .help("输入图片路径")
                    .value_parser(value_parser!(PathBuf))
                    .required(true),
            )
            .arg(Self::create_bands_argument().required(true))
            .arg(
                arg!(output: -o --out <FILE> "输出 PNG 文件")
                    .value_parser(value_parser!(PathBuf))
                    .required(true),
            )
            .arg(Self::create_config_argument())
    }

    fn create_bands_argument() -> Arg {
        arg!(bands: -n --bands <N> "横带数量，0 表示未混淆").value_parser(value_parser!(u32))
    }

    fn create_config_argument() -> Arg {
        arg!(config: -c --config <FILE> "JSON 配置文件").value_parser(value_parser!(PathBuf))
    }

    fn extract_invocation(matches: &ArgMatches) -> Result<Invocation, AppError> {
        match matches.subcommand() {
            Some(("deliver", sub)) => Ok(Invocation::Deliver(DeliverArgs {
                locator: required::<String>(sub, "locator")?,
                bands: required::<u32>(sub, "bands")?,
                output: sub.get_one::<PathBuf>("output").cloned(),
                config: sub.get_one::<PathBuf>("config").cloned(),
            })),
            Some(("scramble", sub)) => Ok(Invocation::Scramble(ScrambleArgs {
                input: required::<PathBuf>(sub, "input")?,
                bands: required::<u32>(sub, "bands")?,
                output: required::<PathBuf>(sub, "output")?,
                config: sub.get_one::<PathBuf>("config").cloned(),
            })),
            Some((other, _)) => Err(AppError::Usage(format!("未知子命令: {}", other))),
            None => Err(AppError::Usage("缺少子命令".to_string())),
        }
    }
}

impl Default for CliParser {
    fn default() -> Self {
        Self::new()
    }
}

fn required<T>(matches: &ArgMatches, id: &str) -> Result<T, AppError>
where
    T: Clone + Send + Sync + 'static,
{
    matches
        .get_one::<T>(id)
        .cloned()
        .ok_or_else(|| AppError::Usage(format!("缺少参数: {}", id)))
}
