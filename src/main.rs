mod config;
mod discovery;
mod output;
mod runner;

use std::path::PathBuf;

use android_makefile_parser::{match_built_outs, to_reports};
use anyhow::{Result, bail};
use clap::Parser;
use tracing::{Level, info, warn};

use crate::config::{Config, parse_kinds};
use crate::discovery::{find_build_files, find_built_libs};

#[derive(Parser)]
struct Cli {
    /// 源码树目录或单个 Android.mk / Android.bp
    path: PathBuf,
    /// 配置文件地址
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// 写入条目的版本号
    #[arg(short, long)]
    version: Option<String>,
    /// 目标编译器：gcc / clang
    #[arg(long)]
    compiler: Option<String>,
    /// 线程数
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// 赋值时立即展开变量
    #[arg(short, long)]
    env_flatten: bool,
    /// 扫描的模块类型，如 native,apk
    #[arg(long)]
    kinds: Option<String>,
    /// 原生库没有头文件目录时自动推断
    #[arg(long)]
    infer_headers: bool,
    /// 关闭头文件目录推断
    #[arg(long)]
    no_infer_headers: bool,
    /// 编译产物目录，用其中的 .so/.a 替换 libs
    #[arg(short, long)]
    out_match: Option<PathBuf>,
    /// 只保留能在产物目录找到的库
    #[arg(short, long)]
    filter_out_match: bool,
    /// 输出文件，缺省写到 stdout
    #[arg(short = 'p', long)]
    output: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    /// 命令行参数覆盖配置文件
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(version) = &self.version {
            config.version = version.clone();
        }
        if let Some(compiler) = &self.compiler {
            config.compiler = compiler.clone();
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(kinds) = &self.kinds {
            config.kinds = parse_kinds(kinds)?;
        }
        if self.out_match.is_some() {
            config.out_match = self.out_match.clone();
        }
        if self.output.is_some() {
            config.output = self.output.clone();
        }
        config.env_flatten |= self.env_flatten;
        if self.infer_headers {
            config.infer_headers = true;
        } else if self.no_infer_headers {
            config.infer_headers = false;
        }
        config.filter_out_match |= self.filter_out_match;
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config)?;
    let options = config.parser_options()?;

    if !cli.path.exists() {
        bail!("{} does not exist", cli.path.display());
    }
    let files = find_build_files(&cli.path);
    info!("Found {} build file(s) under {}", files.len(), cli.path.display());

    let records = runner::scan(&files, &options, config.thread_count())?;
    let mut entries = to_reports(&records, &config.version);

    if let Some(out_dir) = &config.out_match {
        let built = find_built_libs(out_dir);
        info!("Matched against {} built librar(ies) in {}", built.len(), out_dir.display());
        entries = match_built_outs(entries, &built, config.filter_out_match);
    } else if config.filter_out_match {
        warn!("--filter-out-match has no effect without --out-match");
    }

    output::write_report(&entries, config.output.as_deref())
}
