use std::path::PathBuf;

use android_makefile_parser::{ModuleRecord, ParserOptions, ResultCollector, scan_build_file};
use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::info;

/// 每个构建文件一个解析任务，线程池结束后再汇总
pub fn scan(files: &[PathBuf], options: &ParserOptions, threads: usize) -> Result<Vec<ModuleRecord>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("failed to build thread pool")?;

    let collector = ResultCollector::new();
    pool.install(|| {
        files.par_iter().for_each(|path| {
            collector.on_result(path, scan_build_file(path, options));
        });
    });

    info!("{} of {} build file(s) produced modules", collector.len(), files.len());
    Ok(collector.into_records())
}
