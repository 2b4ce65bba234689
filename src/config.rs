use std::fs;
use std::path::{Path, PathBuf};

use android_makefile_parser::{CompilerFilter, ParserOptions, ScanKinds};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use toml::{Table, Value};

const DEFAULT_CONFIG: &str = include_str!("default_config.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// 写入每个条目的版本号
    pub version: String,
    /// `gcc` 或 `clang`
    pub compiler: String,
    /// 0 表示按 CPU 核数
    pub threads: usize,
    pub env_flatten: bool,
    pub infer_headers: bool,
    pub kinds: ScanKinds,
    #[serde(default)]
    pub out_match: Option<PathBuf>,
    pub filter_out_match: bool,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// 递归合并，`overlay` 中的值优先
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(theirs) if matches!(base.get(&key), Some(Value::Table(_))) => {
                if let Some(Value::Table(mine)) = base.get_mut(&key) {
                    merge_tables(mine, theirs);
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    /// 内置默认配置，再叠加用户配置文件
    pub fn load(user: Option<&Path>) -> Result<Self> {
        let mut table: Table = toml::from_str(DEFAULT_CONFIG).context("invalid embedded config")?;
        if let Some(path) = user {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let overlay: Table = toml::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            merge_tables(&mut table, overlay);
        }
        Value::Table(table)
            .try_into::<Config>()
            .context("config does not match the expected layout")
    }

    pub fn thread_count(&self) -> usize {
        if self.threads == 0 { num_cpus::get() } else { self.threads }
    }

    pub fn parser_options(&self) -> Result<ParserOptions> {
        let Some(compiler_filter) = CompilerFilter::for_compiler(&self.compiler) else {
            bail!("unsupported compiler {:?}, expected gcc or clang", self.compiler);
        };
        Ok(ParserOptions {
            compiler_filter,
            env_flatten: self.env_flatten,
            kinds: self.kinds,
            infer_headers: self.infer_headers,
        })
    }
}

/// 解析 `native,apk,jar,apex` 形式的类型列表，只启用列出的类型
pub fn parse_kinds(text: &str) -> Result<ScanKinds> {
    let mut kinds = ScanKinds {
        native: false,
        apk: false,
        jar: false,
        apex: false,
    };
    for name in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name {
            "native" => kinds.native = true,
            "apk" => kinds.apk = true,
            "jar" => kinds.jar = true,
            "apex" => kinds.apex = true,
            other => bail!("unknown module kind {:?}", other),
        }
    }
    Ok(kinds)
}
