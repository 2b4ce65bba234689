use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ParseError;
use crate::filter::CompilerFilter;
use crate::lines::read_lines;
use crate::model::{ModuleKind, ModuleRecord};
use crate::path::{build_file_dir, detect_platform_root, normalize_include, resolve};
use crate::{bp, mk};

const HEADER_EXTENSIONS: &[&str] = &["h", "hpp", "hh", "h++"];
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cxx", "cpp"];

/// 需要扫描的模块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanKinds {
    pub native: bool,
    pub apk: bool,
    pub jar: bool,
    pub apex: bool,
}

impl Default for ScanKinds {
    fn default() -> Self {
        Self {
            native: true,
            apk: true,
            jar: true,
            apex: true,
        }
    }
}

impl ScanKinds {
    pub fn allows(&self, kind: ModuleKind) -> bool {
        match kind {
            ModuleKind::NativeLib => self.native,
            ModuleKind::Apk => self.apk,
            ModuleKind::Jar => self.jar,
            ModuleKind::Apex => self.apex,
            ModuleKind::Unknown => false,
        }
    }
}

/// 一次扫描中所有解析任务共享的只读配置
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    pub compiler_filter: CompilerFilter,
    /// 赋值时立即展开变量
    pub env_flatten: bool,
    pub kinds: ScanKinds,
    /// 原生库没有声明头文件目录时，从构建文件目录推断
    pub infer_headers: bool,
}

/// 单个构建文件的解析上下文
#[derive(Debug)]
pub struct ParseContext<'a> {
    pub source: &'a Path,
    pub file_dir: PathBuf,
    pub platform_root: Option<PathBuf>,
    pub options: &'a ParserOptions,
}

impl<'a> ParseContext<'a> {
    pub fn new(source: &'a Path, options: &'a ParserOptions) -> Self {
        Self {
            source,
            file_dir: build_file_dir(source),
            platform_root: detect_platform_root(source),
            options,
        }
    }

    /// 分别相对构建文件目录和平台根目录解析，存在的路径都保留
    pub fn resolve_include(&self, token: &str, headers: &mut IndexSet<String>) {
        let token = token.trim();
        let token = token.strip_suffix('.').unwrap_or(token);
        if token.is_empty() {
            return;
        }
        let bases = std::iter::once(self.file_dir.as_path()).chain(self.platform_root.as_deref());
        for base in bases {
            if let Some(path) = resolve(base, token) {
                headers.insert(normalize_include(&path.to_string_lossy()));
            }
        }
    }
}

/// 构建文件方言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// GNU Make 风格的 Android.mk
    Mk,
    /// Soong/Blueprint 风格的 Android.bp
    Bp,
}

impl Dialect {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "mk" => Some(Dialect::Mk),
            "bp" => Some(Dialect::Bp),
            _ => None,
        }
    }

    pub fn parse(&self, lines: &[String], ctx: &ParseContext<'_>) -> Vec<ModuleRecord> {
        let records = match self {
            Dialect::Mk => mk::parse(lines, ctx),
            Dialect::Bp => bp::parse(lines, ctx),
        };
        finish_records(records, ctx)
    }
}

/// 过滤编译选项、补全头文件，并丢弃不完整或未启用类型的记录
pub fn finish_records(records: Vec<ModuleRecord>, ctx: &ParseContext<'_>) -> Vec<ModuleRecord> {
    records
        .into_iter()
        .filter_map(|mut record| {
            record.compiler_flags = ctx.options.compiler_filter.filter(record.compiler_flags);
            if ctx.options.infer_headers
                && record.kind == ModuleKind::NativeLib
                && record.header_search_paths.is_empty()
            {
                record.header_search_paths = infer_headers(&ctx.file_dir);
            }
            if !record.is_complete() {
                debug!("drop incomplete module in {}", ctx.source.display());
                return None;
            }
            ctx.options.kinds.allows(record.kind).then_some(record)
        })
        .collect()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}

fn directories_containing(dir: &Path, extensions: &[&str]) -> IndexSet<String> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), extensions))
        .filter_map(|e| e.path().parent().map(|p| normalize_include(&p.to_string_lossy())))
        .filter(|p| !p.is_empty())
        .collect()
}

/// 以头文件所在目录作为搜索路径，没有头文件时退回到源文件目录
pub fn infer_headers(dir: &Path) -> IndexSet<String> {
    let headers = directories_containing(dir, HEADER_EXTENSIONS);
    if !headers.is_empty() {
        return headers;
    }
    directories_containing(dir, SOURCE_EXTENSIONS)
}

/// 读取并解析一个构建文件
pub fn parse_build_file(path: &Path, options: &ParserOptions) -> Result<Vec<ModuleRecord>, ParseError> {
    let dialect = Dialect::from_path(path).ok_or_else(|| ParseError::UnsupportedFile(path.to_path_buf()))?;
    let lines = read_lines(path)?;
    let ctx = ParseContext::new(path, options);
    Ok(dialect.parse(&lines, &ctx))
}

/// 读取失败只记日志，视为没有产出记录
pub fn scan_build_file(path: &Path, options: &ParserOptions) -> Vec<ModuleRecord> {
    match parse_build_file(path, options) {
        Ok(records) => {
            debug!("{}: {} module(s)", path.display(), records.len());
            records
        }
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    }
}
