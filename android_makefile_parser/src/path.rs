//! 头文件路径解析
//!
//! 构建文件里的路径经常已经带上了模块目录的一部分
//! （如在 `frameworks/av/media` 下写 `frameworks/av/media/include`），
//! 直接拼接会得到不存在的路径，这里用重叠前缀做一次修正。

use std::path::{Path, PathBuf};

/// Android 源码树的顶层目录，用于推断平台根目录
pub const PLATFORM_ROOT_MARKERS: &[&str] = &[
    "/system/",
    "/frameworks/",
    "/device/",
    "/vendor/",
    "/packages/",
    "/external/",
    "/hardware/",
];

/// 截断到最早出现的顶层目录之前；找不到时返回 `None`
pub fn detect_platform_root(path: &Path) -> Option<PathBuf> {
    let text = path.to_string_lossy();
    let pos = PLATFORM_ROOT_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()?;
    if pos == 0 {
        return Some(PathBuf::from("/"));
    }
    Some(PathBuf::from(&text[..pos]))
}

/// 构建文件所在目录
pub fn build_file_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn naive(base_dir: &Path, relative: &str) -> PathBuf {
    base_dir.join(relative.trim_start_matches('/'))
}

fn segments(relative: &str) -> Vec<&str> {
    relative
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// 在 `haystack` 中按路径段边界查找 `needle`
///
/// 不是简单的子串包含：`av/include` 不会命中 `/src/frameworks/avx/media`。
fn find_aligned(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(pos, _)| pos).find(|&pos| {
        let end = pos + needle.len();
        let starts = pos == 0 || haystack.as_bytes()[pos - 1] == b'/';
        let ends = end == haystack.len() || haystack.as_bytes()[end] == b'/';
        starts && ends
    })
}

/// 用 `relative` 开头与 `base_dir` 重叠的最长路径段修正拼接结果
///
/// 结果不保证存在；没有重叠时返回 `None`。
pub fn overlap_corrected(base_dir: &Path, relative: &str) -> Option<PathBuf> {
    let base = base_dir.to_string_lossy();
    let segments = segments(relative);

    let mut overlap = None;
    for k in 1..=segments.len() {
        match find_aligned(&base, &segments[..k].join("/")) {
            Some(pos) => overlap = Some(pos),
            None => break,
        }
    }
    let pos = overlap?;

    let head = base[..pos].trim_end_matches('/');
    let tail = segments.join("/");
    if head.is_empty() {
        let rooted = if base.starts_with('/') { "/" } else { "" };
        return Some(PathBuf::from(format!("{rooted}{tail}")));
    }
    Some(PathBuf::from(format!("{head}/{tail}")))
}

/// 未经存在性校验的候选路径：直接拼接存在时用它，否则尝试重叠修正
pub fn candidate(base_dir: &Path, relative: &str) -> PathBuf {
    let relative = relative.trim();
    let joined = naive(base_dir, relative);
    if joined.exists() {
        return joined;
    }
    overlap_corrected(base_dir, relative).unwrap_or(joined)
}

/// 解析为磁盘上存在的路径，失败返回 `None`
pub fn resolve(base_dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = relative.trim();
    if relative.is_empty() {
        return None;
    }
    let as_path = Path::new(relative);
    if as_path.is_absolute() && as_path.exists() {
        return Some(as_path.to_path_buf());
    }
    let joined = naive(base_dir, relative);
    if joined.exists() {
        return Some(joined);
    }
    overlap_corrected(base_dir, relative).filter(|path| path.exists())
}

/// 合并 `//`，去掉结尾的 `/` 与 `/.`
pub fn normalize_include(path: &str) -> String {
    let mut result = path.trim().to_string();
    while result.contains("//") {
        result = result.replace("//", "/");
    }
    loop {
        if let Some(stripped) = result.strip_suffix("/.") {
            result = stripped.to_string();
        } else if result.len() > 1 && result.ends_with('/') {
            result.pop();
        } else {
            break;
        }
    }
    result
}
