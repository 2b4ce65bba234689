use std::fs;
use std::path::Path;

use crate::error::ParseError;

/// 读取构建文件，按行返回（去掉行尾换行）
pub fn read_lines(path: &Path) -> Result<Vec<String>, ParseError> {
    let bytes = fs::read(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    // Android 树里偶尔有 Latin-1 注释，按有损 UTF-8 读取
    let content = String::from_utf8_lossy(&bytes);
    Ok(content.lines().map(|l| l.to_string()).collect())
}

/// 展开多行续行
///
/// 以 `\` 结尾的物理行与下一行拼接，各段之间用单个空格分隔。
/// 文件末尾悬空的续行也会作为一行输出。
pub fn join_continued_lines<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut result = Vec::new();
    let mut parts: Vec<&str> = Vec::new();
    let mut continued = false;

    for l in lines {
        let trimmed = l.as_ref().trim();
        match trimmed.strip_suffix('\\') {
            Some(head) => {
                let head = head.trim_end();
                if !head.is_empty() {
                    parts.push(head);
                }
                continued = true;
            }
            None => {
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
                result.push(parts.join(" "));
                parts.clear();
                continued = false;
            }
        }
    }
    if continued && !parts.is_empty() {
        result.push(parts.join(" "));
    }
    result
}
