use std::ops::Range;

/// 括号匹配扫描器
///
/// 从 `from` 开始找到第一个 `open`，按深度计数找到与之配对的 `close`。
/// 开启 `string_aware` 时，双引号字符串内的括号不参与计数（支持 `\"` 转义）。
#[derive(Debug, Clone, Copy)]
pub struct BalancedScanner {
    open: char,
    close: char,
    string_aware: bool,
}

impl BalancedScanner {
    pub fn new(open: char, close: char) -> Self {
        Self {
            open,
            close,
            string_aware: true,
        }
    }

    pub fn string_aware(mut self, enabled: bool) -> Self {
        self.string_aware = enabled;
        self
    }

    /// 返回包含两端括号在内的字节区间
    pub fn span(&self, text: &str, from: usize) -> Option<Range<usize>> {
        let tail = text.get(from..)?;
        let mut depth = 0usize;
        let mut start = None;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, c) in tail.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            if self.string_aware && c == '"' {
                in_string = true;
                continue;
            }
            if c == self.open {
                if depth == 0 {
                    start = Some(from + offset);
                }
                depth += 1;
            } else if c == self.close && depth > 0 {
                depth -= 1;
                if depth == 0 {
                    let begin = start?;
                    return Some(begin..from + offset + c.len_utf8());
                }
            }
        }
        None
    }
}

/// 提取平衡括号区间，字符串字面量内的括号被忽略
pub fn extract_balanced(text: &str, open: char, close: char, from: usize) -> Option<Range<usize>> {
    BalancedScanner::new(open, close).span(text, from)
}

/// 在顶层（不在任何括号或字符串内）按 `sep` 切分
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth = depth.saturating_sub(1),
            _ if c == sep && depth == 0 => {
                parts.push(&text[last..i]);
                last = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[last..]);
    parts
}
