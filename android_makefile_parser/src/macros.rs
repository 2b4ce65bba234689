//! Make 风格的宏展开
//!
//! 只覆盖 Android.mk 里常见的子集：`$(VAR)` / `${VAR}` 替换、
//! `$(subst from,to,text)` 以及 `$(call include-path-for, key)`。
//! 无法识别或写错的宏原样保留，不报错。

use std::ops::Range;
use std::path::Path;

use indexmap::IndexMap;

use crate::brackets::{BalancedScanner, split_top_level};

/// `+=` 拼接时使用的分隔符
pub const APPEND_SEPARATOR: &str = " ";

/// 反复展开的最大轮数，防止自引用变量无限增长
pub const MAX_EXPANSION_ROUNDS: usize = 8;

const SUBST_PREFIX: &str = "$(subst ";
const INCLUDE_PATH_FOR: &str = "$(call include-path-for";

/// `include-path-for` 的固定查找表，值相对于平台根目录
pub const INCLUDE_PATH_TABLE: &[(&str, &str)] = &[
    ("camera", "system/media/camera/include"),
    ("frameworks-base", "frameworks/base/include"),
    ("frameworks-native", "frameworks/native/include"),
    ("libhardware", "hardware/libhardware/include"),
    ("libhardware_legacy", "hardware/libhardware_legacy/include"),
    ("libril", "hardware/ril/include"),
    ("system-core", "system/core/include"),
    ("audio", "system/media/audio/include"),
    ("audio-effects", "system/media/audio_effects/include"),
    ("audio-utils", "system/media/audio_utils/include"),
    ("audio-route", "system/media/audio_route/include"),
    ("wilhelm", "frameworks/wilhelm/include"),
    ("wilhelm-ut", "frameworks/wilhelm/src/ut"),
    ("mediandk", "frameworks/av/media/ndk"),
];

/// 变量环境：按赋值顺序保存每个变量最后一次的值
#[derive(Debug, Clone, Default)]
pub struct MacroEnvironment {
    vars: IndexMap<String, String>,
}

impl MacroEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// `+=`：已有值时以分隔符拼接，否则等同于赋值
    pub fn append(&mut self, key: &str, value: &str) {
        match self.vars.get_mut(key) {
            Some(prior) if !prior.is_empty() => {
                prior.push_str(APPEND_SEPARATOR);
                prior.push_str(value);
            }
            Some(prior) => *prior = value.to_string(),
            None => {
                self.vars.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// `?=`：仅在变量未定义时赋值
    pub fn set_if_absent(&mut self, key: &str, value: &str) {
        if !self.vars.contains_key(key) {
            self.vars.insert(key.to_string(), value.to_string());
        }
    }

    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.vars.retain(|k, _| keep(k));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// 按定义顺序把每个值展开到稳定，解决前向/后向引用
    pub fn settle(&mut self) {
        let keys: Vec<String> = self.vars.keys().cloned().collect();
        for key in keys {
            let Some(raw) = self.vars.get(&key) else {
                continue;
            };
            let expanded = expand_until_stable(raw, self);
            self.vars.insert(key, expanded);
        }
    }
}

/// 单轮展开：先替换变量引用，再处理 `$(subst ...)`
pub fn expand(raw: &str, env: &MacroEnvironment) -> String {
    let substituted = substitute_variables(raw, env);
    apply_subst(&substituted)
}

/// 反复调用 [`expand`] 直到结果不再变化
pub fn expand_until_stable(raw: &str, env: &MacroEnvironment) -> String {
    let mut current = raw.to_string();
    for _ in 0..MAX_EXPANSION_ROUNDS {
        let next = expand(&current, env);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn parens() -> BalancedScanner {
    BalancedScanner::new('(', ')').string_aware(false)
}

/// `$(...)` 或 `${...}` 引用的完整区间（含 `$`）
fn reference_span(text: &str, dollar: usize) -> Option<Range<usize>> {
    let (open, close) = match *text.as_bytes().get(dollar + 1)? {
        b'(' => ('(', ')'),
        b'{' => ('{', '}'),
        _ => return None,
    };
    let span = BalancedScanner::new(open, close)
        .string_aware(false)
        .span(text, dollar + 1)?;
    (span.start == dollar + 1).then_some(dollar..span.end)
}

fn substitute_variables(raw: &str, env: &MacroEnvironment) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut copied = 0;
    let mut cursor = 0;

    while let Some(found) = raw[cursor..].find('$') {
        let at = cursor + found;
        if raw.as_bytes().get(at + 1) == Some(&b'$') {
            cursor = at + 2;
            continue;
        }
        let bound = reference_span(raw, at)
            .and_then(|span| env.get(&raw[span.start + 2..span.end - 1]).map(|v| (span, v)));
        match bound {
            Some((span, value)) => {
                out.push_str(&raw[copied..at]);
                out.push_str(value);
                copied = span.end;
                cursor = span.end;
            }
            // 未定义的引用保留，但继续扫描其内部
            None => cursor = at + 1,
        }
    }
    out.push_str(&raw[copied..]);
    out
}

/// 处理所有 `$(subst from,to,text)`，内层先于外层求值
pub fn apply_subst(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find(SUBST_PREFIX) {
        let Some(span) = parens().span(rest, pos + 1) else {
            break;
        };
        let args = apply_subst(&rest[pos + SUBST_PREFIX.len()..span.end - 1]);
        out.push_str(&rest[..pos]);
        match subst_call(&args) {
            Some(replaced) => out.push_str(&replaced),
            None => out.push_str(&rest[pos..span.end]),
        }
        rest = &rest[span.end..];
    }
    out.push_str(rest);
    out
}

/// 是否还含有 `$(...)` / `${...}` 引用
pub fn has_reference(text: &str) -> bool {
    text.contains("$(") || text.contains("${")
}

/// 参数里还有未展开的引用时不求值，等变量定义后再处理
fn subst_call(args: &str) -> Option<String> {
    if has_reference(args) {
        return None;
    }
    let parts = split_top_level(args, ',');
    let [from, to, text] = parts.as_slice() else {
        return None;
    };
    let (from, to, text) = (from.trim(), to.trim(), text.trim());
    if from.is_empty() {
        return Some(text.to_string());
    }
    Some(text.replace(from, to))
}

pub fn lookup_include_path(key: &str) -> Option<&'static str> {
    INCLUDE_PATH_TABLE
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, suffix)| *suffix)
}

/// 展开 `$(call include-path-for, key)`；没有平台根目录或 key 未知时保留原文
pub fn resolve_include_path_for(text: &str, platform_root: Option<&Path>) -> String {
    let Some(root) = platform_root else {
        return text.to_string();
    };
    let root = root.to_string_lossy();
    let root = root.trim_end_matches('/');

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(INCLUDE_PATH_FOR) {
        let Some(span) = parens().span(rest, pos + 1) else {
            break;
        };
        let arg = rest[pos + INCLUDE_PATH_FOR.len()..span.end - 1].trim_start();
        out.push_str(&rest[..pos]);
        match arg.strip_prefix(',').map(str::trim).and_then(lookup_include_path) {
            Some(suffix) => {
                out.push_str(root);
                out.push('/');
                out.push_str(suffix);
            }
            None => out.push_str(&rest[pos..span.end]),
        }
        rest = &rest[span.end..];
    }
    out.push_str(rest);
    out
}
