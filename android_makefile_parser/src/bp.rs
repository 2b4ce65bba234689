//! Android.bp 解析
//!
//! Blueprint 的模块体是宽松的 JSON：键不加引号，允许尾逗号。
//! 先按括号提取每个顶层 `type { ... }` 块，改写成严格 JSON 后交给 serde_json。
//! 解析失败的块直接跳过。

use std::collections::HashMap;
use std::ops::Range;

use serde_json::{Map, Value};
use tracing::debug;

use crate::brackets::extract_balanced;
use crate::dialect::ParseContext;
use crate::model::{ModuleKind, ModuleRecord};

type Block = Map<String, Value>;

const INCLUDE_KEYS: &[&str] = &[
    "export_include_dirs",
    "header_libs",
    "export_header_lib_headers",
    "include_dirs",
    "local_include_dirs",
];
const CFLAGS_KEYS: &[&str] = &["cflags", "cppflags", "conlyflags"];
const ARTIFACT_KEYS: &[&str] = &["apk", "jars", "srcs", "src"];

/// 按前缀匹配的模块类型
const MODULE_TYPE_PREFIXES: &[(&str, ModuleKind)] = &[
    ("cc_library", ModuleKind::NativeLib),
    ("cc_prebuilt_library", ModuleKind::NativeLib),
    ("android_app", ModuleKind::Apk),
    ("java_library", ModuleKind::Jar),
];
const MODULE_TYPES: &[(&str, ModuleKind)] = &[
    ("java_import", ModuleKind::Jar),
    ("apex", ModuleKind::Apex),
    ("module_apex", ModuleKind::Apex),
    ("prebuilt_apex", ModuleKind::Apex),
    ("apex_set", ModuleKind::Apex),
];
/// 前缀匹配但并非产物模块
const EXCLUDED_TYPES: &[&str] = &["android_app_certificate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Module(ModuleKind),
    Defaults,
}

pub fn classify(module_type: &str) -> Option<BlockKind> {
    if module_type.ends_with("_defaults") {
        return Some(BlockKind::Defaults);
    }
    if EXCLUDED_TYPES.contains(&module_type) {
        return None;
    }
    MODULE_TYPES
        .iter()
        .find(|(name, _)| *name == module_type)
        .or_else(|| {
            MODULE_TYPE_PREFIXES
                .iter()
                .find(|(prefix, _)| module_type.starts_with(prefix))
        })
        .map(|(_, kind)| BlockKind::Module(*kind))
}

/// 去掉 `//` 与 `/* */` 注释，字符串内的不动
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' || c == '\n' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// 字符串结束位置（`start` 指向开头的引号）
fn skip_string(text: &str, start: usize) -> usize {
    let mut escaped = false;
    for (offset, c) in text[start + 1..].char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return start + 1 + offset + 1;
        }
    }
    text.len()
}

/// `{` 前紧挨着的标识符；`x = {` 这类赋值返回 `None`
fn preceding_ident(text: &str, brace: usize) -> Option<&str> {
    let head = text[..brace].trim_end();
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)?;
    Some(&head[start..])
}

/// 顶层的 `type { ... }` 块
pub fn top_level_blocks(body: &str) -> Vec<(String, Range<usize>)> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let c = body.as_bytes()[i];
        let close = match c {
            b'"' => {
                i = skip_string(body, i);
                continue;
            }
            b'{' => '}',
            b'[' => ']',
            b'(' => ')',
            _ => {
                i += 1;
                continue;
            }
        };
        let Some(span) = extract_balanced(body, c as char, close, i) else {
            break;
        };
        if c == b'{' {
            if let Some(ident) = preceding_ident(body, i) {
                blocks.push((ident.to_string(), span.clone()));
            }
        }
        i = span.end;
    }
    blocks
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

/// 宽松语法转严格 JSON：给裸键加引号，删掉 `]`/`}` 前的尾逗号
pub fn to_strict_json(block: &str) -> String {
    let chars: Vec<char> = block.chars().collect();
    let mut out = String::with_capacity(block.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            out.push(c);
            i += 1;
            let mut escaped = false;
            while i < chars.len() {
                let s = chars[i];
                out.push(s);
                i += 1;
                if escaped {
                    escaped = false;
                } else if s == '\\' {
                    escaped = true;
                } else if s == '"' {
                    break;
                }
            }
            continue;
        }
        if c == ',' && matches!(next_significant(&chars, i + 1), Some(']') | Some('}')) {
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if next_significant(&chars, i) == Some(':') {
                out.push('"');
                out.push_str(&word);
                out.push('"');
            } else {
                out.push_str(&word);
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

pub fn parse_block(text: &str) -> Option<Block> {
    match serde_json::from_str::<Value>(&to_strict_json(text)) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    }
}

fn strings(value: Option<&Value>) -> Vec<&str> {
    match value {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn nested<'a>(block: &'a Block, object: &str, key: &str) -> Option<&'a Value> {
    block.get(object)?.as_object()?.get(key)
}

/// 把 default 合并进模块：模块自身的值优先，列表取并集，对象做浅合并
fn merge_into(module: &mut Block, default: &Block) {
    for (key, dv) in default {
        if key == "name" || key == "defaults" {
            continue;
        }
        if !module.contains_key(key) {
            module.insert(key.clone(), dv.clone());
            continue;
        }
        match (module.get_mut(key), dv) {
            (Some(Value::Array(mine)), Value::Array(theirs)) => {
                let mut merged: Vec<Value> = Vec::with_capacity(theirs.len() + mine.len());
                for item in theirs.iter().chain(mine.iter()) {
                    if !merged.contains(item) {
                        merged.push(item.clone());
                    }
                }
                *mine = merged;
            }
            (Some(Value::Object(mine)), Value::Object(theirs)) => {
                for (k, v) in theirs {
                    mine.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            _ => {}
        }
    }
}

/// 递归展开 `defaults` 引用，`visited` 防止循环
pub fn merge_defaults(module: &mut Block, defaults: &HashMap<String, Block>, visited: &mut Vec<String>) {
    let names: Vec<String> = strings(module.get("defaults"))
        .into_iter()
        .map(str::to_string)
        .collect();
    for name in names {
        if visited.contains(&name) {
            continue;
        }
        visited.push(name.clone());
        let Some(default) = defaults.get(&name) else {
            debug!("defaults {} not found", name);
            continue;
        };
        let mut default = default.clone();
        merge_defaults(&mut default, defaults, visited);
        merge_into(module, &default);
    }
}

fn record_from(block: &Block, kind: ModuleKind, ctx: &ParseContext<'_>) -> ModuleRecord {
    let mut record = ModuleRecord::new(ctx.source);
    record.kind = kind;

    if let Some(name) = block.get("name").and_then(Value::as_str).map(str::trim) {
        if !name.is_empty() {
            record.name = name.to_string();
            record.built_outputs.insert(name.to_string());
        }
    }
    for key in ARTIFACT_KEYS {
        for artifact in strings(block.get(*key)) {
            if ModuleKind::from_artifact(artifact) == Some(kind) {
                record.built_outputs.insert(artifact.trim().to_string());
            }
        }
    }

    match kind {
        ModuleKind::NativeLib => {
            for key in INCLUDE_KEYS {
                for include in strings(block.get(*key)) {
                    ctx.resolve_include(include, &mut record.header_search_paths);
                }
            }
            for key in CFLAGS_KEYS {
                record.compiler_flags.extend(
                    strings(block.get(*key))
                        .into_iter()
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string),
                );
            }
        }
        ModuleKind::Apk | ModuleKind::Jar => {
            if let Some(certificate) = scalar_string(block.get("certificate")) {
                record.certificate = certificate;
            }
            if let Some(enabled) = scalar_string(nested(block, "optimize", "enabled")) {
                record.optimize_enabled = enabled;
            }
            if let Some(shrink) = scalar_string(nested(block, "optimize", "shrink")) {
                record.optimize_shrink = shrink;
            }
            if let Some(dex_pre_opt) = scalar_string(nested(block, "dex_preopt", "enabled")) {
                record.dex_pre_opt = dex_pre_opt;
            }
        }
        ModuleKind::Apex | ModuleKind::Unknown => {}
    }
    record
}

/// 解析 Android.bp 的物理行
pub fn parse(lines: &[String], ctx: &ParseContext<'_>) -> Vec<ModuleRecord> {
    let body = strip_comments(&lines.join("\n")).replace('\n', " ");

    let mut modules = Vec::new();
    let mut defaults = HashMap::new();
    for (module_type, span) in top_level_blocks(&body) {
        let Some(kind) = classify(&module_type) else {
            continue;
        };
        let Some(block) = parse_block(&body[span]) else {
            debug!("skip malformed {} block in {}", module_type, ctx.source.display());
            continue;
        };
        match kind {
            BlockKind::Defaults => {
                if let Some(name) = block.get("name").and_then(Value::as_str) {
                    defaults.insert(name.to_string(), block);
                }
            }
            BlockKind::Module(kind) => modules.push((kind, block)),
        }
    }

    modules
        .into_iter()
        .map(|(kind, mut block)| {
            merge_defaults(&mut block, &defaults, &mut Vec::new());
            record_from(&block, kind, ctx)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::ParserOptions;
    use std::fs;
    use std::path::Path;

    fn run(source: &Path, text: &str) -> Vec<ModuleRecord> {
        let options = ParserOptions::default();
        let ctx = ParseContext::new(source, &options);
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        parse(&lines, &ctx)
    }

    #[test]
    fn quotes_keys_and_drops_trailing_commas() {
        let json = to_strict_json(r#"{ name: "a:b", srcs: ["x.c",], opt: { enabled: false, }, }"#);
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "a:b");
        assert_eq!(value["srcs"], serde_json::json!(["x.c"]));
        assert_eq!(value["opt"]["enabled"], false);
    }

    #[test]
    fn comments_are_removed_outside_strings() {
        let text = "a { // c1\n url: \"http://x\", /* c2 */ b: 1 }";
        assert_eq!(strip_comments(text), "a { \n url: \"http://x\",   b: 1 }");
    }

    #[test]
    fn classifies_module_types() {
        assert_eq!(classify("cc_library_shared"), Some(BlockKind::Module(ModuleKind::NativeLib)));
        assert_eq!(classify("android_app_import"), Some(BlockKind::Module(ModuleKind::Apk)));
        assert_eq!(classify("java_library_static"), Some(BlockKind::Module(ModuleKind::Jar)));
        assert_eq!(classify("apex"), Some(BlockKind::Module(ModuleKind::Apex)));
        assert_eq!(classify("cc_defaults"), Some(BlockKind::Defaults));
        assert_eq!(classify("android_app_certificate"), None);
        assert_eq!(classify("cc_binary"), None);
    }

    #[test]
    fn finds_every_top_level_block() {
        let body = r#"x = ["a{"] cc_library { name: "a", arch: { arm: {} } } cc_library { name: "b" }"#;
        let blocks: Vec<String> = top_level_blocks(body).into_iter().map(|(t, _)| t).collect();
        assert_eq!(blocks, vec!["cc_library", "cc_library"]);
    }

    #[test]
    fn defaults_are_merged_into_module() {
        let text = r#"
cc_defaults {
    name: "common_defaults",
    cflags: ["-Wall"],
}

cc_library_shared {
    name: "libfoo",
    defaults: ["common_defaults"],
    cflags: ["-Werror", "-Wall"],
}
"#;
        let records = run(Path::new("/tmp/x/Android.bp"), text);
        assert_eq!(records.len(), 1);
        let flags: Vec<&String> = records[0].compiler_flags.iter().collect();
        assert_eq!(flags, vec!["-Wall", "-Werror"]);
    }

    #[test]
    fn merge_keeps_module_scalars_and_shallow_merges_objects() {
        let mut module = parse_block(r#"{ name: "m", certificate: "platform", optimize: { enabled: true } }"#).unwrap();
        let mut defaults = HashMap::new();
        defaults.insert(
            "d".to_string(),
            parse_block(r#"{ name: "d", certificate: "shared", optimize: { enabled: false, shrink: false }, defaults: ["e"] }"#)
                .unwrap(),
        );
        defaults.insert("e".to_string(), parse_block(r#"{ name: "e", sdk_version: "current" }"#).unwrap());
        module.insert("defaults".into(), serde_json::json!(["d"]));

        merge_defaults(&mut module, &defaults, &mut Vec::new());
        assert_eq!(module["name"], "m");
        assert_eq!(module["certificate"], "platform");
        assert_eq!(module["optimize"]["enabled"], true);
        assert_eq!(module["optimize"]["shrink"], false);
        assert_eq!(module["sdk_version"], "current");
    }

    #[test]
    fn cyclic_defaults_terminate() {
        let mut defaults = HashMap::new();
        defaults.insert("a".to_string(), parse_block(r#"{ name: "a", defaults: ["b"], x: 1 }"#).unwrap());
        defaults.insert("b".to_string(), parse_block(r#"{ name: "b", defaults: ["a"], y: 2 }"#).unwrap());
        let mut module = parse_block(r#"{ name: "m", defaults: ["a"] }"#).unwrap();
        merge_defaults(&mut module, &defaults, &mut Vec::new());
        assert_eq!(module["x"], 1);
        assert_eq!(module["y"], 2);
    }

    #[test]
    fn malformed_block_is_skipped() {
        let text = r#"
cc_library { name: "bad", srcs: common_srcs + ["a.c"] }
cc_library { name: "good", cflags: ["-O2"] }
"#;
        let records = run(Path::new("/tmp/x/Android.bp"), text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "good");
    }

    #[test]
    fn no_known_block_means_no_records() {
        let text = "cc_binary { name: \"tool\" }\nfilegroup { name: \"fg\" }\n";
        assert!(run(Path::new("/tmp/x/Android.bp"), text).is_empty());
        assert!(run(Path::new("/tmp/x/Android.bp"), "").is_empty());
    }

    #[test]
    fn app_attributes_are_read() {
        let text = r#"
android_app {
    name: "Settings",
    certificate: "platform",
    optimize: { enabled: false, shrink: true },
    dex_preopt: { enabled: false },
    cflags: ["-O2"],
}
"#;
        let records = run(Path::new("/tmp/x/Android.bp"), text);
        let app = &records[0];
        assert_eq!(app.kind, ModuleKind::Apk);
        assert_eq!(app.name, "Settings");
        assert_eq!(app.certificate, "platform");
        assert_eq!(app.optimize_enabled, "false");
        assert_eq!(app.optimize_shrink, "true");
        assert_eq!(app.dex_pre_opt, "false");
        assert!(app.compiler_flags.is_empty());
    }

    #[test]
    fn prebuilt_artifacts_become_outputs() {
        let text = r#"android_app_import { name: "Maps", apk: "Maps.apk" }"#;
        let records = run(Path::new("/tmp/x/Android.bp"), text);
        let outputs: Vec<&String> = records[0].built_outputs.iter().collect();
        assert_eq!(outputs, vec!["Maps", "Maps.apk"]);
    }

    #[test]
    fn include_dirs_resolve_against_module_and_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("aosp");
        let dir = root.join("system/libfoo");
        fs::create_dir_all(dir.join("include")).unwrap();
        fs::create_dir_all(root.join("system/core/include")).unwrap();
        let text = r#"
cc_library {
    name: "libfoo",
    export_include_dirs: ["include", "missing"],
    include_dirs: ["system/core/include"],
}
"#;
        let records = run(&dir.join("Android.bp"), text);
        let headers: Vec<&String> = records[0].header_search_paths.iter().collect();
        assert_eq!(headers.len(), 2);
        assert!(headers[0].ends_with("aosp/system/libfoo/include"));
        assert!(headers[1].ends_with("aosp/system/core/include"));
    }
}
