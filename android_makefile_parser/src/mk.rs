//! Android.mk 解析
//!
//! 逐行模拟一个很小的 GNU Make 子集。每遇到一个构建类型标记
//! （如 `include $(BUILD_SHARED_LIBRARY)`）就结束当前模块并开始下一个，
//! 所以一个文件会产出一串记录。条件语句不求值，两个分支的赋值都会生效。

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use tracing::{debug, trace};

use crate::dialect::ParseContext;
use crate::lines::join_continued_lines;
use crate::macros::{MacroEnvironment, expand_until_stable, has_reference, resolve_include_path_for};
use crate::model::{ModuleKind, ModuleRecord, artifact_stem};

const INCLUDE_KEYS: &[&str] = &["LOCAL_C_INCLUDES", "LOCAL_EXPORT_C_INCLUDE_DIRS"];
const OUTPUT_KEYS: &[&str] = &["LOCAL_MODULE", "LOCAL_PACKAGE_NAME"];
const CFLAGS_KEYS: &[&str] = &["LOCAL_CPPFLAGS", "LOCAL_CFLAGS", "LOCAL_CONLYFLAGS"];
const PREBUILT_KEYS: &[&str] = &[
    "LOCAL_SRC_FILES",
    "LOCAL_PREBUILT_MODULE_FILE",
    "LOCAL_PREBUILT_LIBS",
    "LOCAL_PREBUILT_JAVA_LIBRARIES",
];

/// `include $(CLEAR_VARS)` 之后保留的模块变量
const KEPT_LOCAL_VARS: &[&str] = &["LOCAL_PATH"];

/// `$(call my-dir)` 在环境里的键
pub const MY_DIR_KEY: &str = "call my-dir";

/// 模块结束标记对应的构建类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    NativeLib,
    /// 类型由产物扩展名或 `LOCAL_MODULE_CLASS` 决定
    Prebuilt,
    Apk,
    Jar,
}

static BOUNDARY_MARKERS: LazyLock<Vec<(Regex, Boundary)>> = LazyLock::new(|| {
    [
        (r"\(BUILD_(HOST_)?(STATIC|SHARED)_LIBRARY\)", Boundary::NativeLib),
        (r"\(BUILD_(HOST_|MULTI_)?PREBUILT\)", Boundary::Prebuilt),
        (r"\(BUILD_PACKAGE\)", Boundary::Apk),
        (r"\(BUILD_(HOST_|STATIC_)?JAVA_LIBRARY\)", Boundary::Jar),
    ]
    .into_iter()
    .map(|(pattern, boundary)| (Regex::new(pattern).unwrap(), boundary))
    .collect()
});

static CLEAR_VARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?include\s+\$\(CLEAR_VARS\)").unwrap());

static RE_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:export|override)\s+)*([A-Za-z0-9_.\-]+)\s*(::=|:=|\+=|\?=|=)\s*(.*)$")
        .unwrap()
});

/// 赋值运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`，使用时才展开
    Set,
    /// `:=`、`::=`，赋值时立即展开
    Immediate,
    /// `+=`
    Append,
    /// `?=`
    Conditional,
}

pub fn boundary_of(line: &str) -> Option<Boundary> {
    BOUNDARY_MARKERS
        .iter()
        .find(|(re, _)| re.is_match(line))
        .map(|(_, boundary)| *boundary)
}

/// 拆出 `(key, op, value)`，key 不是普通变量名时返回 `None`
pub fn split_assignment(line: &str) -> Option<(&str, AssignOp, &str)> {
    let cap = RE_ASSIGN.captures(line)?;
    let key = cap.get(1)?.as_str();
    let op = match cap.get(2)?.as_str() {
        "+=" => AssignOp::Append,
        "?=" => AssignOp::Conditional,
        ":=" | "::=" => AssignOp::Immediate,
        _ => AssignOp::Set,
    };
    let value = cap.get(3)?.as_str().trim();
    Some((key, op, value))
}

/// 去掉行内 `#` 注释（`\#` 不算）
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let cut = (0..bytes.len()).find(|&i| bytes[i] == b'#' && (i == 0 || bytes[i - 1] != b'\\'));
    match cut {
        Some(i) => &line[..i],
        None => line,
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == '\\')
        .filter(|t| !t.is_empty())
}

/// 赋值时展开；引用自身而自身未定义时按空值处理
fn expand_assigned(key: &str, raw: &str, env: &MacroEnvironment) -> String {
    let self_ref = raw.contains(&format!("$({key})")) || raw.contains(&format!("${{{key}}}"));
    if !self_ref || env.contains(key) {
        return expand_until_stable(raw, env);
    }
    let mut scoped = env.clone();
    scoped.set(key, "");
    expand_until_stable(raw, &scoped).trim().to_string()
}

/// 展开并解析头文件目录，仍有未定义引用时返回展开后的文本
fn resolve_includes(
    text: &str,
    env: &MacroEnvironment,
    ctx: &ParseContext<'_>,
    headers: &mut IndexSet<String>,
) -> Option<String> {
    let expanded = expand_until_stable(text, env);
    let expanded = resolve_include_path_for(&expanded, ctx.platform_root.as_deref());
    if has_reference(&expanded) {
        return Some(expanded);
    }
    for token in tokens(&expanded) {
        ctx.resolve_include(token, headers);
    }
    None
}

fn is_module_local(key: &str) -> bool {
    key.starts_with("LOCAL_") && !KEPT_LOCAL_VARS.contains(&key)
}

/// 两个边界之间累积的模块信息
#[derive(Debug, Default)]
struct ModuleBuilder {
    built_outputs: IndexSet<String>,
    last_output: Option<String>,
    headers: IndexSet<String>,
    /// 含前向引用、要等整个文件扫描完再解析的头文件目录
    pending_includes: Vec<String>,
    /// 含引用的值整体保留，展开后再拆分
    flags: IndexSet<String>,
    artifact_kind: Option<ModuleKind>,
    module_class: Option<ModuleKind>,
    certificate: Option<String>,
    dex_pre_opt: Option<String>,
    optimize_enabled: Option<String>,
}

impl ModuleBuilder {
    fn add_output(&mut self, output: &str) {
        let output = output.trim();
        if output.is_empty() {
            return;
        }
        self.built_outputs.insert(output.to_string());
        self.last_output = Some(output.to_string());
    }

    fn apply(&mut self, key: &str, text: &str, env: &MacroEnvironment, ctx: &ParseContext<'_>) {
        if INCLUDE_KEYS.contains(&key) {
            if let Some(pending) = resolve_includes(text, env, ctx, &mut self.headers) {
                self.pending_includes.push(pending);
            }
        } else if OUTPUT_KEYS.contains(&key) {
            self.add_output(text);
        } else if CFLAGS_KEYS.contains(&key) {
            if has_reference(text) {
                self.flags.insert(text.trim().to_string());
            } else {
                self.flags.extend(tokens(text).map(str::to_string));
            }
        } else if PREBUILT_KEYS.contains(&key) {
            let expanded = expand_until_stable(text, env);
            for token in tokens(&expanded) {
                // LOCAL_PREBUILT_LIBS 允许 `name:path` 写法
                let artifact = token.rsplit(':').next().unwrap_or(token);
                if let Some(kind) = ModuleKind::from_artifact(artifact) {
                    self.artifact_kind = Some(kind);
                    self.add_output(artifact);
                }
            }
        } else {
            let value = expand_until_stable(text, env).trim().to_string();
            match key {
                "LOCAL_MODULE_CLASS" => self.module_class = ModuleKind::from_module_class(&value),
                "LOCAL_CERTIFICATE" => self.certificate = Some(value),
                "LOCAL_DEX_PREOPT" => self.dex_pre_opt = Some(value),
                "LOCAL_PROGUARD_ENABLED" => {
                    self.optimize_enabled = Some(if value == "disabled" {
                        "false".to_string()
                    } else {
                        value
                    })
                }
                _ => {}
            }
        }
    }

    fn finalize(
        self,
        boundary: Boundary,
        env: &MacroEnvironment,
        ctx: &ParseContext<'_>,
    ) -> (ModuleRecord, Vec<String>) {
        let kind = match boundary {
            Boundary::NativeLib => ModuleKind::NativeLib,
            Boundary::Apk => ModuleKind::Apk,
            Boundary::Jar => ModuleKind::Jar,
            Boundary::Prebuilt => self
                .artifact_kind
                .or(self.module_class)
                .unwrap_or(ModuleKind::Unknown),
        };

        let mut record = ModuleRecord::new(ctx.source);
        record.kind = kind;
        record.built_outputs = expand_pending(self.built_outputs, env);
        record.header_search_paths = self.headers;
        let pending_includes = self
            .pending_includes
            .iter()
            .filter_map(|text| resolve_includes(text, env, ctx, &mut record.header_search_paths))
            .collect();
        record.compiler_flags = expand_pending(self.flags, env);
        if let Some(last) = self.last_output {
            record.name = artifact_stem(&expand_until_stable(&last, env), kind);
        }
        if matches!(kind, ModuleKind::Apk | ModuleKind::Jar) {
            if let Some(certificate) = self.certificate {
                record.certificate = certificate;
            }
            if let Some(dex_pre_opt) = self.dex_pre_opt {
                record.dex_pre_opt = dex_pre_opt;
            }
            if let Some(optimize_enabled) = self.optimize_enabled {
                record.optimize_enabled = optimize_enabled;
            }
        }
        (record, pending_includes)
    }
}

/// 展开仍含引用的值；完全展开后才拆成多个 token，否则整体保留
fn expand_pending(values: IndexSet<String>, env: &MacroEnvironment) -> IndexSet<String> {
    let mut result = IndexSet::new();
    for value in values {
        if !has_reference(&value) {
            result.insert(value);
            continue;
        }
        let expanded = expand_until_stable(&value, env);
        if has_reference(&expanded) {
            result.insert(expanded.trim().to_string());
        } else {
            result.extend(tokens(&expanded).map(str::to_string));
        }
    }
    result
}

/// 解析 Android.mk 的物理行
pub fn parse(lines: &[String], ctx: &ParseContext<'_>) -> Vec<ModuleRecord> {
    let mut env = MacroEnvironment::new();
    env.set(MY_DIR_KEY, ctx.file_dir.to_string_lossy());

    let mut records = Vec::new();
    let mut pending_includes = Vec::new();
    let mut builder = ModuleBuilder::default();

    for line in join_continued_lines(lines) {
        let line = strip_comment(&line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(boundary) = boundary_of(line) {
            let finished = std::mem::take(&mut builder);
            let (record, pending) = finished.finalize(boundary, &env, ctx);
            records.push(record);
            pending_includes.push(pending);
            env.retain(|k| !is_module_local(k));
            continue;
        }
        if CLEAR_VARS.is_match(line) {
            builder = ModuleBuilder::default();
            env.retain(|k| !is_module_local(k));
            continue;
        }

        let Some((key, op, raw)) = split_assignment(line) else {
            continue;
        };
        let text = if ctx.options.env_flatten || op == AssignOp::Immediate {
            expand_assigned(key, raw, &env)
        } else {
            raw.to_string()
        };
        match op {
            AssignOp::Set | AssignOp::Immediate => env.set(key, text.as_str()),
            AssignOp::Append => env.append(key, &text),
            AssignOp::Conditional => {
                if env.contains(key) {
                    continue;
                }
                env.set(key, text.as_str());
            }
        }
        trace!("{} {:?} {}", key, op, text);
        builder.apply(key, &text, &env, ctx);
    }

    // 第二轮：用整个文件的全局变量补全前向引用
    env.settle();
    env.retain(|k| !is_module_local(k));
    for (record, pending) in records.iter_mut().zip(&pending_includes) {
        for text in pending {
            if let Some(left) = resolve_includes(text, &env, ctx, &mut record.header_search_paths) {
                debug!("unresolved include {} in {}", left, ctx.source.display());
            }
        }
        record.compiler_flags = expand_pending(std::mem::take(&mut record.compiler_flags), &env);
        record.built_outputs = expand_pending(std::mem::take(&mut record.built_outputs), &env);
        if has_reference(&record.name) {
            record.name = artifact_stem(&expand_until_stable(&record.name, &env), record.kind);
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::ParserOptions;
    use std::fs;
    use std::path::Path;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    fn run(source: &Path, text: &str, options: &ParserOptions) -> Vec<ModuleRecord> {
        let ctx = ParseContext::new(source, options);
        parse(&lines(text), &ctx)
    }

    #[test]
    fn splits_assignment_operators() {
        assert_eq!(split_assignment("A := b c"), Some(("A", AssignOp::Immediate, "b c")));
        assert_eq!(split_assignment("A ::= b"), Some(("A", AssignOp::Immediate, "b")));
        assert_eq!(split_assignment("A+=-DX=1"), Some(("A", AssignOp::Append, "-DX=1")));
        assert_eq!(split_assignment("A ?= 1"), Some(("A", AssignOp::Conditional, "1")));
        assert_eq!(split_assignment("export A = 1"), Some(("A", AssignOp::Set, "1")));
        assert_eq!(split_assignment("ifeq ($(A),true)"), None);
        assert_eq!(split_assignment("$(foo) := x"), None);
    }

    #[test]
    fn recognizes_boundaries() {
        assert_eq!(boundary_of("include $(BUILD_SHARED_LIBRARY)"), Some(Boundary::NativeLib));
        assert_eq!(boundary_of("include $(BUILD_HOST_STATIC_LIBRARY)"), Some(Boundary::NativeLib));
        assert_eq!(boundary_of("include $(BUILD_PREBUILT)"), Some(Boundary::Prebuilt));
        assert_eq!(boundary_of("include $(BUILD_PACKAGE)"), Some(Boundary::Apk));
        assert_eq!(boundary_of("include $(BUILD_STATIC_JAVA_LIBRARY)"), Some(Boundary::Jar));
        assert_eq!(boundary_of("include $(CLEAR_VARS)"), None);
    }

    #[test]
    fn strips_trailing_comments() {
        assert_eq!(strip_comment("A := b # note"), "A := b ");
        assert_eq!(strip_comment("A := \\#b"), "A := \\#b");
    }

    #[test]
    fn two_modules_do_not_leak() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("hw");
        fs::create_dir_all(dir.join("inc_a")).unwrap();
        fs::create_dir_all(dir.join("inc_b")).unwrap();
        let source = dir.join("Android.mk");
        let text = "\
LOCAL_PATH := $(call my-dir)
include $(CLEAR_VARS)
LOCAL_MODULE := liba
LOCAL_C_INCLUDES := $(LOCAL_PATH)/inc_a
LOCAL_CFLAGS += -DA
include $(BUILD_SHARED_LIBRARY)

include $(CLEAR_VARS)
LOCAL_MODULE := libb
LOCAL_C_INCLUDES := $(LOCAL_PATH)/inc_b
LOCAL_CFLAGS += -DB
include $(BUILD_SHARED_LIBRARY)
";
        let records = run(&source, text, &ParserOptions::default());
        assert_eq!(records.len(), 2);

        let a = &records[0];
        assert_eq!(a.name, "liba");
        assert_eq!(a.kind, ModuleKind::NativeLib);
        assert_eq!(a.compiler_flags.iter().collect::<Vec<_>>(), vec!["-DA"]);
        assert_eq!(a.header_search_paths.len(), 1);
        assert!(a.header_search_paths[0].ends_with("inc_a"));

        let b = &records[1];
        assert_eq!(b.name, "libb");
        assert_eq!(b.compiler_flags.iter().collect::<Vec<_>>(), vec!["-DB"]);
        assert_eq!(b.header_search_paths.len(), 1);
        assert!(b.header_search_paths[0].ends_with("inc_b"));
    }

    #[test]
    fn no_boundary_means_no_records() {
        let text = "LOCAL_MODULE := orphan\nLOCAL_CFLAGS := -O2\n";
        let records = run(Path::new("/tmp/x/Android.mk"), text, &ParserOptions::default());
        assert!(records.is_empty());
    }

    #[test]
    fn continued_flags_are_tokenized() {
        let text = "LOCAL_MODULE := libc2\nLOCAL_CFLAGS := -DA \\\n  -DB \\\n  -DC\ninclude $(BUILD_STATIC_LIBRARY)\n";
        let records = run(Path::new("/tmp/x/Android.mk"), text, &ParserOptions::default());
        assert_eq!(records[0].compiler_flags.iter().collect::<Vec<_>>(), vec!["-DA", "-DB", "-DC"]);
    }

    #[test]
    fn prebuilt_kind_follows_artifact() {
        let text = "\
include $(CLEAR_VARS)
LOCAL_MODULE := Gallery
LOCAL_SRC_FILES := prebuilt/Gallery.apk
LOCAL_CERTIFICATE := platform
LOCAL_DEX_PREOPT := false
LOCAL_PROGUARD_ENABLED := disabled
include $(BUILD_PREBUILT)
";
        let records = run(Path::new("/tmp/x/Android.mk"), text, &ParserOptions::default());
        assert_eq!(records.len(), 1);
        let apk = &records[0];
        assert_eq!(apk.kind, ModuleKind::Apk);
        assert_eq!(apk.name, "Gallery");
        assert_eq!(apk.certificate, "platform");
        assert_eq!(apk.dex_pre_opt, "false");
        assert_eq!(apk.optimize_enabled, "false");
        assert!(apk.built_outputs.contains("prebuilt/Gallery.apk"));
    }

    #[test]
    fn prebuilt_kind_falls_back_to_module_class() {
        let text = "\
LOCAL_MODULE := libvendor
LOCAL_MODULE_CLASS := SHARED_LIBRARIES
LOCAL_CFLAGS := -O2
include $(BUILD_PREBUILT)
";
        let records = run(Path::new("/tmp/x/Android.mk"), text, &ParserOptions::default());
        assert_eq!(records[0].kind, ModuleKind::NativeLib);
        assert_eq!(records[0].name, "libvendor");
    }

    #[test]
    fn forward_references_resolve_after_scan() {
        let text = "\
LOCAL_MODULE := $(my_name)
LOCAL_CFLAGS := -DNAME=$(my_name)
include $(BUILD_SHARED_LIBRARY)
my_name := libfwd
";
        let records = run(Path::new("/tmp/x/Android.mk"), text, &ParserOptions::default());
        assert_eq!(records[0].name, "libfwd");
        assert!(records[0].built_outputs.contains("libfwd"));
        assert!(records[0].compiler_flags.contains("-DNAME=libfwd"));
    }

    #[test]
    fn forward_referenced_include_resolves_after_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("hw");
        fs::create_dir_all(dir.join("gen/include")).unwrap();
        let text = "\
LOCAL_PATH := $(call my-dir)
include $(CLEAR_VARS)
LOCAL_MODULE := libgen
LOCAL_C_INCLUDES := $(gen_root)/include
include $(BUILD_SHARED_LIBRARY)
gen_root := $(LOCAL_PATH)/gen
";
        let records = run(&dir.join("Android.mk"), text, &ParserOptions::default());
        let headers: Vec<&String> = records[0].header_search_paths.iter().collect();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].ends_with("hw/gen/include"));
    }

    #[test]
    fn subst_with_spaced_arguments_in_flags() {
        let immediate = "\
BASE := -O3 -DX
LOCAL_MODULE := libsubst
LOCAL_CFLAGS := $(subst -O3, -O2, $(BASE))
include $(BUILD_SHARED_LIBRARY)
";
        let lazy = "\
LOCAL_MODULE := libsubst
LOCAL_CFLAGS = $(subst -O3, -O2, $(BASE)) -Wall
include $(BUILD_SHARED_LIBRARY)
BASE := -O3 -DX
";
        let options = ParserOptions::default();
        let records = run(Path::new("/tmp/x/Android.mk"), immediate, &options);
        assert_eq!(records[0].compiler_flags.iter().collect::<Vec<_>>(), vec!["-O2", "-DX"]);

        let records = run(Path::new("/tmp/x/Android.mk"), lazy, &options);
        assert_eq!(
            records[0].compiler_flags.iter().collect::<Vec<_>>(),
            vec!["-O2", "-DX", "-Wall"]
        );
    }

    #[test]
    fn spaced_call_in_module_name_stays_whole() {
        let text = "\
LOCAL_MODULE := $(subst _, -, lib_dash)
LOCAL_CFLAGS := -O2
include $(BUILD_SHARED_LIBRARY)
";
        let records = run(Path::new("/tmp/x/Android.mk"), text, &ParserOptions::default());
        assert_eq!(records[0].name, "lib-dash");
        assert_eq!(records[0].built_outputs.iter().collect::<Vec<_>>(), vec!["lib-dash"]);
    }

    #[test]
    fn immediate_self_reference_keeps_prior_value() {
        let text = "\
common := -DA
common := $(common) -DB
LOCAL_MODULE := libglobal
LOCAL_CFLAGS := $(common)
include $(BUILD_SHARED_LIBRARY)

include $(CLEAR_VARS)
LOCAL_MODULE := liblocal
LOCAL_CFLAGS := -DA
LOCAL_CFLAGS := $(LOCAL_CFLAGS) -DB
include $(BUILD_SHARED_LIBRARY)

include $(CLEAR_VARS)
LOCAL_MODULE := libfresh
LOCAL_CFLAGS := $(LOCAL_CFLAGS) -DC
include $(BUILD_SHARED_LIBRARY)
";
        let records = run(Path::new("/tmp/x/Android.mk"), text, &ParserOptions::default());
        let flags: Vec<Vec<&String>> = records.iter().map(|r| r.compiler_flags.iter().collect()).collect();
        assert_eq!(flags[0], vec!["-DA", "-DB"]);
        assert_eq!(flags[1], vec!["-DA", "-DB"]);
        assert_eq!(flags[2], vec!["-DC"]);
    }

    #[test]
    fn flatten_expands_at_assignment() {
        let text = "\
COMMON := -DCOMMON
LOCAL_MODULE := libflat
LOCAL_CFLAGS := $(COMMON) -DX
include $(BUILD_SHARED_LIBRARY)
";
        let options = ParserOptions {
            env_flatten: true,
            ..ParserOptions::default()
        };
        let records = run(Path::new("/tmp/x/Android.mk"), text, &options);
        assert_eq!(records[0].compiler_flags.iter().collect::<Vec<_>>(), vec!["-DCOMMON", "-DX"]);
    }

    #[test]
    fn include_path_for_resolves_under_platform_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("aosp");
        fs::create_dir_all(root.join("system/media/audio_utils/include")).unwrap();
        let dir = root.join("hardware/foo");
        fs::create_dir_all(&dir).unwrap();
        let text = "\
LOCAL_MODULE := audio.primary.foo
LOCAL_C_INCLUDES += $(call include-path-for, audio-utils)
include $(BUILD_SHARED_LIBRARY)
";
        let records = run(&dir.join("Android.mk"), text, &ParserOptions::default());
        assert_eq!(records.len(), 1);
        let headers: Vec<&String> = records[0].header_search_paths.iter().collect();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].ends_with("aosp/system/media/audio_utils/include"));
    }
}
