use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// 构建模块的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    NativeLib,
    Apk,
    Jar,
    Apex,
    Unknown,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::NativeLib => "native_lib",
            ModuleKind::Apk => "apk",
            ModuleKind::Jar => "jar",
            ModuleKind::Apex => "apex",
            ModuleKind::Unknown => "unknown",
        }
    }

    /// 该类型产物的扩展名
    pub fn artifact_extension(&self) -> Option<&'static str> {
        match self {
            ModuleKind::NativeLib => Some(".so"),
            ModuleKind::Apk => Some(".apk"),
            ModuleKind::Jar => Some(".jar"),
            ModuleKind::Apex => Some(".apex"),
            ModuleKind::Unknown => None,
        }
    }

    /// 按扩展名判断预编译产物的类型
    pub fn from_artifact(path: &str) -> Option<Self> {
        let path = path.trim();
        [
            ModuleKind::NativeLib,
            ModuleKind::Apk,
            ModuleKind::Jar,
            ModuleKind::Apex,
        ]
        .into_iter()
        .find(|kind| {
            kind.artifact_extension()
                .is_some_and(|ext| path.len() > ext.len() && path.ends_with(ext))
        })
    }

    /// `LOCAL_MODULE_CLASS` 到类型的映射
    pub fn from_module_class(class: &str) -> Option<Self> {
        match class.trim() {
            "SHARED_LIBRARIES" | "STATIC_LIBRARIES" => Some(ModuleKind::NativeLib),
            "APPS" => Some(ModuleKind::Apk),
            "JAVA_LIBRARIES" => Some(ModuleKind::Jar),
            _ => None,
        }
    }
}

/// 去掉目录和产物扩展名，得到模块名
///
/// `.so` 按最后一次出现截断，以兼容 `libfoo.so.1` 这类带版本号的文件名。
pub fn artifact_stem(output: &str, kind: ModuleKind) -> String {
    let file = output.trim().rsplit('/').next().unwrap_or_default();
    match kind.artifact_extension() {
        Some(ext) => match file.rfind(ext) {
            Some(pos) if pos > 0 => file[..pos].to_string(),
            _ => file.to_string(),
        },
        None => file.to_string(),
    }
}

pub const DEFAULT_DEX_PREOPT: &str = "true";
pub const DEFAULT_OPTIMIZE_ENABLED: &str = "true";
pub const DEFAULT_OPTIMIZE_SHRINK: &str = "true";

/// 一个构建模块的解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRecord {
    pub kind: ModuleKind,
    pub name: String,
    pub built_outputs: IndexSet<String>,
    pub header_search_paths: IndexSet<String>,
    pub compiler_flags: IndexSet<String>,
    pub certificate: String,
    pub dex_pre_opt: String,
    pub optimize_enabled: String,
    pub optimize_shrink: String,
    pub source_file: PathBuf,
}

impl ModuleRecord {
    pub fn new(source_file: &Path) -> Self {
        Self {
            kind: ModuleKind::Unknown,
            name: String::new(),
            built_outputs: IndexSet::new(),
            header_search_paths: IndexSet::new(),
            compiler_flags: IndexSet::new(),
            certificate: String::new(),
            dex_pre_opt: DEFAULT_DEX_PREOPT.to_string(),
            optimize_enabled: DEFAULT_OPTIMIZE_ENABLED.to_string(),
            optimize_shrink: DEFAULT_OPTIMIZE_SHRINK.to_string(),
            source_file: source_file.to_path_buf(),
        }
    }

    /// 有名字且至少有一项头文件/编译选项/产物，才算完整
    pub fn is_complete(&self) -> bool {
        self.kind != ModuleKind::Unknown
            && !self.name.is_empty()
            && (!self.header_search_paths.is_empty()
                || !self.compiler_flags.is_empty()
                || !self.built_outputs.is_empty())
    }

    /// 用于跨任务去重的身份键
    pub fn identity(&self) -> String {
        let outputs: Vec<&str> = self.built_outputs.iter().map(String::as_str).collect();
        format!(
            "{}|{}|{}|{}",
            self.source_file.display(),
            self.kind.as_str(),
            self.name,
            outputs.join(",")
        )
    }

    pub fn to_report(&self, version: &str) -> ReportEntry {
        let mut entry = ReportEntry {
            lib_name: None,
            apk_name: None,
            jar_name: None,
            apex_name: None,
            version: version.to_string(),
            headers: self.header_search_paths.iter().cloned().collect(),
            libs: self.built_outputs.iter().cloned().collect(),
            gcc_options: self.compiler_flags.iter().cloned().collect(),
            certificate: None,
            dex_pre_opt: None,
            optimize_enabled: None,
            optimize_shrink: None,
            source_file: self.source_file.display().to_string(),
        };
        let name = Some(self.name.clone());
        match self.kind {
            ModuleKind::NativeLib => entry.lib_name = name,
            ModuleKind::Apex => entry.apex_name = name,
            ModuleKind::Apk | ModuleKind::Jar => {
                if self.kind == ModuleKind::Apk {
                    entry.apk_name = name;
                } else {
                    entry.jar_name = name;
                }
                entry.certificate = Some(self.certificate.clone());
                entry.dex_pre_opt = Some(self.dex_pre_opt.clone());
                entry.optimize_enabled = Some(self.optimize_enabled.clone());
                entry.optimize_shrink = Some(self.optimize_shrink.clone());
            }
            ModuleKind::Unknown => {}
        }
        entry
    }
}

/// 交给报告端的条目，字段名保持稳定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lib_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apk_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apex_name: Option<String>,
    pub version: String,
    pub headers: Vec<String>,
    pub libs: Vec<String>,
    #[serde(rename = "gcc_options")]
    pub gcc_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dex_pre_opt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize_enabled: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize_shrink: Option<String>,
    pub source_file: String,
}
