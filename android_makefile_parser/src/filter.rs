use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// gcc 不支持的 clang 选项前缀
pub const GCC_UNSUPPORTED_FLAGS: &[&str] = &[
    "-fstandalone-debug",
    "-Wthread-safety",
    "-Wexit-time-destructors",
    "-fno-c++-static-destructors",
    "-ftrivial-auto-var-init",
    "-funused-private-field",
    "-fno-unused-argument",
    "-fno-nullability-completeness",
    "-Wshadow-",
    "-Wno-implicit-fallthrough",
];

/// 按目标编译器过滤编译选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerFilter {
    /// clang：原样返回
    Identity,
    /// gcc：去掉 clang 专有选项
    #[default]
    GccUnsupported,
}

impl CompilerFilter {
    /// `gcc` / `clang`，其他名字返回 `None`
    pub fn for_compiler(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gcc" => Some(CompilerFilter::GccUnsupported),
            "clang" => Some(CompilerFilter::Identity),
            _ => None,
        }
    }

    pub fn filter(&self, flags: IndexSet<String>) -> IndexSet<String> {
        match self {
            CompilerFilter::Identity => flags,
            CompilerFilter::GccUnsupported => flags
                .into_iter()
                .map(|flag| flag.trim().to_string())
                .filter(|flag| !flag.is_empty())
                .filter(|flag| {
                    !GCC_UNSUPPORTED_FLAGS
                        .iter()
                        .any(|unsupported| flag.starts_with(unsupported))
                })
                .collect(),
        }
    }
}
