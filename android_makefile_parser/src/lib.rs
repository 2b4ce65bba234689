//! Android.mk / Android.bp 解析
//!
//! 每个构建文件独立解析为若干 [`ModuleRecord`]，解析过程不共享可变状态，
//! 可以放心在线程池里并行调用 [`scan_build_file`]。

pub mod bp;
pub mod brackets;
pub mod collector;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod lines;
pub mod macros;
pub mod mk;
pub mod model;
pub mod path;

pub use brackets::extract_balanced;
pub use collector::{ResultCollector, aggregate, match_built_outs, to_reports};
pub use dialect::{Dialect, ParseContext, ParserOptions, ScanKinds, parse_build_file, scan_build_file};
pub use error::ParseError;
pub use filter::CompilerFilter;
pub use lines::join_continued_lines;
pub use macros::{MacroEnvironment, expand, expand_until_stable};
pub use model::{ModuleKind, ModuleRecord, ReportEntry};
