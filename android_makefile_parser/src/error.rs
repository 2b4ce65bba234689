use std::path::PathBuf;

/// 解析器内部错误，对外只表现为“没有产出记录”
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported build file: {0}")]
    UnsupportedFile(PathBuf),
}
