use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::model::{ModuleRecord, ReportEntry};

/// 各解析任务共享的结果收集器，按构建文件路径归档
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Mutex<BTreeMap<PathBuf, Vec<ModuleRecord>>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_result(&self, path: &Path, records: Vec<ModuleRecord>) {
        if records.is_empty() {
            return;
        }
        self.results
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .extend(records);
    }

    /// 产出过记录的文件数
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<ModuleRecord> {
        aggregate(self.results.into_inner().into_values().flatten())
    }
}

/// 按来源文件排序（同一文件内保持模块顺序）并按身份去重，与到达顺序无关
pub fn aggregate<I: IntoIterator<Item = ModuleRecord>>(records: I) -> Vec<ModuleRecord> {
    let mut records: Vec<ModuleRecord> = records.into_iter().collect();
    records.sort_by(|a, b| a.source_file.cmp(&b.source_file));
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.identity()));
    records
}

pub fn to_reports(records: &[ModuleRecord], version: &str) -> Vec<ReportEntry> {
    records.iter().map(|record| record.to_report(version)).collect()
}

/// `libfoo.so`、`libfoo.so.1`、`libfoo.a` 都得到 `libfoo`
pub fn library_stem(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    if let Some(pos) = file.rfind(".so") {
        if pos > 0 {
            return file[..pos].to_string();
        }
    }
    file.strip_suffix(".a").unwrap_or(file).to_string()
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// 用编译产物目录里找到的库替换原生库条目的 `libs`
///
/// `only_found` 为真时，只保留能匹配到非空产物文件的库和条目。
/// APK/JAR/APEX 条目原样通过。
pub fn match_built_outs(entries: Vec<ReportEntry>, built_libs: &[PathBuf], only_found: bool) -> Vec<ReportEntry> {
    let mut built: HashMap<String, String> = HashMap::new();
    for lib in built_libs {
        if only_found && !is_non_empty_file(lib) {
            continue;
        }
        let path = lib.to_string_lossy().to_string();
        built.insert(library_stem(&path), path);
    }

    entries
        .into_iter()
        .filter_map(|mut entry| {
            if entry.lib_name.is_none() {
                return Some(entry);
            }
            let mut found = false;
            let mut libs = IndexSet::new();
            for lib in &entry.libs {
                match built.get(&library_stem(lib)) {
                    Some(path) => {
                        found = true;
                        libs.insert(path.clone());
                    }
                    None if !only_found => {
                        libs.insert(lib.clone());
                    }
                    None => {}
                }
            }
            entry.libs = libs.into_iter().collect();
            if let Some(first) = entry.libs.first() {
                entry.lib_name = Some(library_stem(first));
            }
            (!only_found || found).then_some(entry)
        })
        .collect()
}
