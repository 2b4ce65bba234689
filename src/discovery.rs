use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::{DirEntry, WalkDir};

static BUILD_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Android\.(bp|mk)$").unwrap());
static BUILT_LIB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(so|a)$").unwrap());

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

fn files_matching(root: &Path, re: &Regex) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|name| re.is_match(name)))
        .map(DirEntry::into_path)
        .collect()
}

/// 目录下所有 Android.mk / Android.bp；传入单个文件时原样返回
pub fn find_build_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    files_matching(root, &BUILD_FILE)
}

/// 编译产物目录下的 `.so` / `.a`
pub fn find_built_libs(out_dir: &Path) -> Vec<PathBuf> {
    files_matching(out_dir, &BUILT_LIB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn finds_build_files_outside_hidden_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("a/Android.mk"));
        touch(&root.join("b/c/Android.bp"));
        touch(&root.join("b/Android.mk.bak"));
        touch(&root.join(".repo/x/Android.bp"));
        touch(&root.join("d/Makefile"));

        let found = find_build_files(root);
        assert_eq!(found, vec![root.join("a/Android.mk"), root.join("b/c/Android.bp")]);
    }

    #[test]
    fn single_file_is_returned() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("Android.bp");
        touch(&file);
        assert_eq!(find_build_files(&file), vec![file]);
    }

    #[test]
    fn finds_built_libraries() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("lib64/libfoo.so"));
        touch(&root.join("obj/libbar.a"));
        touch(&root.join("obj/bar.o"));

        let found = find_built_libs(root);
        assert_eq!(found, vec![root.join("lib64/libfoo.so"), root.join("obj/libbar.a")]);
    }
}
