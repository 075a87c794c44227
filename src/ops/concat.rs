//! print extracted config files back to back

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};

/// what [`concat`] wrote
#[derive(Debug, Default)]
pub struct ConcatReport {
    /// files in the order they were written
    pub files: Vec<PathBuf>,
    pub bytes: u64,
}

/// write every file directly in `dir` whose extension is one of
/// `extensions` (case-insensitive) to `out`, sorted by name, with no
/// separator between files
pub fn concat<W: Write + ?Sized>(
    dir: &Path,
    extensions: &[String],
    out: &mut W,
) -> Result<ConcatReport> {
    let mut report = ConcatReport::default();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| crate::Error::Io {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("walkdir error")),
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            report.files.push(entry.into_path());
        }
    }

    for path in &report.files {
        let mut file = File::open(path).with_path(path)?;
        report.bytes += io::copy(&mut file, &mut *out).with_path(path)?;
    }
    out.flush().with_path(dir)?;

    tracing::debug!(dir = %dir.display(), files = report.files.len(), bytes = report.bytes, "concatenated");
    Ok(report)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn yaml_exts() -> Vec<String> {
        vec!["yml".to_string(), "yaml".to_string()]
    }

    #[test]
    fn test_concatenates_sorted_without_framing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.yml"), "b: 2\n").unwrap();
        fs::write(dir.path().join("a.yaml"), "a: 1\n").unwrap();
        fs::write(dir.path().join("c.YML"), "c: 3").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        fs::write(dir.path().join("registry"), "NAME x").unwrap();

        let mut out = Vec::new();
        let report = concat(dir.path(), &yaml_exts(), &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "a: 1\nb: 2\nc: 3");
        assert_eq!(report.files.len(), 3);
        assert_eq!(report.bytes, 14);
    }

    #[test]
    fn test_ignores_subdirectories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested.yml")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/inner.yml"), "inner").unwrap();
        fs::write(dir.path().join("top.yml"), "top").unwrap();

        let mut out = Vec::new();
        concat(dir.path(), &yaml_exts(), &mut out).unwrap();
        assert_eq!(out, b"top");
    }

    #[test]
    fn test_empty_directory_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        let report = concat(dir.path(), &yaml_exts(), &mut out).unwrap();
        assert!(out.is_empty());
        assert!(report.files.is_empty());
    }

    #[test]
    fn test_extension_list_accepts_leading_dot() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.conf"), "conf").unwrap();
        let mut out = Vec::new();
        concat(dir.path(), &[".conf".to_string()], &mut out).unwrap();
        assert_eq!(out, b"conf");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            concat(&dir.path().join("absent"), &yaml_exts(), &mut out),
            Err(crate::Error::Io { .. })
        ));
    }
}
