//! Listing of finished report artifacts on disk.

use std::io;
use std::path::PathBuf;

use crate::pipeline::OrderKind;

/// Report files live under `<root>/<vacancies|resumes>/<subject>.<ext>`.
#[derive(Debug, Clone)]
pub struct ReportCatalog {
    root: PathBuf,
}

impl ReportCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn directory(&self, kind: OrderKind) -> PathBuf {
        self.root.join(kind.report_dir())
    }

    /// Report names (file stems) available for `kind`, sorted. A missing
    /// directory lists as empty.
    pub fn list(&self, kind: OrderKind) -> io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(self.directory(kind)) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(stem) = entry.path().file_stem().and_then(|stem| stem.to_str()) {
                reports.push(stem.to_string());
            }
        }
        reports.sort();
        Ok(reports)
    }

    pub fn contains(&self, kind: OrderKind, subject: &str) -> io::Result<bool> {
        Ok(self.list(kind)?.iter().any(|report| report == subject))
    }

    /// Resolve a downloadable file inside the `kind` directory. Names with
    /// path separators or parent references are refused.
    pub fn resolve(&self, kind: OrderKind, file_name: &str) -> Option<PathBuf> {
        let suspicious = file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name == ".."
            || file_name.starts_with('.');
        if suspicious {
            return None;
        }

        let path = self.directory(kind).join(file_name);
        path.is_file().then_some(path)
    }
}
