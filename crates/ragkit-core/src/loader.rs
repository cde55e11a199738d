use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::Document;

/// Reads text files from a directory tree into [`Document`]s.
pub struct DirectoryReader {
    extensions: Vec<String>,
}

impl Default for DirectoryReader {
    fn default() -> Self {
        Self { extensions: vec!["txt".to_string(), "md".to_string()] }
    }
}

impl DirectoryReader {
    pub fn new() -> Self { Self::default() }

    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { extensions: extensions.into_iter().map(Into::into).collect() }
    }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        self.load_files(data_dir, self.list_files(data_dir))
    }

    pub fn load_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<Document>> {
        let mut files = self.list_files(data_dir);
        if files.len() > limit {
            files.truncate(limit);
            info!(limit, "limited to first files");
        }
        self.load_files(data_dir, files)
    }

    /// Load a single file; its id is the file name.
    pub fn load_file(&self, file_path: &Path) -> Result<Document> {
        let base = file_path.parent().unwrap_or_else(|| Path::new(""));
        self.document_for(base, file_path)
    }

    fn load_files(&self, data_dir: &Path, files: Vec<PathBuf>) -> Result<Vec<Document>> {
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no matching files found");
            return Ok(vec![]);
        }
        let mut docs = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(n = file_index + 1, total = files.len(), path = %file_path.display(), "loading file");
            docs.push(self.document_for(data_dir, file_path)?);
        }
        info!(files = docs.len(), dir = %data_dir.display(), "loaded documents");
        Ok(docs)
    }

    fn document_for(&self, data_dir: &Path, file_path: &Path) -> Result<Document> {
        let text = self.read_file_content(file_path)?;
        let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("not a file path: {}", file_path.display()))?;
        Ok(Document::new(relative.to_string_lossy().to_string(), text)
            .with_metadata("file_name", file_name)
            .with_metadata("file_path", file_path.to_string_lossy().to_string())
            .with_metadata("category", self.category_from_path(relative)))
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn category_from_path(&self, relative_path: &Path) -> String {
        match relative_path.parent().and_then(|p| p.to_str()) {
            Some(parent) if !parent.is_empty() => parent.to_string(),
            _ => "misc".to_string(),
        }
    }

    fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
            })
            .collect();
        files.sort();
        files
    }
}
