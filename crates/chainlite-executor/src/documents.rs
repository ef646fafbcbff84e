//! Project-scoped document store and text extraction.
//!
//! Layout: `{root}/{project}/{filename}`.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

/// Raw bytes of named files, scoped to a project.
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when the file does not exist.
    fn read(&self, project: &str, name: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, project: &str, name: &str, bytes: &[u8]) -> Result<()>;
    fn list(&self, project: &str) -> Result<Vec<String>>;
}

pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, project: &str, name: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(validate_segment(project)?)
            .join(validate_segment(name)?))
    }
}

/// Reject names that would escape the project directory.
fn validate_segment(s: &str) -> Result<&str> {
    let mut components = Path::new(s).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(s),
        _ => bail!("Invalid document name: {:?}", s),
    }
}

impl DocumentStore for FsDocumentStore {
    fn read(&self, project: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(project, name)?;
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        Ok(Some(bytes))
    }

    fn write(&self, project: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(project, name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write document: {}", path.display()))
    }

    fn list(&self, project: &str) -> Result<Vec<String>> {
        let dir = self.root.join(validate_segment(project)?);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Document formats the ingestion and file-context paths understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
}

impl DocumentFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())?;
        match ext.as_str() {
            "txt" | "md" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Extract plain text from a stored document. NUL bytes are stripped.
pub fn extract_text(name: &str, bytes: &[u8]) -> Result<String> {
    let text = match DocumentFormat::from_name(name) {
        Some(DocumentFormat::Text) => String::from_utf8_lossy(bytes).into_owned(),
        // pdf-extract panics on some malformed inputs.
        Some(DocumentFormat::Pdf) => {
            match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => bail!("Failed to extract PDF {}: {}", name, e),
                Err(_) => bail!("Failed to extract PDF {}: malformed document", name),
            }
        }
        None => bail!("Unsupported file type: {}", name),
    };
    Ok(chainlite_core::text::strip_nul(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        store.write("p1", "b.txt", b"bee").unwrap();
        store.write("p1", "a.txt", b"ay").unwrap();
        assert_eq!(store.read("p1", "a.txt").unwrap(), Some(b"ay".to_vec()));
        assert_eq!(store.read("p1", "missing.txt").unwrap(), None);
        assert_eq!(store.read("p2", "a.txt").unwrap(), None);
        assert_eq!(store.list("p1").unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(store.read("p1", "../secret.txt").is_err());
        assert!(store.write("..", "x.txt", b"x").is_err());
        assert!(store.read("p1", "a/b.txt").is_err());
    }

    #[test]
    fn test_extract_text_formats() {
        assert_eq!(extract_text("notes.TXT", b"a\0b").unwrap(), "ab");
        assert_eq!(extract_text("readme.md", b"# hi").unwrap(), "# hi");
        let err = extract_text("sheet.xlsx", b"x").unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));
        assert!(extract_text("broken.pdf", b"not a pdf").is_err());
    }
}
