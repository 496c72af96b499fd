use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::ProductSource;
use crate::error::{PipelineError, Result};

/// Listing pages saved to disk as `*.html`, read in file-name order
pub struct HtmlDirSource {
    dir: PathBuf,
    pages: Vec<PathBuf>,
}

impl HtmlDirSource {
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "saved pages directory '{}' does not exist",
                dir.display()
            )));
        }

        let mut pages: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
                        .unwrap_or(false)
            })
            .collect();
        pages.sort();

        info!(dir = %dir.display(), pages = pages.len(), "Found saved listing pages");
        Ok(Self {
            dir: dir.to_path_buf(),
            pages,
        })
    }
}

impl ProductSource for HtmlDirSource {
    fn source_name(&self) -> &str {
        self.dir.to_str().unwrap_or("saved-pages")
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn fetch_page(&self, page_index: usize) -> Result<String> {
        let path = self.pages.get(page_index).ok_or_else(|| {
            PipelineError::Config(format!("no saved page at index {}", page_index))
        })?;
        // saved pages may carry stray non-UTF-8 bytes; lossy is fine for extraction
        let bytes = fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page_02.html"), "<p>two</p>").unwrap();
        fs::write(dir.path().join("page_01.html"), "<p>one</p>").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = HtmlDirSource::new(dir.path()).unwrap();
        assert_eq!(source.page_count(), 2);
        assert_eq!(source.fetch_page(0).unwrap(), "<p>one</p>");
        assert_eq!(source.fetch_page(1).unwrap(), "<p>two</p>");
        assert!(source.fetch_page(2).is_err());
    }

    #[test]
    fn test_missing_directory() {
        assert!(HtmlDirSource::new(Path::new("no/such/pages")).is_err());
    }
}
