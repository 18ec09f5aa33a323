//! Decides whether an item's content can be sent to the analyzer.

use crate::store::Item;

/// Extensions whose content is never plain text.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "ico", "webp", "zip", "gz", "tgz", "bz2",
    "xz", "7z", "rar", "tar", "jar", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "exe",
    "dll", "so", "dylib", "bin", "class", "mp3", "mp4", "avi", "mov", "wav", "parquet", "avro",
];

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    max_item_size: Option<u64>,
}

impl ContentFilter {
    pub fn new(max_item_size: Option<u64>) -> Self {
        Self { max_item_size }
    }

    /// Checks an item before any content is read.
    pub fn check_item(&self, item: &Item) -> Result<(), String> {
        if let Some(ext) = extension(&item.name) {
            if BINARY_EXTENSIONS.contains(&ext.as_str()) {
                return Err(format!("binary file type '.{}'", ext));
            }
        }
        self.check_size(item.size)
    }

    /// Re-checks the size against the bytes actually read, then decodes them.
    pub fn decode(&self, content: Vec<u8>) -> Result<String, String> {
        self.check_size(content.len() as u64)?;
        String::from_utf8(content).map_err(|e| {
            format!("content is not valid UTF-8 (invalid byte at offset {})", e.utf8_error().valid_up_to())
        })
    }

    fn check_size(&self, size: u64) -> Result<(), String> {
        match self.max_item_size {
            Some(max) if size > max => Err(format!("size {} exceeds limit of {} bytes", size, max)),
            _ => Ok(()),
        }
    }
}

fn extension(name: &str) -> Option<String> {
    let file = name.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
