//! # Boot Image
//!
//! Read-only files handed over by the bootloader.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Boot image reader
pub trait BootImage {
    /// Contents of `path`; empty files count as absent
    fn get(&self, path: &str) -> Option<&[u8]>;
}

/// Boot image held in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryBootImage {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryBootImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: &str, contents: &[u8]) {
        self.files.insert(String::from(path), contents.to_vec());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_file(mut self, path: &str, contents: &[u8]) -> Self {
        self.insert(path, contents);
        self
    }
}

impl BootImage for MemoryBootImage {
    fn get(&self, path: &str) -> Option<&[u8]> {
        self.files
            .get(path)
            .map(Vec::as_slice)
            .filter(|bytes| !bytes.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_absent() {
        let image = MemoryBootImage::new()
            .with_file("/system/startup.js", b"")
            .with_file("/system/lib.js", b"export {}");

        assert_eq!(image.get("/system/startup.js"), None);
        assert_eq!(image.get("/system/lib.js"), Some(&b"export {}"[..]));
        assert_eq!(image.get("/missing"), None);
    }
}
