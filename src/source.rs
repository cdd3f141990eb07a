//! Raw image files
//!
//! An image is an unstructured byte stream. No header, no dimensions, no
//! validation: the length is whatever the file's length is.

use crate::{Error, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An opened raw image file
#[derive(Debug)]
pub struct ImageFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl ImageFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_open_failed = |source: io::Error| Error::FileOpenFailed {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(file_open_failed)?;
        let len = file.metadata().map_err(file_open_failed)?.len();
        debug!("Opened image {} ({} bytes)", path.display(), len);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the file in bytes at open time
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for ImageFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}
