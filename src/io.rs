//! Image input: a read-only byte buffer, file-backed or in-memory.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

/// The opaque image handed to the pipeline. File-backed buffers are
/// memory-mapped read-only; callers that already hold bytes wrap them
/// without copying.
pub enum ImageBuffer {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl ImageBuffer {
    /// Memory-maps an image file read-only.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and the file handle is held for
        // the lifetime of the map.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(ImageBuffer::Mapped(mmap))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ImageBuffer::Owned(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            ImageBuffer::Mapped(mmap) => mmap,
            ImageBuffer::Owned(vec) => vec,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl std::ops::Deref for ImageBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}
