//! Copying frame data into a pixel buffer
//!
//! Sources are raw byte blobs. Nothing here knows about rows or pitch: bytes
//! land at offset 0 and the copy stops at the end of the source or the end of
//! the buffer, whichever comes first.

use crate::buffer::PixelBuffer;
use crate::device::KmsDevice;
use std::io::{self, Read};
use tracing::debug;

/// Copy `source` into the start of `buffer`; returns the number of bytes copied.
///
/// Bytes past the copied prefix keep whatever they held before.
pub fn write<D: KmsDevice + ?Sized>(buffer: &mut PixelBuffer<D>, source: &[u8]) -> usize {
    let dst = buffer.as_mut_slice();
    let len = source.len().min(dst.len());
    dst[..len].copy_from_slice(&source[..len]);

    if source.len() > len {
        debug!("Source is {} bytes, truncated to buffer size {}", source.len(), len);
    }
    len
}

/// Set every byte of `buffer` to `value`
pub fn fill<D: KmsDevice + ?Sized>(buffer: &mut PixelBuffer<D>, value: u8) {
    buffer.as_mut_slice().fill(value);
}

/// Stream `reader` into the start of `buffer` until either runs out.
///
/// Never reads more than the buffer can hold.
pub fn copy_from<D: KmsDevice + ?Sized, R: Read>(buffer: &mut PixelBuffer<D>, reader: &mut R) -> io::Result<usize> {
    let dst = buffer.as_mut_slice();
    let mut filled = 0;

    while filled < dst.len() {
        match reader.read(&mut dst[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
