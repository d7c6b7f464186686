use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Compress `data` as a zlib-wrapped stream.
pub(crate) fn zlib_deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Streaming inflate. `size_hint` pre-sizes the output buffer when the
/// uncompressed size is known; pass 0 otherwise.
pub(crate) fn zlib_inflate(data: &[u8], size_hint: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size_hint);
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}
