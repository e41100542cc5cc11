/*
    chronos-core
    https://github.com/dbalsom/chronos-backup

    Copyright 2026 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/codec.rs

    Streaming compressor/decompressor with a configurable effort level
    (C6). Grounded on `src/containers/gzip.rs`'s use of `flate2` for the
    same concern.
*/

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::progress::CancelHandle;
use crate::{ChronosError, ChronosResult};

/// The lowest published compression level. `0` is reserved by callers to
/// mean "do not engage the codec" and is never passed to [`compress`].
pub const MIN_LEVEL: u32 = 1;
/// The highest published compression level.
pub const MAX_LEVEL: u32 = 9;

const WORKING_BUFFER: usize = 256 * 1024;

/// Streams `in_stream` through the compressor at `level` (`1..=9`) into
/// `out_stream`, checking `cancel` at each working-buffer boundary.
pub fn compress<R: Read, W: Write>(mut in_stream: R, out_stream: W, level: u32, cancel: &CancelHandle) -> ChronosResult<u64> {
    if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        return Err(ChronosError::InvalidParameter(format!("compression level {level} outside {MIN_LEVEL}..={MAX_LEVEL}")));
    }
    let mut encoder = ZlibEncoder::new(out_stream, Compression::new(level));
    let mut buf = vec![0u8; WORKING_BUFFER];
    let mut total = 0u64;
    loop {
        cancel.check()?;
        let n = in_stream.read(&mut buf).map_err(ChronosError::from)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n]).map_err(ChronosError::from)?;
        total += n as u64;
    }
    encoder.finish().map_err(ChronosError::from)?;
    log::debug!("codec: compressed {total} bytes at level {level}");
    Ok(total)
}

/// Streams `in_stream` through the decompressor into `out_stream`.
pub fn decompress<R: Read, W: Write>(in_stream: R, mut out_stream: W, cancel: &CancelHandle) -> ChronosResult<u64> {
    let mut decoder = ZlibDecoder::new(in_stream);
    let mut buf = vec![0u8; WORKING_BUFFER];
    let mut total = 0u64;
    loop {
        cancel.check()?;
        let n = read_full(&mut decoder, &mut buf)?;
        if n == 0 {
            break;
        }
        out_stream.write_all(&buf[..n]).map_err(ChronosError::from)?;
        total += n as u64;
    }
    log::debug!("codec: decompressed {total} bytes");
    Ok(total)
}

fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    match r.read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => read_full(r, buf),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_preserves_content() {
        let cancel = CancelHandle::new();
        let original = b"the quick brown fox jumps over the lazy dog".repeat(4096);
        let mut compressed = Vec::new();
        compress(Cursor::new(&original), &mut compressed, 6, &cancel).unwrap();
        assert!(compressed.len() < original.len());

        let mut decompressed = Vec::new();
        decompress(Cursor::new(&compressed), &mut decompressed, &cancel).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn level_zero_is_rejected_by_the_codec() {
        let cancel = CancelHandle::new();
        let mut out = Vec::new();
        let err = compress(Cursor::new(b"data"), &mut out, 0, &cancel).unwrap_err();
        assert!(matches!(err, ChronosError::InvalidParameter(_)));
    }

    #[test]
    fn cancellation_is_observed_mid_stream() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let mut out = Vec::new();
        let err = compress(Cursor::new(vec![0u8; WORKING_BUFFER * 4]), &mut out, 6, &cancel).unwrap_err();
        assert!(matches!(err, ChronosError::Cancelled));
    }
}
