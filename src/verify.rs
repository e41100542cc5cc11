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

    src/verify.rs

    Sequential readability check and content hash of an image file (C13).
    `verify_image` pre-checks against the sidecar's expected allocated
    bytes before touching the file at all.
*/

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::sidecar::ImageSidecar;
use crate::{ChronosError, ChronosResult};

const CHUNK: usize = 2 * 1024 * 1024;
const UNDERSIZED_RATIO: f64 = 0.75;

/// Reads `path` sequentially end-to-end. Succeeds if EOF is reached
/// without a read error; an empty or missing file fails.
pub fn verify_image(path: &Path) -> ChronosResult<()> {
    let metadata = std::fs::metadata(path)?;
    let file_size = metadata.len();

    if let Some(sidecar) = ImageSidecar::load(path) {
        let expected = sidecar.expected_allocated_bytes();
        if expected > 0 {
            let ratio = file_size as f64 / expected as f64;
            if ratio < UNDERSIZED_RATIO {
                return Err(ChronosError::ImageUndersized { actual: file_size, expected });
            }
        }
    }

    if file_size == 0 {
        return Err(ChronosError::ImageUndersized { actual: 0, expected: 1 });
    }

    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(ChronosError::from)?;
        if n == 0 {
            break;
        }
    }
    Ok(())
}

/// SHA-256 over the file bytes, hex-encoded lowercase.
pub fn compute_hash(path: &Path) -> ChronosResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(ChronosError::from)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_succeeds_on_plain_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::write(&path, vec![7u8; 4096]).unwrap();
        verify_image(&path).unwrap();
    }

    #[test]
    fn verify_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, []).unwrap();
        let err = verify_image(&path).unwrap_err();
        assert!(matches!(err, ChronosError::ImageUndersized { .. }));
    }

    #[test]
    fn verify_rejects_file_far_smaller_than_sidecar_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.vhdx");
        std::fs::write(&path, vec![1u8; 100]).unwrap();

        let mut sidecar = ImageSidecar::from_disk(
            &crate::enumerate::DiskIdentity {
                index: 0,
                model: "T".into(),
                serial: "S".into(),
                size: 10_000,
                sector_size: 512,
                flags: crate::enumerate::DiskRoleFlags::empty(),
            },
            &[],
            512,
        );
        sidecar.set_expected_allocated_bytes(10_000);
        sidecar.save(&path).unwrap();

        let err = verify_image(&path).unwrap_err();
        assert!(matches!(err, ChronosError::ImageUndersized { actual: 100, expected: 10_000 }));
    }

    #[test]
    fn compute_hash_is_stable_and_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::write(&path, b"abc").unwrap();
        let hash = compute_hash(&path).unwrap();
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
