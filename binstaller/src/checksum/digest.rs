//! Multi-algorithm digest dispatch.
//!
//! Mirrors the generated scripts' `hash_compute` helpers: the same four
//! algorithms, the same lowercase-hex output, so hashes computed here are
//! directly comparable with what the script computes at install time.

use std::io::Read;

use binstaller_schema::ChecksumAlgorithm;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::errors::BinstallResult;

fn digest_to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::new(), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn hash_reader_with<D: Digest>(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(digest_to_hex(&hasher.finalize()))
}

/// Hash a byte stream, returning lowercase hex
pub fn hash_reader(
    algorithm: ChecksumAlgorithm,
    reader: impl Read,
) -> BinstallResult<String> {
    let hex = match algorithm {
        ChecksumAlgorithm::Sha256 => hash_reader_with::<Sha256>(reader)?,
        ChecksumAlgorithm::Sha512 => hash_reader_with::<Sha512>(reader)?,
        ChecksumAlgorithm::Sha1 => hash_reader_with::<Sha1>(reader)?,
        ChecksumAlgorithm::Md5 => hash_reader_with::<Md5>(reader)?,
    };
    Ok(hex)
}

/// Hash an in-memory buffer, returning lowercase hex
pub fn hash_bytes(algorithm: ChecksumAlgorithm, bytes: &[u8]) -> String {
    hash_reader(algorithm, bytes).expect("reading from a slice cannot fail")
}
