//! SHA-256 of completed artifacts.
//!
//! Hashing runs after a transfer succeeds and before placement, never while
//! the scheduler lock is held.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Normalize a caller-supplied digest: trimmed, lowercase, 64 hex chars.
pub fn normalize_sha256(digest: &str) -> Option<String> {
    let d = digest.trim().to_ascii_lowercase();
    let valid = d.len() == 64 && d.bytes().all(|b| b.is_ascii_hexdigit());
    valid.then_some(d)
}

/// Outcome of comparing a file against an expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch { actual: String },
}

pub fn verify_sha256(path: &Path, expected: &str) -> io::Result<Verification> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(Verification::Match)
    } else {
        Ok(Verification::Mismatch { actual })
    }
}
