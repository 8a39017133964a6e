//! Artifact checks
//!
//! All functions are blocking; the pipeline runs them off the async runtime.

use crate::error::{DownloadError, IoError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Compare the downloaded byte count with the advertised size
pub fn check_size(expected: Option<u64>, actual: u64) -> Result<(), DownloadError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(DownloadError::SizeMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Lowercase hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String, IoError> {
    let file = File::open(path).map_err(|e| IoError::generic(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| IoError::generic(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare the file hash with the advertised hash, if any
pub fn check_hash(path: &Path, expected: Option<&str>) -> Result<(), DownloadError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(DownloadError::HashMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Copy the entry `entry` of the zip at `archive` to `dest`
pub fn extract_entry(archive: &Path, entry: &str, dest: &Path) -> Result<(), DownloadError> {
    let file = File::open(archive).map_err(|e| IoError::generic(archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive, e))?;

    let mut inner = match zip.by_name(entry) {
        Ok(inner) => inner,
        Err(ZipError::FileNotFound) => {
            return Err(DownloadError::MissingArchiveEntry {
                path: archive.to_path_buf(),
                entry: entry.to_string(),
            })
        }
        Err(e) => return Err(corrupt(archive, e)),
    };

    let mut out = File::create(dest).map_err(|e| IoError::generic(dest, e))?;
    io::copy(&mut inner, &mut out).map_err(|e| IoError::generic(dest, e))?;
    out.sync_all().map_err(|e| IoError::generic(dest, e))?;
    Ok(())
}

/// An Android package is a zip archive; anything else is corrupt
pub fn check_package(path: &Path) -> Result<(), DownloadError> {
    let file = File::open(path).map_err(|e| IoError::generic(path, e))?;
    let zip = ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(path, e))?;
    if zip.is_empty() {
        return Err(DownloadError::CorruptArtifact {
            path: path.to_path_buf(),
            message: "archive has no entries".to_string(),
        });
    }
    Ok(())
}

fn corrupt(path: &Path, e: ZipError) -> DownloadError {
    DownloadError::CorruptArtifact {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
