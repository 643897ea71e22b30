//! Building `tar.gz` archives of local bare mirrors.
//!
//! The archive is materialized into a temp file that is deleted on drop,
//! which covers success, error, and cancellation paths alike. Content
//! hashes are computed from the finished compressed stream so the backend
//! can suppress uploads of unchanged repositories.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use md5::Md5;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use gitvault_core::error::{Result, VaultError};

/// A finished archive awaiting upload. The temp file disappears when this
/// value is dropped.
#[derive(Debug)]
pub struct BuiltArchive {
    pub file: NamedTempFile,
    pub size: u64,
    pub sha256_hex: String,
    pub md5_base64: String,
}

/// Pack the contents of `source_dir` (no base directory) into a gzipped
/// tarball and hash the result.
pub fn build_tar_gz(source_dir: &Path) -> Result<BuiltArchive> {
    if !source_dir.is_dir() {
        return Err(VaultError::Storage(format!(
            "archive source '{}' is not a directory",
            source_dir.display()
        )));
    }

    let file = NamedTempFile::new()?;
    let encoder = GzEncoder::new(file.as_file(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source_dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.flush()?;

    let (size, sha256_hex, md5_base64) = hash_file(file.path())?;
    Ok(BuiltArchive {
        file,
        size,
        sha256_hex,
        md5_base64,
    })
}

fn hash_file(path: &Path) -> Result<(u64, String, String)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut sha256 = Sha256::new();
    let mut md5 = Md5::new();
    let mut size = 0u64;
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sha256.update(&buf[..n]);
        md5.update(&buf[..n]);
        size += n as u64;
    }

    Ok((
        size,
        hex::encode(sha256.finalize()),
        BASE64.encode(md5.finalize()),
    ))
}
