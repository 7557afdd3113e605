//! ads pack: package function code as deployable payloads.
//!
//! A payload is a zip archive plus the SHA-256 of the archive bytes. Archives
//! are deterministic (fixed timestamps and permissions) so that unchanged
//! code yields an unchanged digest, which lets the provisioner skip code
//! updates that would be no-ops.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use ads_core::manifest::FunctionSpec;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;

pub mod artifact;
pub mod descriptor;

pub use artifact::ArtifactPackager;
pub use descriptor::DescriptorPackager;

/// Packaged code for one function, treated as opaque by the provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePayload {
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
}

impl CodePayload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let sha256 = sha256_hex(&bytes);
        Self { bytes, sha256 }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Write the archive as `<dir>/<name>.zip` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        let path = dir.join(format!("{name}.zip"));
        std::fs::write(&path, &self.bytes)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

/// Produces the code payload for a function.
pub trait PayloadSource: Send + Sync {
    fn package(&self, function: &FunctionSpec) -> Result<CodePayload>;
}

/// A file to place in an archive.
pub(crate) struct ArchiveEntry<'a> {
    pub name: &'a str,
    pub contents: &'a [u8],
    pub executable: bool,
}

/// Build a deterministic zip archive from the given entries.
pub(crate) fn build_archive(entries: &[ArchiveEntry<'_>]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        let mode = if entry.executable { 0o755 } else { 0o644 };
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(mode);
        writer
            .start_file(entry.name, options)
            .with_context(|| format!("adding {} to archive", entry.name))?;
        writer.write_all(entry.contents)?;
    }
    let cursor = writer.finish().context("finalizing archive")?;
    Ok(cursor.into_inner())
}

/// Compute SHA-256 of a byte slice and return the hex digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
