//! Packaging of a prebuilt `bootstrap` executable.
//!
//! Every function ships the same executable; the runtime picks the handler
//! unit from the function's configured entry point. Search order for the
//! executable:
//! 1. `$ADS_BOOTSTRAP_PATH`
//! 2. `<artifacts_dir>/bootstrap`
//! 3. `target/lambda/bootstrap/bootstrap` relative to the working directory

use std::path::{Path, PathBuf};

use ads_core::manifest::FunctionSpec;
use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::{ArchiveEntry, CodePayload, PayloadSource, build_archive};

pub const BOOTSTRAP_NAME: &str = "bootstrap";

#[derive(Debug, Clone)]
pub struct ArtifactPackager {
    artifacts_dir: Option<PathBuf>,
}

impl ArtifactPackager {
    pub fn new(artifacts_dir: Option<&Path>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.map(Path::to_path_buf),
        }
    }

    /// Locate the bootstrap executable.
    pub fn locate(&self) -> Result<PathBuf> {
        if let Ok(path) = std::env::var("ADS_BOOTSTRAP_PATH") {
            let candidate = PathBuf::from(&path);
            if candidate.is_file() {
                debug!("Found bootstrap at {} (from ADS_BOOTSTRAP_PATH)", candidate.display());
                return Ok(candidate);
            }
        }

        if let Some(dir) = &self.artifacts_dir {
            let candidate = dir.join(BOOTSTRAP_NAME);
            if candidate.is_file() {
                debug!("Found bootstrap at {} (artifacts dir)", candidate.display());
                return Ok(candidate);
            }
        }

        let default = Path::new("target").join("lambda").join(BOOTSTRAP_NAME).join(BOOTSTRAP_NAME);
        if default.is_file() {
            debug!("Found bootstrap at {} (default build output)", default.display());
            return Ok(default);
        }

        bail!(
            "bootstrap executable not found.\n\
             \n\
             Build it for the function runtime, e.g.:\n\
             \n\
             \x20 cargo lambda build --release -p ads-lambda\n\
             \n\
             or set [functions].artifacts_dir / ADS_BOOTSTRAP_PATH."
        )
    }
}

impl PayloadSource for ArtifactPackager {
    fn package(&self, function: &FunctionSpec) -> Result<CodePayload> {
        let path = self.locate()?;
        let contents =
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let bytes = build_archive(&[ArchiveEntry {
            name: BOOTSTRAP_NAME,
            contents: &contents,
            executable: true,
        }])?;
        let payload = CodePayload::from_bytes(bytes);
        info!(
            function = %function.name,
            size = payload.size_bytes(),
            sha256 = %payload.sha256,
            "packaged function code"
        );
        Ok(payload)
    }
}
