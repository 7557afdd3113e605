use std::path::Path;

use ads_core::Manifest;
use ads_pack::{ArtifactPackager, DescriptorPackager, PayloadSource};
use anyhow::Result;

pub fn pack(config_path: &Path, out: &Path, local: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let manifest = Manifest::classifieds(&config);
    let packager: Box<dyn PayloadSource> = if local {
        Box::new(DescriptorPackager)
    } else {
        Box::new(ArtifactPackager::new(config.artifacts_dir()))
    };

    for function in &manifest.functions {
        match packager.package(function) {
            Ok(payload) => {
                let path = payload.write_to(out, &function.name)?;
                println!("✓ {} ({:.1} KB)", function.name, payload.size_bytes() as f64 / 1024.0);
                println!("  Output: {}", path.display());
                println!("  SHA256: {}", payload.sha256);
            }
            Err(e) => {
                eprintln!("Pack failed for {}: {e}", function.name);
                return Err(e);
            }
        }
    }
    Ok(())
}
