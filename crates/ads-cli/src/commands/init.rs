use std::path::Path;

use ads_core::AdsConfig;
use anyhow::{Result, bail};

pub fn init(path: &Path, name: &str, region: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = AdsConfig::scaffold(name, region);
    std::fs::write(path, config.to_toml_string()?)?;
    println!("✓ Generated {}", path.display());
    Ok(())
}
