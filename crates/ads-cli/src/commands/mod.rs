use std::path::Path;

use ads_core::AdsConfig;
use anyhow::{Context, Result, bail};

pub mod init;
pub mod pack;
pub mod provision;
pub mod routes;
pub mod serve;

pub const DEFAULT_STATE_PATH: &str = ".ads/state.redb";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

/// Load classifieds.toml, pointing at `adsctl init` when it is missing.
pub fn load_config(path: &Path) -> Result<AdsConfig> {
    if !path.is_file() {
        bail!(
            "{} not found. Run `adsctl init` to write a scaffold.",
            path.display()
        );
    }
    AdsConfig::from_file(path).with_context(|| format!("parsing {}", path.display()))
}
