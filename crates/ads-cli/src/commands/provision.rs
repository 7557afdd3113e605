//! `adsctl provision`: run the provisioner against a target control plane.

use std::path::Path;
use std::sync::Arc;

use ads_aws::AwsCloud;
use ads_core::{AdsConfig, Manifest, arn};
use ads_pack::{ArtifactPackager, DescriptorPackager, PayloadSource};
use ads_provision::{ControlPlane, LocalCloud, ProvisionSettings, Provisioner, RunReport, RunStatus};
use ads_state::StateStore;
use anyhow::{Context, Result};
use tracing::info;

use super::routes::{format_routes, stage_base};
use crate::Target;

/// Provision and print the run summary. Returns the process exit code.
pub async fn provision(config_path: &Path, target: Target, state: &Path, strict: bool) -> Result<i32> {
    let config = super::load_config(config_path)?;
    let report = run(&config, target, state).await?;

    print!("{}", summary(&report, &Manifest::classifieds(&config), target));
    Ok(report.exit_code(strict))
}

/// The report followed by either a resume hint (aborted) or the stage URL,
/// the route surface and example invocations.
fn summary(report: &RunReport, manifest: &Manifest, target: Target) -> String {
    let mut out = format!("{report}\n");
    if let RunStatus::Aborted { .. } = report.status() {
        out.push_str("Re-run `adsctl provision` once the cause is fixed; finished steps are kept.\n");
        return out;
    }
    let Some(api_id) = &report.api_id else {
        return out;
    };

    let stage_url = match target {
        Target::Local => {
            out.push_str(&format!(
                "Stage {} deployed locally. Serve it with `adsctl serve`.\n",
                manifest.api.stage
            ));
            stage_base(manifest, &format!("http://{}", super::DEFAULT_LISTEN))
        }
        Target::Aws => arn::stage_url(api_id, &manifest.region, &manifest.api.stage),
    };
    out.push_str(&format!("Stage URL: {stage_url}\n\n"));
    out.push_str(&format_routes(manifest, &stage_url));
    out
}

/// Run the provisioner for `config` against `target`.
pub async fn run(config: &AdsConfig, target: Target, state: &Path) -> Result<RunReport> {
    let manifest = Manifest::classifieds(config);
    let settings = ProvisionSettings::from_config(config)?;
    info!(
        project = %config.project.name,
        region = %manifest.region,
        ?target,
        "provisioning"
    );

    let (plane, payloads): (ControlPlane, Arc<dyn PayloadSource>) = match target {
        Target::Local => {
            let store = open_state(state)?;
            let cloud = Arc::new(LocalCloud::new(store, &manifest.region));
            (ControlPlane::unified(cloud), Arc::new(DescriptorPackager))
        }
        Target::Aws => {
            let cloud = Arc::new(AwsCloud::connect(&manifest.region, config.endpoint_url()).await);
            (
                ControlPlane::unified(cloud),
                Arc::new(ArtifactPackager::new(config.artifacts_dir())),
            )
        }
    };

    Ok(Provisioner::new(plane, payloads, manifest, settings).run().await)
}

/// Open (creating if needed) the local control-plane state file.
pub fn open_state(path: &Path) -> Result<StateStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating state directory {}", parent.display()))?;
    }
    StateStore::open(path).with_context(|| format!("opening state file {}", path.display()))
}
