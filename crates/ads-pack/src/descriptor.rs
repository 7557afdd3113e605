//! Descriptor payloads for the local control plane.
//!
//! The local gateway runs handler units in-process, so a function's payload
//! only needs to identify which unit it carries. The archive holds a single
//! `handler.json` naming the handler and the package version.

use ads_core::manifest::FunctionSpec;
use anyhow::Result;

use crate::{ArchiveEntry, CodePayload, PayloadSource, build_archive};

pub const DESCRIPTOR_NAME: &str = "handler.json";

#[derive(Debug, Clone, Default)]
pub struct DescriptorPackager;

impl PayloadSource for DescriptorPackager {
    fn package(&self, function: &FunctionSpec) -> Result<CodePayload> {
        let descriptor = serde_json::json!({
            "handler": function.handler.name(),
            "version": env!("CARGO_PKG_VERSION"),
        });
        let contents = serde_json::to_vec_pretty(&descriptor)?;
        let bytes = build_archive(&[ArchiveEntry {
            name: DESCRIPTOR_NAME,
            contents: &contents,
            executable: false,
        }])?;
        Ok(CodePayload::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ads_core::{AdsConfig, Manifest};

    #[test]
    fn descriptors_differ_per_handler() {
        let manifest = Manifest::classifieds(&AdsConfig::minimal("t"));
        let a = DescriptorPackager.package(&manifest.functions[0]).unwrap();
        let b = DescriptorPackager.package(&manifest.functions[1]).unwrap();
        assert_ne!(a.sha256, b.sha256);
    }

    #[test]
    fn descriptor_is_stable_across_runs() {
        let manifest = Manifest::classifieds(&AdsConfig::minimal("t"));
        let a = DescriptorPackager.package(&manifest.functions[2]).unwrap();
        let b = DescriptorPackager.package(&manifest.functions[2]).unwrap();
        assert_eq!(a, b);
    }
}
