use std::path::Path;

use ads_core::{HandlerKind, HttpMethod, Manifest};
use anyhow::Result;
use serde_json::{Value, json};

use crate::Format;

pub fn routes(config_path: &Path, base_url: &str, format: Format) -> Result<()> {
    let config = super::load_config(config_path)?;
    let manifest = Manifest::classifieds(&config);
    let stage_url = stage_base(&manifest, base_url);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&route_table(&manifest, &stage_url))?),
        Format::Text => print!("{}", format_routes(&manifest, &stage_url)),
    }
    Ok(())
}

/// Sample request body for handlers that take one.
fn sample_body(kind: HandlerKind) -> Option<Value> {
    match kind {
        HandlerKind::CreateAd => Some(json!({"titulo": "Bicicleta", "descripcion": "Roja, poco uso"})),
        HandlerKind::CreateComment => Some(json!({"usuario": "ana", "mensaje": "¿Sigue disponible?"})),
        _ => None,
    }
}

fn curl_example(base: &str, method: HttpMethod, path: &str, body: Option<&Value>) -> String {
    let url = format!("{base}{}", path.replace("{id}", "<id>"));
    match (method, body) {
        (HttpMethod::Get, _) | (_, None) => format!("curl -s {url}"),
        (_, Some(body)) => format!(
            "curl -s -X {} {url} -H 'Content-Type: application/json' -d '{body}'",
            method.as_str()
        ),
    }
}

pub(crate) fn stage_base(manifest: &Manifest, base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), manifest.api.stage)
}

/// One JSON row per binding; `stage_url` already ends in the stage name.
fn route_table(manifest: &Manifest, stage_url: &str) -> Vec<Value> {
    let base = stage_url.trim_end_matches('/');
    manifest
        .methods
        .iter()
        .map(|m| {
            let body = manifest.function(&m.function).and_then(|f| sample_body(f.handler));
            json!({
                "method": m.method.as_str(),
                "path": m.path,
                "function": m.function,
                "example": curl_example(base, m.method, &m.path, body.as_ref()),
            })
        })
        .collect()
}

pub(crate) fn format_routes(manifest: &Manifest, stage_url: &str) -> String {
    let base = stage_url.trim_end_matches('/');
    let mut out = format!("API {} (stage {})\n\n", manifest.api.name, manifest.api.stage);
    for m in &manifest.methods {
        out.push_str(&format!("  {:<7} {:<28} → {}\n", m.method.as_str(), m.path, m.function));
    }
    out.push_str("\nExamples:\n");
    for m in &manifest.methods {
        let body = manifest.function(&m.function).and_then(|f| sample_body(f.handler));
        out.push_str(&format!("  {}\n", curl_example(base, m.method, &m.path, body.as_ref())));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ads_core::AdsConfig;

    #[test]
    fn every_binding_is_listed_with_an_example() {
        let manifest = Manifest::classifieds(&AdsConfig::minimal("t"));
        let table = route_table(&manifest, &stage_base(&manifest, "http://localhost:3000/"));
        assert_eq!(table.len(), 5);

        let create = table.iter().find(|r| r["function"] == "createAd").unwrap();
        let example = create["example"].as_str().unwrap();
        assert!(example.starts_with("curl -s -X POST http://localhost:3000/prod/listings"));
        assert!(example.contains("titulo"));

        let get = table.iter().find(|r| r["function"] == "getAd").unwrap();
        assert_eq!(get["example"], "curl -s http://localhost:3000/prod/listings/<id>");
    }

    #[test]
    fn text_output_names_api_and_stage() {
        let manifest = Manifest::classifieds(&AdsConfig::minimal("t"));
        let text = format_routes(&manifest, &stage_base(&manifest, "http://localhost:3000"));
        assert!(text.starts_with("API ClassifiedsAPI (stage prod)"));
        assert!(text.contains("/listings/{id}/comments"));
    }
}
