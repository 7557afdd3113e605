//! The five handler units.

use std::collections::BTreeMap;
use std::sync::Arc;

use ads_core::HandlerKind;
use ads_core::manifest::{COMMENTS_TABLE_ENV, LISTINGS_TABLE_ENV, Manifest, TableSpec};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error};

use crate::contract::{HandlerRequest, HandlerResponse};
use crate::store::{Item, ItemStore};

const DEFAULT_TITLE: &str = "Sin título";
const DEFAULT_DESCRIPTION: &str = "Sin descripción";

/// Which tables the handlers read and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub listings: TableSpec,
    pub comments: TableSpec,
}

impl TableLayout {
    pub fn new(listings: &str, comments: &str) -> Self {
        Self {
            listings: TableSpec::listings(listings),
            comments: TableSpec::comments(comments),
        }
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        manifest
            .functions
            .first()
            .map(|f| Self::from_vars(&f.environment))
            .unwrap_or_else(|| Self::from_vars(&BTreeMap::new()))
    }

    /// Table names from a function's environment variables.
    pub fn from_vars(vars: &BTreeMap<String, String>) -> Self {
        let listings = vars.get(LISTINGS_TABLE_ENV).map(String::as_str).unwrap_or("Listings");
        let comments = vars.get(COMMENTS_TABLE_ENV).map(String::as_str).unwrap_or("Comments");
        Self::new(listings, comments)
    }

    /// Table names from the function environment, with the default names as fallback.
    pub fn from_env() -> Self {
        let listings = std::env::var(LISTINGS_TABLE_ENV).unwrap_or_else(|_| "Listings".to_string());
        let comments = std::env::var(COMMENTS_TABLE_ENV).unwrap_or_else(|_| "Comments".to_string());
        Self::new(&listings, &comments)
    }
}

/// Everything a handler needs besides the request.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: Arc<dyn ItemStore>,
    pub tables: TableLayout,
}

impl HandlerContext {
    pub fn new(store: Arc<dyn ItemStore>, tables: TableLayout) -> Self {
        Self { store, tables }
    }
}

/// Dispatch a request to the handler unit `kind`.
pub async fn invoke(kind: HandlerKind, ctx: &HandlerContext, req: HandlerRequest) -> HandlerResponse {
    debug!(handler = %kind, "invoking handler");
    match kind {
        HandlerKind::ListAds => list_ads(ctx).await,
        HandlerKind::CreateAd => create_ad(ctx, &req).await,
        HandlerKind::GetAd => get_ad(ctx, &req).await,
        HandlerKind::ListComments => list_comments(ctx, &req).await,
        HandlerKind::CreateComment => create_comment(ctx, &req).await,
    }
}

/// `createAd`: store a listing with a fresh id.
pub async fn create_ad(ctx: &HandlerContext, req: &HandlerRequest) -> HandlerResponse {
    let data = match req.body_object() {
        Ok(data) => data,
        Err(msg) => return HandlerResponse::error(400, &msg),
    };

    let mut listing = Item::new();
    listing.insert("id".into(), Value::String(new_id()));
    listing.insert(
        "titulo".into(),
        data.get("titulo").cloned().unwrap_or_else(|| DEFAULT_TITLE.into()),
    );
    listing.insert(
        "descripcion".into(),
        data.get("descripcion")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.into()),
    );

    match ctx.store.put_item(&ctx.tables.listings, listing.clone()).await {
        Ok(()) => HandlerResponse::ok(&listing),
        Err(e) => {
            error!(error = %e, "failed to store listing");
            HandlerResponse::error(500, &e.to_string())
        }
    }
}

/// `getAd`: fetch one listing by path id.
pub async fn get_ad(ctx: &HandlerContext, req: &HandlerRequest) -> HandlerResponse {
    let Some(id) = req.path_param("id") else {
        return HandlerResponse::error(400, "listing id was not provided");
    };
    match ctx.store.get_item(&ctx.tables.listings, id).await {
        Ok(Some(listing)) => HandlerResponse::ok(&listing),
        Ok(None) => HandlerResponse::error(404, "listing not found"),
        Err(e) => HandlerResponse::error(500, &e.to_string()),
    }
}

/// `listAds`: the whole listings table.
pub async fn list_ads(ctx: &HandlerContext) -> HandlerResponse {
    match ctx.store.scan(&ctx.tables.listings).await {
        Ok(listings) => HandlerResponse::ok(&listings),
        Err(e) => HandlerResponse::error(500, &e.to_string()),
    }
}

/// `listComments`: every comment on the listing named by the path id.
pub async fn list_comments(ctx: &HandlerContext, req: &HandlerRequest) -> HandlerResponse {
    let Some(id) = req.path_param("id") else {
        return HandlerResponse::error(400, "listing id was not provided");
    };
    match ctx.store.query_partition(&ctx.tables.comments, id).await {
        Ok(comments) => HandlerResponse::ok(&comments),
        Err(e) => HandlerResponse::error(500, &e.to_string()),
    }
}

/// `createComment`: store a comment on the listing named by the path id.
pub async fn create_comment(ctx: &HandlerContext, req: &HandlerRequest) -> HandlerResponse {
    let Some(listing_id) = req.path_param("id") else {
        return HandlerResponse::error(400, "listing id was not provided");
    };
    let data = match req.body_object() {
        Ok(data) => data,
        Err(msg) => return HandlerResponse::error(400, &msg),
    };

    let field = |name: &str| {
        data.get(name)
            .filter(|v| !v.is_null() && v.as_str() != Some(""))
            .cloned()
    };
    let (Some(usuario), Some(mensaje)) = (field("usuario"), field("mensaje")) else {
        return HandlerResponse::error(400, "usuario and mensaje are required");
    };

    let mut comment = Item::new();
    comment.insert("listing_id".into(), Value::String(listing_id.to_string()));
    comment.insert("comment_id".into(), Value::String(new_id()));
    comment.insert("usuario".into(), usuario);
    comment.insert("mensaje".into(), mensaje);
    comment.insert(
        "fecha".into(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );

    match ctx.store.put_item(&ctx.tables.comments, comment.clone()).await {
        Ok(()) => HandlerResponse::ok(&comment),
        Err(e) => {
            error!(error = %e, %listing_id, "failed to store comment");
            HandlerResponse::error(500, &e.to_string())
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryItemStore;
    use serde_json::json;

    fn ctx() -> HandlerContext {
        HandlerContext::new(Arc::new(MemoryItemStore::new()), TableLayout::new("Listings", "Comments"))
    }

    #[tokio::test]
    async fn create_ad_returns_stored_record() {
        let ctx = ctx();
        let req = HandlerRequest::default().body(json!({"titulo": "Bike", "descripcion": "Red bike"}));

        let resp = create_ad(&ctx, &req).await;
        assert_eq!(resp.status_code, 200);
        assert!(resp.body.contains(r#""titulo":"Bike""#));
        assert!(resp.body.contains(r#""descripcion":"Red bike""#));

        let record = resp.json().unwrap();
        let id = record["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());

        let fetched = get_ad(&ctx, &HandlerRequest::with_path_id(id)).await;
        assert_eq!(fetched.status_code, 200);
        assert_eq!(fetched.json().unwrap(), record);
    }

    #[tokio::test]
    async fn create_ad_accepts_string_body_and_fills_defaults() {
        let ctx = ctx();
        let req = HandlerRequest::default().body(json!("{}"));
        let record = create_ad(&ctx, &req).await.json().unwrap();
        assert_eq!(record["titulo"], DEFAULT_TITLE);
        assert_eq!(record["descripcion"], DEFAULT_DESCRIPTION);
    }

    #[tokio::test]
    async fn create_ad_rejects_malformed_body() {
        let req = HandlerRequest::default().body(json!("{oops"));
        assert_eq!(create_ad(&ctx(), &req).await.status_code, 400);
    }

    #[tokio::test]
    async fn get_ad_without_id_is_bad_request() {
        let resp = get_ad(&ctx(), &HandlerRequest::default()).await;
        assert_eq!(resp.status_code, 400);
        assert!(resp.json().unwrap()["error"].is_string());
    }

    #[tokio::test]
    async fn get_ad_unknown_id_is_not_found() {
        let resp = get_ad(&ctx(), &HandlerRequest::with_path_id("missing")).await;
        assert_eq!(resp.status_code, 404);
    }

    #[tokio::test]
    async fn list_ads_returns_everything() {
        let ctx = ctx();
        for title in ["a", "b"] {
            create_ad(&ctx, &HandlerRequest::default().body(json!({"titulo": title}))).await;
        }
        let resp = list_ads(&ctx).await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.json().unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn comments_round_trip_per_listing() {
        let ctx = ctx();
        let req = HandlerRequest::with_path_id("L1").body(json!({"usuario": "ana", "mensaje": "hola"}));
        let created = create_comment(&ctx, &req).await;
        assert_eq!(created.status_code, 200);
        let record = created.json().unwrap();
        assert_eq!(record["listing_id"], "L1");
        assert!(record["comment_id"].is_string());
        assert!(record["fecha"].as_str().unwrap().ends_with('Z'));

        let listed = list_comments(&ctx, &HandlerRequest::with_path_id("L1")).await;
        assert_eq!(listed.json().unwrap().as_array().unwrap().len(), 1);

        let other = list_comments(&ctx, &HandlerRequest::with_path_id("L2")).await;
        assert_eq!(other.status_code, 200);
        assert_eq!(other.json().unwrap(), json!([]));
    }

    #[tokio::test]
    async fn create_comment_requires_id_and_fields() {
        let ctx = ctx();
        let no_id = HandlerRequest::default().body(json!({"usuario": "ana", "mensaje": "hola"}));
        assert_eq!(create_comment(&ctx, &no_id).await.status_code, 400);

        let no_msg = HandlerRequest::with_path_id("L1").body(json!({"usuario": "ana"}));
        assert_eq!(create_comment(&ctx, &no_msg).await.status_code, 400);

        let empty_user = HandlerRequest::with_path_id("L1").body(json!({"usuario": "", "mensaje": "x"}));
        assert_eq!(create_comment(&ctx, &empty_user).await.status_code, 400);
    }

    #[tokio::test]
    async fn list_comments_without_id_is_bad_request() {
        assert_eq!(list_comments(&ctx(), &HandlerRequest::default()).await.status_code, 400);
    }

    #[tokio::test]
    async fn invoke_dispatches_by_kind() {
        let ctx = ctx();
        let resp = invoke(HandlerKind::ListAds, &ctx, HandlerRequest::default()).await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, "[]");
    }

    #[test]
    fn layout_follows_manifest_table_names() {
        let mut config = ads_core::AdsConfig::minimal("t");
        config.tables = Some(ads_core::config::TablesConfig {
            listings: Some("Anuncios".to_string()),
            comments: None,
        });
        let layout = TableLayout::from_manifest(&Manifest::classifieds(&config));
        assert_eq!(layout.listings.name, "Anuncios");
        assert_eq!(layout.comments.name, "Comments");
    }
}
