//! HTTP surface of the application.
//!
//! Thin glue only: each route resolves the request language, invokes one
//! engine operation on a request-scoped connection and serializes the
//! result. Status codes map 1:1 from the error kind.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::config::{Config, DEFAULT_LANG};
use crate::engine::{assoc, delete, merge, registry, UpdateOutcome};
use crate::error::{AppError, Result};
use crate::i18n::{self, Resources};
use crate::media;
use crate::store::Store;
use crate::translate::{self, TagEntry};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Store,
}

/// Run the HTTP server until interrupted.
pub async fn serve(cfg: Config) -> anyhow::Result<()> {
    let store = Store::new(&cfg.database);
    store.ensure_schema()?;
    info!(
        "Catalog ready at {}: {} images, {} tags",
        store.path().display(),
        store.image_count()?,
        store.tag_count()?
    );

    let bind = cfg.bind;
    let state = AppState {
        cfg: Arc::new(cfg),
        store,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
}

pub fn router(state: AppState) -> Router {
    let assets = ServeDir::new(state.cfg.static_folder.clone());
    Router::new()
        .route("/images", get(images))
        .route("/loadImage", get(load_image))
        .route("/tags", get(tags))
        .route("/imageTags", get(image_tags))
        .route("/searchImages", post(search_images))
        .route("/addTag", post(add_tag))
        .route("/toggleTags", post(toggle_tags))
        .route("/tagInfo", get(tag_info))
        .route("/updateTag", post(update_tag))
        .route("/deDuplicate", post(de_duplicate))
        .route("/deleteTags", post(delete_tags))
        .route("/latest", get(latest))
        .route("/translateTags", post(translate_tags))
        .route("/health", get(|| async { "OK" }))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request context and response plumbing

/// Per-request language and localized strings for one endpoint.
struct RequestContext {
    lang: String,
    resources: Resources,
}

fn context(state: &AppState, endpoint: &str, headers: &HeaderMap) -> RequestContext {
    let accept = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());
    let lang = i18n::resolve_lang(accept);
    let resources = i18n::load(&state.cfg.resources_folder, endpoint, &lang);
    RequestContext { lang, resources }
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Integrity { .. } | AppError::Operational { .. } | AppError::Upstream { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn content_language(ctx: &RequestContext) -> HeaderValue {
    HeaderValue::from_str(&ctx.lang).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_LANG))
}

fn json_response<T: serde::Serialize>(ctx: &RequestContext, status: StatusCode, body: T) -> Response {
    let mut resp = (status, Json(body)).into_response();
    resp.headers_mut()
        .insert(header::CONTENT_LANGUAGE, content_language(ctx));
    resp
}

fn error_response(ctx: &RequestContext, err: &AppError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Request failed: {err:#}");
    }
    let (category, key) = err.message_key();
    json_response(
        ctx,
        status,
        json!({
            "error": { "code": status.as_u16(), "name": err.kind() },
            "reason": ctx.resources.message(category, key),
        }),
    )
}

fn respond<T: serde::Serialize>(ctx: &RequestContext, result: Result<T>) -> Response {
    match result {
        Ok(body) => json_response(ctx, StatusCode::OK, body),
        Err(err) => error_response(ctx, &err),
    }
}

/// Run a store operation on a request-scoped connection off the async
/// worker threads.
async fn with_conn<T, F>(store: &Store, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = store.connect()?;
        op(&mut conn)
    })
    .await
    .map_err(|_| AppError::operational("worker_failed"))?
}

/// Decode a JSON-encoded form field into whatever the operation expects.
fn parse_json_field<T: serde::de::DeserializeOwned>(raw: Option<&str>) -> Result<T> {
    let raw = raw.ok_or_else(|| AppError::validation("missing_tag_list"))?;
    serde_json::from_str(raw).map_err(|_| AppError::validation("malformed_tag_list"))
}

fn parse_id(raw: Option<&str>, missing: &'static str) -> Result<i64> {
    let raw = raw.ok_or_else(|| AppError::validation(missing))?;
    raw.trim()
        .parse()
        .map_err(|_| AppError::validation("malformed_tag_id"))
}

// ---------------------------------------------------------------------------
// Handlers

/// Lists all the images in the configured folder.
async fn images(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = context(&state, "images", &headers);
    let folder = state.cfg.images_folder.clone();
    let result = tokio::task::spawn_blocking(move || media::list_images(&folder))
        .await
        .map_err(|_| AppError::operational("worker_failed"))
        .and_then(|r| r);
    respond(&ctx, result)
}

#[derive(Deserialize)]
struct LoadImageQuery {
    #[serde(rename = "fn")]
    fn_: Option<String>,
    tn: Option<String>,
}

/// Loads and optionally resizes an image, serving it as JPEG.
async fn load_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<LoadImageQuery>,
) -> Response {
    let ctx = context(&state, "load_image", &headers);
    let Some(fn_) = q.fn_.filter(|f| !f.is_empty()) else {
        return error_response(&ctx, &AppError::validation("missing_filename"));
    };
    let thumbnail = q.tn.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("true"));

    let folder = state.cfg.images_folder.clone();
    let result = tokio::task::spawn_blocking(move || media::load_jpeg(&folder, &fn_, thumbnail))
        .await
        .map_err(|_| AppError::operational("worker_failed"))
        .and_then(|r| r);

    match result {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg")),
                // 30 days
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("max-age=2592000"),
                ),
                (header::CONTENT_LANGUAGE, content_language(&ctx)),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => error_response(&ctx, &err),
    }
}

#[derive(Deserialize)]
struct TagsQuery {
    extended: Option<String>,
}

/// Loads the list of tags.
async fn tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<TagsQuery>,
) -> Response {
    let ctx = context(&state, "tags", &headers);
    let extended = q.extended.as_deref() == Some("true");
    let lang = ctx.lang.clone();
    let result = with_conn(&state.store, move |conn| {
        registry::get_tags(conn, &lang, extended)
    })
    .await;
    respond(&ctx, result)
}

#[derive(Deserialize)]
struct ImageTagsQuery {
    #[serde(rename = "fn")]
    fn_: Option<String>,
}

/// Returns the list of tag ids for an image.
async fn image_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ImageTagsQuery>,
) -> Response {
    let ctx = context(&state, "image_tags", &headers);
    let Some(fn_) = q.fn_.filter(|f| !f.is_empty()) else {
        return error_response(&ctx, &AppError::validation("missing_filename"));
    };
    let result = with_conn(&state.store, move |conn| assoc::image_tags(conn, &fn_)).await;
    respond(&ctx, result)
}

#[derive(Deserialize)]
struct TagListForm {
    tags: Option<String>,
}

/// Search images carrying every requested tag.
async fn search_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TagListForm>,
) -> Response {
    let ctx = context(&state, "search_images", &headers);
    let tag_ids: Vec<i64> = match parse_json_field(form.tags.as_deref()) {
        Ok(ids) => ids,
        Err(err) => return error_response(&ctx, &err),
    };
    let result = with_conn(&state.store, move |conn| {
        assoc::search_images(conn, &tag_ids)
    })
    .await;
    respond(&ctx, result)
}

#[derive(Deserialize)]
struct AddTagForm {
    name: Option<String>,
    description: Option<String>,
}

/// Adds a new tag to the list of available tags.
async fn add_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AddTagForm>,
) -> Response {
    let ctx = context(&state, "add_tag", &headers);
    // The tag is owned by the language it was written in, carried by the
    // Content-Language request header.
    let content_lang = headers
        .get(header::CONTENT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_LANG)
        .to_string();

    let result = with_conn(&state.store, move |conn| {
        registry::add_tag(
            conn,
            form.name.as_deref().unwrap_or(""),
            form.description.as_deref(),
            &content_lang,
        )
    })
    .await;

    match result {
        Ok(tag) => json_response(&ctx, StatusCode::CREATED, tag),
        Err(err) => error_response(&ctx, &err),
    }
}

#[derive(Deserialize)]
struct ToggleTagsForm {
    #[serde(rename = "fn")]
    fn_: Option<String>,
    tags: Option<String>,
}

/// Toggle tags for an image.
async fn toggle_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ToggleTagsForm>,
) -> Response {
    let ctx = context(&state, "toggle_tags", &headers);
    let Some(fn_) = form.fn_.filter(|f| !f.is_empty()) else {
        return error_response(&ctx, &AppError::validation("missing_filename"));
    };
    let tag_ids: Vec<i64> = match parse_json_field(form.tags.as_deref()) {
        Ok(ids) => ids,
        Err(err) => return error_response(&ctx, &err),
    };
    let result = with_conn(&state.store, move |conn| {
        assoc::toggle_tags(conn, &fn_, &tag_ids)
    })
    .await;
    respond(&ctx, result)
}

#[derive(Deserialize)]
struct TagInfoQuery {
    tag: Option<String>,
}

/// Returns information on the specified tag.
async fn tag_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<TagInfoQuery>,
) -> Response {
    let ctx = context(&state, "tag_info", &headers);
    let tag_id = match parse_id(q.tag.as_deref(), "missing_tag_id") {
        Ok(id) => id,
        Err(err) => return error_response(&ctx, &err),
    };
    let lang = ctx.lang.clone();
    let result = with_conn(&state.store, move |conn| {
        registry::tag_info(conn, tag_id, &lang)
    })
    .await;
    respond(&ctx, result)
}

#[derive(Deserialize)]
struct UpdateTagForm {
    tag_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

/// Updates a tag's name or description (only fields provided).
async fn update_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<UpdateTagForm>,
) -> Response {
    let ctx = context(&state, "update_tag", &headers);
    let tag_id = match parse_id(form.tag_id.as_deref(), "missing_tag_id") {
        Ok(id) => id,
        Err(err) => return error_response(&ctx, &err),
    };
    let lang = ctx.lang.clone();
    let result = with_conn(&state.store, move |conn| {
        registry::update_tag(
            conn,
            tag_id,
            &lang,
            form.name.as_deref(),
            form.description.as_deref(),
        )
    })
    .await;

    match result {
        Ok(UpdateOutcome::Updated) => {
            json_response(&ctx, StatusCode::OK, json!({ "status": "success" }))
        }
        Ok(UpdateOutcome::NoChanges) => {
            json_response(&ctx, StatusCode::OK, json!({ "status": "no changes" }))
        }
        Err(err) => error_response(&ctx, &err),
    }
}

/// Merge several tags into the first one and remove the redundant ones.
async fn de_duplicate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TagListForm>,
) -> Response {
    let ctx = context(&state, "de_duplicate", &headers);
    let tag_ids: Vec<i64> = match parse_json_field(form.tags.as_deref()) {
        Ok(ids) => ids,
        Err(err) => return error_response(&ctx, &err),
    };
    let result = with_conn(&state.store, move |conn| merge::merge(conn, &tag_ids)).await;

    match result {
        Ok(outcome) => json_response(
            &ctx,
            StatusCode::OK,
            json!({ "status": "success", "kept": outcome.kept, "removed": outcome.removed }),
        ),
        Err(err) => error_response(&ctx, &err),
    }
}

/// Delete the tags specified by the "tags" form field.
async fn delete_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TagListForm>,
) -> Response {
    let ctx = context(&state, "delete_tags", &headers);
    let tag_ids: Vec<i64> = match parse_json_field(form.tags.as_deref()) {
        Ok(ids) => ids,
        Err(err) => return error_response(&ctx, &err),
    };
    let result = with_conn(&state.store, move |conn| {
        delete::delete_tags(conn, &tag_ids)
    })
    .await;

    match result {
        Ok(removed) => json_response(
            &ctx,
            StatusCode::OK,
            json!({ "status": "success", "removed": removed }),
        ),
        Err(err) => error_response(&ctx, &err),
    }
}

/// Returns the latest image that was tagged.
async fn latest(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = context(&state, "latest", &headers);
    let result = with_conn(&state.store, |conn| assoc::latest(conn)).await;
    match result {
        Ok(fn_) => json_response(&ctx, StatusCode::OK, json!({ "fn": fn_ })),
        Err(err) => error_response(&ctx, &err),
    }
}

#[derive(Deserialize)]
struct TranslateForm {
    #[serde(rename = "sourceLang")]
    source_lang: Option<String>,
    #[serde(rename = "destLang")]
    dest_lang: Option<String>,
    tags: Option<String>,
}

/// Translate tags with a language model through the Ollama API.
async fn translate_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TranslateForm>,
) -> Response {
    let ctx = context(&state, "translate_tags", &headers);

    let entries: Vec<TagEntry> = match parse_json_field(form.tags.as_deref()) {
        Ok(entries) => entries,
        Err(err) => return error_response(&ctx, &err),
    };
    let Some(source_lang) = form.source_lang else {
        return error_response(&ctx, &AppError::validation("missing_source_lang"));
    };
    let Some(dest_lang) = form.dest_lang else {
        return error_response(&ctx, &AppError::validation("missing_dest_lang"));
    };

    let translated =
        match translate::request_translations(&state.cfg, &source_lang, &dest_lang, &entries).await
        {
            Ok(translated) => translated,
            Err(err) => return error_response(&ctx, &err),
        };

    let to_persist = translated.clone();
    let result = with_conn(&state.store, move |conn| {
        translate::persist_overrides(conn, &dest_lang, &to_persist)
    })
    .await;

    match result {
        Ok(()) => json_response(
            &ctx,
            StatusCode::OK,
            json!({ "status": "success", "translated": translated }),
        ),
        Err(err) => error_response(&ctx, &err),
    }
}
