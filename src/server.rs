//! HTTP annotation service
//!
//! Thin actix-web surface over the [`DatasetStore`]: one endpoint for
//! single lookups, one for batches, one readiness probe. The handlers do
//! no I/O of their own; each lookup takes a dataset snapshot and runs
//! entirely in memory, so the worker pool serves lookups concurrently
//! while the refresher swaps datasets underneath.

use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::GeoError;
use crate::store::DatasetStore;

/// Query parameters of `GET /annotate`.
#[derive(Debug, Deserialize)]
struct AnnotateQuery {
    ip_addr: String,
}

/// One entry of a `POST /batch_annotate` body.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    ip: String,
}

/// `GET /annotate?ip_addr=X` -> metadata JSON or a typed error status.
async fn annotate(
    store: web::Data<DatasetStore>,
    query: web::Query<AnnotateQuery>,
) -> HttpResponse {
    match store.annotate(&query.ip_addr) {
        Ok(metadata) => HttpResponse::Ok().json(metadata),
        Err(err) => error_response(&err),
    }
}

/// `POST /batch_annotate` with `[{"ip": "..."}]` -> map keyed by query IP.
///
/// Per-entry failures degrade to `null` for that key, matching the
/// one-bad-address-does-not-fail-the-batch contract; an unready store
/// still fails the whole request.
async fn batch_annotate(
    store: web::Data<DatasetStore>,
    body: web::Json<Vec<BatchEntry>>,
) -> HttpResponse {
    if !store.is_ready() {
        return error_response(&GeoError::NotReady);
    }

    let mut results = serde_json::Map::with_capacity(body.len());
    for entry in body.iter() {
        let value = match store.annotate(&entry.ip) {
            Ok(metadata) => serde_json::to_value(metadata).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };
        results.insert(entry.ip.clone(), value);
    }
    HttpResponse::Ok().json(results)
}

/// `GET /healthz` -> readiness of the store.
async fn healthz(store: web::Data<DatasetStore>) -> HttpResponse {
    match store.snapshot() {
        Some(dataset) => HttpResponse::Ok().json(json!({
            "status": "ready",
            "ip4_ranges": dataset.ip4.len(),
            "ip6_ranges": dataset.ip6.len(),
            "locations": dataset.locations.len(),
        })),
        None => HttpResponse::ServiceUnavailable().json(json!({
            "status": "loading",
        })),
    }
}

fn error_response(err: &GeoError) -> HttpResponse {
    let body = json!({ "error": err.to_string() });
    match err {
        GeoError::InvalidQueryIp(_) => HttpResponse::BadRequest().json(body),
        GeoError::NotFound => HttpResponse::NotFound().json(body),
        GeoError::NotReady => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Configure the annotation routes on an actix `App`.
fn routes(config: &mut web::ServiceConfig) {
    config
        .route("/annotate", web::get().to(annotate))
        .route("/batch_annotate", web::post().to(batch_annotate))
        .route("/healthz", web::get().to(healthz));
}

/// Serve the annotation API until the process receives a stop signal.
pub async fn run(store: Arc<DatasetStore>, listen: &str) -> std::io::Result<()> {
    let data = web::Data::from(store);
    info!(listen, "annotation service listening");
    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .bind(listen)?
        .run()
        .await
}
