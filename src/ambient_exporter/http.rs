// ambient_exporter - Prometheus metrics exporter for Ambient Weather stations
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::report::{self, Fields, Report};
use crate::translate::Translator;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const REPORT_PATH: &str = "/data/report/";
const OPENMETRICS_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Global state shared between all HTTP requests.
#[derive(Debug)]
pub struct RequestContext {
    registry: Registry,
    translator: Translator,
    verbose: bool,
}

impl RequestContext {
    pub fn new(registry: Registry, translator: Translator, verbose: bool) -> Self {
        RequestContext {
            registry,
            translator,
            verbose,
        }
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }
}

/// Routes for station reports under `/data/report/` and Prometheus scrapes of `/metrics`.
///
/// The router must be served with `into_make_service_with_connect_info::<SocketAddr>()`
/// so that reports can be labeled with the address of the station that sent them.
pub fn app(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(text_metrics))
        .fallback(station_report)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(context)
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(
                message = "encoded prometheus metrics to text format",
                num_bytes = buf.len(),
            );

            ([(CONTENT_TYPE, OPENMETRICS_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Accept a report from a weather station.
///
/// Stations send their readings as a query string, either as a normal query or appended
/// directly to the path (`/data/report/&PASSKEY=...&tempf=...`). The response is sent
/// immediately and the report is translated to metrics in the background.
async fn station_report(
    State(context): State<Arc<RequestContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
) -> StatusCode {
    let rest = match uri.path().strip_prefix(REPORT_PATH) {
        Some(rest) => rest,
        None => return StatusCode::NOT_FOUND,
    };

    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED;
    }

    let remote_address = addr.ip().to_string();
    let query = report_query(rest, uri.query());
    if context.verbose {
        tracing::info!(
            message = "sample submitted",
            remote_address = %remote_address,
            report = %report::redact(&query),
        );
    }

    let (fields, errors) = Fields::parse(&query);
    for e in errors {
        tracing::warn!(
            message = "failed to parse weather observation from request url",
            remote_address = %remote_address,
            error = %e,
        );
    }

    let report = Report::new(remote_address, fields);
    tokio::spawn(async move {
        context
            .translator
            .translate(&report.remote_address, &report.fields);
    });

    StatusCode::NO_CONTENT
}

/// Span for each request with the station PASSKEY masked in the URI.
fn request_span(req: &Request<Body>) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %req.method(),
        uri = %redacted_uri(req.uri()),
        version = ?req.version(),
    )
}

fn redacted_uri(uri: &Uri) -> String {
    match uri.query() {
        Some(q) => format!("{}?{}", report::redact(uri.path()), report::redact(q)),
        None => report::redact(uri.path()),
    }
}

/// Combine the portion of the path after the report prefix with the query string, if any.
fn report_query(rest: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if rest.is_empty() => q.to_owned(),
        Some(q) => format!("{}&{}", rest, q),
        None => rest.to_owned(),
    }
}
