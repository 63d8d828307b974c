//! The REST gateway adapter: a thin `axum` router in front of the gRPC
//! service, dialed over an in-process channel.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::{error, info};

use crate::errors::GeoError;
use crate::model::Geolocation;
use crate::rpc::proto::geolocation_service_client::GeolocationServiceClient;
use crate::rpc::proto::GeolocationByIpRequest;
use crate::supervisor::Service as SupervisorService;

/// Header the origin gRPC call can use to override the REST response's
/// HTTP status; stripped before the response is written. Set on the error
/// path by `rpc::status_for` (e.g. invalid-argument overrides the default
/// 400 with 422).
const HTTP_CODE_METADATA_KEY: &str = "x-http-code";

#[derive(Clone)]
struct GatewayState {
    client: GeolocationServiceClient<Channel>,
}

/// The REST gateway listener, bound into the Lifecycle Supervisor.
pub struct RestListener {
    addr: SocketAddr,
    grpc_addr: String,
    shutdown: Option<CancellationToken>,
}

impl RestListener {
    pub fn new(addr: SocketAddr, grpc_addr: impl Into<String>) -> Self {
        RestListener { addr, grpc_addr: grpc_addr.into(), shutdown: None }
    }
}

#[async_trait]
impl SupervisorService for RestListener {
    fn name(&self) -> &str {
        "rest"
    }

    fn addr(&self) -> String {
        self.addr.to_string()
    }

    fn bind_shutdown(&mut self, shutdown: CancellationToken) {
        self.shutdown = Some(shutdown);
    }

    async fn start(self: Box<Self>) -> Result<(), GeoError> {
        let shutdown = self
            .shutdown
            .expect("bind_shutdown must be called before start");

        let endpoint = Endpoint::from_shared(format!("http://{}", self.grpc_addr))
            .map_err(|err| GeoError::Setup(format!("invalid grpc endpoint: {}", err)))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|err| GeoError::Setup(format!("dialing grpc at {}: {}", self.grpc_addr, err)))?;

        let state = GatewayState { client: GeolocationServiceClient::new(channel) };
        let app = router(state);

        info!(addr = %self.addr, "rest gateway starting");

        axum::Server::bind(&self.addr)
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|err| {
                error!(error = %err, "rest gateway failed");
                GeoError::Setup(format!("rest gateway: {}", err))
            })
    }
}

fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/version", get(version))
        .route("/docs/openapi.json", get(openapi))
        .route("/v1/geolocations/:ip", get(lookup_by_ip))
        .with_state(state)
}

async fn banner() -> impl IntoResponse {
    Json(json!({ "service": "geoloc-service" }))
}

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn openapi() -> impl IntoResponse {
    Json(json!({
        "openapi": "3.0.0",
        "info": { "title": "geoloc-service", "version": env!("CARGO_PKG_VERSION") },
        "paths": {
            "/v1/geolocations/{ip}": {
                "get": {
                    "parameters": [{ "name": "ip", "in": "path", "required": true }],
                    "responses": {
                        "200": { "description": "the geolocation record" },
                        "400": { "description": "empty or unparseable ip" },
                        "404": { "description": "no record for this ip" }
                    }
                }
            }
        }
    }))
}

async fn lookup_by_ip(
    State(mut state): State<GatewayState>,
    Path(ip): Path<String>,
) -> impl IntoResponse {
    let request = tonic::Request::new(GeolocationByIpRequest { ip_address: ip });

    match state.client.geolocation_by_ip(request).await {
        Ok(response) => {
            let geo = response.into_inner();
            (StatusCode::OK, Json(to_json(geo))).into_response()
        }
        Err(status) => {
            let code = status_override(&status).unwrap_or_else(|| default_status_for(status.code()));
            (code, Json(json!({ "error": status.message() }))).into_response()
        }
    }
}

fn to_json(geo: crate::rpc::proto::Geolocation) -> Geolocation {
    Geolocation {
        ip_address: geo.ip_address,
        country_code: geo.country_code,
        country: geo.country,
        city: geo.city,
        latitude: geo.latitude,
        longitude: geo.longitude,
        mystery_value: geo.mystery_value,
    }
}

/// Read the `x-http-code` trailer the gRPC side may have set and translate
/// it into an HTTP status, stripping it from view (the caller never sees
/// the raw gRPC status's metadata, only the resulting `StatusCode`).
fn status_override(status: &tonic::Status) -> Option<StatusCode> {
    status
        .metadata()
        .get(HTTP_CODE_METADATA_KEY)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
}

fn default_status_for(code: tonic::Code) -> StatusCode {
    match code {
        tonic::Code::InvalidArgument => StatusCode::BAD_REQUEST,
        tonic::Code::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
