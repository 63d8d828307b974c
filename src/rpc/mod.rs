//! The gRPC adapter: a `tonic`-generated unary service backed directly by
//! the Lookup Service, wired into the Lifecycle Supervisor's `Service`
//! contract.

pub mod proto {
    tonic::include_proto!("geolocation.v1");
}

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{error, info};

use crate::errors::GeoError;
use crate::lookup::LookupService;
use crate::supervisor::Service as SupervisorService;

use proto::geolocation_service_server::{GeolocationService, GeolocationServiceServer};
use proto::{Geolocation as ProtoGeolocation, GeolocationByIpRequest};

/// Implements the generated `GeolocationService` trait over the Lookup
/// Service, mapping the domain error taxonomy onto gRPC status codes.
pub struct GrpcService {
    lookup: Arc<LookupService>,
}

impl GrpcService {
    pub fn new(lookup: Arc<LookupService>) -> Self {
        GrpcService { lookup }
    }
}

#[async_trait]
impl GeolocationService for GrpcService {
    async fn geolocation_by_ip(
        &self,
        request: Request<GeolocationByIpRequest>,
    ) -> Result<Response<ProtoGeolocation>, Status> {
        let ip_address = request.into_inner().ip_address;

        let geo = self.lookup.lookup(&ip_address).await.map_err(status_for)?;

        Ok(Response::new(ProtoGeolocation {
            ip_address: geo.ip_address,
            country_code: geo.country_code,
            country: geo.country,
            city: geo.city,
            latitude: geo.latitude,
            longitude: geo.longitude,
            mystery_value: geo.mystery_value,
        }))
    }
}

/// Metadata key the REST gateway reads to override its default gRPC-code →
/// HTTP-status mapping. Set here on the error path, the one place this
/// service's single RPC can attach response metadata.
const HTTP_CODE_METADATA_KEY: &str = "x-http-code";

fn status_for(err: GeoError) -> Status {
    match err {
        GeoError::MissingIpAddress | GeoError::InvalidIpAddress => {
            // 422 Unprocessable Entity describes a syntactically malformed
            // IP query more precisely than the gateway's default mapping of
            // INVALID_ARGUMENT to 400 Bad Request.
            let mut status = Status::invalid_argument(err.to_string());
            status
                .metadata_mut()
                .insert(HTTP_CODE_METADATA_KEY, "422".parse().expect("422 is a valid header value"));
            status
        }
        GeoError::NotFound => Status::not_found(err.to_string()),
        other => Status::internal(other.to_string()),
    }
}

/// The gRPC listener, bound into the Lifecycle Supervisor.
pub struct GrpcListener {
    addr: SocketAddr,
    service: GrpcService,
    shutdown: Option<CancellationToken>,
}

impl GrpcListener {
    pub fn new(addr: SocketAddr, lookup: Arc<LookupService>) -> Self {
        GrpcListener { addr, service: GrpcService::new(lookup), shutdown: None }
    }
}

#[async_trait]
impl SupervisorService for GrpcListener {
    fn name(&self) -> &str {
        "grpc"
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

        info!(addr = %self.addr, "grpc listener starting");

        Server::builder()
            .add_service(GeolocationServiceServer::new(self.service))
            .serve_with_shutdown(self.addr, shutdown.cancelled())
            .await
            .map_err(|err| {
                error!(error = %err, "grpc server failed");
                GeoError::Setup(format!("grpc server: {}", err))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_double::InMemoryStore;

    fn geo(ip: &str) -> crate::model::Geolocation {
        crate::model::Geolocation {
            ip_address: ip.to_owned(),
            country_code: "US".to_owned(),
            country: "United States".to_owned(),
            city: "Anytown".to_owned(),
            latitude: 1.0,
            longitude: 2.0,
            mystery_value: 3.0,
        }
    }

    #[tokio::test]
    async fn maps_missing_ip_to_invalid_argument() {
        let store = Arc::new(InMemoryStore::new());
        let service = GrpcService::new(Arc::new(LookupService::new(store)));
        let request = Request::new(GeolocationByIpRequest { ip_address: String::new() });
        let status = service.geolocation_by_ip(request).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn invalid_argument_sets_the_http_code_override() {
        let status = status_for(GeoError::InvalidIpAddress);
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(
            status.metadata().get(HTTP_CODE_METADATA_KEY).and_then(|v| v.to_str().ok()),
            Some("422"),
        );
    }

    #[test]
    fn not_found_carries_no_override() {
        let status = status_for(GeoError::NotFound);
        assert!(status.metadata().get(HTTP_CODE_METADATA_KEY).is_none());
    }

    #[tokio::test]
    async fn maps_absent_ip_to_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let service = GrpcService::new(Arc::new(LookupService::new(store)));
        let request = Request::new(GeolocationByIpRequest { ip_address: "8.8.8.8".to_owned() });
        let status = service.geolocation_by_ip(request).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn returns_stored_record() {
        use crate::storage::Store;

        let store = Arc::new(InMemoryStore::new());
        store.insert_batch(&[geo("8.8.8.8")]).await.unwrap();
        let service = GrpcService::new(Arc::new(LookupService::new(store)));
        let request = Request::new(GeolocationByIpRequest { ip_address: "8.8.8.8".to_owned() });
        let response = service.geolocation_by_ip(request).await.unwrap().into_inner();
        assert_eq!(response.ip_address, "8.8.8.8");
        assert_eq!(response.country, "United States");
    }
}
