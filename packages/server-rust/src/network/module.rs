//! Network module with deferred startup lifecycle.
//!
//! `new()` wires shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. Binding
//! separately lets callers learn the OS-assigned port before serving.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    earthquakes_handler, health_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::query::QueryEngine;

/// Owns the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    engine: Arc<QueryEngine>,
    shutdown: Arc<ShutdownController>,
    start_time: Instant,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, engine: Arc<QueryEngine>) -> Self {
        Self {
            config,
            listener: None,
            engine,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /earthquakes` -- paginated event query
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness check
    /// - `GET /health/ready` -- readiness check
    pub fn build_router(&self) -> Router {
        let state = AppState {
            engine: Arc::clone(&self.engine),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };

        Router::new()
            .route("/earthquakes", get(earthquakes_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains in-flight
    /// queries for up to the configured drain timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        self.shutdown.set_ready();

        if let Some(tls) = &self.config.tls {
            serve_tls(listener, router, tls, shutdown).await?;
        } else {
            info!("Serving plain HTTP");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        self.shutdown.trigger_shutdown();
        let in_flight = self.shutdown.in_flight_count();
        if in_flight > 0 {
            info!(in_flight, "Draining in-flight queries");
        }
        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("Shutdown complete");
        } else {
            warn!("Drain timeout expired with queries still in flight");
        }
    }
}

/// Serves TLS connections with `axum-server`, reusing the bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "Serving TLS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use quakefeed_core::{CursorCodec, CursorSecret, EarthquakeEvent, EpochMillis, DAY_MILLIS};
    use tower::ServiceExt;

    use super::*;
    use crate::storage::{MemoryEventStore, PartitionPage, PartitionQuery, PartitionStore};

    /// 2024-01-01T00:00:00Z
    const JAN_1: EpochMillis = 1_704_067_200_000;

    fn module() -> NetworkModule {
        let store = MemoryEventStore::new();
        for day in 0..3 {
            for i in 0..4 {
                store
                    .insert(EarthquakeEvent {
                        event_id: format!("ev{day}{i}"),
                        event_time: JAN_1 + day * DAY_MILLIS + i * 60_000,
                        magnitude: 2.0 + f64::from(u8::try_from(i).unwrap()),
                        latitude: 61.2,
                        longitude: -149.9,
                        depth_km: Some(10.0),
                        place: Some("Southern Alaska".to_string()),
                    })
                    .unwrap();
            }
        }
        let codec = Arc::new(CursorCodec::new(CursorSecret::new("module-test-secret")));
        let engine = Arc::new(QueryEngine::new(Arc::new(store), codec));
        NetworkModule::new(NetworkConfig::default(), engine)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn new_creates_module_without_binding() {
        assert!(module().listener.is_none());
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = module();
        assert!(Arc::ptr_eq(
            &module.shutdown_controller(),
            &module.shutdown_controller()
        ));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = NetworkModule {
            config: NetworkConfig {
                host: "127.0.0.1".to_string(),
                ..NetworkConfig::default()
            },
            ..module()
        };
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let result = module().serve(std::future::pending::<()>()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn earthquakes_route_pages_through_window() {
        let router = module().build_router();
        let uri = format!(
            "/earthquakes?starttime={JAN_1}&endtime={}&minmagnitude=3&limit=4",
            JAN_1 + 3 * DAY_MILLIS - 1
        );

        let (status, first) = get_json(router.clone(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["count"], 4);
        assert_eq!(first["items"][0]["place"], "Southern Alaska");
        let token = first["nextToken"].as_str().expect("more pages").to_string();

        // Only the token: the filters come from the cursor.
        let (status, second) =
            get_json(router.clone(), &format!("/earthquakes?nextToken={token}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["count"], 4);

        let mut seen = std::collections::HashSet::new();
        for page in [&first, &second] {
            for item in page["items"].as_array().unwrap() {
                assert!(item["magnitude"].as_f64().unwrap() >= 3.0);
                assert!(seen.insert(item["eventId"].as_str().unwrap().to_string()));
            }
        }

        if let Some(token) = second["nextToken"].as_str() {
            let (_, third) = get_json(router, &format!("/earthquakes?nextToken={token}")).await;
            assert_eq!(third["count"], 1);
            assert!(third.get("nextToken").is_none());
        }
    }

    #[tokio::test]
    async fn changed_filter_with_token_is_bad_request() {
        let router = module().build_router();
        let uri = format!(
            "/earthquakes?starttime={JAN_1}&endtime={}&limit=2",
            JAN_1 + DAY_MILLIS
        );
        let (_, first) = get_json(router.clone(), &uri).await;
        let token = first["nextToken"].as_str().unwrap().to_string();

        let (status, body) = get_json(
            router,
            &format!("/earthquakes?nextToken={token}&minmagnitude=5"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "parameter_mismatch");
    }

    #[tokio::test]
    async fn forged_token_is_bad_request() {
        let router = module().build_router();
        let (status, body) = get_json(router, "/earthquakes?nextToken=abcd.abcd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_signature");
    }

    #[tokio::test]
    async fn oversized_window_is_bad_request() {
        let router = module().build_router();
        let (status, body) = get_json(
            router,
            "/earthquakes?starttime=2020-01-01&endtime=2024-01-01",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn store_failure_is_service_unavailable() {
        struct DownStore;

        #[async_trait::async_trait]
        impl PartitionStore for DownStore {
            async fn query_partition(
                &self,
                _query: &PartitionQuery,
            ) -> anyhow::Result<PartitionPage> {
                anyhow::bail!("connection refused")
            }
        }

        let codec = Arc::new(CursorCodec::new(CursorSecret::new("module-test-secret")));
        let engine = Arc::new(QueryEngine::new(Arc::new(DownStore), codec));
        let router = NetworkModule::new(NetworkConfig::default(), engine).build_router();

        let (status, body) =
            get_json(router, "/earthquakes?starttime=2024-01-01&endtime=2024-01-02").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "store_unavailable");
        assert!(!body["message"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn health_route_reports_state() {
        let router = module().build_router();
        let (status, body) = get_json(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "starting");
    }
}
