//! Health and readiness surface
//!
//! Two distinct views over the same three collaborators. Readiness is the
//! AND of cheap, local connected flags and answers "is anything obviously
//! down right now". Health is the AND of each collaborator's functional
//! probe, which may do I/O. Liveness is implied by this server answering
//! at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;
use warp::Filter;

/// Self-reported state of one pipeline dependency
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Functional probe; may be I/O-bound, must never panic or error out
    async fn is_healthy(&self) -> bool;
    /// Cheap, non-blocking connection-state read
    fn is_connected(&self) -> bool;
}

/// The three mandatory collaborators, by role
pub struct HealthState {
    pub database: Arc<dyn HealthProbe>,
    pub transport: Arc<dyn HealthProbe>,
    pub event_log: Arc<dyn HealthProbe>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DependencyChecks {
    pub database: bool,
    pub transport: bool,
    #[serde(rename = "eventLog")]
    pub event_log: bool,
}

impl DependencyChecks {
    pub fn all_healthy(&self) -> bool {
        self.database && self.transport && self.event_log
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    checks: DependencyChecks,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ServiceDescriptor {
    service: &'static str,
    version: &'static str,
    status: &'static str,
}

impl HealthState {
    /// Run each collaborator's functional probe
    pub async fn check_health(&self) -> DependencyChecks {
        DependencyChecks {
            database: self.database.is_healthy().await,
            transport: self.transport.is_healthy().await,
            event_log: self.event_log.is_healthy().await,
        }
    }

    /// Cheap readiness: every collaborator currently connected
    pub fn is_ready(&self) -> bool {
        self.database.is_connected()
            && self.transport.is_connected()
            && self.event_log.is_connected()
    }
}

/// HTTP server for `/health`, `/ready` and `/`
pub struct HealthServer {
    port: u16,
    state: Arc<HealthState>,
}

impl HealthServer {
    pub fn new(port: u16, state: Arc<HealthState>) -> Self {
        Self { port, state }
    }

    /// Serve until the task is dropped
    pub async fn start(&self) {
        info!(port = self.port, "Health server listening");
        warp::serve(Self::routes(self.state.clone()))
            .run(([0, 0, 0, 0], self.port))
            .await;
    }

    /// Route set, exposed separately so tests can drive it in-process
    pub fn routes(
        state: Arc<HealthState>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_state = state.clone();
        let health_route = warp::path("health").and(warp::get()).and_then(move || {
            let state = health_state.clone();
            async move {
                let checks = state.check_health().await;
                let all_healthy = checks.all_healthy();
                let response = HealthResponse {
                    status: if all_healthy { "ok" } else { "degraded" },
                    timestamp: Utc::now(),
                    checks,
                };
                let status_code = if all_healthy {
                    warp::http::StatusCode::OK
                } else {
                    warp::http::StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(
                    warp::reply::json(&response),
                    status_code,
                ))
            }
        });

        let ready_state = state.clone();
        let ready_route = warp::path("ready").and(warp::get()).and_then(move || {
            let state = ready_state.clone();
            async move {
                let ready = state.is_ready();
                let (status, status_code) = if ready {
                    ("ready", warp::http::StatusCode::OK)
                } else {
                    ("not ready", warp::http::StatusCode::SERVICE_UNAVAILABLE)
                };
                Ok::<_, Infallible>(warp::reply::with_status(
                    warp::reply::json(&ReadyResponse { status }),
                    status_code,
                ))
            }
        });

        let root_route = warp::path::end().and(warp::get()).map(|| {
            warp::reply::json(&ServiceDescriptor {
                service: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
                status: "running",
            })
        });

        health_route.or(ready_route).or(root_route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::StaticProbe;

    fn state(db: bool, transport: bool, event_log: bool) -> HealthState {
        HealthState {
            database: Arc::new(StaticProbe::new(db, db)),
            transport: Arc::new(StaticProbe::new(transport, transport)),
            event_log: Arc::new(StaticProbe::new(event_log, event_log)),
        }
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let state = state(true, true, true);
        let checks = state.check_health().await;
        assert!(checks.all_healthy());
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_one_unhealthy_degrades_aggregate() {
        let state = state(true, false, true);
        let checks = state.check_health().await;
        assert!(checks.database);
        assert!(!checks.transport);
        assert!(checks.event_log);
        assert!(!checks.all_healthy());
    }

    #[tokio::test]
    async fn test_readiness_tracks_connection_flags() {
        let db = Arc::new(StaticProbe::new(true, true));
        let transport = Arc::new(StaticProbe::new(true, true));
        let event_log = Arc::new(StaticProbe::new(true, true));
        let state = HealthState {
            database: db,
            transport: transport.clone(),
            event_log,
        };

        assert!(state.is_ready());
        transport.set_connected(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn test_checks_serialize_with_event_log_key() {
        let checks = DependencyChecks {
            database: true,
            transport: true,
            event_log: false,
        };
        let value = serde_json::to_value(&checks).unwrap();
        assert_eq!(value["eventLog"], false);
        assert_eq!(value["database"], true);
    }
}
