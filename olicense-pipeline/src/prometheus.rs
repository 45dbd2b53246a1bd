//! Prometheus exposition format support.
//!
//! Renders the currently published [`Snapshot`] in the Prometheus text
//! exposition format and serves it over HTTP.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use olicense_pipeline::SnapshotStore;
//! use olicense_pipeline::prometheus::{PrometheusConfig, PrometheusExporter};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = PrometheusConfig::builder()
//!         .listen_addr("0.0.0.0:9877".parse().unwrap())
//!         .metrics_path("/metrics")
//!         .build();
//!
//!     let store = Arc::new(SnapshotStore::new());
//!     let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//!     let server = PrometheusExporter::new(config, store).start_server(stop_rx).await?;
//!
//!     // Metrics available at http://localhost:9877/metrics
//!     server.join().await;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::fmt::Write as _;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use olicense_types::Snapshot;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::store::SnapshotStore;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Default port for the metrics endpoint.
pub const DEFAULT_PORT: u16 = 9877;

/// Configuration for the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrometheusConfig {
    /// Address to listen on (e.g., `0.0.0.0:9877`)
    pub listen_addr: SocketAddr,
    /// Path for metrics endpoint (e.g., `/metrics`)
    pub metrics_path: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl PrometheusConfig {
    /// Create a new builder for PrometheusConfig.
    pub fn builder() -> PrometheusConfigBuilder {
        PrometheusConfigBuilder::default()
    }
}

/// Builder for PrometheusConfig.
#[derive(Debug, Default)]
pub struct PrometheusConfigBuilder {
    listen_addr: Option<SocketAddr>,
    metrics_path: Option<String>,
}

impl PrometheusConfigBuilder {
    /// Set the listen address.
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Set the metrics path.
    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    /// Build the PrometheusConfig.
    pub fn build(self) -> PrometheusConfig {
        let defaults = PrometheusConfig::default();
        PrometheusConfig {
            listen_addr: self.listen_addr.unwrap_or(defaults.listen_addr),
            metrics_path: self.metrics_path.unwrap_or(defaults.metrics_path),
        }
    }
}

/// Serves the store's current snapshot over HTTP.
#[derive(Debug, Clone)]
pub struct PrometheusExporter {
    config: PrometheusConfig,
    store: Arc<SnapshotStore>,
}

impl PrometheusExporter {
    pub fn new(config: PrometheusConfig, store: Arc<SnapshotStore>) -> Self {
        Self { config, store }
    }

    /// Get the current metrics in Prometheus exposition format.
    pub fn render(&self) -> String {
        format_prometheus(self.store.current().as_deref())
    }

    /// Bind the listener and start serving in a background task.
    ///
    /// Binding happens before this returns, so an unusable address is
    /// reported to the caller. The server stops accepting connections once
    /// `shutdown` turns true or its sender is dropped.
    pub async fn start_server(&self, shutdown: watch::Receiver<bool>) -> io::Result<MetricsServer> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            address = %local_addr,
            path = %self.config.metrics_path,
            "serving metrics"
        );

        let task = tokio::spawn(run_server(
            listener,
            self.config.metrics_path.clone(),
            self.store.clone(),
            shutdown,
        ));
        Ok(MetricsServer { local_addr, task })
    }
}

/// A running metrics server.
#[derive(Debug)]
pub struct MetricsServer {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MetricsServer {
    /// The address actually bound, useful when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the accept loop to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "metrics server task failed");
        }
    }
}

async fn run_server(
    listener: TcpListener,
    metrics_path: String,
    store: Arc<SnapshotStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let metrics_path: Arc<str> = metrics_path.into();

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    accept_failed(e).await;
                    continue;
                }
            },
            _ = async { shutdown.wait_for(|stopped| *stopped).await.map(|_| ()) } => break,
        };
        let io = TokioIo::new(stream);

        let metrics_path = metrics_path.clone();
        let store = store.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let metrics_path = metrics_path.clone();
                let store = store.clone();

                async move { handle_request(&req, &metrics_path, &store) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %e, "metrics connection error");
            }
        });
    }

    tracing::info!("metrics server stopped");
}

/// Log a failed accept and pause. Errors such as EMFILE persist, so an
/// immediate retry would spin.
async fn accept_failed(e: io::Error) {
    tracing::warn!(error = %e, "failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

fn handle_request<B>(
    req: &Request<B>,
    metrics_path: &str,
    store: &SnapshotStore,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let readable = req.method() == Method::GET || req.method() == Method::HEAD;

    let (status, content_type, body) = if !readable {
        (StatusCode::METHOD_NOT_ALLOWED, "text/plain", "Method Not Allowed".to_string())
    } else if path == metrics_path {
        let snapshot = store.current();
        match catch_unwind(AssertUnwindSafe(|| format_prometheus(snapshot.as_deref()))) {
            Ok(body) => (StatusCode::OK, EXPOSITION_CONTENT_TYPE, body),
            Err(_) => {
                tracing::error!("rendering metrics panicked");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    "Internal Server Error".to_string(),
                )
            }
        }
    } else if path == "/health" || path == "/healthz" {
        (StatusCode::OK, "text/plain", "OK".to_string())
    } else {
        (StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static(content_type));
    Ok(response)
}

/// Metric families in the order they are emitted.
struct Family {
    name: &'static str,
    help: &'static str,
}

const SERVER_TOTAL: Family = Family {
    name: "olicense_server_total_licenses",
    help: "Total number of licenses configured on the server",
};
const SERVER_IN_USE: Family = Family {
    name: "olicense_server_licenses_in_use",
    help: "Number of licenses currently checked out",
};
const SERVER_AVAILABLE: Family = Family {
    name: "olicense_server_licenses_available",
    help: "Number of licenses available for checkout",
};
const SERVER_DENIALS: Family = Family {
    name: "olicense_server_denials_total",
    help: "Number of license requests the server has denied",
};
const SERVER_HEARTBEAT: Family = Family {
    name: "olicense_server_heartbeat_timestamp",
    help: "Unix timestamp of the last server heartbeat",
};
const FEATURE_TOTAL: Family = Family {
    name: "olicense_feature_total_licenses",
    help: "Total number of licenses for a feature",
};
const FEATURE_IN_USE: Family = Family {
    name: "olicense_feature_licenses_in_use",
    help: "Number of licenses in use for a feature",
};
const FEATURE_BORROWED: Family = Family {
    name: "olicense_feature_licenses_borrowed",
    help: "Number of licenses borrowed for a feature",
};
const FEATURE_DENIALS: Family = Family {
    name: "olicense_feature_denials_total",
    help: "Number of denied requests for a feature",
};
const SCRAPE_SUCCESS: Family = Family {
    name: "olicense_exporter_scrape_success",
    help: "Whether the last status scrape succeeded (1) or failed (0)",
};
const SCRAPE_DURATION: Family = Family {
    name: "olicense_exporter_scrape_duration_seconds",
    help: "Duration of the last status scrape in seconds",
};

fn header(out: &mut String, family: &Family) {
    let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
    let _ = writeln!(out, "# TYPE {} gauge", family.name);
}

fn sample(out: &mut String, family: &Family, value: impl std::fmt::Display) {
    header(out, family);
    let _ = writeln!(out, "{} {}", family.name, value);
}

/// Format a snapshot as Prometheus exposition format.
///
/// Server and feature series are present whenever the snapshot carries a
/// status, even a stale one. Server counts are left out when the source
/// reported none of them. The scrape series are always present; with
/// no snapshot at all they report a failed scrape of zero duration.
pub fn format_prometheus(snapshot: Option<&Snapshot>) -> String {
    let mut output = String::new();

    if let Some(status) = snapshot.and_then(Snapshot::status) {
        if status.server_totals_reported {
            sample(&mut output, &SERVER_TOTAL, status.total_licenses);
            sample(&mut output, &SERVER_IN_USE, status.licenses_in_use);
            sample(&mut output, &SERVER_AVAILABLE, status.licenses_available);
            sample(&mut output, &SERVER_DENIALS, status.denials_total);
        }
        if let Some(heartbeat) = status.heartbeat_timestamp {
            sample(&mut output, &SERVER_HEARTBEAT, heartbeat);
        }

        if !status.features.is_empty() {
            let families: [(&Family, fn(&olicense_types::FeatureStatus) -> u64); 4] = [
                (&FEATURE_TOTAL, |f| f.total_licenses),
                (&FEATURE_IN_USE, |f| f.licenses_in_use),
                (&FEATURE_BORROWED, |f| f.licenses_borrowed),
                (&FEATURE_DENIALS, |f| f.denials_total),
            ];
            for (family, value) in families {
                header(&mut output, family);
                for feature in &status.features {
                    let _ = writeln!(
                        output,
                        "{}{{feature=\"{}\"}} {}",
                        family.name,
                        escape_label_value(&feature.name),
                        value(feature)
                    );
                }
            }
        }
    }

    let (succeeded, duration) = snapshot
        .map(|s| (s.scrape.succeeded, s.scrape.duration_seconds))
        .unwrap_or((false, 0.0));
    sample(&mut output, &SCRAPE_SUCCESS, u8::from(succeeded));
    sample(&mut output, &SCRAPE_DURATION, format!("{:.6}", duration));

    output
}

/// Escape a label value for Prometheus format.
/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
