//! CephFS Share Provisioner
//!
//! Process wiring for the provisioner: CLI arguments, logging, the
//! Kubernetes client, and the health and metrics endpoints. The
//! provision/delete lifecycle itself is driven by the persistent volume
//! controller through the `VolumeProvisioner` trait.

use clap::Parser;
use kube::Client;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cephfs_share_provisioner::{
    AgentClient, CephFsProvisioner, Error, KubeSecretStore, KubeStorageClassSource,
    ProvisionerIdentity, Result, VolumeProvisionerRef,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// CephFS Share Provisioner - dynamic CephFS volumes for Kubernetes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the allocation agent executable
    #[arg(
        long,
        env = "PROVISION_AGENT",
        default_value = "/usr/local/bin/cephfs_provisioner"
    )]
    agent_path: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting CephFS share provisioner");
    info!("  Version: {}", cephfs_share_provisioner::VERSION);
    info!("  Allocation agent: {}", args.agent_path);

    if !Path::new(&args.agent_path).exists() {
        return Err(Error::Configuration(format!(
            "allocation agent not found at {}",
            args.agent_path
        )));
    }

    let client = Client::try_default().await?;
    let version = client.apiserver_version().await?;
    info!("Connected to Kubernetes API server {}", version.git_version);

    let identity = ProvisionerIdentity::generate();
    info!("Provisioner identity: {}", identity);

    let _provisioner: VolumeProvisionerRef = Arc::new(CephFsProvisioner::new(
        identity,
        AgentClient::new(&args.agent_path),
        Arc::new(KubeSecretStore::new(client.clone())),
        Arc::new(KubeStorageClassSource::new(client)),
    ));

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // The persistent volume controller drives Provision/Delete through the
    // VolumeProvisioner trait; this process stays up to serve probes.
    info!("Provisioner ready");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Internal(format!("failed to listen for shutdown signal: {}", e)))?;

    info!("Shutdown signal received");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("kube=info".parse().unwrap())
        .add_directive("tower=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                "/readyz" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    // Register provisioner metrics
    let _ = prometheus::register_counter!(
        "cephfs_provisioner_provisions_total",
        "Total number of share provision attempts"
    );
    let _ = prometheus::register_counter!(
        "cephfs_provisioner_deletes_total",
        "Total number of share delete attempts"
    );
    let _ = prometheus::register_counter_vec!(
        "cephfs_provisioner_agent_failures",
        "Allocation agent failures by operation",
        &["operation"]
    );
    let _ = prometheus::register_histogram!(
        "cephfs_provisioner_agent_duration_seconds",
        "Duration of allocation agent invocations"
    );

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap();

                    Response::builder()
                        .status(StatusCode::OK)
                        .header("Content-Type", encoder.format_type())
                        .body(Body::from(buffer))
                        .unwrap()
                }
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
