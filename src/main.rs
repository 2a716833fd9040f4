//! Tenant Store Node
//!
//! Runs one node of the store: the REST and internal API, a health server,
//! a Prometheus metrics server and the periodic peer probe that keeps
//! membership current.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tenant_store::{
    ApiServer, ApiServerConfig, Coordinator, Error, NodeInfo, PlacementPolicy, Result,
    StatusFailurePolicy, StoreConfig, StoreMetrics,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tenant Store - multi-tenant object storage node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; flags and environment override it
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Name of this node
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// REST API bind address
    #[arg(long, env = "API_ADDR")]
    api_addr: Option<String>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR")]
    health_addr: Option<String>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Base URL peers use to reach this node
    #[arg(long, env = "ADVERTISE_URL")]
    advertise_url: Option<String>,

    /// Peer nodes as name=url, comma separated
    #[arg(long, env = "PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Shard placement policy (round-robin, least-loaded)
    #[arg(long, env = "PLACEMENT")]
    placement: Option<String>,

    /// Status failure policy (fail, degrade)
    #[arg(long, env = "STATUS_FAILURE_POLICY")]
    status_failure_policy: Option<String>,

    /// Timeout for calls to other nodes in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Timeout for each node's status answer in milliseconds
    #[arg(long, env = "STATUS_TIMEOUT_MS")]
    status_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Resolve the effective configuration: file, then flags and environment
    fn store_config(&self) -> Result<StoreConfig> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::load(path)?,
            None => StoreConfig::default(),
        };

        if let Some(name) = &self.node_name {
            config.node_name = name.clone();
        }
        if let Some(addr) = &self.api_addr {
            config.api_addr = addr.clone();
        }
        if let Some(addr) = &self.health_addr {
            config.health_addr = addr.clone();
        }
        if let Some(addr) = &self.metrics_addr {
            config.metrics_addr = addr.clone();
        }
        if let Some(url) = &self.advertise_url {
            config.advertise_url = Some(url.clone());
        }
        if !self.peers.is_empty() {
            config.peers = self
                .peers
                .iter()
                .map(|peer| parse_peer(peer))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(policy) = &self.placement {
            config.placement = policy.parse::<PlacementPolicy>()?;
        }
        if let Some(policy) = &self.status_failure_policy {
            config.status_failure_policy = policy.parse::<StatusFailurePolicy>()?;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout_ms = ms;
        }
        if let Some(ms) = self.status_timeout_ms {
            config.status_timeout_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_peer(peer: &str) -> Result<NodeInfo> {
    let (name, url) = peer
        .split_once('=')
        .ok_or_else(|| Error::Configuration(format!("peer '{}' must be given as name=url", peer)))?;
    Ok(NodeInfo::new(name.trim()).with_address(url.trim()))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.store_config()?;

    info!("Starting Tenant Store node");
    info!("  Version: {}", tenant_store::VERSION);
    info!("  Node: {}", config.node_name);
    info!("  API: {}", config.api_addr);
    info!("  Peers: {}", config.peers.len());
    info!("  Placement: {}", config.placement);
    info!("  Status failure policy: {:?}", config.status_failure_policy);

    let coordinator = Coordinator::new(config.clone())?;

    // Start health server
    let health_addr = config.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = config.metrics_addr.clone();
    let metrics = coordinator.metrics().clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Keep peer liveness current
    if !config.peers.is_empty() {
        spawn_membership_refresh(coordinator.clone(), config.membership_refresh_secs);
    }

    let api_config = ApiServerConfig {
        addr: config
            .api_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid API address: {}", e)))?,
        ..Default::default()
    };
    let api_server = Arc::new(ApiServer::new(api_config, coordinator));

    let signal_server = api_server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_server.shutdown();
        }
    });

    api_server.run().await?;

    info!("Node shutdown complete");
    Ok(())
}

fn spawn_membership_refresh(coordinator: Arc<Coordinator>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let went_offline = coordinator.refresh_membership().await;
            if went_offline > 0 {
                warn!(count = went_offline, "Peers went offline");
            }
        }
    });
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

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "tower_http=info", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

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

fn plain(status: hyper::StatusCode, body: &'static str) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => plain(StatusCode::OK, "ok"),
                _ => plain(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

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

async fn run_metrics_server(addr: &str, metrics: StoreMetrics) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = Response::new(Body::from(buffer));
                                if let Ok(value) = content_type.parse() {
                                    response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                plain(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                            }
                        },
                        "/healthz" => plain(StatusCode::OK, "ok"),
                        _ => plain(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
