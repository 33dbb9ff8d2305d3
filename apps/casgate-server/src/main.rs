//! CasGate server: an S3-compatible gateway over a content-addressed blob store.
//!
//! # Usage
//!
//! ```text
//! ACCESS_KEY=admin SECRET_KEY=changeme GATEWAY_LISTEN=0.0.0.0:9000 casgate-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:9000` | Bind address |
//! | `CASGATE_DOMAIN` | `s3.localhost` | Virtual hosting domain |
//! | `CASGATE_SKIP_SIGNATURE_VALIDATION` | `false` | Skip SigV4 verification |
//! | `ACCESS_KEY` / `SECRET_KEY` | *(unset)* | Access key seeded at startup |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `LOG_FORMAT` | `text` | `json` for JSON log lines |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! See [`GatewayConfig::from_env`] for the remaining gateway settings.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use casgate_auth::CredentialProvider;
use casgate_core::{CasGateway, GatewayConfig};
use casgate_http::{GatewayHandler, S3Handler, S3HttpConfig, S3HttpService};

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Build the [`S3HttpConfig`] from the gateway configuration.
///
/// Signatures are always verified against the gateway's own access key store.
fn build_http_config(config: &GatewayConfig, gateway: &CasGateway) -> S3HttpConfig {
    let credential_provider: Arc<dyn CredentialProvider> =
        Arc::new(gateway.access_keys().clone());

    S3HttpConfig {
        domain: config.domain.clone(),
        virtual_hosting: config.virtual_hosting,
        skip_signature_validation: config.skip_signature_validation,
        region: config.default_region.clone(),
        credential_provider: Some(credential_provider),
        max_object_size: config.max_object_size,
    }
}

/// The key pair from `ACCESS_KEY` / `SECRET_KEY`, falling back to the
/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` pair.
fn bootstrap_credentials() -> Option<(String, String)> {
    let access_key = std::env::var("ACCESS_KEY")
        .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
        .ok()?;
    let secret_key = std::env::var("SECRET_KEY")
        .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
        .ok()?;
    Some((access_key, secret_key))
}

/// Seed the bootstrap key pair, if one is configured.
async fn seed_access_key(
    gateway: &CasGateway,
    credentials: Option<(String, String)>,
) -> Result<()> {
    let Some((access_key, secret_key)) = credentials else {
        warn!("ACCESS_KEY / SECRET_KEY not set; only anonymous requests can succeed");
        return Ok(());
    };

    gateway
        .access_keys()
        .bootstrap(&access_key, &secret_key)
        .await
        .context("failed to bootstrap access key")?;
    info!(access_key = %access_key, "configured access key from environment");
    Ok(())
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve<H: S3Handler>(listener: TcpListener, service: S3HttpService<H>) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Probe the health endpoint of a running gateway.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /_health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = GatewayConfig::from_env();
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = GatewayConfig::from_env();

    init_tracing(&config.log_level)?;

    info!(
        gateway_listen = %config.gateway_listen,
        domain = %config.domain,
        virtual_hosting = config.virtual_hosting,
        skip_signature_validation = config.skip_signature_validation,
        version = VERSION,
        "starting CasGate server",
    );

    let gateway = Arc::new(CasGateway::in_memory(config.clone()));
    seed_access_key(&gateway, bootstrap_credentials()).await?;

    let http_config = build_http_config(&config, &gateway);
    let service = S3HttpService::new(GatewayHandler::new(Arc::clone(&gateway)), http_config);

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}

#[cfg(test)]
mod tests {
    use casgate_auth::SecretLookup;

    use super::*;

    #[test]
    fn test_should_build_http_config_from_gateway_config() {
        let config = GatewayConfig::builder()
            .domain("s3.example.test".to_owned())
            .virtual_hosting(false)
            .default_region("eu-west-1".to_owned())
            .build();
        let gateway = CasGateway::in_memory(config.clone());
        let http_config = build_http_config(&config, &gateway);

        assert_eq!(http_config.domain, "s3.example.test");
        assert!(!http_config.virtual_hosting);
        assert!(!http_config.skip_signature_validation);
        assert_eq!(http_config.region, "eu-west-1");
        assert!(http_config.credential_provider.is_some());
        assert_eq!(http_config.max_object_size, config.max_object_size);
    }

    #[tokio::test]
    async fn test_should_verify_against_seeded_access_key() {
        let config = GatewayConfig::default();
        let gateway = CasGateway::in_memory(config.clone());
        seed_access_key(&gateway, Some(("admin".to_owned(), "changeme".to_owned())))
            .await
            .expect("seed");

        let http_config = build_http_config(&config, &gateway);
        let provider = http_config.credential_provider.expect("provider");
        let lookup = provider.lookup("admin").await.expect("lookup");
        assert_eq!(lookup, SecretLookup::enabled("changeme"));
        assert!(!provider.lookup("nobody").await.expect("lookup").exists);
    }

    #[tokio::test]
    async fn test_should_start_without_bootstrap_credentials() {
        let gateway = CasGateway::in_memory(GatewayConfig::default());
        seed_access_key(&gateway, None).await.expect("no-op");
        assert!(gateway.access_keys().list().await.expect("list").is_empty());
    }

    #[test]
    fn test_should_reject_invalid_log_filter() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("=[{").is_err());
    }
}
