//! API server.

use std::{future::Future, io::BufReader, net::SocketAddr, path::Path, sync::Arc};

use axum::Router;
use ferry_api::APIHandler;
use ferry_error::{generic_error, ErrorContext as _, GenericError};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::{crypto::ring::default_provider, ServerConfig};
use rustls_pemfile::{certs, private_key};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

/// An API builder.
///
/// `APIBuilder` provides a simple and ergonomic builder pattern for constructing an API server from multiple handlers.
/// This allows composing portions of an API from individual building blocks.
///
/// ## Missing
///
/// - graceful shutdown (shutdown stops new connections, but does not wait for existing connections to close)
#[derive(Default)]
pub struct APIBuilder {
    router: Router,
    tls_config: Option<ServerConfig>,
}

impl APIBuilder {
    /// Create a new `APIBuilder` with an empty router.
    ///
    /// Any route that isn't explicitly handled responds with 404 Not Found.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the given handler to this builder.
    ///
    /// The initial state and routes provided by the handler will be merged into this builder.
    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: APIHandler,
    {
        let handler_router = handler.generate_routes();
        let handler_state = handler.generate_initial_state();
        self.router = self.router.merge(handler_router.with_state(handler_state));

        self
    }

    /// Serves the API over TLS with the given configuration.
    pub fn with_tls_config(mut self, config: ServerConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Serves the API over TLS with a freshly generated self-signed certificate for `host`.
    ///
    /// # Errors
    ///
    /// If the certificate cannot be generated, an error is returned.
    pub fn with_self_signed_tls(self, host: &str) -> Result<Self, GenericError> {
        let CertifiedKey { cert, key_pair } = generate_simple_self_signed(vec![host.to_string()])
            .with_error_context(|| format!("Failed to generate self-signed certificate for '{}'.", host))?;

        let config = tls_config_from_pem(cert.pem().as_bytes(), key_pair.serialize_pem().as_bytes())?;
        Ok(self.with_tls_config(config))
    }

    /// Serves the API over TLS with the PEM-encoded certificate chain and private key at the given paths.
    ///
    /// # Errors
    ///
    /// If either file cannot be read, or does not contain a usable certificate or key, an error is returned.
    pub fn with_pem_files<P, K>(self, certificate_path: P, private_key_path: K) -> Result<Self, GenericError>
    where
        P: AsRef<Path>,
        K: AsRef<Path>,
    {
        let certificate_path = certificate_path.as_ref();
        let private_key_path = private_key_path.as_ref();
        let cert_pem = std::fs::read(certificate_path)
            .with_error_context(|| format!("Failed to read certificate file '{}'.", certificate_path.display()))?;
        let key_pem = std::fs::read(private_key_path)
            .with_error_context(|| format!("Failed to read private key file '{}'.", private_key_path.display()))?;

        let config = tls_config_from_pem(&cert_pem, &key_pem)?;
        Ok(self.with_tls_config(config))
    }

    /// Binds to the given address and serves the API until `shutdown` resolves.
    ///
    /// Returns once the listener is bound; connections are accepted on a background task.
    ///
    /// ## Errors
    ///
    /// If the server fails to bind to the address, an error will be returned.
    pub async fn serve<F>(self, listen_address: SocketAddr, shutdown: F) -> Result<RunningServer, GenericError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(listen_address)
            .await
            .with_error_context(|| format!("Failed to bind API server to {}.", listen_address))?;
        let local_addr = listener.local_addr()?;

        let tls_acceptor = self.tls_config.map(|config| TlsAcceptor::from(Arc::new(config)));
        let conn_builder = Builder::new(TokioExecutor::new());

        // Axum routers are Tower services, which Hyper can't drive directly.
        let service = TowerToHyperService::new(self.router);

        let handle = tokio::spawn(async move {
            info!(listen_addr = %local_addr, tls = tls_acceptor.is_some(), "API server started.");
            tokio::pin!(shutdown);

            loop {
                select! {
                    result = listener.accept() => match result {
                        Ok((stream, remote_addr)) => {
                            let service = service.clone();
                            let conn_builder = conn_builder.clone();
                            let tls_acceptor = tls_acceptor.clone();

                            tokio::spawn(async move {
                                let result = match tls_acceptor {
                                    Some(acceptor) => match acceptor.accept(stream).await {
                                        Ok(tls_stream) => conn_builder.serve_connection(TokioIo::new(tls_stream), service).await,
                                        Err(e) => {
                                            debug!(%remote_addr, error = %e, "TLS handshake failed.");
                                            return;
                                        }
                                    },
                                    None => conn_builder.serve_connection(TokioIo::new(stream), service).await,
                                };
                                if let Err(e) = result {
                                    debug!(%remote_addr, error = %e, "Failed to serve API connection.");
                                }
                            });
                        }
                        Err(e) => {
                            error!(listen_addr = %local_addr, error = %e, "Failed to accept API connection.");
                        }
                    },

                    _ = &mut shutdown => {
                        debug!(listen_addr = %local_addr, "Received shutdown signal.");
                        break;
                    }
                }
            }

            info!(listen_addr = %local_addr, "API server stopped.");
        });

        Ok(RunningServer { local_addr, handle })
    }
}

/// A running API server.
pub struct RunningServer {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RunningServer {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the server to stop accepting connections.
    ///
    /// # Errors
    ///
    /// If the accept loop panicked, an error is returned.
    pub async fn wait(self) -> Result<(), GenericError> {
        self.handle
            .await
            .map_err(|e| generic_error!("API server task failed: {}", e))
    }
}

fn tls_config_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig, GenericError> {
    let cert_chain = certs(&mut BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .error_context("Failed to parse certificate chain.")?;
    if cert_chain.is_empty() {
        return Err(generic_error!("No certificates found in certificate chain."));
    }

    let key = private_key(&mut BufReader::new(key_pem))
        .error_context("Failed to parse private key.")?
        .ok_or_else(|| generic_error!("No private key found."))?;

    let config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use tokio::{
        io::{AsyncReadExt as _, AsyncWriteExt as _},
        net::TcpStream,
        sync::oneshot,
    };

    use super::*;

    struct PingHandler;

    impl APIHandler for PingHandler {
        type State = &'static str;

        fn generate_initial_state(&self) -> Self::State {
            "pong"
        }

        fn generate_routes(&self) -> Router<Self::State> {
            Router::new().route(
                "/ping",
                get(|axum::extract::State(reply): axum::extract::State<&'static str>| async move { reply }),
            )
        }
    }

    #[tokio::test]
    async fn serves_handler_routes_until_shutdown() {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = APIBuilder::new()
            .with_handler(PingHandler)
            .serve("127.0.0.1:0".parse().unwrap(), async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("server should bind");

        let mut stream = TcpStream::connect(server.local_addr()).await.expect("should connect");
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .expect("should send request");
        let mut response = String::new();
        stream.read_to_string(&mut response).await.expect("should read response");

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("pong"));

        shutdown_tx.send(()).expect("server should be running");
        server.wait().await.expect("server should stop cleanly");
    }

    #[test]
    fn self_signed_tls_config_builds() {
        assert!(APIBuilder::new().with_self_signed_tls("localhost").is_ok());
    }

    #[test]
    fn pem_files_are_loaded() {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["localhost".to_string()]).expect("should generate certificate");
        let dir = tempfile::tempdir().expect("should create temp dir");
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert.pem()).expect("should write certificate");
        std::fs::write(&key_path, key_pair.serialize_pem()).expect("should write key");

        assert!(APIBuilder::new().with_pem_files(&cert_path, &key_path).is_ok());
        assert!(APIBuilder::new().with_pem_files(&key_path, &cert_path).is_err());
    }
}
