//! Control-plane REST server.
use std::{
    net::{SocketAddr, ToSocketAddrs as _},
    sync::mpsc,
    thread::JoinHandle,
};

use ferry_app::api::APIBuilder;
use ferry_config::ParameterGroup as _;
use ferry_error::{generic_error, ErrorContext as _, GenericError};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{
    activator::{ControlPlaneContext, ControlPlaneServer, ControlPlaneServerBuilder},
    parameters::RestServerParameters,
};

mod routes;
pub use self::routes::ControlPlaneAPIHandler;

/// Builds [`RestControlPlane`] servers.
pub struct RestControlPlaneBuilder;

impl ControlPlaneServerBuilder for RestControlPlaneBuilder {
    fn build(
        &self, parameters: &RestServerParameters, context: ControlPlaneContext,
    ) -> Result<Box<dyn ControlPlaneServer>, GenericError> {
        Ok(Box::new(RestControlPlane::new(parameters.clone(), context)))
    }
}

struct RunningControlPlane {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<Result<(), GenericError>>,
}

/// Serves the control-plane API on a dedicated thread, with its own single-threaded runtime.
pub struct RestControlPlane {
    parameters: RestServerParameters,
    context: ControlPlaneContext,
    running: Option<RunningControlPlane>,
}

impl RestControlPlane {
    /// Creates a new `RestControlPlane`. Nothing is bound until it is started.
    pub fn new(parameters: RestServerParameters, context: ControlPlaneContext) -> Self {
        Self {
            parameters,
            context,
            running: None,
        }
    }

    fn listen_address(&self) -> Result<SocketAddr, GenericError> {
        let host = self.parameters.host();
        let port = u16::try_from(self.parameters.port())
            .with_error_context(|| format!("Invalid control-plane port {}.", self.parameters.port()))?;
        (host, port)
            .to_socket_addrs()
            .with_error_context(|| format!("Failed to resolve control-plane host '{}'.", host))?
            .next()
            .ok_or_else(|| generic_error!("Control-plane host '{}' resolved to no addresses.", host))
    }

    fn api_builder(&self) -> Result<APIBuilder, GenericError> {
        let builder = APIBuilder::new().with_handler(ControlPlaneAPIHandler::new(&self.parameters, self.context.clone()));
        if !self.parameters.https() {
            return Ok(builder);
        }

        match self.parameters.pem_files() {
            Some((certificate_path, private_key_path)) => builder.with_pem_files(certificate_path, private_key_path),
            None => builder.with_self_signed_tls(self.parameters.host()),
        }
    }
}

impl ControlPlaneServer for RestControlPlane {
    fn start(&mut self) -> Result<(), GenericError> {
        if self.running.is_some() {
            return Err(generic_error!("Control-plane server is already running."));
        }

        let listen_address = self.listen_address()?;
        let builder = self.api_builder()?;

        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr, GenericError>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .error_context("Failed to build control-plane runtime.")?;

        let thread = std::thread::Builder::new()
            .name("ferry-control-plane".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let shutdown = async move {
                        let _ = shutdown_rx.await;
                    };
                    match builder.serve(listen_address, shutdown).await {
                        Ok(server) => {
                            let _ = ready_tx.send(Ok(server.local_addr()));
                            server.wait().await
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            Ok(())
                        }
                    }
                })
            })
            .error_context("Failed to spawn control-plane thread.")?;

        let local_addr = match ready_rx.recv() {
            Ok(Ok(local_addr)) => local_addr,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(generic_error!("Control-plane thread exited before the server was ready."));
            }
        };

        info!(
            service = self.parameters.name(),
            listen_addr = %local_addr,
            https = self.parameters.https(),
            "Control-plane server started."
        );
        self.running = Some(RunningControlPlane {
            local_addr,
            shutdown: shutdown_tx,
            thread,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), GenericError> {
        let Some(running) = self.running.take() else {
            debug!("Control-plane server is not running.");
            return Ok(());
        };

        let _ = running.shutdown.send(());
        running
            .thread
            .join()
            .map_err(|_| generic_error!("Control-plane thread panicked."))??;

        info!(listen_addr = %running.local_addr, "Control-plane server stopped.");
        Ok(())
    }
}
