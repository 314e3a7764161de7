//! Watching and serving the output tree together.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::error::{Result, WatcherError};
use crate::watcher::{WatchLoop, WatchStats};

/// Router serving static files from `output_dir`.
///
/// Directory index and not-found handling are left to [`ServeDir`].
pub fn router(output_dir: &Path) -> Router {
    Router::new().fallback_service(ServeDir::new(output_dir))
}

/// Runs a [`WatchLoop`] in the background while serving its output tree over HTTP.
pub struct ServeCoordinator {
    watch: Arc<WatchLoop>,
}

impl ServeCoordinator {
    /// Create a coordinator around a watch loop.
    pub fn new(watch: WatchLoop) -> Self {
        Self {
            watch: Arc::new(watch),
        }
    }

    /// Bind `port` on all local interfaces. Port 0 picks a free port.
    pub async fn bind(self, port: u16) -> Result<BoundServer> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WatcherError::Serve(format!("cannot bind {addr}: {e}")))?;

        Ok(BoundServer {
            watch: self.watch,
            listener,
        })
    }

    /// Bind `port`, then watch and serve until `cancel` fires.
    pub async fn activate_and_serve(
        self,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<WatchStats> {
        self.bind(port).await?.run(cancel).await
    }
}

/// A coordinator whose listener is bound but not yet serving.
pub struct BoundServer {
    watch: Arc<WatchLoop>,
    listener: TcpListener,
}

impl BoundServer {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `cancel` fires, then stop the watch task and wait for it.
    ///
    /// The watch loop runs on its own task with a child token. If it fails,
    /// it cancels `cancel` so the server shuts down too.
    pub async fn run(self, cancel: CancellationToken) -> Result<WatchStats> {
        let addr = self.local_addr()?;
        let app = router(&self.watch.config().output_dir);

        let watch_token = cancel.child_token();
        let watch_task = {
            let watch = Arc::clone(&self.watch);
            let token = watch_token.clone();
            let server_token = cancel.clone();
            tokio::spawn(async move {
                let result = watch.run(token).await;
                if let Err(e) = &result {
                    warn!("Watch loop failed, shutting down server: {e}");
                    server_token.cancel();
                }
                result
            })
        };

        info!("Serving now on http://localhost:{}", addr.port());
        let served = axum::serve(self.listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .await;
        info!("Closing server");

        watch_token.cancel();
        let stats = watch_task.await??;
        served?;
        Ok(stats)
    }
}
