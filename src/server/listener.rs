//! Accept loop, background rescans and orderly shutdown.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::library::catalog::CatalogEngine;
use crate::library::episodes::EpisodeService;
use crate::library::metadata::MetadataProvider;
use crate::library::thumbnails::ThumbnailCache;
use crate::library::tools::MediaTools;
use crate::player::bridge::{PlaybackBridge, PlayerSettings};
use crate::server::dispatch::Dispatcher;
use crate::server::pool::WorkerPool;
use crate::server::registry::SessionRegistry;
use crate::server::session::{run_session, SessionContext};

/// How long shutdown waits for each background task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Bind the listening sockets: `127.0.0.1` only, or `0.0.0.0` plus `[::]`.
///
/// The IPv6 socket is created with `IPV6_V6ONLY` so it can coexist with the
/// IPv4 one; if it cannot be set up the server carries on with IPv4 alone.
pub async fn bind(port: u16, localhost: bool) -> io::Result<Vec<TcpListener>> {
    if localhost {
        return Ok(vec![TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?]);
    }

    let mut listeners = vec![TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?];
    match bind_v6_only(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))) {
        Ok(listener) => listeners.push(listener),
        Err(e) => tracing::warn!("IPv6 listener unavailable, serving IPv4 only: {}", e),
    }
    Ok(listeners)
}

fn bind_v6_only(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV6,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_only_v6(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

/// The assembled server: shared state plus the settings the background
/// tasks need.
pub struct Server {
    registry: Arc<SessionRegistry>,
    catalog: Arc<CatalogEngine>,
    player: Arc<PlaybackBridge>,
    pool: WorkerPool,
    ctx: SessionContext,
    rescan_interval: Duration,
}

impl Server {
    pub fn new(config: &Config, provider: Arc<dyn MetadataProvider>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let catalog = Arc::new(CatalogEngine::new(
            config.library_root.clone(),
            provider,
            Arc::clone(&registry),
        ));
        let tools = MediaTools {
            timeout: config.tool_timeout,
            ..MediaTools::default()
        };
        let episodes = Arc::new(EpisodeService::new(
            tools,
            ThumbnailCache::new(config.thumbnail_dir.clone()),
        ));
        let player = Arc::new(PlaybackBridge::new(PlayerSettings {
            mpv_path: config.mpv_path.clone(),
            ipc_socket: config.ipc_socket.clone(),
            mixer_path: config.mixer_path.clone(),
            tool_timeout: config.tool_timeout,
            ipc_timeout: config.ipc_timeout,
        }));
        let dispatcher = Arc::new(Dispatcher::new(
            config.library_root.clone(),
            Arc::clone(&catalog),
            episodes,
            Arc::clone(&player),
        ));
        let pool = WorkerPool::new(config.workers);
        let ctx = SessionContext {
            registry: Arc::clone(&registry),
            dispatcher,
            pool: pool.clone(),
            idle_timeout: config.idle_timeout,
        };

        Self {
            registry,
            catalog,
            player,
            pool,
            ctx,
            rescan_interval: config.rescan_interval,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<CatalogEngine> {
        &self.catalog
    }

    pub fn player(&self) -> &Arc<PlaybackBridge> {
        &self.player
    }

    /// Serve on `listeners` until `shutdown` resolves, then stop accepting,
    /// close every session, stop rescanning and stop the player.
    pub async fn serve<F>(self, listeners: Vec<TcpListener>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        let catalog_task = tokio::spawn(
            Arc::clone(&self.catalog).run(self.rescan_interval, shutdown_tx.subscribe()),
        );
        let accept_tasks: Vec<_> = listeners
            .into_iter()
            .map(|listener| tokio::spawn(accept_loop(listener, self.ctx.clone(), shutdown_tx.subscribe())))
            .collect();

        shutdown.await;
        tracing::info!("Shutting down...");
        let _ = shutdown_tx.send(());

        for task in accept_tasks {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, task).await;
        }
        // closes the registry too, so sessions accepted in the last moments
        // are turned away instead of outliving shutdown
        self.registry.close_all();
        self.pool.shutdown();
        self.player.close().await;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, catalog_task).await;

        tracing::info!("Goodbye.");
    }
}

async fn accept_loop(listener: TcpListener, ctx: SessionContext, mut shutdown: broadcast::Receiver<()>) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on {}", addr);
    }
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
                    }
                    tokio::spawn(run_session(stream, Some(peer), ctx.clone()));
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                }
            },
            _ = shutdown.recv() => {
                tracing::debug!("Accept loop: shutdown signal received");
                return;
            }
        }
    }
}
