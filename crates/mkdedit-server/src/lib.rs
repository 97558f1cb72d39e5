//! HTTP adapter for the mkdedit virtual file store.
//! One resource, `/vfs`, whose verbs map onto `FileStore` operations.

use std::{future::Future, sync::Arc};

use axum::{routing::get, Router};
use mkdedit_core::storage::FileStore;
use tokio::net::TcpListener;
use tracing::info;

pub mod error;
pub mod handlers;

/// Route serving every file operation.
pub const VFS_PATH: &str = "/vfs";

/// The single store handle shared by all requests.
pub type SharedStore = Arc<dyn FileStore>;

/// Build the router:
/// - `GET    /vfs?cmd=list|read|exists`
/// - `POST   /vfs` write
/// - `PUT    /vfs` rename (or write)
/// - `DELETE /vfs?name=X`
pub fn build_router(store: SharedStore) -> Router {
    Router::new()
        .route(
            VFS_PATH,
            get(handlers::query)
                .post(handlers::write)
                .put(handlers::modify)
                .delete(handlers::remove),
        )
        .with_state(store)
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve<F>(listener: TcpListener, store: SharedStore, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("listening on http://{addr}{VFS_PATH}");
    axum::serve(listener, build_router(store))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("http server stopped");
    Ok(())
}
