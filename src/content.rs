//! Local HTTP server that hands media bytes to a player
//!
//! The device can only play content it fetches by URL, so raw bytes are
//! registered here and the resulting URL is passed to `browse/play_stream`.

use crate::error::Result;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Clone)]
struct Content {
    data: Bytes,
    mime_type: String,
}

type ContentStore = Arc<Mutex<HashMap<Uuid, Content>>>;

// Entries are inserted and removed whole, so a poisoned map is still consistent.
fn lock(store: &ContentStore) -> MutexGuard<'_, HashMap<Uuid, Content>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serves registered content at `http://<addr>/content/<id>`
///
/// The server task stops when the `ContentServer` is dropped.
pub struct ContentServer {
    addr: SocketAddr,
    store: ContentStore,
    task: JoinHandle<()>,
}

impl ContentServer {
    /// Start serving on `bind_ip` with an ephemeral port
    ///
    /// Bind to the address the device can reach, typically the local end of
    /// the control connection.
    pub async fn start(bind_ip: IpAddr) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(bind_ip, 0)).await?;
        let addr = listener.local_addr()?;
        let store: ContentStore = Arc::new(Mutex::new(HashMap::new()));

        let app = Router::new()
            .route("/content/{id}", get(serve_content))
            .with_state(store.clone());

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Content server stopped: {}", e);
            }
        });

        tracing::info!("Content server listening on {}", addr);
        Ok(Self { addr, store, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register content and return the URL it is served at
    pub fn register(&self, data: impl Into<Bytes>, mime_type: &str) -> String {
        let id = Uuid::new_v4();
        let data = data.into();
        tracing::debug!("Registered {} bytes of {} as {}", data.len(), mime_type, id);

        lock(&self.store).insert(
            id,
            Content {
                data,
                mime_type: mime_type.to_string(),
            },
        );
        format!("http://{}/content/{}", self.addr, id)
    }

    /// Drop all registered content
    pub fn clear(&self) {
        lock(&self.store).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.store).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ContentServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_content(Path(id): Path<Uuid>, State(store): State<ContentStore>) -> Response {
    let content = lock(&store).get(&id).cloned();
    match content {
        Some(content) => {
            tracing::debug!("Serving content {} ({} bytes)", id, content.data.len());
            ([(header::CONTENT_TYPE, content.mime_type)], content.data).into_response()
        }
        None => {
            tracing::warn!("Request for unknown content {}", id);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_serves_registered_content() {
        let server = ContentServer::start(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        let url = server.register(&b"ID3 fake mp3"[..], "audio/mpeg");

        let prefix = format!("http://{}", server.local_addr());
        assert!(url.starts_with(&prefix));
        let path = &url[prefix.len()..];

        let response = http_get(server.local_addr(), path).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.to_ascii_lowercase().contains("content-type: audio/mpeg"));
        assert!(response.ends_with("ID3 fake mp3"));
    }

    #[tokio::test]
    async fn test_poisoned_store_keeps_serving() {
        let server = ContentServer::start(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        let url = server.register(&b"still here"[..], "audio/mpeg");

        let store = server.store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = store.lock().unwrap();
            panic!("poison the store");
        })
        .join();
        assert!(server.store.is_poisoned());

        assert_eq!(server.len(), 1);
        let path = &url[format!("http://{}", server.local_addr()).len()..];
        let response = http_get(server.local_addr(), path).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("still here"));
    }

    #[tokio::test]
    async fn test_unknown_and_cleared_content_is_not_found() {
        let server = ContentServer::start(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        let url = server.register(vec![1u8, 2, 3], "audio/wav");
        assert_eq!(server.len(), 1);

        server.clear();
        assert!(server.is_empty());

        let path = &url[format!("http://{}", server.local_addr()).len()..];
        let response = http_get(server.local_addr(), path).await;
        assert!(response.starts_with("HTTP/1.1 404"));

        let missing = format!("/content/{}", Uuid::new_v4());
        let response = http_get(server.local_addr(), &missing).await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }
}
