//! Primary-side argument listener.
//!
//! Accepts connections on the loopback listener bound during arbitration and
//! turns each `open_paths` request into raw arguments on an
//! [`ArgumentStream`]. Every connection is handled on its own task, so a slow
//! secondary never holds up the accept loop.
//!
//! Arguments from one connection reach the stream in the order they were
//! sent. Nothing is promised about interleaving across connections.

use super::protocol::{
    read_frame, write_frame, ChannelRequest, ChannelResponse, OpenPathsParams, OpenPathsResult,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, METHOD_OPEN_PATHS,
    PARSE_ERROR,
};
use super::RawArgument;
use crate::config::InstanceConfig;
use crate::error::{Result, VaultdeskError};
use futures::Stream;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Raw arguments received by the primary, in receipt order.
///
/// Ends once the listener has shut down and every connection handler has
/// finished.
#[derive(Debug)]
pub struct ArgumentStream {
    rx: mpsc::UnboundedReceiver<RawArgument>,
}

impl ArgumentStream {
    pub async fn recv(&mut self) -> Option<RawArgument> {
        self.rx.recv().await
    }
}

impl Stream for ArgumentStream {
    type Item = RawArgument;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Handle to a running argument listener. Dropping shuts it down.
#[derive(Debug)]
pub struct ListenerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    local_tx: Option<mpsc::UnboundedSender<RawArgument>>,
}

impl ListenerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue the primary's own launch arguments ahead of anything forwarded
    /// later. Returns how many were queued.
    pub fn deliver_local<I, S>(&self, args: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<RawArgument>,
    {
        let Some(tx) = &self.local_tx else {
            return 0;
        };
        args.into_iter()
            .map(|arg| tx.send(arg.into()).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    /// Stop accepting connections and close every active handler.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
        self.local_tx = None;
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Listener that feeds forwarded arguments to the primary.
pub struct ArgumentListener;

impl ArgumentListener {
    /// Start accepting on a listener bound during arbitration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen(listener: std::net::TcpListener) -> Result<(ListenerHandle, ArgumentStream)> {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        let addr = listener.local_addr()?;

        info!("Argument listener accepting on {}", addr);

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            tx.clone(),
            shutdown_rx,
            conn_shutdown_rx,
            active_connections,
        ));

        Ok((
            ListenerHandle {
                addr,
                shutdown_tx: Some(shutdown_tx),
                conn_shutdown_tx,
                task_handle: Some(task_handle),
                local_tx: Some(tx),
            },
            ArgumentStream { rx },
        ))
    }

    async fn accept_loop(
        listener: TcpListener,
        tx: mpsc::UnboundedSender<RawArgument>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Argument listener shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= InstanceConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting connection from {}: at max capacity ({})",
                                    peer_addr,
                                    InstanceConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let tx = tx.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("Secondary connected from {}", peer_addr);
                                if let Err(e) = Self::handle_connection(stream, &tx, &mut conn_shutdown).await {
                                    debug!("Connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Argument listener accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        tx: &mpsc::UnboundedSender<RawArgument>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()),
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(());
                }
            };

            let response = Self::process_request(&frame, tx);
            let response_bytes = serde_json::to_vec(&response)?;
            write_frame(&mut writer, &response_bytes).await?;
        }
    }

    fn process_request(frame: &[u8], tx: &mpsc::UnboundedSender<RawArgument>) -> ChannelResponse {
        let request: ChannelRequest = match serde_json::from_slice(frame) {
            Ok(req) => req,
            Err(e) => {
                return ChannelResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return ChannelResponse::error(
                request.id,
                INVALID_REQUEST,
                "Invalid Request: expected jsonrpc 2.0",
            );
        }

        if request.method != METHOD_OPEN_PATHS {
            return ChannelResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            );
        }

        let params = request
            .params
            .unwrap_or(serde_json::Value::Object(Default::default()));
        let params: OpenPathsParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return ChannelResponse::error(
                    request.id,
                    INVALID_PARAMS,
                    format!("Invalid params: {}", e),
                );
            }
        };

        match Self::enqueue(params.paths, tx) {
            Ok(accepted) => {
                match serde_json::to_value(OpenPathsResult { accepted }) {
                    Ok(result) => ChannelResponse::success(request.id, result),
                    Err(e) => ChannelResponse::error(request.id, INTERNAL_ERROR, e.to_string()),
                }
            }
            Err(e) => ChannelResponse::error(request.id, INTERNAL_ERROR, e.to_string()),
        }
    }

    fn enqueue(paths: Vec<String>, tx: &mpsc::UnboundedSender<RawArgument>) -> Result<usize> {
        let count = paths.len();
        for path in paths {
            debug!("Received forwarded argument: {}", path);
            tx.send(path)
                .map_err(|_| VaultdeskError::Other("Argument stream closed".to_string()))?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn bind_loopback() -> std::net::TcpListener {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap()
    }

    async fn roundtrip(addr: SocketAddr, payload: &[u8]) -> ChannelResponse {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        write_frame(&mut writer, payload).await.unwrap();
        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_open_paths_delivered_in_order() {
        let (mut handle, mut stream) = ArgumentListener::listen(bind_loopback()).unwrap();

        let paths = vec!["/one".to_string(), "/two".to_string(), "/three".to_string()];
        let request = serde_json::to_vec(&ChannelRequest::open_paths(&paths, 1)).unwrap();
        let response = roundtrip(handle.addr(), &request).await;

        assert!(response.error.is_none());
        assert_eq!(response.result, Some(serde_json::json!({"accepted": 3})));

        for expected in &paths {
            let got = tokio::time::timeout(Duration::from_secs(1), stream.next())
                .await
                .unwrap();
            assert_eq!(got.as_ref(), Some(expected));
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_local_arguments_join_stream() {
        let (mut handle, mut stream) = ArgumentListener::listen(bind_loopback()).unwrap();

        assert_eq!(handle.deliver_local(["/local"]), 1);
        assert_eq!(stream.recv().await.as_deref(), Some("/local"));

        handle.shutdown();
        assert_eq!(handle.deliver_local(["/late"]), 0);
    }

    #[tokio::test]
    async fn test_unknown_method_rejected() {
        let (mut handle, _stream) = ArgumentListener::listen(bind_loopback()).unwrap();

        let request =
            serde_json::to_vec(&ChannelRequest::new("delete_everything", serde_json::json!({}), 2))
                .unwrap();
        let response = roundtrip(handle.addr(), &request).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_json_returns_parse_error() {
        let (mut handle, _stream) = ArgumentListener::listen(bind_loopback()).unwrap();

        let response = roundtrip(handle.addr(), b"not valid json").await;
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_params_rejected() {
        let (mut handle, _stream) = ArgumentListener::listen(bind_loopback()).unwrap();

        let request = serde_json::to_vec(&ChannelRequest::new(
            METHOD_OPEN_PATHS,
            serde_json::json!({"paths": 42}),
            3,
        ))
        .unwrap();
        let response = roundtrip(handle.addr(), &request).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_stream_ends_after_shutdown() {
        let (mut handle, mut stream) = ArgumentListener::listen(bind_loopback()).unwrap();
        handle.shutdown();

        let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("stream should close after shutdown");
        assert!(next.is_none());
    }
}
