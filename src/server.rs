//! The listener side of the gateway: an accept loop that serves each
//! connection through hyper with socket-level deadlines, plus graceful
//! shutdown.
//!
//! `axum::serve` exposes no read/write/idle timeouts, so connections are
//! wrapped in [`TimeoutStream`] and served by hand. The numbers match the
//! server contract: 30 s to read a request, 120 s for a stalled write,
//! 120 s for an idle keep-alive connection.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpListener;
use tokio::time::Sleep;

pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(120);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Socket deadlines for one connection. A connection starts idle; the
/// first byte of a request switches it to active, where reads must keep
/// making progress within [`READ_TIMEOUT`]. A completed write means the
/// response is flowing, so the next read wait is keep-alive idle again and
/// gets [`IDLE_TIMEOUT`]. Writes that stall longer than [`WRITE_TIMEOUT`]
/// kill the connection.
struct TimeoutStream<S> {
    inner: S,
    idle: bool,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> TimeoutStream<S> {
    fn new(inner: S) -> Self {
        TimeoutStream {
            inner,
            idle: true,
            read_deadline: None,
            write_deadline: None,
        }
    }
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{what} timed out"))
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for TimeoutStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let filled_before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.read_deadline = None;
                if result.is_ok() && buf.filled().len() > filled_before {
                    this.idle = false;
                }
                Poll::Ready(result)
            }
            Poll::Pending => {
                let timeout = if this.idle { IDLE_TIMEOUT } else { READ_TIMEOUT };
                let deadline = this
                    .read_deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => Poll::Ready(Err(timed_out("read"))),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for TimeoutStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                this.write_deadline = None;
                // The response is flowing; the next read wait belongs to the
                // next request on this connection
                this.idle = true;
                this.read_deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                let deadline = this
                    .write_deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(WRITE_TIMEOUT)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => Poll::Ready(Err(timed_out("write"))),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Accepts connections until `shutdown` resolves, then stops accepting and
/// drains the in-flight connections.
pub async fn serve(listener: TcpListener, router: Router, shutdown: impl Future<Output = ()>) {
    let builder = Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                let io = TokioIo::new(TimeoutStream::new(stream));
                let service = TowerToHyperService::new(router.clone());
                let conn = builder.serve_connection_with_upgrades(io, service);
                let conn = graceful.watch(conn.into_owned());
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(error = %e, remote = %remote_addr, "Connection closed with error");
                    }
                });
            }
            () = &mut shutdown => break,
        }
    }

    graceful.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdsConfig;
    use crate::gateway_util::test_util::dummy_state;
    use crate::routes::build_router;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_times_out_at_idle_deadline() {
        let (client, server) = duplex(64);
        let mut stream = TimeoutStream::new(server);
        let start = Instant::now();

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(start.elapsed(), IDLE_TIMEOUT);
        drop(client);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_gap_times_out_once_request_started() {
        let (mut client, server) = duplex(64);
        let mut stream = TimeoutStream::new(server);

        client.write_all(b"GET").await.unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();

        // The connection is mid-request now, so the shorter deadline applies
        let start = Instant::now();
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(start.elapsed(), READ_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_returns_connection_to_idle() {
        let (mut client, server) = duplex(64);
        let mut stream = TimeoutStream::new(server);

        client.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(b"response").await.unwrap();

        let start = Instant::now();
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(start.elapsed(), IDLE_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        let (client, server) = duplex(4);
        let mut stream = TimeoutStream::new(server);
        let start = Instant::now();

        // The peer buffer fills and nothing drains it
        let err = stream.write_all(&[0u8; 64]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(start.elapsed(), WRITE_TIMEOUT);
        drop(client);
    }

    #[tokio::test]
    async fn test_serve_handles_requests_and_shuts_down() {
        let router = build_router(dummy_state(
            &["p1"],
            &[("my-model", vec![("p1", "good")])],
            ThresholdsConfig::default(),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, router, async move {
            rx.await.ok();
        }));

        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"GET / HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        conn.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("openmodel"));

        tx.send(()).ok();
        server.await.unwrap();
    }
}
