//! Connection dispatcher shared by both services
//!
//! Accepts stream connections and serves each one on its own task: read one
//! newline-terminated request, decode it, hand it to the service's
//! [`Handler`], write one response line, then half-close and close. Faults
//! never escape a connection; they become error responses.
//!
//! Concurrency is bounded by a semaphore. A connection arriving while every
//! slot is taken is answered with `server_busy` straight away, so the accept
//! loop itself never waits on a client. Those rejections are capped too:
//! once [`REJECT_SLOTS`] are in flight, further overflow is closed without a
//! reply.

use crate::config::Limits;
use log::{debug, error, info, warn};
use shared::codec::{read_frame_within, write_frame};
use shared::{decode_request, Request, Response, ServiceError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// How long a closing connection keeps draining unread input
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Concurrent `server_busy` replies; overflow beyond this is just closed
pub const REJECT_SLOTS: usize = 32;

/// Write deadline for a `server_busy` reply
const REJECT_DEADLINE: Duration = Duration::from_millis(500);

/// Domain side of a service: turns one decoded request into one response
///
/// Runs on the blocking pool, so implementations may touch the record store
/// or take locks directly.
pub trait Handler: Send + Sync + 'static {
    /// Identity returned by `ping`
    fn service_name(&self) -> &'static str;

    fn handle(&self, request: Request) -> Result<Response, ServiceError>;
}

pub struct Dispatcher<H: Handler> {
    listener: TcpListener,
    handler: Arc<H>,
    limits: Limits,
    slots: Arc<Semaphore>,
    rejects: Arc<Semaphore>,
}

impl<H: Handler> Dispatcher<H> {
    /// Binds the listening socket; an address already in use is an error
    pub async fn bind(addr: &str, handler: H, limits: Limits) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "{} service listening on {} (max {} connections, {} byte frames)",
            handler.service_name(),
            listener.local_addr()?,
            limits.max_connections,
            limits.max_frame_bytes
        );

        Ok(Dispatcher {
            listener,
            handler: Arc::new(handler),
            slots: Arc::new(Semaphore::new(limits.max_connections)),
            rejects: Arc::new(Semaphore::new(REJECT_SLOTS)),
            limits,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop; only returns if the runtime shuts it down
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            match Arc::clone(&self.slots).try_acquire_owned() {
                Ok(permit) => {
                    let handler = Arc::clone(&self.handler);
                    let limits = self.limits.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, peer, handler, &limits).await;
                        drop(permit);
                    });
                }
                Err(_) => self.reject(stream, peer),
            }
        }
    }

    fn reject(&self, stream: TcpStream, peer: SocketAddr) {
        match Arc::clone(&self.rejects).try_acquire_owned() {
            Ok(permit) => {
                warn!(
                    "Rejecting {}: all {} handler slots busy",
                    peer, self.limits.max_connections
                );
                tokio::spawn(async move {
                    reply_and_close(
                        stream,
                        Response::failure(&ServiceError::ServerBusy),
                        REJECT_DEADLINE,
                    )
                    .await;
                    drop(permit);
                });
            }
            Err(_) => {
                debug!("Dropping {}: rejection backlog full", peer);
                drop(stream);
            }
        }
    }
}

async fn serve_connection<H: Handler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    limits: &Limits,
) {
    debug!("Connection from {}", peer);

    let frame =
        read_frame_within(&mut stream, limits.max_frame_bytes, limits.read_timeout).await;

    let response = match frame {
        Ok(Some(frame)) => respond(frame, handler).await,
        Ok(None) => {
            debug!("{} closed without sending a request", peer);
            close(stream).await;
            return;
        }
        Err(e) => {
            warn!("Unreadable request from {}: {}", peer, e);
            Response::failure(&ServiceError::from(e))
        }
    };

    if let Err(e) = write_frame(&mut stream, &response).await {
        warn!("Failed to send response to {}: {}", peer, e);
    }
    close(stream).await;
}

async fn respond<H: Handler>(frame: Vec<u8>, handler: Arc<H>) -> Response {
    let request = match decode_request(&frame) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected request: {}", e);
            return Response::failure(&e);
        }
    };

    let action = request.action();
    debug!("Dispatching {} to {}", action, handler.service_name());

    match tokio::task::spawn_blocking(move || handler.handle(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            match &e {
                ServiceError::Internal(_) => error!("{} failed: {}", action, e),
                _ => debug!("{} refused: {}", action, e),
            }
            Response::failure(&e)
        }
        Err(e) => {
            error!("Handler for {} aborted: {}", action, e);
            Response::failure(&ServiceError::Internal(format!("{} handler aborted", action)))
        }
    }
}

async fn reply_and_close(mut stream: TcpStream, response: Response, deadline: Duration) {
    match tokio::time::timeout(deadline, write_frame(&mut stream, &response)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Failed to send rejection: {}", e),
        Err(_) => debug!("Timed out sending rejection"),
    }
    close(stream).await;
}

/// Half-closes, then drains leftover input before the socket is dropped
///
/// Dropping a socket with unread input makes the kernel send a reset, which
/// can destroy the response before the peer reads it.
async fn close(mut stream: TcpStream) {
    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown failed: {}", e);
        return;
    }

    let mut sink = [0u8; 4096];
    let _ = tokio::time::timeout(DRAIN_GRACE, async {
        while let Ok(n) = stream.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use shared::Pong;

    /// Echoes pings, panics on `get_global_stats`, refuses everything else
    struct CannedHandler;

    impl Handler for CannedHandler {
        fn service_name(&self) -> &'static str {
            "canned"
        }

        fn handle(&self, request: Request) -> Result<Response, ServiceError> {
            match request {
                Request::Ping => Response::ok(&Pong::new(self.service_name())),
                Request::GetGlobalStats => panic!("handler exploded"),
                Request::GetUserStats { .. } => {
                    std::thread::sleep(Duration::from_millis(300));
                    Response::ok(&json!({"slow": true}))
                }
                _ => Err(ServiceError::UnknownAction),
            }
        }
    }

    async fn start(limits: Limits) -> SocketAddr {
        let dispatcher = Dispatcher::bind("127.0.0.1:0", CannedHandler, limits)
            .await
            .unwrap();
        let addr = dispatcher.local_addr().unwrap();
        tokio::spawn(dispatcher.run());
        addr
    }

    async fn exchange(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    async fn exchange_json(addr: SocketAddr, payload: &[u8]) -> Value {
        let reply = exchange(addr, payload).await;
        assert_eq!(reply.last(), Some(&b'\n'), "response must end with newline");
        serde_json::from_slice(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_ping_roundtrip() {
        let addr = start(Limits::default()).await;
        let reply = exchange_json(addr, b"{\"action\":\"ping\"}\n").await;
        assert_eq!(
            reply,
            json!({"success": true, "pong": true, "service": "canned"})
        );
    }

    #[tokio::test]
    async fn test_request_without_newline_is_served_on_close() {
        let addr = start(Limits::default()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"{\"action\":\"ping\"}").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        let reply: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(reply["success"], json!(true));
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let addr = start(Limits::default()).await;
        let reply = exchange_json(addr, b"not json at all\n").await;
        assert_eq!(
            reply,
            json!({"success": false, "error": "invalid_request_format"})
        );
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let addr = start(Limits::default()).await;
        let reply = exchange_json(addr, b"{\"action\":\"bogus\"}\n").await;
        assert_eq!(reply, json!({"success": false, "error": "unknown_action"}));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_server_error() {
        let addr = start(Limits::default()).await;
        let reply = exchange_json(addr, b"{\"action\":\"get_global_stats\"}\n").await;
        assert_eq!(reply["success"], json!(false));
        assert_eq!(reply["error"], json!("server_error"));
        assert!(reply["details"].as_str().unwrap().contains("get_global_stats"));

        // The accept loop survives the fault
        let reply = exchange_json(addr, b"{\"action\":\"ping\"}\n").await;
        assert_eq!(reply["success"], json!(true));
    }

    #[tokio::test]
    async fn test_empty_connection_gets_no_reply() {
        let addr = start(Limits::default()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let limits = Limits {
            max_frame_bytes: 128,
            ..Limits::default()
        };
        let addr = start(limits).await;

        let mut payload = vec![b' '; 1024];
        payload.push(b'\n');
        let reply = exchange_json(addr, &payload).await;
        assert_eq!(reply["error"], json!("frame_too_large"));
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let limits = Limits {
            read_timeout: Duration::from_millis(50),
            ..Limits::default()
        };
        let addr = start(limits).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        let reply: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(reply, json!({"success": false, "error": "request_timeout"}));
    }

    #[tokio::test]
    async fn test_busy_when_all_slots_taken() {
        let limits = Limits {
            max_connections: 1,
            read_timeout: Duration::from_secs(2),
            ..Limits::default()
        };
        let addr = start(limits).await;

        // Holds the only slot without sending anything
        let idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let reply = exchange_json(addr, b"{\"action\":\"ping\"}\n").await;
        assert_eq!(reply, json!({"success": false, "error": "server_busy"}));

        drop(idle);
    }

    #[tokio::test]
    async fn test_busy_replies_are_capped() {
        let limits = Limits {
            max_connections: 1,
            read_timeout: Duration::from_secs(5),
            ..Limits::default()
        };
        let addr = start(limits).await;

        let idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Held open so every rejection stays in its drain window
        let mut flood = Vec::new();
        for _ in 0..REJECT_SLOTS + 16 {
            flood.push(TcpStream::connect(addr).await.unwrap());
        }

        let mut busy = 0;
        let mut bare = 0;
        for stream in flood.iter_mut() {
            let mut reply = Vec::new();
            tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut reply))
                .await
                .expect("rejected connection left open")
                .unwrap();
            if reply.is_empty() {
                bare += 1;
            } else {
                let reply: Value = serde_json::from_slice(&reply).unwrap();
                assert_eq!(reply["error"], json!("server_busy"));
                busy += 1;
            }
        }

        assert!(busy >= 1);
        assert!(busy <= REJECT_SLOTS);
        assert_eq!(busy + bare, REJECT_SLOTS + 16);

        drop(idle);
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_block_others() {
        let addr = start(Limits::default()).await;

        let slow = tokio::spawn(async move {
            exchange_json(addr, b"{\"action\":\"get_user_stats\",\"user_id\":1}\n").await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let reply = exchange_json(addr, b"{\"action\":\"ping\"}\n").await;
        assert_eq!(reply["success"], json!(true));
        assert!(started.elapsed() < Duration::from_millis(250));

        let slow = slow.await.unwrap();
        assert_eq!(slow["slow"], json!(true));
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let first = Dispatcher::bind("127.0.0.1:0", CannedHandler, Limits::default())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap().to_string();

        let second = Dispatcher::bind(&addr, CannedHandler, Limits::default()).await;
        assert!(second.is_err());
    }
}
