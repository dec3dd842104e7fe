//! Control socket server
//!
//! Each connection is served by one task. Requests on a connection are
//! handled in order; every attached operation gets a forwarding task that
//! pushes its live events to the connection's writer until the terminal
//! event, then an end frame.

use crate::protocol::{self, ServerFrame};
use crate::watchdog::Activity;
use pkgd_dispatch::{Request, RequestDispatcher, Response};
use pkgd_registry::Subscription;
use pkgd_types::{Caller, OperationId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Server {
    dispatcher: Arc<RequestDispatcher>,
    activity: Arc<Activity>,
    max_request_bytes: usize,
}

impl Server {
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        activity: Arc<Activity>,
        max_request_bytes: usize,
    ) -> Self {
        Self {
            dispatcher,
            activity,
            max_request_bytes,
        }
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run(self, listener: UnixListener, shutdown: impl Future<Output = ()>) {
        let server = Arc::new(self);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let server = Arc::clone(&server);
                        tokio::spawn(async move { server.serve(stream).await });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                () = &mut shutdown => {
                    info!("shutting down listener");
                    break;
                }
            }
        }
    }

    /// Serve one connection until the peer hangs up
    pub async fn serve(&self, stream: UnixStream) {
        let caller = match stream.peer_cred() {
            Ok(cred) => Caller::new(cred.uid(), cred.pid()),
            Err(e) => {
                warn!(error = %e, "cannot read peer credentials, closing");
                return;
            }
        };
        let _connection = self.activity.connect();
        debug!(caller = %caller, "client connected");

        let (read_half, mut write_half) = stream.into_split();
        let (frames, mut outgoing) = mpsc::unbounded_channel::<ServerFrame>();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outgoing.recv().await {
                let line = match protocol::encode(&frame) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "cannot encode frame");
                        continue;
                    }
                };
                if write_half.write_all(&line).await.is_err() {
                    break;
                }
            }
        });

        let mut connection = Connection {
            caller,
            frames,
            forwarders: HashMap::new(),
        };
        let mut reader = BufReader::new(read_half);
        loop {
            let line = match read_line(&mut reader, self.max_request_bytes).await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(reason) => {
                    warn!(caller = %caller, %reason, "closing connection");
                    break;
                }
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.activity.touch();
            connection.handle(&self.dispatcher, &line).await;
        }

        connection.close();
        // the writer ends once every sender is gone
        drop(connection);
        let _ = writer.await;
        debug!(caller = %caller, "client disconnected");
    }
}

/// Read one newline-terminated line of at most `limit` bytes
///
/// `Ok(None)` means the peer closed the connection.
async fn read_line<R>(reader: &mut BufReader<R>, limit: usize) -> Result<Option<Vec<u8>>, String>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let bound = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let read = reader
        .take(bound)
        .read_until(b'\n', &mut line)
        .await
        .map_err(|e| e.to_string())?;
    if read == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    } else if line.len() > limit {
        return Err(format!("request exceeds {limit} bytes"));
    }
    Ok(Some(line))
}

struct Connection {
    caller: Caller,
    frames: mpsc::UnboundedSender<ServerFrame>,
    forwarders: HashMap<OperationId, JoinHandle<()>>,
}

impl Connection {
    async fn handle(&mut self, dispatcher: &RequestDispatcher, line: &[u8]) {
        let frame = match protocol::decode(line) {
            Ok(frame) => frame,
            Err((id, reason)) => {
                self.send(ServerFrame::malformed(id, reason));
                return;
            }
        };
        let id = frame.id;
        let detach = match &frame.request {
            Request::Detach { operation } => Some(*operation),
            _ => None,
        };

        match dispatcher.dispatch(&self.caller, frame.request).await {
            Response::Reply(reply) => {
                if let (Some(operation), false) = (detach, reply.is_error()) {
                    self.stop_forwarding(operation);
                }
                self.send(ServerFrame::reply(id, reply));
            }
            Response::Attached {
                snapshot,
                subscription,
            } => {
                let operation = snapshot.operation;
                self.send(ServerFrame::reply(
                    id,
                    pkgd_dispatch::Reply::Attached { snapshot },
                ));
                self.forward(id, operation, subscription);
            }
        }
    }

    fn send(&self, frame: ServerFrame) {
        // fails only once the writer is gone, which ends the connection anyway
        let _ = self.frames.send(frame);
    }

    fn forward(&mut self, id: u64, operation: OperationId, mut subscription: Subscription) {
        self.stop_forwarding(operation);
        let frames = self.frames.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if frames.send(ServerFrame::event(id, event)).is_err() {
                    return;
                }
            }
            let _ = frames.send(ServerFrame::end(id));
        });
        self.forwarders.insert(operation, task);
    }

    fn stop_forwarding(&mut self, operation: OperationId) {
        if let Some(task) = self.forwarders.remove(&operation) {
            // aborting drops the subscription, which detaches it
            task.abort();
        }
    }

    fn close(&mut self) {
        for (_, task) in self.forwarders.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::Services;
    use pkgd_config::{Config, Grant};
    use serde_json::{json, Value};

    async fn connected() -> (Services, Arc<Activity>, JoinHandle<()>, UnixStream) {
        let mut config = Config::default();
        config.auth.actions.insert("remove".to_string(), Grant::None);
        let services = Services::build(&config).await.unwrap();
        let activity = Activity::new();
        let server = Server::new(Arc::clone(&services.dispatcher), Arc::clone(&activity), 4096);
        let (ours, theirs) = UnixStream::pair().unwrap();
        let task = tokio::spawn(async move { server.serve(theirs).await });
        (services, activity, task, ours)
    }

    async fn next_frame(
        lines: &mut tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
    ) -> Value {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_request_reply_roundtrip() {
        let (_services, activity, task, stream) = connected().await;
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write
            .write_all(b"{\"id\": 1, \"request\": {\"method\": \"get_version\"}}\n")
            .await
            .unwrap();
        let frame = next_frame(&mut lines).await;
        assert_eq!(frame, json!({"id": 1, "reply": {"type": "version", "api": 2}}));
        assert_eq!(activity.connections(), 1);

        write.write_all(b"{\"id\": 2, \"request\": {\"method\": \"nope\"}}\n").await.unwrap();
        let frame = next_frame(&mut lines).await;
        assert_eq!(frame["id"], 2);
        assert_eq!(frame["reply"]["code"], "request.malformed");

        drop(write);
        task.await.unwrap();
        assert_eq!(activity.connections(), 0);
    }

    #[tokio::test]
    async fn test_oversized_request_closes_connection() {
        let (_services, _activity, task, stream) = connected().await;
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        let huge = vec![b'x'; 10_000];
        // the server may close before the whole payload is written
        let _ = write.write_all(&huge).await;
        task.await.unwrap();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_streams_until_end() {
        let (_services, _activity, _task, stream) = connected().await;
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        // the empty in-memory catalog resolves removal of a missing package to nothing
        let begin = json!({
            "id": 1,
            "request": {"method": "begin_transaction", "action": "remove", "targets": ["ghost"]}
        });
        write
            .write_all(format!("{begin}\n").as_bytes())
            .await
            .unwrap();
        let began = next_frame(&mut lines).await;
        let operation = began["reply"]["operation"].as_str().unwrap().to_string();

        let attach = json!({"id": 2, "request": {"method": "attach", "operation": operation}});
        write
            .write_all(format!("{attach}\n").as_bytes())
            .await
            .unwrap();

        let mut saw_terminal = false;
        loop {
            let frame = next_frame(&mut lines).await;
            assert_eq!(frame["id"], 2);
            if frame.get("end").is_some() {
                break;
            }
            let events = match (frame.get("reply"), frame.get("event")) {
                (Some(reply), _) => reply["snapshot"]["events"].as_array().unwrap().clone(),
                (None, Some(event)) => vec![event.clone()],
                _ => panic!("unexpected frame {frame}"),
            };
            saw_terminal |= events.iter().any(|e| e["kind"]["type"] == "terminal");
        }
        assert!(saw_terminal);
    }
}
