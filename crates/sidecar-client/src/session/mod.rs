//! Client session over one transport.
//!
//! A session owns the outbound sink (writes are serialized), a receive loop
//! that dispatches callbacks and publishes every inbound event to the
//! multiplexer, and the cancellation token every handler and stream
//! derives from.

mod dispatch;
mod types;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sidecar_core::ids::new_id;
use sidecar_proto::{
    CancelRequest, ClientEnvelope, ClientEvent, ClientHello, EndInputStream, InterruptRequest,
    QueryPrompt, QueryRequest, SetModelRequest, SetPermissionModeRequest, StreamInputChunk,
};

use crate::error::SessionError;
use crate::handlers::Handlers;
use crate::input::InputEvent;
use crate::mux::{EventMultiplexer, Subscription, SubscriptionId};
use crate::stream::Stream;
use crate::transport::{EnvelopeSink, EnvelopeSource};
use crate::turn::{RunResult, Turn, TurnFeed, collect_turns};

pub use types::SessionConfig;

/// Mint a fresh input stream reference.
pub fn new_input_stream_id() -> String {
    new_id("input")
}

/// Handle to an attached session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    session_id: String,
    sink: Mutex<Box<dyn EnvelopeSink>>,
    mux: Arc<EventMultiplexer>,
    handlers: Handlers,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SessionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInner")
            .field("session_id", &self.session_id)
            .field("handlers", &self.handlers)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    /// Write one envelope, filling in the session id when absent.
    pub(crate) async fn send(&self, mut envelope: ClientEnvelope) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed {
                session_id: self.session_id.clone(),
            });
        }
        if envelope.session_id.as_deref().is_none_or(str::is_empty) {
            envelope.session_id = Some(self.session_id.clone());
        }
        let mut sink = self.sink.lock().await;
        sink.send(&envelope).await?;
        drop(sink);
        debug!(
            session_id = %self.session_id,
            event = envelope.event.name(),
            request_id = envelope.request_id.as_deref().unwrap_or_default(),
            "Envelope sent"
        );
        Ok(())
    }
}

impl Session {
    /// Attach to a session: announce the client, then start receiving.
    pub async fn attach(
        session_id: impl Into<String>,
        sink: impl EnvelopeSink,
        source: impl EnvelopeSource,
        handlers: Handlers,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let session = Self::new(session_id.into(), Box::new(sink), handlers, config);
        let hello = ClientHello {
            protocol_version: session.inner.config.protocol.clone(),
            client_name: session.inner.config.client_name.clone(),
            client_version: session.inner.config.client_version.clone(),
        };
        session
            .inner
            .send(ClientEnvelope::new(ClientEvent::Hello(hello)))
            .await?;
        session.start_receive_loop(Box::new(source));
        info!(session_id = %session.inner.session_id, "Session attached");
        Ok(session)
    }

    fn new(
        session_id: String,
        sink: Box<dyn EnvelopeSink>,
        handlers: Handlers,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                session_id,
                sink: Mutex::new(sink),
                mux: Arc::new(EventMultiplexer::new()),
                handlers,
                config,
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn start_receive_loop(&self, mut source: Box<dyn EnvelopeSource>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let session_id = inner.session_id.clone();
            loop {
                let received = tokio::select! {
                    biased;
                    () = inner.cancel.cancelled() => {
                        debug!(%session_id, "Receive loop cancelled");
                        break;
                    }
                    received = source.recv() => received,
                };
                match received {
                    Ok(Some(envelope)) => {
                        dispatch::dispatch_invocation(&inner, &envelope);
                        inner.mux.publish(Arc::new(envelope));
                    }
                    Ok(None) => {
                        info!(%session_id, "Transport closed by service");
                        break;
                    }
                    Err(e) => {
                        warn!(%session_id, error = %e, "Receive failed, ending session");
                        break;
                    }
                }
            }
            inner.mux.close();
        });
    }

    /// Id stamped on every outbound envelope.
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Configuration the session was attached with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Token cancelled when the session closes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// The multiplexer fed by the receive loop.
    pub fn multiplexer(&self) -> &Arc<EventMultiplexer> {
        &self.inner.mux
    }

    /// Send an arbitrary envelope.
    pub async fn send(&self, envelope: ClientEnvelope) -> Result<(), SessionError> {
        self.inner.send(envelope).await
    }

    async fn send_request(&self, event: ClientEvent) -> Result<String, SessionError> {
        let request_id = new_id("req");
        self.inner
            .send(ClientEnvelope::new(event).with_request(request_id.clone()))
            .await?;
        Ok(request_id)
    }

    /// Start a request. Returns its minted request id.
    pub async fn start_request(&self, prompt: QueryPrompt) -> Result<String, SessionError> {
        self.send_request(ClientEvent::Query(QueryRequest { prompt }))
            .await
    }

    /// Start a request from a prompt string.
    pub async fn query(&self, prompt: impl Into<String>) -> Result<String, SessionError> {
        self.start_request(QueryPrompt::Text(prompt.into())).await
    }

    /// Start a request fed by a new input stream. Returns
    /// `(request_id, input_stream_id)`.
    pub async fn start_input_stream(&self) -> Result<(String, String), SessionError> {
        let stream_id = new_input_stream_id();
        let request_id = self
            .start_request(QueryPrompt::InputStream(stream_id.clone()))
            .await?;
        Ok((request_id, stream_id))
    }

    /// Send one JSON object on an input stream. Non-object payloads are rejected.
    pub async fn send_input_chunk(
        &self,
        input_stream_id: &str,
        event: serde_json::Value,
    ) -> Result<(), SessionError> {
        if !event.is_object() {
            return Err(SessionError::Input(
                "input chunk payload must be a JSON object".into(),
            ));
        }
        self.inner
            .send(ClientEnvelope::new(ClientEvent::InputChunk(
                StreamInputChunk {
                    input_stream_id: input_stream_id.to_string(),
                    event,
                },
            )))
            .await
    }

    /// Send a typed input event on an input stream.
    pub async fn send_input_event(
        &self,
        input_stream_id: &str,
        event: &InputEvent,
    ) -> Result<(), SessionError> {
        self.send_input_chunk(input_stream_id, event.to_value())
            .await
    }

    /// Mark an input stream as finished.
    pub async fn end_input_stream(&self, input_stream_id: &str) -> Result<(), SessionError> {
        self.inner
            .send(ClientEnvelope::new(ClientEvent::EndInput(EndInputStream {
                input_stream_id: input_stream_id.to_string(),
            })))
            .await
    }

    /// Interrupt the running turn. Returns the minted request id.
    pub async fn interrupt(&self) -> Result<String, SessionError> {
        self.send_request(ClientEvent::Interrupt(InterruptRequest {}))
            .await
    }

    /// Cancel outstanding work with a reason. Returns the minted request id.
    pub async fn cancel(&self, reason: impl Into<String>) -> Result<String, SessionError> {
        self.send_request(ClientEvent::Cancel(CancelRequest {
            reason: reason.into(),
        }))
        .await
    }

    /// Switch the permission mode. Returns the minted request id.
    pub async fn set_permission_mode(
        &self,
        mode: impl Into<String>,
    ) -> Result<String, SessionError> {
        self.send_request(ClientEvent::SetPermissionMode(SetPermissionModeRequest {
            mode: mode.into(),
        }))
        .await
    }

    /// Switch the model. Returns the minted request id.
    pub async fn set_model(&self, model: impl Into<String>) -> Result<String, SessionError> {
        self.send_request(ClientEvent::SetModel(SetModelRequest {
            model: model.into(),
        }))
        .await
    }

    /// Subscribe to every inbound event.
    pub fn events(&self) -> Subscription {
        self.inner
            .mux
            .subscribe_all(self.inner.config.buffers.events)
    }

    /// Subscribe to the events of one request.
    pub fn subscribe_request(&self, request_id: &str) -> Subscription {
        self.inner
            .mux
            .subscribe_request(request_id, self.inner.config.buffers.requests)
    }

    /// Drop a request subscription before its turn ends.
    pub fn unsubscribe_request(&self, request_id: &str, id: SubscriptionId) {
        self.inner.mux.unsubscribe_request(request_id, id);
    }

    /// Collect every turn of the session from now on.
    pub fn turns(&self) -> TurnFeed {
        collect_turns(
            self.events(),
            self.inner.config.buffers.turns,
            self.inner.cancel.child_token(),
        )
    }

    /// Start a request from a prompt string and stream its turn.
    pub async fn stream(&self, prompt: impl Into<String>) -> Result<Stream, SessionError> {
        self.stream_request(QueryPrompt::Text(prompt.into())).await
    }

    /// Start a request fed by `input_stream_id` and stream its turn.
    pub async fn stream_input(&self, input_stream_id: &str) -> Result<Stream, SessionError> {
        self.stream_request(QueryPrompt::InputStream(input_stream_id.to_string()))
            .await
    }

    /// The request subscription is opened before the query is sent, so no
    /// early event of the request can be missed.
    async fn stream_request(&self, prompt: QueryPrompt) -> Result<Stream, SessionError> {
        let request_id = new_id("req");
        let subscription = self.subscribe_request(&request_id);
        let query = ClientEnvelope::new(ClientEvent::Query(QueryRequest { prompt }))
            .with_request(request_id.clone());
        if let Err(e) = self.inner.send(query).await {
            self.inner
                .mux
                .unsubscribe_request(&request_id, subscription.id());
            return Err(e);
        }
        Ok(Stream::spawn(
            request_id,
            subscription,
            Arc::clone(&self.inner.mux),
            self.inner.config.buffers.partials,
            self.inner.cancel.child_token(),
        ))
    }

    /// Run a prompt to completion of its turn.
    pub async fn run(&self, prompt: impl Into<String>) -> Result<RunResult, SessionError> {
        self.stream(prompt).await?.result().await
    }

    /// Run a prompt and return only its turn.
    pub async fn query_turn(&self, prompt: impl Into<String>) -> Result<Turn, SessionError> {
        Ok(self.run(prompt).await?.turn)
    }

    /// Close the session: cancel handlers and streams, close the sink, and
    /// end every subscription. Idempotent.
    pub async fn close(&self) -> Result<(), SessionError> {
        if self.inner.cancel.is_cancelled() {
            return Ok(());
        }
        self.inner.cancel.cancel();
        self.inner.mux.close();
        let mut sink = self.inner.sink.lock().await;
        let closed = sink.close().await;
        drop(sink);
        info!(session_id = %self.inner.session_id, "Session closed");
        closed.map_err(SessionError::from)
    }

    /// Whether [`Session::close`] has run or the session was cancelled.
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::pair;
    use sidecar_proto::{QueryPrompt, ServerEnvelope, ServerEvent, SessionInit};
    use std::time::Duration;

    async fn attach() -> (Session, crate::transport::RemoteEnd) {
        let (sink, source, mut remote) = pair(16);
        let session = Session::attach(
            "sess-1",
            sink,
            source,
            Handlers::new(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        let hello = remote.next_outbound().await.unwrap();
        assert!(matches!(hello.event, ClientEvent::Hello(_)));
        (session, remote)
    }

    #[tokio::test]
    async fn attach_sends_hello_with_session_id() {
        let (sink, source, mut remote) = pair(4);
        let _session = Session::attach("sess-1", sink, source, Handlers::new(), SessionConfig::default())
            .await
            .unwrap();
        let hello = remote.next_outbound().await.unwrap();
        assert_eq!(hello.session_id.as_deref(), Some("sess-1"));
        let ClientEvent::Hello(hello) = hello.event else {
            panic!("expected hello");
        };
        assert_eq!(hello.protocol_version, "v1");
        assert_eq!(hello.client_name, "sidecar-client");
    }

    #[tokio::test]
    async fn query_mints_request_id() {
        let (session, mut remote) = attach().await;
        let request_id = session.query("hello").await.unwrap();
        assert!(request_id.starts_with("req_"));
        assert_eq!(request_id.len(), "req_".len() + 16);

        let sent = remote.next_outbound().await.unwrap();
        assert_eq!(sent.request_id.as_deref(), Some(request_id.as_str()));
        assert_eq!(
            sent.event,
            ClientEvent::Query(QueryRequest {
                prompt: QueryPrompt::Text("hello".into())
            })
        );
    }

    #[tokio::test]
    async fn input_stream_lifecycle() {
        let (session, mut remote) = attach().await;
        let (_request_id, stream_id) = session.start_input_stream().await.unwrap();
        assert!(stream_id.starts_with("input_"));
        session
            .send_input_event(&stream_id, &InputEvent::user_text("hi"))
            .await
            .unwrap();
        session.end_input_stream(&stream_id).await.unwrap();

        let query = remote.next_outbound().await.unwrap();
        assert_eq!(
            query.event,
            ClientEvent::Query(QueryRequest {
                prompt: QueryPrompt::InputStream(stream_id.clone())
            })
        );
        let ClientEvent::InputChunk(chunk) = remote.next_outbound().await.unwrap().event else {
            panic!("expected input chunk");
        };
        assert_eq!(chunk.input_stream_id, stream_id);
        assert_eq!(chunk.event["message"]["content"], "hi");
        assert!(matches!(
            remote.next_outbound().await.unwrap().event,
            ClientEvent::EndInput(_)
        ));
    }

    #[tokio::test]
    async fn non_object_input_chunk_is_rejected() {
        let (session, _remote) = attach().await;
        let err = session
            .send_input_chunk("input_x", serde_json::json!("text"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Input(_)));
    }

    #[tokio::test]
    async fn control_requests_each_mint_ids() {
        let (session, mut remote) = attach().await;
        let a = session.interrupt().await.unwrap();
        let b = session.set_model("opus").await.unwrap();
        let c = session.set_permission_mode("plan").await.unwrap();
        let d = session.cancel("user").await.unwrap();
        assert_eq!(
            [&a, &b, &c, &d].iter().collect::<std::collections::HashSet<_>>().len(),
            4
        );
        let names: Vec<_> = [
            remote.next_outbound().await.unwrap(),
            remote.next_outbound().await.unwrap(),
            remote.next_outbound().await.unwrap(),
            remote.next_outbound().await.unwrap(),
        ]
        .iter()
        .map(|e| e.event.name())
        .collect();
        assert_eq!(names, ["interrupt", "set_model", "set_permission_mode", "cancel"]);
    }

    #[tokio::test]
    async fn transport_eof_closes_subscriptions() {
        let (session, mut remote) = attach().await;
        let mut events = session.events();

        remote
            .push(ServerEnvelope::new(ServerEvent::SessionInit(SessionInit::default())))
            .await
            .unwrap();
        remote.close_inbound();

        let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first.event, ServerEvent::SessionInit(_)));
        let end = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert!(end.is_none());
        assert!(session.multiplexer().is_closed());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (session, _remote) = attach().await;
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());

        let err = session.query("late").await.unwrap_err();
        assert!(matches!(err, SessionError::Closed { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn failed_stream_send_releases_subscription() {
        let (session, mut remote) = attach().await;
        remote.close_outbound();

        let err = session.stream("hello").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(session.multiplexer().stats().requests, 0);
    }
}
