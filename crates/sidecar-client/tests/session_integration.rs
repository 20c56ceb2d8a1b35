#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Integration tests use unwrap for brevity

//! Session behaviour against an in-memory service.
//!
//! Covers request isolation, auto-close on turn end, concurrent turns,
//! early termination, and callback dispatch defaults.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sidecar_client::transport::{RemoteEnd, pair};
use sidecar_client::{
    Handlers, InvocationContext, Session, SessionConfig, SessionError, Subscription,
};
use sidecar_proto::{
    AssistantMessage, ClientEnvelope, ClientEvent, HookInvocation, HookOutput, HookSpecific,
    Message, MessageEvent, PermissionBehavior, PermissionDecision, PermissionInvocation,
    PermissionUpdate, QueryPrompt, ResultMessage, ServerEnvelope, ServerEvent, SidecarError,
    ToolInvocation, ToolResult, TurnBoundary,
};

const WAIT: Duration = Duration::from_secs(2);

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting")
}

async fn attach(handlers: Handlers) -> (Session, RemoteEnd) {
    let (sink, source, mut remote) = pair(64);
    let session = Session::attach("sess-it", sink, source, handlers, SessionConfig::default())
        .await
        .unwrap();
    let hello = within(remote.next_outbound()).await.unwrap();
    assert!(matches!(hello.event, ClientEvent::Hello(_)));
    (session, remote)
}

/// Wait for the next query the client sends; returns its request id.
async fn next_query(remote: &mut RemoteEnd) -> String {
    loop {
        let env = within(remote.next_outbound()).await.unwrap();
        if matches!(env.event, ClientEvent::Query(_)) {
            return env.request_id.unwrap();
        }
    }
}

async fn next_response(remote: &mut RemoteEnd) -> ClientEnvelope {
    loop {
        let env = within(remote.next_outbound()).await.unwrap();
        if env.event.invocation_id().is_some() {
            return env;
        }
    }
}

fn tagged(request_id: &str, turn_id: &str, event: ServerEvent) -> ServerEnvelope {
    ServerEnvelope::new(event)
        .with_request(request_id)
        .with_turn(turn_id)
}

fn assistant(request_id: &str, turn_id: &str, text: &str, partial: bool) -> ServerEnvelope {
    let message = Message::Assistant(AssistantMessage::from_text(text));
    tagged(
        request_id,
        turn_id,
        ServerEvent::Message(if partial {
            MessageEvent::partial(message)
        } else {
            MessageEvent::complete(message)
        }),
    )
}

fn result(request_id: &str, turn_id: &str, text: &str) -> ServerEnvelope {
    tagged(
        request_id,
        turn_id,
        ServerEvent::Message(MessageEvent::complete(Message::Result(
            ResultMessage::success(text),
        ))),
    )
}

fn begin(request_id: &str, turn_id: &str, index: u32) -> ServerEnvelope {
    tagged(request_id, turn_id, ServerEvent::Turn(TurnBoundary::begin(index)))
}

fn end(request_id: &str, turn_id: &str, index: u32) -> ServerEnvelope {
    tagged(request_id, turn_id, ServerEvent::Turn(TurnBoundary::end(index)))
}

async fn drain(sub: &mut Subscription) -> Vec<Arc<ServerEnvelope>> {
    let mut out = Vec::new();
    while let Some(event) = within(sub.recv()).await {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn request_subscriptions_are_isolated_and_auto_close() {
    let (session, remote) = attach(Handlers::new()).await;
    let mut a = session.subscribe_request("req_a");
    let mut b = session.subscribe_request("req_b");

    for env in [
        begin("req_a", "ta", 1),
        begin("req_b", "tb", 1),
        assistant("req_a", "ta", "a1", false),
        assistant("req_b", "tb", "b1", false),
        assistant("req_a", "ta", "a2", false),
        end("req_a", "ta", 1),
        assistant("req_b", "tb", "b2", false),
        end("req_b", "tb", 1),
    ] {
        remote.push(env).await.unwrap();
    }

    let a_events = drain(&mut a).await;
    let b_events = drain(&mut b).await;

    assert_eq!(a_events.len(), 4);
    assert!(a_events.iter().all(|e| e.request_id() == Some("req_a")));
    assert!(a_events.last().unwrap().is_turn_end());

    assert_eq!(b_events.len(), 4);
    assert!(b_events.iter().all(|e| e.request_id() == Some("req_b")));

    // Auto-closed: further reads end immediately.
    assert!(within(a.recv()).await.is_none());
}

#[tokio::test]
async fn resubscribe_after_turn_end_delivers_nothing() {
    let (session, remote) = attach(Handlers::new()).await;
    let mut global = session.events();

    remote.push(end("req_done", "t1", 1)).await.unwrap();
    // Once the global subscriber has seen it, the turn-end has been published.
    assert!(within(global.recv()).await.unwrap().is_turn_end());

    let mut late = session.subscribe_request("req_done");
    remote
        .push(assistant("req_done", "t1", "straggler", false))
        .await
        .unwrap();
    assert!(within(late.recv()).await.is_none());
}

#[tokio::test]
async fn run_aggregates_the_turn() {
    let (session, mut remote) = attach(Handlers::new()).await;

    let service = tokio::spawn(async move {
        let request_id = next_query(&mut remote).await;
        for env in [
            begin(&request_id, "T1", 1),
            assistant(&request_id, "T1", "p", true),
            assistant(&request_id, "T1", "f", false),
            result(&request_id, "T1", "ok"),
            end(&request_id, "T1", 1),
        ] {
            remote.push(env).await.unwrap();
        }
        remote
    });

    let run = within(session.run("hello")).await.unwrap();
    let turn = &run.turn;
    assert!(turn.started);
    assert!(turn.ended);
    assert_eq!(turn.turn_index, 1);
    assert_eq!(turn.partials.len(), 1);
    assert_eq!(turn.messages.len(), 2);
    assert_eq!(run.assistant().unwrap().text(), "f");
    assert_eq!(run.result().unwrap().result, "ok");
    service.await.unwrap();
}

#[tokio::test]
async fn stream_mirrors_partials_before_result() {
    let (session, mut remote) = attach(Handlers::new()).await;
    let mut stream = session.stream("write a haiku").await.unwrap();
    let request_id = next_query(&mut remote).await;
    assert_eq!(request_id, stream.request_id());

    remote.push(begin(&request_id, "T1", 1)).await.unwrap();
    remote
        .push(assistant(&request_id, "T1", "old pond", true))
        .await
        .unwrap();
    let partial = within(stream.next_partial()).await.unwrap();
    assert_eq!(partial.message.as_assistant().unwrap().text(), "old pond");

    remote
        .push(assistant(&request_id, "T1", "old pond / frog", false))
        .await
        .unwrap();
    remote.push(end(&request_id, "T1", 1)).await.unwrap();

    let run = within(stream.result()).await.unwrap();
    assert_eq!(run.assistant().unwrap().text(), "old pond / frog");
}

#[tokio::test]
async fn concurrent_streams_get_disjoint_turns() {
    let (session, mut remote) = attach(Handlers::new()).await;
    let first = session.stream("one").await.unwrap();
    let second = session.stream("two").await.unwrap();
    let r1 = next_query(&mut remote).await;
    let r2 = next_query(&mut remote).await;

    for env in [
        begin(&r1, "t1", 1),
        begin(&r2, "t2", 1),
        assistant(&r1, "t1", "1a", false),
        assistant(&r2, "t2", "2a", false),
        assistant(&r2, "t2", "2b", false),
        assistant(&r1, "t1", "1b", false),
        end(&r2, "t2", 1),
        end(&r1, "t1", 1),
    ] {
        remote.push(env).await.unwrap();
    }

    let texts = |run: &sidecar_client::RunResult| -> Vec<String> {
        run.turn
            .messages
            .iter()
            .filter_map(|m| m.message.as_assistant().map(AssistantMessage::text))
            .collect()
    };

    let one = within(first.result()).await.unwrap();
    let two = within(second.result()).await.unwrap();
    assert_eq!(texts(&one), ["1a", "1b"]);
    assert_eq!(texts(&two), ["2a", "2b"]);
    assert_eq!(one.request_id(), Some(r1.as_str()));
    assert_eq!(two.request_id(), Some(r2.as_str()));
}

#[tokio::test]
async fn transport_end_fails_open_streams() {
    let (session, mut remote) = attach(Handlers::new()).await;
    let stream = session.stream("never finishes").await.unwrap();
    let request_id = next_query(&mut remote).await;

    remote.push(begin(&request_id, "T1", 1)).await.unwrap();
    remote
        .push(assistant(&request_id, "T1", "half", true))
        .await
        .unwrap();
    remote.close_inbound();

    let err = within(stream.result()).await.unwrap_err();
    assert!(matches!(err, SessionError::StreamEndedEarly { .. }));
}

#[tokio::test]
async fn protocol_errors_are_data() {
    let (session, mut remote) = attach(Handlers::new()).await;
    let stream = session.stream("q").await.unwrap();
    let request_id = next_query(&mut remote).await;

    remote
        .push(tagged(
            &request_id,
            "T1",
            ServerEvent::Error(SidecarError {
                code: "rate_limited".into(),
                message: "slow down".into(),
                fatal: true,
            }),
        ))
        .await
        .unwrap();
    remote.push(end(&request_id, "T1", 1)).await.unwrap();

    let run = within(stream.result()).await.unwrap();
    assert_eq!(run.turn.errors.len(), 1);
    assert!(run.turn.errors[0].fatal);
    assert!(!session.is_closed());
}

#[tokio::test]
async fn dropping_a_stream_releases_its_subscription() {
    let (session, mut remote) = attach(Handlers::new()).await;
    let stream = session.stream("q").await.unwrap();
    let _ = next_query(&mut remote).await;
    assert_eq!(session.multiplexer().stats().request_subscriptions, 1);

    drop(stream);
    within(async {
        while session.multiplexer().stats().request_subscriptions != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn turns_feed_collects_every_turn() {
    let (session, remote) = attach(Handlers::new()).await;
    let mut feed = session.turns();

    remote.push(begin("r1", "t1", 1)).await.unwrap();
    remote.push(assistant("r1", "t1", "x", false)).await.unwrap();
    remote.push(end("r1", "t1", 1)).await.unwrap();
    remote.push(begin("r1", "t2", 2)).await.unwrap();
    remote.push(end("r1", "t2", 2)).await.unwrap();

    let first = within(feed.recv()).await.unwrap();
    let second = within(feed.recv()).await.unwrap();
    assert_eq!(first.turn_id, "t1");
    assert_eq!(first.latest_assistant().unwrap().text(), "x");
    assert_eq!(second.turn_id, "t2");
    assert_eq!(second.turn_index, 2);
}

#[tokio::test]
async fn missing_handlers_answer_with_canonical_negatives() {
    let (_session, mut remote) = attach(Handlers::new()).await;

    remote
        .push(tagged(
            "r1",
            "t1",
            ServerEvent::ToolInvocation(ToolInvocation {
                invocation_id: "inv_tool".into(),
                tool_id: "mcp__x__y".into(),
                ..ToolInvocation::default()
            }),
        ))
        .await
        .unwrap();
    remote
        .push(tagged(
            "r1",
            "t1",
            ServerEvent::HookInvocation(HookInvocation {
                invocation_id: "inv_hook".into(),
                hook_event: "PreToolUse".into(),
                ..HookInvocation::default()
            }),
        ))
        .await
        .unwrap();
    remote
        .push(tagged(
            "r1",
            "t1",
            ServerEvent::PermissionInvocation(PermissionInvocation {
                invocation_id: "inv_perm".into(),
                tool_id: "Bash".into(),
                attempt: 1,
                ..PermissionInvocation::default()
            }),
        ))
        .await
        .unwrap();

    let mut seen = HashSet::new();
    for _ in 0..3 {
        let response = next_response(&mut remote).await;
        assert_eq!(response.session_id.as_deref(), Some("sess-it"));
        assert!(seen.insert(response.event.invocation_id().unwrap().to_string()));
        match response.event {
            ClientEvent::ToolResponse(r) => {
                assert_eq!(r.invocation_id, "inv_tool");
                assert!(r.tool_result.is_error);
            }
            ClientEvent::HookResponse(r) => {
                assert_eq!(r.invocation_id, "inv_hook");
                assert!(!r.output.should_continue());
            }
            ClientEvent::PermissionResponse(r) => {
                assert_eq!(r.invocation_id, "inv_perm");
                assert_eq!(r.decision.behavior, PermissionBehavior::Deny);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
    assert_eq!(seen.len(), 3);
    assert!(remote.try_next_outbound().is_none());
}

#[tokio::test]
async fn failing_and_panicking_handlers_are_contained() {
    let handlers = Handlers::new()
        .with_tool(|_ctx: InvocationContext, _req: ToolInvocation| async {
            Err::<ToolResult, _>(anyhow::anyhow!("disk full"))
        })
        .with_hook(|_ctx: InvocationContext, req: HookInvocation| async move {
            assert!(req.invocation_id.is_empty(), "hook exploded");
            anyhow::Ok(HookOutput::proceed())
        });
    let (session, mut remote) = attach(handlers).await;

    remote
        .push(ServerEnvelope::new(ServerEvent::ToolInvocation(ToolInvocation {
            invocation_id: "inv_1".into(),
            ..ToolInvocation::default()
        })))
        .await
        .unwrap();
    remote
        .push(ServerEnvelope::new(ServerEvent::HookInvocation(HookInvocation {
            invocation_id: "inv_2".into(),
            ..HookInvocation::default()
        })))
        .await
        .unwrap();

    for _ in 0..2 {
        match next_response(&mut remote).await.event {
            ClientEvent::ToolResponse(r) => {
                assert_eq!(r.invocation_id, "inv_1");
                assert!(r.tool_result.is_error);
                assert_eq!(
                    r.tool_result.content,
                    vec![sidecar_proto::ContentBlock::text("disk full")]
                );
            }
            ClientEvent::HookResponse(r) => {
                assert_eq!(r.invocation_id, "inv_2");
                assert_eq!(r.output.continue_, Some(false));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    // The receive loop survived both failures.
    let mut events = session.events();
    remote.push(end("r9", "t9", 1)).await.unwrap();
    assert!(within(events.recv()).await.unwrap().is_turn_end());
}

#[tokio::test]
async fn slow_handler_does_not_stall_event_delivery() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    let handlers = Handlers::new().with_permission(
        move |ctx: InvocationContext, req: PermissionInvocation| {
            let calls = Arc::clone(&calls_in);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                ctx.cancel.cancelled().await;
                anyhow::Ok(PermissionDecision::allow(req.tool_id))
            }
        },
    );
    let (session, remote) = attach(handlers).await;
    let mut events = session.events();

    remote
        .push(tagged(
            "r1",
            "t1",
            ServerEvent::PermissionInvocation(PermissionInvocation {
                invocation_id: "inv_slow".into(),
                ..PermissionInvocation::default()
            }),
        ))
        .await
        .unwrap();
    remote.push(end("r1", "t1", 1)).await.unwrap();

    let first = within(events.recv()).await.unwrap();
    assert!(matches!(first.event, ServerEvent::PermissionInvocation(_)));
    assert!(within(events.recv()).await.unwrap().is_turn_end());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn start_request_with_input_stream_prompt() {
    let (session, mut remote) = attach(Handlers::new()).await;
    let stream_id = sidecar_client::session::new_input_stream_id();
    let stream = session.stream_input(&stream_id).await.unwrap();

    let query = within(remote.next_outbound()).await.unwrap();
    assert_eq!(query.request_id.as_deref(), Some(stream.request_id()));
    assert_eq!(
        query.event,
        ClientEvent::Query(sidecar_proto::QueryRequest {
            prompt: QueryPrompt::InputStream(stream_id)
        })
    );
    stream.cancel();
    assert!(matches!(
        within(stream.result()).await.unwrap_err(),
        SessionError::Cancelled
    ));
}

#[tokio::test]
async fn close_resolves_streams_and_subscriptions() {
    let (session, mut remote) = attach(Handlers::new()).await;
    let mut events = session.events();
    let stream = session.stream("q").await.unwrap();
    let _ = next_query(&mut remote).await;

    session.close().await.unwrap();

    assert!(within(events.recv()).await.is_none());
    assert!(within(stream.result()).await.is_err());
}

#[tokio::test]
async fn typed_hook_and_permission_updates_reach_the_service() {
    let handlers = Handlers::new()
        .with_hook(|_ctx: InvocationContext, _req: HookInvocation| async {
            let output = HookOutput::proceed().with_specific(
                &HookSpecific::pre_tool_use_updated_input(serde_json::json!({"text": "rewritten"})),
            )?;
            anyhow::Ok(output)
        })
        .with_permission(|_ctx: InvocationContext, req: PermissionInvocation| async move {
            anyhow::Ok(
                PermissionDecision::allow("remember")
                    .with_updated_permissions(req.suggested_updates()),
            )
        });
    let (_session, mut remote) = attach(handlers).await;

    remote
        .push(tagged(
            "r1",
            "t1",
            ServerEvent::HookInvocation(HookInvocation {
                invocation_id: "inv_hook".into(),
                hook_event: "PreToolUse".into(),
                ..HookInvocation::default()
            }),
        ))
        .await
        .unwrap();
    let response = next_response(&mut remote).await;
    let ClientEvent::HookResponse(hook) = response.event else {
        panic!("expected hook response");
    };
    assert_eq!(
        hook.output.specific(),
        Some(HookSpecific::pre_tool_use_updated_input(
            serde_json::json!({"text": "rewritten"})
        ))
    );

    remote
        .push(tagged(
            "r1",
            "t1",
            ServerEvent::PermissionInvocation(PermissionInvocation {
                invocation_id: "inv_perm".into(),
                tool_id: "Edit".into(),
                attempt: 1,
                suggestions: vec![serde_json::json!({
                    "type": "setMode",
                    "mode": "acceptEdits",
                    "destination": "session",
                })],
                ..PermissionInvocation::default()
            }),
        ))
        .await
        .unwrap();
    let response = next_response(&mut remote).await;
    let ClientEvent::PermissionResponse(permission) = response.event else {
        panic!("expected permission response");
    };
    assert_eq!(permission.decision.behavior, PermissionBehavior::Allow);
    assert_eq!(
        permission.decision.updated_permissions,
        vec![PermissionUpdate::set_mode("acceptEdits", "session")]
    );
}
