//! Asynchronous dispatch of callback invocations.
//!
//! Every invocation is answered exactly once, from its own task, so the
//! receive loop never waits on a handler. A missing handler, a handler
//! error, or a handler panic all produce the canonical negative response.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use sidecar_proto::{
    ClientEnvelope, ClientEvent, HookInvocationResponse, HookOutput, InvocationKind,
    PermissionDecision, PermissionDecisionResponse, ServerEnvelope, ServerEvent,
    ToolInvocationResponse, ToolResult,
};

use super::SessionInner;
use crate::handlers::InvocationContext;

/// Spawn the response task for a callback event. Other events are ignored.
pub(super) fn dispatch_invocation(inner: &Arc<SessionInner>, envelope: &ServerEnvelope) {
    let Some(kind) = envelope.event.invocation_kind() else {
        return;
    };
    let ctx = InvocationContext {
        session_id: inner.session_id.clone(),
        request_id: envelope.request_id().map(str::to_owned),
        turn_id: envelope.turn_id().map(str::to_owned),
        cancel: inner.cancel.child_token(),
    };
    let handlers = inner.handlers.clone();
    let event = envelope.event.clone();
    let inner = Arc::clone(inner);

    tokio::spawn(async move {
        let response = match event {
            ServerEvent::ToolInvocation(request) => {
                let invocation_id = request.invocation_id.clone();
                let tool_result = match handlers.tool {
                    Some(handler) => guarded(kind, &invocation_id, async move {
                        handler.handle(ctx, request).await
                    })
                    .await
                    .unwrap_or_else(ToolResult::error),
                    None => ToolResult::error("missing tool handler"),
                };
                ClientEvent::ToolResponse(ToolInvocationResponse {
                    invocation_id,
                    tool_result,
                })
            }
            ServerEvent::HookInvocation(request) => {
                let invocation_id = request.invocation_id.clone();
                let output = match handlers.hook {
                    Some(handler) => guarded(kind, &invocation_id, async move {
                        handler.handle(ctx, request).await
                    })
                    .await
                    .unwrap_or_else(HookOutput::stop),
                    None => HookOutput::stop("no hook handler"),
                };
                ClientEvent::HookResponse(HookInvocationResponse {
                    invocation_id,
                    output,
                })
            }
            ServerEvent::PermissionInvocation(request) => {
                let invocation_id = request.invocation_id.clone();
                let decision = match handlers.permission {
                    Some(handler) => guarded(kind, &invocation_id, async move {
                        handler.handle(ctx, request).await
                    })
                    .await
                    .unwrap_or_else(PermissionDecision::deny),
                    None => PermissionDecision::deny("no permission handler"),
                };
                ClientEvent::PermissionResponse(PermissionDecisionResponse {
                    invocation_id,
                    decision,
                })
            }
            _ => return,
        };

        let invocation_id = response.invocation_id().unwrap_or_default().to_owned();
        match inner.send(ClientEnvelope::new(response)).await {
            Ok(()) => debug!(kind = kind.as_str(), invocation_id, "Invocation answered"),
            Err(e) => warn!(
                kind = kind.as_str(),
                invocation_id,
                error = %e,
                "Failed to send invocation response"
            ),
        }
    });
}

/// Run a handler future in its own task.
///
/// Errors and panics both come back as `Err(reason)`.
async fn guarded<T, F>(kind: InvocationKind, invocation_id: &str, handler: F) -> Result<T, String>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    match tokio::spawn(handler).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(kind = kind.as_str(), invocation_id, error = %e, "Handler failed");
            Err(format!("{e:#}"))
        }
        Err(join) if join.is_panic() => {
            warn!(kind = kind.as_str(), invocation_id, "Handler panicked");
            Err(format!("{} handler panicked", kind.as_str()))
        }
        Err(_) => Err(format!("{} handler cancelled", kind.as_str())),
    }
}
