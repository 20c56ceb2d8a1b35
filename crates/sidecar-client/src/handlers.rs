//! Callback handlers for tool, hook, and permission invocations.
//!
//! Handlers return `anyhow::Result`; any error (or panic) is turned into the
//! canonical negative response for its kind by the session.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use sidecar_proto::{
    HookInvocation, HookOutput, PermissionDecision, PermissionInvocation, ToolInvocation,
    ToolResult,
};

/// Context passed to every handler invocation.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub session_id: String,
    pub request_id: Option<String>,
    pub turn_id: Option<String>,
    /// Cancelled when the session closes.
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: InvocationContext,
        request: ToolInvocation,
    ) -> anyhow::Result<ToolResult>;
}

#[async_trait]
pub trait HookHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: InvocationContext,
        request: HookInvocation,
    ) -> anyhow::Result<HookOutput>;
}

#[async_trait]
pub trait PermissionHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: InvocationContext,
        request: PermissionInvocation,
    ) -> anyhow::Result<PermissionDecision>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(InvocationContext, ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: InvocationContext,
        request: ToolInvocation,
    ) -> anyhow::Result<ToolResult> {
        self(ctx, request).await
    }
}

#[async_trait]
impl<F, Fut> HookHandler for F
where
    F: Fn(InvocationContext, HookInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HookOutput>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: InvocationContext,
        request: HookInvocation,
    ) -> anyhow::Result<HookOutput> {
        self(ctx, request).await
    }
}

#[async_trait]
impl<F, Fut> PermissionHandler for F
where
    F: Fn(InvocationContext, PermissionInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<PermissionDecision>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: InvocationContext,
        request: PermissionInvocation,
    ) -> anyhow::Result<PermissionDecision> {
        self(ctx, request).await
    }
}

/// The set of handlers a session dispatches to. Any may be absent.
#[derive(Clone, Default)]
pub struct Handlers {
    pub tool: Option<Arc<dyn ToolHandler>>,
    pub hook: Option<Arc<dyn HookHandler>>,
    pub permission: Option<Arc<dyn PermissionHandler>>,
}

impl Handlers {
    /// Empty set; every invocation gets the canonical negative response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle tool invocations with `handler`.
    #[must_use]
    pub fn with_tool(mut self, handler: impl ToolHandler) -> Self {
        self.tool = Some(Arc::new(handler));
        self
    }

    /// Handle hook invocations with `handler`.
    #[must_use]
    pub fn with_hook(mut self, handler: impl HookHandler) -> Self {
        self.hook = Some(Arc::new(handler));
        self
    }

    /// Handle permission invocations with `handler`.
    #[must_use]
    pub fn with_permission(mut self, handler: impl PermissionHandler) -> Self {
        self.permission = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("tool", &self.tool.is_some())
            .field("hook", &self.hook.is_some())
            .field("permission", &self.permission.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Ask / confirm
// ---------------------------------------------------------------------------

/// Answer from an interactive confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Confirmation {
    pub approved: bool,
    pub reason: String,
}

impl Confirmation {
    /// Approved, with a reason.
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
        }
    }

    /// Rejected, with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
        }
    }
}

/// Asks a human (or any out-of-band party) to confirm a permission request.
#[async_trait]
pub trait ConfirmHandler: Send + Sync + 'static {
    async fn confirm(
        &self,
        ctx: InvocationContext,
        prompt: String,
        request: PermissionInvocation,
    ) -> anyhow::Result<Confirmation>;
}

#[async_trait]
impl<F, Fut> ConfirmHandler for F
where
    F: Fn(InvocationContext, String, PermissionInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Confirmation>> + Send + 'static,
{
    async fn confirm(
        &self,
        ctx: InvocationContext,
        prompt: String,
        request: PermissionInvocation,
    ) -> anyhow::Result<Confirmation> {
        self(ctx, prompt, request).await
    }
}

/// Prompt shown when the request carries none of its own.
pub fn default_permission_prompt(request: &PermissionInvocation) -> String {
    if let Some(prompt) = request.prompt.as_deref().filter(|p| !p.is_empty()) {
        return prompt.to_string();
    }
    if request.tool_id.is_empty() {
        "Allow the requested tool to run? (y/n): ".to_string()
    } else {
        format!("Allow tool {} to run? (y/n): ", request.tool_id)
    }
}

/// Two-phase permission handler.
///
/// The first attempt goes to the `decide` handler, which may answer `ask`
/// to escalate. Later attempts go to the confirmer with a prompt. Without a
/// `decide` handler the first attempt answers `ask` when a confirmer exists.
pub struct AskConfirm {
    decide: Option<Arc<dyn PermissionHandler>>,
    confirm: Option<Arc<dyn ConfirmHandler>>,
    prompt: fn(&PermissionInvocation) -> String,
}

impl AskConfirm {
    /// Combinator with no handlers; it denies everything.
    pub fn new() -> Self {
        Self {
            decide: None,
            confirm: None,
            prompt: default_permission_prompt,
        }
    }

    /// Handler for first attempts.
    #[must_use]
    pub fn decide(mut self, handler: impl PermissionHandler) -> Self {
        self.decide = Some(Arc::new(handler));
        self
    }

    /// Confirmer for later attempts.
    #[must_use]
    pub fn confirm(mut self, handler: impl ConfirmHandler) -> Self {
        self.confirm = Some(Arc::new(handler));
        self
    }

    /// Replace the prompt builder.
    #[must_use]
    pub fn with_prompt(mut self, prompt: fn(&PermissionInvocation) -> String) -> Self {
        self.prompt = prompt;
        self
    }
}

impl Default for AskConfirm {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AskConfirm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskConfirm")
            .field("decide", &self.decide.is_some())
            .field("confirm", &self.confirm.is_some())
            .finish_non_exhaustive()
    }
}

/// Confirms on a line console: writes the prompt, then reads `y`/`yes` or
/// `n`/`no` (case-insensitive), asking again on anything else.
///
/// End of input and session cancellation are errors, which [`AskConfirm`]
/// turns into a deny.
pub struct ConsoleConfirm<R, W> {
    io: tokio::sync::Mutex<(R, W)>,
}

impl<R, W> ConsoleConfirm<R, W> {
    /// Confirm over `reader` and `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: tokio::sync::Mutex::new((reader, writer)),
        }
    }

    /// Give back the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

impl ConsoleConfirm<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Confirm on the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> fmt::Debug for ConsoleConfirm<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleConfirm").finish_non_exhaustive()
    }
}

#[async_trait]
impl<R, W> ConfirmHandler for ConsoleConfirm<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn confirm(
        &self,
        ctx: InvocationContext,
        prompt: String,
        _request: PermissionInvocation,
    ) -> anyhow::Result<Confirmation> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;
        let mut prompt = prompt;
        loop {
            writer
                .write_all(prompt.as_bytes())
                .await
                .context("confirmation write failed")?;
            writer.flush().await.context("confirmation write failed")?;

            let mut line = String::new();
            let read = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => anyhow::bail!("confirmation cancelled"),
                read = reader.read_line(&mut line) => read.context("confirmation read failed")?,
            };
            if read == 0 {
                anyhow::bail!("confirmation input closed");
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(Confirmation::approve("confirmed")),
                "n" | "no" => return Ok(Confirmation::reject("denied")),
                _ => prompt = "Please reply y/n: ".to_string(),
            }
        }
    }
}

#[async_trait]
impl PermissionHandler for AskConfirm {
    async fn handle(
        &self,
        ctx: InvocationContext,
        request: PermissionInvocation,
    ) -> anyhow::Result<PermissionDecision> {
        if request.attempt <= 1 {
            if let Some(decide) = &self.decide {
                return decide.handle(ctx, request).await;
            }
            if self.confirm.is_some() {
                return Ok(PermissionDecision::ask("confirmation required"));
            }
            return Ok(PermissionDecision::deny("no permission handler"));
        }

        let Some(confirm) = &self.confirm else {
            if let Some(decide) = &self.decide {
                return decide.handle(ctx, request).await;
            }
            return Ok(PermissionDecision::deny("no confirmation handler"));
        };

        let prompt = (self.prompt)(&request);
        Ok(match confirm.confirm(ctx, prompt, request).await {
            Ok(Confirmation {
                approved: true,
                reason,
            }) => PermissionDecision::allow(reason),
            Ok(Confirmation { reason, .. }) => PermissionDecision::deny(reason),
            Err(e) => PermissionDecision::deny(format!("confirmation failed: {e}")),
        })
    }
}
