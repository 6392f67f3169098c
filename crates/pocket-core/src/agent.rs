// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use pocket_bus::{
    AgentState, Bus, InboundMessage, Media, MediaKind, OutboundMessage, StateChange,
    ToolExecutionEvent,
};
use pocket_config::{AgentConfig, AgentMode};
use pocket_memory::MemoryStore;
use pocket_model::{
    CompletionRequest, ContentPart, FunctionCall, Message, MessageContent, ModelProvider,
    ResponseEvent, ToolSchema as ModelToolSchema,
};
use pocket_session::SessionStore;
use pocket_tools::{ApprovalPolicy, OutputCategory, Tool, ToolCall, ToolContext, ToolOutput, ToolOutputPart, ToolPolicy, ToolRegistry};

use crate::events::AgentEvent;
use crate::prompts::{system_prompt, SystemPromptContext};

const MAX_MODEL_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 250;

/// Drives the {Idle,Building,AwaitingModel,ExecutingTools,Publishing,Failed}
/// state machine for one channel message at a time, per session key.
///
/// One `Agent` is shared across every channel adapter in the process: it
/// consumes [`Bus::consume_inbound`] in a loop and spawns a task per inbound
/// message, serializing turns that share a session key while letting turns
/// on different keys run fully in parallel.
pub struct Agent {
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    bus: Arc<Bus>,
    memory: Arc<dyn MemoryStore>,
    tool_policy: ToolPolicy,
    mode: AgentMode,
    max_iterations: u32,
    compaction_threshold: f32,
    compaction_keep_recent: usize,
    workspace_root: Option<PathBuf>,
    system_prompt_override: Option<String>,
    events: Option<mpsc::Sender<AgentEvent>>,
    states: Mutex<HashMap<String, AgentState>>,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Agent {
    /// Build an agent from its collaborators and the `[agent]`/`[tools]`
    /// configuration sections. `events` is an optional sink a caller (the CLI,
    /// a test harness) can use to observe live turn progress; pass `None` to
    /// run headless.
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        bus: Arc<Bus>,
        memory: Arc<dyn MemoryStore>,
        cfg: &AgentConfig,
        tools_cfg: &pocket_config::ToolsConfig,
        events: Option<mpsc::Sender<AgentEvent>>,
    ) -> Self {
        Self {
            model,
            tools,
            sessions,
            bus,
            memory,
            tool_policy: ToolPolicy::from_config(tools_cfg),
            mode: cfg.default_mode,
            max_iterations: cfg.max_iterations,
            compaction_threshold: cfg.compaction_threshold,
            compaction_keep_recent: cfg.compaction_keep_recent,
            workspace_root: tools_cfg.workspace_root.as_ref().map(PathBuf::from),
            system_prompt_override: cfg.system_prompt.clone(),
            events,
            states: Mutex::new(HashMap::new()),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run the agent loop: consume inbound messages forever, one spawned task
    /// per message. Returns only when the bus's inbound queue is shut down.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        loop {
            let inbound = match self.bus.consume_inbound().await {
                Ok(m) => m,
                Err(err) => {
                    info!(%err, "inbound queue closed, agent loop exiting");
                    return Ok(());
                }
            };
            if !inbound.is_valid() {
                warn!(?inbound, "dropping malformed inbound message");
                continue;
            }
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = this.process_turn(inbound).await {
                    warn!(%err, "turn processing failed");
                }
            });
        }
    }

    /// Process exactly one inbound message end to end, serialized against any
    /// other turn sharing the same session key.
    pub async fn process_turn(&self, inbound: InboundMessage) -> anyhow::Result<()> {
        let session_key = inbound.session_key();
        let lock = self.turn_lock(&session_key).await;
        let _guard = lock.lock().await;
        self.run_turn(inbound, &session_key).await
    }

    async fn turn_lock(&self, session_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn current_state(&self, session_key: &str) -> AgentState {
        self.states
            .lock()
            .await
            .get(session_key)
            .copied()
            .unwrap_or(AgentState::Idle)
    }

    /// Transition `session_key` to `to`, publishing a [`StateChange`] on the
    /// bus. No-op (and no event) if already in `to` — every real transition
    /// changes state, per the bus's own `from != to` invariant.
    async fn set_state(
        &self,
        session_key: &str,
        to: AgentState,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        let from = self.current_state(session_key).await;
        if from == to {
            return Ok(());
        }
        self.states.lock().await.insert(session_key.to_string(), to);
        let mut change = StateChange::new(session_key, from, to);
        if let Some(reason) = reason {
            change = change.with_reason(reason);
        }
        self.bus.publish_state_change(change.clone()).await?;
        self.emit(AgentEvent::StateChanged(change)).await;
        Ok(())
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// The full per-turn cycle: persist the inbound message, run the
    /// Building → AwaitingModel ↔ ExecutingTools loop up to the iteration
    /// cap, then publish exactly one [`OutboundMessage`] and return to Idle.
    async fn run_turn(&self, inbound: InboundMessage, session_key: &str) -> anyhow::Result<()> {
        self.set_state(session_key, AgentState::Building, None).await?;

        self.tools.update_context(ToolContext {
            workspace_root: self.workspace_root.clone(),
            default_channel: Some(inbound.channel.clone()),
            default_chat_id: Some(inbound.chat_id.clone()),
            flags: self.tools.context().flags.clone(),
        });

        let user_message = build_session_user_message(&inbound);
        self.sessions
            .append_message(session_key, user_message, OutputCategory::Generic)
            .await
            .context("failed to persist inbound message")?;
        let mut history = self.sessions.get_or_create(session_key).await.messages;
        enforce_history_budget(
            &mut history,
            self.compaction_keep_recent,
            self.model.as_ref(),
            self.compaction_threshold,
        );

        let mut final_text = String::new();
        let mut iterations = 0u32;

        loop {
            if iterations >= self.max_iterations {
                final_text.push_str(&format!(
                    "\n\n[Reached the maximum of {} tool/model round trips for this turn; stopping here.]",
                    self.max_iterations
                ));
                break;
            }
            iterations += 1;

            self.set_state(session_key, AgentState::AwaitingModel, None).await?;
            let request = self
                .build_completion_request(&history, &inbound.content, &inbound.media)
                .await;

            let (text, tool_calls) = match self.call_model_with_retry(request).await {
                Ok(v) => v,
                Err(err) => {
                    self.set_state(session_key, AgentState::Failed, Some(err.to_string()))
                        .await?;
                    self.emit(AgentEvent::Error(err.to_string())).await;
                    self.publish_outbound(&inbound, format!("error: {err}")).await?;
                    self.set_state(session_key, AgentState::Idle, None).await?;
                    return Ok(());
                }
            };

            if !text.is_empty() {
                let assistant_message = Message::assistant(&text);
                self.sessions
                    .append_message(session_key, assistant_message.clone(), OutputCategory::Generic)
                    .await?;
                history.push(assistant_message);
                final_text = text;
            }

            if tool_calls.is_empty() {
                break;
            }

            self.set_state(session_key, AgentState::ExecutingTools, None).await?;
            for tc in &tool_calls {
                self.emit(AgentEvent::ToolCallStarted(tc.clone())).await;

                let call_message = Message {
                    role: pocket_model::Role::Assistant,
                    content: MessageContent::ToolCall {
                        tool_call_id: tc.id.clone(),
                        function: FunctionCall { name: tc.name.clone(), arguments: tc.args.to_string() },
                    },
                };
                self.sessions
                    .append_message(session_key, call_message.clone(), OutputCategory::Generic)
                    .await?;
                history.push(call_message);

                // Sequential execution by design: later calls in the same
                // turn may depend on the side effects of earlier ones.
                let started = Instant::now();
                let output = self.dispatch_tool(tc).await;
                let duration_ms = started.elapsed().as_millis() as u64;

                self.emit(AgentEvent::ToolCallFinished {
                    call_id: tc.id.clone(),
                    tool_name: tc.name.clone(),
                    output: output.content.clone(),
                    is_error: output.is_error,
                })
                .await;

                self.bus
                    .publish_tool_event(ToolExecutionEvent {
                        session_key: session_key.to_string(),
                        tool_call_id: tc.id.clone(),
                        name: tc.name.clone(),
                        arguments: tc.args.clone(),
                        is_error: output.is_error,
                        result: output.content.clone(),
                        duration_ms,
                    })
                    .await?;

                let category = self
                    .tools
                    .get(&tc.name)
                    .map(|t| t.output_category())
                    .unwrap_or_default();
                let result_message = tool_result_message(&tc.id, &output);
                self.sessions
                    .append_message(session_key, result_message.clone(), category)
                    .await?;
                history.push(result_message);
            }
            self.set_state(session_key, AgentState::Building, None).await?;
        }

        self.publish_outbound(&inbound, final_text).await?;
        self.emit(AgentEvent::TurnComplete).await;
        self.set_state(session_key, AgentState::Idle, None).await?;
        Ok(())
    }

    async fn publish_outbound(&self, inbound: &InboundMessage, content: String) -> anyhow::Result<()> {
        let session_key = inbound.session_key();
        if let Err(err) = self.set_state(&session_key, AgentState::Publishing, None).await {
            warn!(%err, "failed to record Publishing transition");
        }
        let outbound = OutboundMessage {
            channel: inbound.channel.clone(),
            chat_id: inbound.chat_id.clone(),
            content,
            media: vec![],
            reply_to: None,
            metadata: Default::default(),
        };
        self.bus.publish_outbound(outbound).await?;
        Ok(())
    }

    /// Look up and invoke one tool call, applying the unknown / unavailable /
    /// policy gates before ever reaching [`ToolRegistry::execute`] — the
    /// registry itself performs no such checks.
    async fn dispatch_tool(&self, tc: &ToolCall) -> ToolOutput {
        let Some(tool) = self.tools.get(&tc.name) else {
            return ToolOutput::err(&tc.id, format!("unknown tool: {}", tc.name));
        };
        let ctx = self.tools.context();
        if !tool.available(&ctx) {
            return ToolOutput::err(&tc.id, format!("tool unavailable: {}", tc.name));
        }

        let decision = if tc.name == "exec" {
            let command = tc.args.get("command").and_then(|v| v.as_str()).unwrap_or("");
            self.tool_policy.decide(command)
        } else {
            tool.default_policy()
        };
        // `Ask` has no interactive surface in the core itself — approving here
        // is the embedding application's job if it wants one; we resolve it
        // to immediate execution.
        if matches!(decision, ApprovalPolicy::Deny) {
            return ToolOutput::err(&tc.id, format!("tool call forbidden by policy: {}", tc.name));
        }

        self.tools.execute(tc).await
    }

    async fn build_completion_request(
        &self,
        history: &[Message],
        current_query: &str,
        current_media: &[Media],
    ) -> CompletionRequest {
        let memory_summary = self
            .memory
            .relevant_context(current_query, 5)
            .await
            .ok()
            .filter(|s| !s.trim().is_empty());
        let system_text = system_prompt(
            self.system_prompt_override.as_deref(),
            SystemPromptContext {
                workspace_root: self.workspace_root.as_deref(),
                memory_summary: memory_summary.as_deref(),
                skill_content: None,
                append: None,
            },
        );

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system_text));
        if let Some((last, rest)) = history.split_last() {
            messages.extend(rest.iter().cloned());
            if current_media.is_empty() {
                messages.push(last.clone());
            } else {
                messages.push(materialize_media_message(last, current_media).await);
            }
        }

        let tools = self
            .tools
            .definitions(self.mode, true)
            .into_iter()
            .map(|s| ModelToolSchema { name: s.name, description: s.description, parameters: s.parameters })
            .collect();

        CompletionRequest { messages, tools, stream: true, system_dynamic_suffix: None }
    }

    async fn call_model_with_retry(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<(String, Vec<ToolCall>)> {
        let mut attempt = 0u32;
        loop {
            match self.complete_once(request.clone()).await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_MODEL_RETRIES {
                        return Err(err);
                    }
                    let delay_ms = RETRY_BASE_DELAY_MS * (1 << attempt);
                    warn!(attempt, %err, delay_ms, "model completion failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn complete_once(&self, request: CompletionRequest) -> anyhow::Result<(String, Vec<ToolCall>)> {
        let mut stream = self.model.complete(request).await.context("model completion failed")?;
        let mut text = String::new();
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();

        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => {
                    if !delta.is_empty() {
                        self.emit(AgentEvent::TextDelta(delta.clone())).await;
                        text.push_str(&delta);
                    }
                }
                ResponseEvent::ThinkingDelta(delta) => {
                    if !delta.is_empty() {
                        self.emit(AgentEvent::ThinkingDelta(delta)).await;
                    }
                }
                ResponseEvent::ToolCall { index, id, name, arguments } => {
                    let entry = pending.entry(index).or_insert_with(PendingToolCall::default);
                    if !id.is_empty() {
                        entry.id = id;
                    }
                    if !name.is_empty() {
                        entry.name = name;
                    }
                    entry.arguments = arguments;
                }
                ResponseEvent::Usage { input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, total_tokens } => {
                    self.emit(AgentEvent::TokenUsage {
                        input: input_tokens,
                        output: output_tokens,
                        cache_read: cache_read_tokens,
                        cache_write: cache_write_tokens,
                        total: total_tokens,
                    })
                    .await;
                }
                ResponseEvent::Done => break,
                ResponseEvent::Error(msg) => warn!(%msg, "model stream reported a recoverable error"),
            }
        }

        let tool_calls = pending.into_values().filter_map(PendingToolCall::finish).collect();
        Ok((text, tool_calls))
    }
}

fn tool_result_message(call_id: &str, output: &ToolOutput) -> Message {
    if !output.has_images() {
        return Message::tool_result(call_id, output.content.clone());
    }
    let parts = output
        .parts
        .iter()
        .map(|p| match p {
            ToolOutputPart::Text(t) => pocket_model::ToolContentPart::Text { text: t.clone() },
            ToolOutputPart::Image(url) => pocket_model::ToolContentPart::Image { image_url: url.clone() },
        })
        .collect();
    Message::tool_result_with_parts(call_id, parts)
}

/// Build the history-persisted user message for an inbound turn. Media is
/// represented as a text placeholder only — the real bytes never reach the
/// session store; see [`materialize_media_message`] for the turn-local
/// version sent to the model.
fn build_session_user_message(inbound: &InboundMessage) -> Message {
    if inbound.media.is_empty() {
        return Message::user(&inbound.content);
    }
    let mut text = inbound.content.clone();
    for m in &inbound.media {
        let label = match m.kind {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::File => "file",
        };
        let name = m.filename.as_deref().unwrap_or("attachment");
        text.push_str(&format!("\n[attached {label}: {name}]"));
    }
    Message::user(text)
}

/// Rebuild the just-appended user message with real inline image data for the
/// current model call only. The session-store copy (plain text placeholder)
/// is never replaced — this is purely a per-request transformation.
async fn materialize_media_message(base: &Message, media: &[Media]) -> Message {
    let text = base.as_text().unwrap_or_default().to_string();
    let mut parts = vec![ContentPart::text(text)];
    for m in media {
        if !matches!(m.kind, MediaKind::Image) {
            continue;
        }
        let bytes = if let Some(data) = &m.data {
            Some(data.clone())
        } else if let Some(path) = &m.path {
            match tokio::fs::read(path).await {
                Ok(b) => Some(b),
                Err(err) => {
                    warn!(path, %err, "failed to read media file for prompt");
                    None
                }
            }
        } else {
            None
        };
        let Some(bytes) = bytes else { continue };
        let mime = m.mime_type.as_deref().unwrap_or("image/png");
        parts.push(ContentPart::image(format!("data:{mime};base64,{}", B64.encode(bytes))));
    }
    Message::user_with_parts(parts)
}

/// Deterministic, non-LLM history trimming applied before each model call:
/// when the approximate token total exceeds `threshold` of the model's
/// context window, drop everything but the `keep_recent` most recent
/// non-system messages and prepend a notice. No model round trip is made —
/// this only protects against overflowing the request, it does not attempt
/// to preserve meaning the way a summarizing compaction pass would.
fn enforce_history_budget(
    history: &mut Vec<Message>,
    keep_recent: usize,
    model: &dyn ModelProvider,
    threshold: f32,
) {
    let Some(window) = model.catalog_context_window() else { return };
    let budget = (window as f32 * threshold) as usize;
    let total: usize = history.iter().map(Message::approx_tokens).sum();
    if total <= budget || history.len() <= keep_recent {
        return;
    }
    let keep = keep_recent.min(history.len());
    let preserved = history.split_off(history.len() - keep);
    let notice = Message::assistant(
        "[Earlier history was dropped to stay within the model's context window. \
         Proceed with the remaining context and ask the user to re-state anything missing.]",
    );
    history.clear();
    history.push(notice);
    history.extend(preserved);
}

/// Accumulates a streamed tool call's arguments across possibly-interleaved
/// deltas, keyed by the provider's `index`.
#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn finish(self) -> Option<ToolCall> {
        if self.name.is_empty() {
            return None;
        }
        let args_buf = self.arguments.trim();
        let args = if args_buf.is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(args_buf) {
                Ok(v) => v,
                Err(_) => match serde_json::from_str(&fix_invalid_json_escapes(args_buf)) {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(%err, tool = %self.name, "unparseable tool call arguments, using empty object");
                        serde_json::Value::Object(Default::default())
                    }
                },
            }
        };
        let id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4())
        } else {
            self.id
        };
        Some(ToolCall { id, name: self.name, args })
    }
}

/// Double any backslash that does not introduce a valid JSON escape
/// (`\"`, `\\`, `\/`, `\b`, `\f`, `\n`, `\r`, `\t`, `\u`), so strings
/// containing stray backslashes (e.g. a raw Windows path) still parse.
fn fix_invalid_json_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if c == '"' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if in_string && c == '\\' {
            match chars.peek() {
                Some(&next)
                    if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') =>
                {
                    out.push(c);
                }
                _ => out.push_str("\\\\"),
            }
            continue;
        }
        out.push(c);
    }
    out
}
