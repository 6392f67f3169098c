// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use pocket_bus::{Bus, Media, MediaKind, OutboundMessage};

use crate::policy::ApprovalPolicy;
use crate::sandbox::resolve_in_workspace;
use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Hard cap on file size accepted by `send_file`.
const MAX_SEND_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Extensions accepted by `send_file`, grouped by inferred [`MediaKind`].
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv"];
const FILE_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "md", "csv", "json", "zip", "log", "tar", "gz",
];

/// Publishes an `OutboundMessage` carrying a single [`Media`] attachment.
pub struct SendFileTool {
    pub bus: Arc<Bus>,
    pub context: Arc<RwLock<Arc<ToolContext>>>,
}

impl SendFileTool {
    pub fn new(bus: Arc<Bus>, context: Arc<RwLock<Arc<ToolContext>>>) -> Self {
        Self { bus, context }
    }
}

fn classify_extension(ext: &str) -> Option<MediaKind> {
    let ext = ext.to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Audio)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if FILE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::File)
    } else {
        None
    }
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "csv" => "text/csv",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Tool for SendFileTool {
    fn name(&self) -> &str { "send_file" }

    fn description(&self) -> &str {
        "Send a local file to the user as a chat attachment. Files over 50 MiB or with an\n\
         extension outside the supported allowlist (images, audio, video, pdf/txt/md/csv/\n\
         json/zip/log/tar/gz) are rejected. channel and chat_id default to the current turn's."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to send"
                },
                "caption": {
                    "type": "string",
                    "description": "Optional caption/text to accompany the attachment"
                },
                "channel": {
                    "type": "string",
                    "description": "Target channel (defaults to the current turn's channel)"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Target chat id (defaults to the current turn's chat id)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Ask }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let caption = call.args.get("caption").and_then(|v| v.as_str()).map(str::to_string);

        let ctx = self.context.read().expect("tool context lock poisoned").clone();
        let channel = call.args.get("channel").and_then(|v| v.as_str()).map(str::to_string)
            .or_else(|| ctx.default_channel.clone());
        let chat_id = call.args.get("chat_id").and_then(|v| v.as_str()).map(str::to_string)
            .or_else(|| ctx.default_chat_id.clone());

        let (Some(channel), Some(chat_id)) = (channel, chat_id) else {
            return ToolOutput::err(
                &call.id,
                "no channel/chat_id given and none available from ambient context",
            );
        };

        let resolved = match resolve_in_workspace(&ctx.workspace_root, &path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let ext = resolved.extension().and_then(|e| e.to_str()).unwrap_or("").to_string();
        let Some(kind) = classify_extension(&ext) else {
            return ToolOutput::err(&call.id, format!("unsupported file extension: {ext:?}"));
        };

        let metadata = match tokio::fs::metadata(&resolved).await {
            Ok(m) => m,
            Err(e) => return ToolOutput::err(&call.id, format!("stat error: {e}")),
        };
        if metadata.len() > MAX_SEND_FILE_BYTES {
            return ToolOutput::err(
                &call.id,
                format!("file is {} bytes, exceeds the {} byte limit", metadata.len(), MAX_SEND_FILE_BYTES),
            );
        }

        debug!(path = %path, channel = %channel, chat_id = %chat_id, "send_file tool");

        let filename = resolved.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string();
        let media = Media {
            kind,
            path: Some(resolved.to_string_lossy().into_owned()),
            mime_type: Some(mime_for_extension(&ext).to_string()),
            filename: Some(filename),
            data: None,
        };

        let outbound = OutboundMessage {
            channel,
            chat_id,
            content: caption.unwrap_or_default(),
            media: vec![media],
            reply_to: None,
            metadata: Default::default(),
        };

        match self.bus.publish_outbound(outbound).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("sent {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("publish error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "s1".into(), name: "send_file".into(), args }
    }

    fn tool_with_context(ctx: ToolContext) -> (SendFileTool, Arc<Bus>) {
        let bus = Arc::new(Bus::new());
        let context = Arc::new(RwLock::new(Arc::new(ctx)));
        (SendFileTool::new(bus.clone(), context), bus)
    }

    fn tmp_file(ext: &str, content: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pocket_send_file_test_{}.{ext}", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn sends_supported_file() {
        let path = tmp_file("png", b"not a real png but fine for this test");
        let (tool, bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({
            "path": path.to_string_lossy(), "channel": "cli", "chat_id": "room1"
        }))).await;
        assert!(!out.is_error, "{}", out.content);
        let m = bus.consume_outbound().await.unwrap();
        assert_eq!(m.media.len(), 1);
        assert_eq!(m.media[0].kind, MediaKind::Image);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn rejects_unsupported_extension() {
        let path = tmp_file("exe", b"binary");
        let (tool, _bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({
            "path": path.to_string_lossy(), "channel": "cli", "chat_id": "room1"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("unsupported file extension"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let path = tmp_file("txt", &vec![0u8; (MAX_SEND_FILE_BYTES as usize) + 1]);
        let (tool, _bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({
            "path": path.to_string_lossy(), "channel": "cli", "chat_id": "room1"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("exceeds"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_stat_error() {
        let (tool, _bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({
            "path": "/tmp/pocket_send_file_does_not_exist.png", "channel": "cli", "chat_id": "r"
        }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("stat error"));
    }

    #[tokio::test]
    async fn fails_without_channel_or_ambient_default() {
        let path = tmp_file("png", b"x");
        let (tool, _bus) = tool_with_context(ToolContext::default());
        let out = tool.execute(&call(json!({ "path": path.to_string_lossy() }))).await;
        assert!(out.is_error);
        assert!(out.content.contains("ambient context"));
        let _ = std::fs::remove_file(&path);
    }
}
