// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Attribute keys and metric names emitted by the agent's OTLP exporter.
//!
//! Span and metric names are producer-defined and not stable, so every
//! classification in this crate keys off these attributes instead.

// ============================================================================
// TOOL INVOCATION SPANS
// ============================================================================

pub const TOOL_CALL_ID: &str = "ai.toolCall.id";
pub const TOOL_CALL_NAME: &str = "ai.toolCall.name";
pub const TOOL_CALL_ARGS: &str = "ai.toolCall.args";
pub const OPERATION_NAME: &str = "operation.name";
pub const OPERATION_ID: &str = "ai.operationId";

/// Marker substring in `operation.name` / `ai.operationId` for tool calls.
pub const TOOL_CALL_MARKER: &str = "toolCall";

pub const CALL_ID: &str = "call.id";
pub const TOOL_NAME: &str = "tool.name";

// ============================================================================
// SESSION CONTEXT (injected by the agent plugin)
// ============================================================================

pub const SESSION_ID: &str = "session.id";
pub const USER: &str = "user";
pub const FILE_PATH: &str = "file.path";
pub const LANGUAGE: &str = "language";
pub const MODEL: &str = "model";
pub const VERSION: &str = "version";

// ============================================================================
// PROMPT-BEARING SPANS
// ============================================================================

pub const PROMPT_MESSAGES: &str = "ai.prompt.messages";
pub const PROMPT: &str = "ai.prompt";
pub const RESPONSE_TEXT: &str = "ai.response.text";
pub const USAGE_INPUT_TOKENS: &str = "ai.usage.inputTokens";
pub const USAGE_OUTPUT_TOKENS: &str = "ai.usage.outputTokens";

pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
pub const GEN_AI_SYSTEM: &str = "gen_ai.system";
pub const GEN_AI_TEMPERATURE: &str = "gen_ai.request.temperature";
pub const GEN_AI_MAX_TOKENS: &str = "gen_ai.request.max_tokens";
pub const GEN_AI_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
pub const GEN_AI_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

// ============================================================================
// METRICS
// ============================================================================

pub const METRIC_LOC_ADDED: &str = "opencode.tool.loc.added";
pub const METRIC_LOC_DELETED: &str = "opencode.tool.loc.deleted";
pub const METRIC_PERMISSION_REQUESTS: &str = "opencode.permission.requests";

pub const PERMISSION_REPLY: &str = "permission.reply";
pub const AUTO_APPROVE_EDIT: &str = "auto_approve_edit";
