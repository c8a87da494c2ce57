//! Plain-text and JSON rendering of transcript turns

use std::fmt::Write as _;

use serde_json::{json, Value};
use threadline_core::{RenderBlock, Turn, TurnStatus};

/// Render one turn as terminal text
///
/// Returns an error line instead of blocks when the turn's segments cannot
/// be ordered.
pub fn turn_text(turn: &Turn) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "> {}", turn.user.content);

    match turn.render() {
        Ok(blocks) => {
            for block in blocks {
                out.push_str(&block_text(&block));
            }
        }
        Err(e) => {
            let _ = writeln!(out, "[unrenderable turn: {e}]");
        }
    }

    match turn.status() {
        TurnStatus::Error => {
            let message = turn.response.error.as_deref().unwrap_or("unknown error");
            let _ = writeln!(out, "\n[error: {message}]");
        }
        TurnStatus::Sending | TurnStatus::Streaming => out.push_str("\n[…]\n"),
        TurnStatus::Idle | TurnStatus::Complete => out.push('\n'),
    }
    out
}

fn block_text(block: &RenderBlock<'_>) -> String {
    match block {
        RenderBlock::Text(text) => text.clone(),
        RenderBlock::Reasoning(reasoning) => {
            let state = if reasoning.complete { "done" } else { "thinking" };
            format!("\n  [reasoning {} ({state}): {}]\n", reasoning.id, reasoning.content)
        }
        RenderBlock::ToolCall(call) => {
            let state = match (&call.result, call.is_error) {
                (None, _) => "running".to_string(),
                (Some(_), true) => "failed".to_string(),
                (Some(result), false) => format!("-> {result}"),
            };
            format!("\n  [tool {} {}({}) {state}]\n", call.id, call.name, call.arguments)
        }
        RenderBlock::TaskList(list) => {
            let counts = &list.snapshot.counts;
            format!(
                "\n  [tasks {}: {}/{} done, {} in progress]\n",
                list.id, counts.completed, counts.total, counts.in_progress
            )
        }
    }
}

/// Render one turn as a JSON document
pub fn turn_json(turn: &Turn) -> Value {
    let blocks = match turn.render() {
        Ok(blocks) => blocks.iter().map(block_json).collect(),
        Err(e) => vec![json!({ "type": "error", "message": e.to_string() })],
    };
    json!({
        "turn_id": turn.id.as_str(),
        "status": turn.status().to_string(),
        "user": turn.user.content,
        "historical": turn.response.historical,
        "error": turn.response.error,
        "blocks": blocks,
    })
}

fn block_json(block: &RenderBlock<'_>) -> Value {
    match block {
        RenderBlock::Text(text) => json!({ "type": "text", "content": text }),
        RenderBlock::Reasoning(reasoning) => json!({ "type": "reasoning", "process": reasoning }),
        RenderBlock::ToolCall(call) => json!({ "type": "tool_call", "process": call }),
        RenderBlock::TaskList(list) => json!({ "type": "task_list", "process": list }),
    }
}
