//! Tool execution loop — the agentic core.
//!
//! Flow: prompt → LLM → if tool_use → execute tools → inject results →
//! LLM → repeat. Stops when the model stops asking for tools, or the
//! round budget runs out.

use tracing::{debug, info, warn};

use crate::executor::{ToolContext, ToolExecutor};
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, Role};

/// Round budget preventing runaway agents.
const MAX_ROUNDS: usize = 8;

/// Names of tools executed during the loop, for the post-processor's
/// premature-confirmation guardrail.
#[derive(Debug, Default, Clone)]
pub struct LoopTrace {
    pub tools_used: Vec<String>,
    pub tools_succeeded: Vec<String>,
}

pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    executor: &ToolExecutor,
    ctx: &ToolContext,
) -> Result<(ChatResponse, LoopTrace), ProviderError> {
    let mut raw_messages: Vec<serde_json::Value> =
        if let Some(ref raw) = initial_request.raw_messages {
            raw.clone()
        } else {
            initial_request
                .messages
                .iter()
                .map(|m| {
                    // Injected system-role context rides as a user turn;
                    // the API accepts only user/assistant in messages.
                    let role = match m.role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    };
                    serde_json::json!({ "role": role, "content": m.content })
                })
                .collect()
        };

    let mut trace = LoopTrace::default();
    let mut last_response: Option<ChatResponse> = None;

    for round in 0..MAX_ROUNDS {
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(round, "tool loop round");
        let response = provider.send(&req).await?;

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(round, "tool loop complete");
            return Ok((response, trace));
        }

        // Assistant turn: any text plus the tool_use blocks.
        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        // Execute each call and feed the envelopes back.
        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();
        for call in &response.tool_calls {
            let outcome = executor.execute(ctx, &call.name, &call.input).await;
            trace.tools_used.push(call.name.clone());
            if outcome.success {
                trace.tools_succeeded.push(call.name.clone());
            }
            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": serde_json::to_string(&outcome).unwrap_or_default(),
                "is_error": !outcome.success,
            }));
        }
        raw_messages.push(serde_json::json!({
            "role": "user",
            "content": tool_result_content,
        }));

        last_response = Some(response);
    }

    warn!(max_rounds = MAX_ROUNDS, "tool loop hit round budget");
    match last_response {
        Some(resp) => Ok((resp, trace)),
        None => Err(ProviderError::Parse(format!(
            "tool loop exceeded {MAX_ROUNDS} rounds without a final response"
        ))),
    }
}
