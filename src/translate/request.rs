//! Translate assistant-dialect requests into provider chat completion requests.
//!
//! Content is flattened to plain text: text blocks are concatenated in order and
//! every other block kind is dropped. The system prompt becomes a leading
//! `system` message and tool schemas become `function` tools.

use super::assistant_types::{AssistantRequest, Message, Tool};
use super::provider_types::{ProviderFunction, ProviderMessage, ProviderRequest, ProviderTool};

pub const DEFAULT_MAX_TOKENS: u64 = 4096;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Translate an assistant request into a provider request.
/// Pure and total: absent fields take their defaults, `default_model` included.
pub fn assistant_to_provider(req: &AssistantRequest, default_model: &str) -> ProviderRequest {
    let model = req
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_model.to_string());

    let mut messages: Vec<ProviderMessage> = req.messages.iter().map(translate_message).collect();

    if let Some(system) = req.system.as_ref().map(|s| s.as_text()) {
        if !system.is_empty() {
            messages.insert(
                0,
                ProviderMessage {
                    role: "system".to_string(),
                    content: system,
                },
            );
        }
    }

    let tools = req
        .tools
        .as_deref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().map(translate_tool).collect());

    ProviderRequest {
        model,
        messages,
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: req.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        stream: req.is_streaming(),
        tools,
    }
}

fn translate_message(msg: &Message) -> ProviderMessage {
    ProviderMessage {
        role: msg.role.clone(),
        content: msg
            .content
            .as_ref()
            .map(|c| c.as_text())
            .unwrap_or_default(),
    }
}

fn translate_tool(tool: &Tool) -> ProviderTool {
    ProviderTool {
        tool_type: "function".to_string(),
        function: ProviderFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> AssistantRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_request_takes_defaults() {
        let result = assistant_to_provider(&parse(json!({})), "gpt-4");

        assert_eq!(result.model, "gpt-4");
        assert!(result.messages.is_empty());
        assert_eq!(result.max_tokens, 4096);
        assert_eq!(result.temperature, 1.0);
        assert!(!result.stream);
        assert!(result.tools.is_none());
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let req = parse(json!({
            "model": "gpt-4o",
            "max_tokens": 100,
            "temperature": 0.0,
            "stream": true
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        assert_eq!(result.model, "gpt-4o");
        assert_eq!(result.max_tokens, 100);
        assert_eq!(result.temperature, 0.0);
        assert!(result.stream);
    }

    #[test]
    fn test_system_is_prepended_before_existing_system_message() {
        let req = parse(json!({
            "system": "You are helpful",
            "messages": [
                {"role": "system", "content": "inline system"},
                {"role": "user", "content": "Hello"},
                {"role": "assistant", "content": "Hi"}
            ]
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        assert_eq!(result.messages.len(), 4);
        assert_eq!(
            result.messages[0],
            ProviderMessage {
                role: "system".to_string(),
                content: "You are helpful".to_string(),
            }
        );
        assert_eq!(result.messages[1].content, "inline system");
        assert_eq!(result.messages[3].role, "assistant");
    }

    #[test]
    fn test_empty_system_is_not_inserted() {
        let req = parse(json!({
            "system": "",
            "messages": [{"role": "user", "content": "Hello"}]
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, "user");
    }

    #[test]
    fn test_only_text_blocks_survive_in_order() {
        let req = parse(json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "Look at "},
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}},
                    {"type": "text", "text": "this"},
                    {"type": "tool_use", "id": "t1", "name": "search", "input": {}}
                ]
            }]
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        assert_eq!(result.messages[0].content, "Look at this");
    }

    #[test]
    fn test_missing_or_non_text_content_becomes_empty_string() {
        let req = parse(json!({
            "messages": [
                {"role": "user"},
                {"role": "user", "content": null},
                {"role": "user", "content": [{"type": "image", "source": {}}]}
            ]
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        assert_eq!(result.messages.len(), 3);
        assert!(result.messages.iter().all(|m| m.content.is_empty()));
    }

    #[test]
    fn test_malformed_blocks_are_dropped_not_rejected() {
        let req = parse(json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"text": "untyped"},
                    "bare string",
                    {"type": "text", "text": null},
                    {"type": "text", "text": "kept"}
                ]
            }]
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].content, "kept");
    }

    #[test]
    fn test_non_text_content_and_system_values_are_dropped() {
        let req = parse(json!({
            "system": 42,
            "messages": [{"role": "user", "content": {"unexpected": true}}]
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].content, "");
    }

    #[test]
    fn test_tools_become_functions() {
        let req = parse(json!({
            "tools": [{
                "name": "get_weather",
                "description": "Get current weather for a city",
                "input_schema": {
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                }
            }]
        }));
        let result = assistant_to_provider(&req, "gpt-4");

        let tools = result.tools.expect("tools should be present");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].tool_type, "function");
        assert_eq!(tools[0].function.name, "get_weather");
        assert_eq!(
            tools[0].function.description.as_deref(),
            Some("Get current weather for a city")
        );
        assert_eq!(tools[0].function.parameters["required"][0], "city");
    }

    #[test]
    fn test_empty_tools_are_omitted() {
        let result = assistant_to_provider(&parse(json!({"tools": []})), "gpt-4");
        assert!(result.tools.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("tools").is_none());
    }
}
