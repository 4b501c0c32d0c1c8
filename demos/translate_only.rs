//! Demonstrate the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use kbserver::translate::assistant_types::AssistantRequest;
use kbserver::translate::provider_types::ProviderResponse;
use kbserver::translate::request::assistant_to_provider;
use kbserver::translate::response::provider_to_assistant;
use kbserver::translate::streaming::{transcode_chunk, StreamTranscoder};

fn main() -> anyhow::Result<()> {
    // What an assistant-dialect caller sends
    let assistant_req: AssistantRequest = serde_json::from_value(serde_json::json!({
        "model": "gpt-4o",
        "system": "You are a geography expert. Be concise.",
        "messages": [
            {"role": "user", "content": "What is the capital of France?"},
            {"role": "assistant", "content": [{"type": "text", "text": "Paris."}]},
            {"role": "user", "content": "And Germany?"}
        ],
        "stream": true
    }))?;

    let provider_req = assistant_to_provider(&assistant_req, "gpt-4");

    println!("=== Translated Request (provider dialect) ===");
    println!("{}", serde_json::to_string_pretty(&provider_req)?);

    // A buffered provider reply, translated back
    let provider_resp: ProviderResponse = serde_json::from_value(serde_json::json!({
        "model": "gpt-4o",
        "choices": [{
            "message": {"role": "assistant", "content": "The capital of Germany is Berlin."},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 8}
    }))?;

    let assistant_resp = provider_to_assistant(&provider_resp, Some("req_demo"))?;

    println!();
    println!("=== Translated Response (assistant dialect) ===");
    println!("{}", serde_json::to_string_pretty(&assistant_resp)?);

    // Streaming: chunks deliberately cut mid-line
    println!();
    println!("=== Streaming Translation Demo ===");

    let chunks: [&[u8]; 4] = [
        b"data: {\"choices\":[{\"delta\":{\"content\":\"The\"}}]}\n\ndata: {\"choi",
        b"ces\":[{\"delta\":{\"content\":\" capital\"}}]}\n\n",
        b"data: {\"choices\":[{\"delta\":{\"content\":\" is Berlin.\"}}]}\n\n",
        b"data: [DONE]\n\n",
    ];

    let mut transcoder = StreamTranscoder::new();
    for (i, chunk) in chunks.iter().enumerate() {
        for frame in transcoder.push(chunk) {
            print!("  chunk {} -> {}", i, frame.to_sse());
        }
    }

    // A complete chunk needs no carry-over state
    println!();
    println!("=== Single Chunk ===");
    for frame in transcode_chunk(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\ndata: [DONE]\n\n") {
        print!("  {}", frame.to_sse());
    }

    println!();
    println!("Done! The translation layer works without any network calls.");
    Ok(())
}
