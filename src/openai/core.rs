use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

// Only the fields needed to relay text are modeled. Reasoning and
// tool call deltas are ignored.
#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
}

/// Parsed form of a single SSE event from the completions endpoint.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Fragment { content: String, finished: bool },
    Skip,
    Finished,
}

fn parse_event(event: &str) -> Result<SseEvent, Error> {
    let event = event.trim();
    let Some(data) = event.strip_prefix("data:") else {
        // Comments (`: keep-alive`) and other SSE fields
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();

    // Data can sometimes be empty
    if data.is_empty() {
        return Ok(SseEvent::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseEvent::Finished);
    }

    let chunk = serde_json::from_str::<CompletionChunk>(data).inspect_err(|e| {
        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
    })?;

    // The usage summary sent at the end of a stream has no choices
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseEvent::Skip);
    };

    let finished = choice.finish_reason.is_some();
    match choice.delta.content {
        Some(content) if !content.is_empty() => Ok(SseEvent::Fragment { content, finished }),
        _ if finished => Ok(SseEvent::Finished),
        _ => Ok(SseEvent::Skip),
    }
}

/// Streams the content of a chat completion from an OpenAI compatible
/// API. Nothing is sent until the returned stream is first polled and
/// dropping the stream aborts the request.
///
/// A chunk carrying a `finish_reason` still has its content yielded
/// before the stream ends.
pub fn completion_stream(
    client: reqwest::Client,
    messages: Vec<Message>,
    api_hostname: String,
    api_key: String,
    model: String,
) -> impl Stream<Item = Result<String, Error>> + Send {
    try_stream! {
        let payload = json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
        let response = client
            .post(url)
            .bearer_auth(&api_key)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(60 * 5))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            Err::<(), Error>(anyhow!(
                "Completion request failed with status {}: {}",
                status,
                body
            ))?;
            return;
        }

        let mut stream = response.bytes_stream();

        // Bytes are buffered rather than decoded per chunk so that SSE
        // events and multi-byte characters split across HTTP frames are
        // reassembled before parsing.
        let mut buffer: Vec<u8> = Vec::new();

        'outer: while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(event_end) = buffer.windows(2).position(|w| w == b"\n\n") {
                let event: Vec<u8> = buffer.drain(..event_end + 2).collect();
                let event = std::str::from_utf8(&event)?;

                match parse_event(event)? {
                    SseEvent::Fragment { content, finished } => {
                        yield content;
                        if finished {
                            break 'outer;
                        }
                    }
                    SseEvent::Skip => continue,
                    SseEvent::Finished => break 'outer,
                }
            }
        }
    }
}
