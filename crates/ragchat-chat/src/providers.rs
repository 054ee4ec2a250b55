//! OpenAI-compatible chat-completions client.
//!
//! Both providers (OpenAI and the HuggingFace router) speak the same
//! `/chat/completions` protocol, streamed as SSE `data:` lines.

use std::pin::Pin;

use futures::Stream;
use ragchat_core::{Error, Result};
use reqwest::Client;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::types::ChatMessage;

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single streamed token, completion marker or error.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done { tokens_used: usize },
    Error(String),
}

/// Sampling settings for one request.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f64,
    pub max_tokens: usize,
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect()
}

/// Stream tokens from an OpenAI-compatible endpoint.
pub fn stream_llm(
    client: &Client,
    endpoint: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    api_key: &str,
    sampling: Sampling,
) -> BoxedStream {
    Box::pin(stream_openai_compat(
        client.clone(),
        endpoint.to_string(),
        wire_messages(&messages),
        model.to_string(),
        api_key.to_string(),
        sampling,
    ))
}

fn stream_openai_compat(
    client: Client,
    url: String,
    msgs: Vec<serde_json::Value>,
    model: String,
    api_key: String,
    sampling: Sampling,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    async_stream::stream! {
        let body = json!({
            "model": model,
            "messages": msgs,
            "temperature": sampling.temperature,
            "max_tokens": sampling.max_tokens,
            "stream": true,
        });

        debug!("Streaming from {} with model {}", url, model);

        let response = match client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut stream = response.bytes_stream();
        // Raw bytes: a multibyte character may straddle two reads.
        let mut buffer: Vec<u8> = Vec::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };

            buffer.extend_from_slice(&bytes);

            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = match std::str::from_utf8(&raw) {
                    Ok(l) => l.trim(),
                    Err(e) => {
                        yield StreamChunk::Error(format!("Invalid UTF-8 in stream: {}", e));
                        return;
                    }
                };

                if line.is_empty() || line.starts_with(':') {
                    continue;
                }

                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };

                if data == "[DONE]" {
                    yield StreamChunk::Done { tokens_used: token_count };
                    return;
                }

                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) {
                    if let Some(message) = parsed["error"]["message"].as_str() {
                        yield StreamChunk::Error(message.to_string());
                        return;
                    }
                    if let Some(content) = parsed["choices"][0]["delta"]["content"].as_str() {
                        if !content.is_empty() {
                            token_count += 1;
                            yield StreamChunk::Token(content.to_string());
                        }
                    }
                }
            }
        }

        yield StreamChunk::Done { tokens_used: token_count };
    }
}

/// Non-streaming completion. With `json_mode` the model is asked for a
/// single JSON object.
pub async fn complete(
    client: &Client,
    endpoint: &str,
    messages: &[ChatMessage],
    model: &str,
    api_key: &str,
    sampling: Sampling,
    json_mode: bool,
) -> Result<String> {
    let mut body = json!({
        "model": model,
        "messages": wire_messages(messages),
        "temperature": sampling.temperature,
        "max_tokens": sampling.max_tokens,
    });
    if json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }

    let response = client
        .post(endpoint)
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Llm(format!("API error {}: {}", status, body)));
    }

    let parsed: serde_json::Value = response
        .json()
        .await
        .map_err(|e| Error::Llm(format!("Malformed response: {}", e)))?;

    parsed["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Llm("response has no message content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLING: Sampling = Sampling {
        temperature: 0.0,
        max_tokens: 64,
    };

    async fn collect(stream: BoxedStream) -> Vec<StreamChunk> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_stream_tokens_until_done() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Lentil\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" soup\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let endpoint = format!("{}/chat/completions", server.url());
        let chunks = collect(stream_llm(
            &Client::new(),
            &endpoint,
            vec![ChatMessage::user("What's for dinner?")],
            "gpt-4o-mini",
            "sk-test",
            SAMPLING,
        ))
        .await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::Token("Lentil".into()),
                StreamChunk::Token(" soup".into()),
                StreamChunk::Done { tokens_used: 2 },
            ]
        );
    }

    /// Serves one streamed response, written in `parts` with a pause
    /// between each so the client sees separate reads.
    async fn serve_in_parts(parts: Vec<Vec<u8>>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for part in parts {
                socket.write_all(&part).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/chat/completions", addr)
    }

    #[tokio::test]
    async fn test_stream_keeps_characters_split_across_reads() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Café au lait\"}}]}\n\n",
            "data: [DONE]\n\n",
        )
        .as_bytes();
        // Split between the two bytes of 'é'.
        let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let endpoint = serve_in_parts(vec![body[..split].to_vec(), body[split..].to_vec()]).await;

        let chunks = collect(stream_llm(
            &Client::new(),
            &endpoint,
            vec![ChatMessage::user("Breakfast on Sunday?")],
            "m",
            "sk",
            SAMPLING,
        ))
        .await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::Token("Café au lait".into()),
                StreamChunk::Done { tokens_used: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let endpoint = format!("{}/chat/completions", server.url());
        let chunks = collect(stream_llm(
            &Client::new(),
            &endpoint,
            vec![ChatMessage::user("hi")],
            "m",
            "sk",
            SAMPLING,
        ))
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], StreamChunk::Error(e) if e.contains("429")));
    }

    #[tokio::test]
    async fn test_complete_json_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"{\"verdicts\":[]}"}}]}"#)
            .create_async()
            .await;

        let endpoint = format!("{}/chat/completions", server.url());
        let content = complete(
            &Client::new(),
            &endpoint,
            &[ChatMessage::user("judge this")],
            "m",
            "sk",
            SAMPLING,
            true,
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(content, r#"{"verdicts":[]}"#);
    }
}
