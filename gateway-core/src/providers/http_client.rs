//! Shared HTTP plumbing used by every adapter: sending the provider-native
//! request an [`Adapter`](super::Adapter) builds, mapping non-2xx
//! responses to [`ProviderError`], and turning a raw SSE byte stream into a
//! line-delimited one an adapter can parse frame by frame.

use crate::error::ProviderError;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use std::pin::Pin;

/// Sends a single non-streaming request and returns the parsed JSON body,
/// or a [`ProviderError`] derived from the status code.
pub async fn send_json(
    client: &Client,
    url: &str,
    headers: reqwest::header::HeaderMap,
    body: &serde_json::Value,
) -> Result<serde_json::Value, ProviderError> {
    let response = client.post(url).headers(headers).json(body).send().await?;
    if !response.status().is_success() {
        return Err(map_error_response(response).await);
    }
    Ok(response.json::<serde_json::Value>().await?)
}

/// Opens a streaming request and returns the raw byte stream, already
/// checked for a successful status.
pub async fn open_stream(
    client: &Client,
    url: &str,
    headers: reqwest::header::HeaderMap,
    body: &serde_json::Value,
) -> Result<Response, ProviderError> {
    let response = client.post(url).headers(headers).json(body).send().await?;
    if !response.status().is_success() {
        return Err(map_error_response(response).await);
    }
    Ok(response)
}

pub async fn map_error_response(response: Response) -> ProviderError {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").cloned())
                .map(|e| e.to_string())
                .unwrap_or(body);
            ProviderError::Http { status, message }
        }
        Err(_) => ProviderError::Http {
            status,
            message: "failed to read error response body".to_string(),
        },
    }
}

/// Re-chunks a raw SSE byte stream into individual `data: ...` payload
/// lines (the `[DONE]` sentinel and blank keep-alive lines are filtered
/// out here so adapters only ever see a JSON payload string).
pub fn sse_lines(
    response: Response,
) -> Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>> {
    Box::pin(async_stream::stream! {
        let mut bytes_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = bytes_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(ProviderError::Transport(e));
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..=line_end);

                let Some(payload) = line.strip_prefix("data: ") else { continue };
                if payload == "[DONE]" {
                    return;
                }
                yield Ok(payload.to_string());
            }
        }
    })
}
