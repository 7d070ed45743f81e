use bytes::Bytes;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;
pub(crate) const MAX_CONTENT_BYTES: usize = 64 * 1024 * 1024;

async fn read_body_capped(response: reqwest::Response, max_bytes: usize) -> (Vec<u8>, bool) {
    let max_bytes = max_bytes.max(1);
    let mut out = Vec::<u8>::new();
    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let Ok(chunk) = next else {
            break;
        };
        let remaining = max_bytes.saturating_sub(out.len());
        if chunk.len() > remaining {
            out.extend_from_slice(&chunk.as_ref()[..remaining]);
            return (out, true);
        }
        out.extend_from_slice(chunk.as_ref());
    }
    (out, false)
}

async fn error_body(response: reqwest::Response) -> String {
    let (bytes, truncated) = read_body_capped(response, MAX_ERROR_BODY_BYTES).await;
    let mut body = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str("...(truncated)");
    }
    body
}

/// Sends the request and turns any non-2xx answer into [`Error::Api`].
pub(crate) async fn send_checked(req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let (client, request) = req.build_split();
    let request = request?;
    let method = request.method().clone();
    let url = request.url().clone();
    tracing::debug!(%method, %url, "sending request");

    let response = client.execute(request).await?;
    let status = response.status();
    if !status.is_success() {
        let body = error_body(response).await;
        tracing::debug!(%method, %url, status = status.as_u16(), "request rejected");
        return Err(Error::Api { status, body });
    }
    Ok(response)
}

pub(crate) async fn send_checked_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T> {
    let response = send_checked(req).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice::<T>(&bytes).map_err(|err| {
        Error::InvalidResponse(format!(
            "unexpected response body ({err}): {}",
            String::from_utf8_lossy(&bytes[..bytes.len().min(512)])
        ))
    })
}

pub(crate) async fn send_checked_bytes(req: reqwest::RequestBuilder) -> Result<Bytes> {
    let response = send_checked(req).await?;
    let (bytes, truncated) = read_body_capped(response, MAX_CONTENT_BYTES).await;
    if truncated {
        return Err(Error::InvalidResponse(format!(
            "response exceeded max bytes ({MAX_CONTENT_BYTES})"
        )));
    }
    Ok(Bytes::from(bytes))
}
