//! fal.ai client
//!
//! Implements storage uploads, the workflow event stream and synchronous model
//! runs against the fal HTTP APIs.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use falbridge_domain::Payload;
use falbridge_shared::HostMessage;

use crate::infrastructure::ports::{
    EventStream, FileStoragePort, ModelApiError, ModelApiPort, RemoteWorkflowPort, StorageError,
    TransportError,
};
use crate::infrastructure::sse::{SseDecoder, SseEvent};

const EVENT_STREAM: &str = "text/event-stream";

/// Client for the fal.ai APIs
#[derive(Clone)]
pub struct FalClient {
    client: Client,
    api_key: Option<String>,
    endpoint: Option<String>,
    run_base_url: String,
    rest_base_url: String,
    stream_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct InitiateUploadRequest<'a> {
    content_type: &'a str,
    file_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitiateUploadResponse {
    upload_url: String,
    file_url: String,
}

impl FalClient {
    pub fn new(
        api_key: Option<String>,
        endpoint: Option<String>,
        run_base_url: &str,
        rest_base_url: &str,
        stream_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            endpoint,
            run_base_url: run_base_url.trim_end_matches('/').to_string(),
            rest_base_url: rest_base_url.trim_end_matches('/').to_string(),
            stream_timeout,
        }
    }

    fn authorize(&self, request: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
        match api_key.or(self.api_key.as_deref()) {
            Some(key) => request.header(AUTHORIZATION, format!("Key {key}")),
            None => request,
        }
    }

    /// Ask the storage API for a signed upload URL.
    async fn initiate_upload(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<InitiateUploadResponse, StorageError> {
        let request = self
            .client
            .post(format!("{}/storage/upload/initiate", self.rest_base_url))
            .timeout(Duration::from_secs(60))
            .json(&InitiateUploadRequest {
                content_type,
                file_name,
            });

        let response = self
            .authorize(request, None)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StorageError::UploadFailed(format!("{status}: {error_text}")));
        }

        response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl FileStoragePort for FalClient {
    async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        let initiated = self.initiate_upload(file_name, content_type).await?;

        let response = self
            .client
            .put(&initiated.upload_url)
            .timeout(Duration::from_secs(300))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StorageError::UploadFailed(format!("{status}: {error_text}")));
        }

        tracing::debug!(file_name, url = %initiated.file_url, "Uploaded file to fal storage");
        Ok(initiated.file_url)
    }
}

#[async_trait]
impl RemoteWorkflowPort for FalClient {
    async fn stream(&self, payload: &Payload) -> Result<EventStream, TransportError> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            TransportError::Connection("fal application name is not configured".to_string())
        })?;

        let request = self
            .client
            .post(endpoint)
            .header(ACCEPT, EVENT_STREAM)
            .json(payload);

        let response = self
            .authorize(request, None)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if !is_event_stream(&response) {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::NotEventStream { body });
        }

        Ok(event_stream(response, self.stream_timeout))
    }
}

#[async_trait]
impl ModelApiPort for FalClient {
    async fn run(
        &self,
        endpoint: &str,
        arguments: Value,
        api_key: Option<String>,
    ) -> Result<Value, ModelApiError> {
        let request = self
            .client
            .post(format!(
                "{}/{}",
                self.run_base_url,
                endpoint.trim_start_matches('/')
            ))
            .timeout(Duration::from_secs(300))
            .json(&arguments);

        let response = self
            .authorize(request, api_key.as_deref().filter(|k| !k.is_empty()))
            .send()
            .await
            .map_err(|e| ModelApiError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ModelApiError::RequestFailed(format!("{status}: {error_text}")));
        }

        response
            .json()
            .await
            .map_err(|e| ModelApiError::InvalidResponse(e.to_string()))
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with(EVENT_STREAM))
        .unwrap_or(false)
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    read_timeout: Duration,
    finished: bool,
}

fn event_stream(response: Response, read_timeout: Duration) -> EventStream {
    let state = StreamState {
        body: response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        read_timeout,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((decode_message(&event), state));
            }
            if state.finished {
                return None;
            }

            match tokio::time::timeout(state.read_timeout, state.body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let events = state.decoder.push(&chunk);
                    state.pending.extend(events);
                }
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    return Some((Err(classify_body_error(&e)), state));
                }
                Ok(None) => {
                    state.finished = true;
                    if state.decoder.finish() {
                        tracing::debug!("Dropped unterminated event at end of stream");
                    }
                }
                Err(_) => {
                    state.finished = true;
                    let message = format!(
                        "no event received within {}s",
                        state.read_timeout.as_secs()
                    );
                    return Some((Err(TransportError::Connection(message)), state));
                }
            }
        }
    })
    .boxed()
}

/// Parse an event's data as a `{ type, data }` host message.
pub fn decode_message(event: &SseEvent) -> Result<HostMessage, TransportError> {
    serde_json::from_str(&event.data)
        .map_err(|e| TransportError::Protocol(format!("{e}: {}", event.data)))
}

/// Map a failure while reading the response body. A body cut short by the
/// peer surfaces as an `UnexpectedEof` somewhere in the source chain.
fn classify_body_error(error: &reqwest::Error) -> TransportError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        let truncated = err
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::UnexpectedEof);
        if truncated {
            return TransportError::PrematureClose;
        }
        source = err.source();
    }
    TransportError::Connection(error.to_string())
}
