use super::request::CommandRequest;
use super::transport::{CommandResponse, JSON_CODE_SUCCESS, Transport, TransportError};
use crate::connection::config::MirrorConfig;
use crate::core::{MirrorError, Result};
use async_trait::async_trait;
use tracing::debug;

const JSON_CODE_CONFLICT: i64 = 409;

/// Posts each command as JSON to `{endpoint}/{command}`.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        config.validate().map_err(MirrorError::Config)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MirrorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn command_url(&self, command: &str) -> String {
        format!("{}/{}", self.endpoint, command)
    }
}

/// Map a decoded response body onto the transport outcome.
pub fn classify_response(response: CommandResponse) -> std::result::Result<CommandResponse, TransportError> {
    let message = response
        .message
        .clone()
        .unwrap_or_else(|| format!("jsonCode {}", response.json_code));

    match response.json_code {
        JSON_CODE_SUCCESS => Ok(response),
        JSON_CODE_CONFLICT => Err(TransportError::Conflict {
            message,
            updates: response.updates,
        }),
        400..=499 => Err(TransportError::Validation {
            message,
            updates: response.updates,
        }),
        _ => Err(TransportError::Network(message)),
    }
}

/// Map an HTTP status and raw body onto the transport outcome. A rejected
/// status wins over a body that claims success or has no `jsonCode`.
pub fn classify_http(status: u16, body: &[u8]) -> std::result::Result<CommandResponse, TransportError> {
    if (500..=599).contains(&status) {
        return Err(TransportError::Network(format!("HTTP {}", status)));
    }

    let decoded = serde_json::from_slice::<CommandResponse>(body);
    if (200..=299).contains(&status) {
        let response =
            decoded.map_err(|e| TransportError::Network(format!("unreadable response: {}", e)))?;
        return classify_response(response);
    }

    let mut response = decoded.unwrap_or_else(|_| CommandResponse {
        json_code: i64::from(status),
        ..CommandResponse::default()
    });
    if response.json_code == JSON_CODE_SUCCESS {
        response.json_code = i64::from(status);
    }
    classify_response(response)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &CommandRequest) -> std::result::Result<CommandResponse, TransportError> {
        let url = self.command_url(&request.command);
        debug!(command = %request.command, request_id = %request.request_id, "POST {}", url);

        let mut builder = self
            .client
            .post(&url)
            .header("X-Request-Id", request.request_id.to_string())
            .json(&request.params);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let http_response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = http_response.status().as_u16();
        let body = http_response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(format!("unreadable response: {}", e)))?;

        classify_http(status, &body)
    }
}
