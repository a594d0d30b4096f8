//! Custom token → ID token exchange over the provider's REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{IdentityError, TokenExchanger};

pub const DEFAULT_EXCHANGE_URL: &str =
    "https://identitytoolkit.googleapis.com/v1/accounts:signInWithCustomToken";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeResponse {
    id_token: String,
}

#[derive(Debug, Clone)]
pub struct RestTokenExchanger {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RestTokenExchanger {
    pub fn new(api_key: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_EXCHANGE_URL.to_string()),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TokenExchanger for RestTokenExchanger {
    async fn exchange_custom_token(&self, custom_token: &str) -> Result<String, IdentityError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&ExchangeRequest {
                token: custom_token,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| IdentityError::Exchange(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            debug!(status, body = %body, "custom token exchange rejected");
            return Err(IdentityError::Exchange(format!("provider returned {status}")));
        }

        let body: ExchangeResponse = resp
            .json()
            .await
            .map_err(|e| IdentityError::Exchange(e.to_string()))?;
        Ok(body.id_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answers a single HTTP request with `status` and `body`, returning the
    /// raw request it received.
    async fn stub(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/accounts:signInWithCustomToken", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn posts_the_custom_token_and_returns_the_id_token() {
        let (url, server) = stub("200 OK", r#"{"idToken":"id-123","refreshToken":"r","expiresIn":"3600"}"#).await;
        let exchanger = RestTokenExchanger::new("api-key", Some(url));

        let id_token = exchanger.exchange_custom_token("custom-abc").await.unwrap();
        assert_eq!(id_token, "id-123");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/accounts:signInWithCustomToken?key=api-key "));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json, serde_json::json!({ "token": "custom-abc", "returnSecureToken": true }));
    }

    #[tokio::test]
    async fn rejected_exchange_reports_the_status() {
        let (url, server) = stub("400 Bad Request", r#"{"error":{"message":"INVALID_CUSTOM_TOKEN"}}"#).await;
        let exchanger = RestTokenExchanger::new("api-key", Some(url));

        let err = exchanger.exchange_custom_token("custom-abc").await.unwrap_err();
        assert_eq!(err, IdentityError::Exchange("provider returned 400".into()));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_response_is_an_exchange_error() {
        let (url, server) = stub("200 OK", r#"{"unexpected":true}"#).await;
        let exchanger = RestTokenExchanger::new("api-key", Some(url));

        assert!(matches!(
            exchanger.exchange_custom_token("custom-abc").await,
            Err(IdentityError::Exchange(_))
        ));
        server.await.unwrap();
    }
}
