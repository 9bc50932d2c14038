//! Remote chat agent client
//!
//! Posts each user query to the agent's `/ask_agent` endpoint and returns
//! the reply text

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::sdk::ChatClient;
use crate::{Error, Result};

/// Request body for `/ask_agent`
#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

/// Response body from `/ask_agent`
#[derive(Debug, Deserialize)]
struct AskResponse {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for the remote chat agent
#[derive(Debug, Clone)]
pub struct AgentClient {
    /// HTTP client
    client: Client,
    /// Base URL of the agent service
    base_url: String,
}

impl AgentClient {
    /// Create a client for the agent at `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, session_id: &str, message: &str) -> Result<String> {
        let url = format!("{}/ask_agent", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&AskRequest {
                session_id,
                message,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteChat(format!("agent returned {status}: {body}")));
        }

        let reply: AskResponse = response.json().await?;
        Ok(reply.text.unwrap_or_default())
    }
}

#[async_trait]
impl ChatClient for AgentClient {
    async fn ask(&self, session_id: &str, message: &str) -> Result<String> {
        tracing::debug!(session_id, len = message.len(), "asking agent");
        self.post(session_id, message).await.map_err(|e| match e {
            Error::RemoteChat(_) => e,
            other => Error::RemoteChat(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> AgentClient {
        AgentClient::new(&AgentConfig {
            base_url: format!("{}/", server.uri()),
            session_id: "demo-session".to_string(),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[tokio::test]
    async fn posts_session_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask_agent"))
            .and(body_json(json!({"session_id": "s-1", "message": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "Hi there."})))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server).ask("s-1", "hello").await.expect("reply");
        assert_eq!(reply, "Hi there.");
    }

    #[tokio::test]
    async fn missing_text_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask_agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let reply = client_for(&server).ask("s-1", "hello").await.expect("reply");
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_remote_chat_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask_agent"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).ask("s-1", "hello").await.unwrap_err();
        assert!(matches!(&err, Error::RemoteChat(msg) if msg.contains("500") && msg.contains("boom")));
        assert!(!err.is_setup_failure());
    }

    #[tokio::test]
    async fn malformed_body_is_remote_chat_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask_agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).ask("s-1", "hello").await.unwrap_err();
        assert!(matches!(err, Error::RemoteChat(_)));
    }
}
