use hyper::header::CONTENT_TYPE;
use log::{debug, error};
use mime::APPLICATION_JSON;
use reqwest_middleware::{reqwest::Url, ClientWithMiddleware};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("problem sending webhook: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending webhook: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("problem serializing webhook payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("webhook rejected with status {status}: {body:?}")]
    Rejected { status: u16, body: String },
}

/// Out of band delivery of rendered balance change messages
#[async_trait::async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), Error>;
}

#[derive(Serialize)]
struct DiscordPayload<'a> {
    content: &'a str,
}

#[derive(Clone)]
pub struct DiscordWebhook {
    url: Url,
    client: ClientWithMiddleware,
}

impl DiscordWebhook {
    /// `client` should be built without retries, a failed delivery is dropped
    pub fn new(client: ClientWithMiddleware, url: Url) -> Self {
        Self { url, client }
    }
}

#[async_trait::async_trait]
impl Notify for DiscordWebhook {
    async fn send(&self, message: &str) -> Result<(), Error> {
        let body = serde_json::to_vec(&DiscordPayload { content: message })?;

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, APPLICATION_JSON.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("error sending webhook: {}", e);
                Error::SendRetry(e)
            })?;

        // Discord answers 204 No Content on success
        let status = response.status();
        if status.is_success() {
            debug!("webhook delivered with status {}", status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wraps_message_in_content() {
        let body = serde_json::to_string(&DiscordPayload {
            content: "**Address Balance Changed**\nNickname: cold",
        })
        .unwrap();
        assert_eq!(
            body,
            r#"{"content":"**Address Balance Changed**\nNickname: cold"}"#
        );
    }
}
