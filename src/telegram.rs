use reqwest::{Client, Request, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{HomeworkError, Result};

/// Delivers text to the configured chat.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&self, message: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct BotApiReply {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API client bound to a single chat.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &Config) -> color_eyre::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            token: config.telegram_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        })
    }

    fn build_request(&self, text: &str) -> reqwest::Result<Request> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        self.client
            .post(url)
            .json(&SendMessageRequest {
                chat_id: &self.chat_id,
                text,
            })
            .build()
    }

    async fn send(&self, text: &str) -> std::result::Result<(), String> {
        let request = self.build_request(text).map_err(redacted)?;
        let response = self.client.execute(request).await.map_err(redacted)?;

        let status = response.status();
        let body = response.text().await.map_err(redacted)?;
        match rejection(status, &body) {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

/// reqwest errors carry the request URL, which embeds the bot token.
fn redacted(error: reqwest::Error) -> String {
    error.without_url().to_string()
}

/// Why the Bot API did not accept the message, if it did not.
fn rejection(status: StatusCode, body: &str) -> Option<String> {
    let reply = serde_json::from_str::<BotApiReply>(body).ok();
    if status.is_success() && reply.as_ref().is_some_and(|r| r.ok) {
        return None;
    }
    let description = reply
        .and_then(|r| r.description)
        .unwrap_or_else(|| "unreadable reply body".to_string());
    Some(format!("Bot API answered {status}: {description}"))
}

impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        match self.send(message).await {
            Ok(()) => {
                debug!(chat_id = %self.chat_id, "Message sent");
                Ok(())
            }
            Err(reason) => {
                error!(chat_id = %self.chat_id, %reason, "Message was not sent");
                Err(HomeworkError::NotifyDelivery { reason })
            }
        }
    }
}
