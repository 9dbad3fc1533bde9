use reqwest::{Client, Request, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{HomeworkError, Result};

/// Anything that can answer "what changed since `from_date`".
#[allow(async_fn_in_trait)]
pub trait HomeworkSource {
    async fn fetch_updates(&self, from_date: i64) -> Result<Value>;
}

/// Client for the Practicum homework statuses endpoint.
pub struct PracticumClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl PracticumClient {
    pub fn new(config: &Config) -> color_eyre::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.practicum_endpoint.clone(),
            token: config.practicum_token.clone(),
        })
    }

    fn build_request(&self, from_date: i64) -> reqwest::Result<Request> {
        self.client
            .get(&self.endpoint)
            .header("Authorization", format!("OAuth {}", self.token))
            .query(&[("from_date", from_date)])
            .build()
    }
}

impl HomeworkSource for PracticumClient {
    async fn fetch_updates(&self, from_date: i64) -> Result<Value> {
        let request = self
            .build_request(from_date)
            .map_err(|source| connect_error(&self.endpoint, source))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| connect_error(&self.endpoint, source))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(HomeworkError::HttpStatus(status));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|source| connect_error(&self.endpoint, source))?;

        debug!(from_date, "Homework statuses fetched");
        Ok(body)
    }
}

fn connect_error(endpoint: &str, source: reqwest::Error) -> HomeworkError {
    error!(endpoint, error = ?source, "Request to homework API failed");
    HomeworkError::ApiConnect { source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn client(endpoint: &str) -> PracticumClient {
        let config = Config {
            practicum_token: "secret".to_string(),
            practicum_endpoint: endpoint.to_string(),
            request_timeout: 2,
            ..Default::default()
        };
        PracticumClient::new(&config).unwrap()
    }

    #[test]
    fn test_request_carries_oauth_header_and_from_date() {
        let client = client("https://practicum.example/api/homework_statuses/");
        let request = client.build_request(1_700_000_000).unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(
            request.url().as_str(),
            "https://practicum.example/api/homework_statuses/?from_date=1700000000"
        );
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "OAuth secret"
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_api_connect() {
        // Nothing listens on port 1.
        let client = client("http://127.0.0.1:1/");
        let err = client.fetch_updates(0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApiConnect);
    }
}
