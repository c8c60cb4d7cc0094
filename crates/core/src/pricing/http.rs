use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::LiveServiceUnavailableError;
use crate::pricing::calculator::CalculatorSession;
use crate::pricing::live::{LiveQuote, QuoteSource};

const MAX_ERROR_BODY: usize = 512;

/// Quote source backed by an HTTP pricing endpoint that answers
/// `POST <endpoint>/quote` with a [`LiveQuote`] body.
#[derive(Clone, Debug)]
pub struct HttpQuoteSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpQuoteSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LiveServiceUnavailableError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LiveServiceUnavailableError::Transport(error.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }

    fn quote_url(&self) -> String {
        format!("{}/quote", self.endpoint)
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn quote(&self, session: &CalculatorSession) -> Result<LiveQuote, LiveServiceUnavailableError> {
        let url = self.quote_url();
        debug!(event_name = "pricing.live.request", url = %url, session_id = %session.session_id, "requesting live quote");

        let response = self
            .client
            .post(&url)
            .json(session)
            .send()
            .await
            .map_err(|error| LiveServiceUnavailableError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LiveServiceUnavailableError::Status {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        response
            .json::<LiveQuote>()
            .await
            .map_err(|error| LiveServiceUnavailableError::MalformedResponse(error.to_string()))
    }
}

fn truncate_body(body: String) -> String {
    if body.chars().count() <= MAX_ERROR_BODY {
        return body;
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::HttpQuoteSource;
    use crate::errors::LiveServiceUnavailableError;
    use crate::pricing::calculator::CalculatorUrlBuilder;
    use crate::pricing::inventory::{parse_inventory, ParseOptions};
    use crate::pricing::live::QuoteSource;

    fn session() -> crate::pricing::calculator::CalculatorSession {
        let requests = parse_inventory(
            "resources:\n  - service: ec2\n    type: web\n    specs: { instance_type: t3.micro }\n    region: us-east-1\n",
            &ParseOptions::default(),
        )
        .expect("inventory");
        CalculatorUrlBuilder::default().session(&requests).expect("session")
    }

    #[tokio::test]
    async fn parses_quote_lines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "lines": [{"index": 0, "monthly_cost": "7.59"}],
                "total_monthly_cost": "7.59"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpQuoteSource::new(format!("{}/", server.uri()), Duration::from_secs(2)).expect("client");
        let quote = source.quote(&session()).await.expect("quote");

        assert_eq!(quote.lines.len(), 1);
        assert_eq!(quote.lines[0].monthly_cost, Decimal::new(759, 2));
        assert_eq!(quote.total_monthly_cost, Some(Decimal::new(759, 2)));
    }

    #[tokio::test]
    async fn posts_the_session_payload() {
        let server = MockServer::start().await;
        let session = session();
        Mock::given(method("POST"))
            .and(path("/quote"))
            .and(wiremock::matchers::body_json(&session))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "lines": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpQuoteSource::new(server.uri(), Duration::from_secs(2)).expect("client");
        let quote = source.quote(&session).await.expect("quote");
        assert!(quote.lines.is_empty());
        assert_eq!(quote.total_monthly_cost, None);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let source = HttpQuoteSource::new(server.uri(), Duration::from_secs(2)).expect("client");
        let error = source.quote(&session()).await.expect_err("must fail");
        assert_eq!(
            error,
            LiveServiceUnavailableError::Status { status: 502, body: "upstream down".to_string() }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let source = HttpQuoteSource::new(server.uri(), Duration::from_secs(2)).expect("client");
        let error = source.quote(&session()).await.expect_err("must fail");
        assert!(matches!(error, LiveServiceUnavailableError::MalformedResponse(_)));
    }
}
