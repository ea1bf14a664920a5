//! Estimation Service over HTTP.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use tracing::debug;

use roofest_session::wire::{self, AnswerRequest, BeginRequest, LeadSubmission};
use roofest_session::{
    AnswerOutcome, AnswerValue, BeginOutcome, EstimationService, LeadReceipt, LeadRequest,
    RemoteSessionRecord, ServiceError, ServiceResult,
};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// JSON/HTTP binding of the Estimation Service.
///
/// Requests are sent once. Answers are not idempotent on the service side,
/// so a failed call is reported and left to the user to repeat.
#[derive(Debug, Clone)]
pub struct HttpEstimationService {
    client: Client,
    base: Url,
}

impl HttpEstimationService {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base = config.base_url()?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append path segments to the base URL, keeping any base path.
    fn url(&self, segments: &[&str]) -> ServiceResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ServiceError::transport("endpoint cannot be used as a base URL"))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> ServiceResult<Vec<u8>> {
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::transport(format!("failed to read response body: {}", e)))?;
        debug!(status = status.as_u16(), bytes = body.len(), "Estimation Service replied");

        if !status.is_success() {
            return Err(wire::decode_error(status.as_u16(), &body));
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl EstimationService for HttpEstimationService {
    async fn begin(&self, address: &str) -> ServiceResult<BeginOutcome> {
        let url = self.url(&["api", "conversation", "start"])?;
        debug!(%url, "POST start");
        let body = self
            .send(self.client.post(url).json(&BeginRequest { address }))
            .await?;
        wire::decode_begin(&body)
    }

    async fn answer(&self, session_id: &str, answer: &AnswerValue) -> ServiceResult<AnswerOutcome> {
        let url = self.url(&["api", "conversation", "answer"])?;
        debug!(%url, session_id, "POST answer");
        let body = self
            .send(self.client.post(url).json(&AnswerRequest { session_id, answer }))
            .await?;
        wire::decode_answer(&body, session_id)
    }

    async fn submit_lead(&self, lead: &LeadRequest) -> ServiceResult<LeadReceipt> {
        let url = self.url(&["api", "leads"])?;
        debug!(%url, "POST lead");
        let body = self
            .send(self.client.post(url).json(&LeadSubmission::from(lead)))
            .await?;
        Ok(wire::decode_lead_receipt(&body))
    }

    async fn session_record(&self, session_id: &str) -> ServiceResult<RemoteSessionRecord> {
        let url = self.url(&["api", "conversation", "session", session_id])?;
        debug!(%url, "GET session record");
        let body = self.send(self.client.get(url)).await?;
        wire::decode_session_record(&body)
    }
}
