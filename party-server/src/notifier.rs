//! Outbound delivery: direct messages and party card refreshes.
//!
//! Delivery is best-effort. Callers log a `DeliveryError` and carry on; it
//! never undoes the state change that produced the message.

use std::time::Instant;

use async_trait::async_trait;
use axum::http;
use reqwest::{Client, Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use party_core::{Party, PartyId, UserId};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("relay request failed: {0}")]
    Transport(String),

    #[error("relay rejected delivery: {status} - {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest_middleware::Error> for DeliveryError {
    fn from(err: reqwest_middleware::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// What a posted party card shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub party_id: PartyId,
    pub context_id: String,
    pub message_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub member_count: usize,
    pub max_members: u32,
    pub requirements: Vec<String>,
}

impl Listing {
    /// The card for `party`, or `None` if the party was never posted.
    pub fn for_party(party: &Party) -> Option<Self> {
        let message_id = party.origin_message_id.clone()?;
        Some(Self {
            party_id: party.id.clone(),
            context_id: party.context_id.clone(),
            message_id,
            title: party.title.clone(),
            description: party.description.clone(),
            status: party.status.to_string(),
            member_count: party.member_count(),
            max_members: party.max_members,
            requirements: party.requirements.iter().map(|r| r.name.clone()).collect(),
        })
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_direct(&self, recipient: &UserId, text: &str) -> Result<(), DeliveryError>;

    async fn update_listing(&self, listing: &Listing) -> Result<(), DeliveryError>;
}

/// Writes deliveries to the log. Used when no relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_direct(&self, recipient: &UserId, text: &str) -> Result<(), DeliveryError> {
        info!("[direct -> {}] {}", recipient, text);
        Ok(())
    }

    async fn update_listing(&self, listing: &Listing) -> Result<(), DeliveryError> {
        info!(
            "[listing {} in {}] {} ({}/{}, {})",
            listing.message_id,
            listing.context_id,
            listing.title,
            listing.member_count,
            listing.max_members,
            listing.status
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct DirectMessageRequest<'a> {
    recipient: &'a UserId,
    text: &'a str,
}

/// Delivers through the chat relay's HTTP API.
#[derive(Clone)]
pub struct HttpNotifier {
    client: ClientWithMiddleware,
    base_url: String,
    token: Option<String>,
}

impl HttpNotifier {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: create_relay_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), DeliveryError> {
        let url = format!("{}{}", self.base_url, path);
        let payload =
            serde_json::to_string(body).map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let mut request_builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(payload);
        if let Some(token) = &self.token {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
        }

        let response = request_builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_direct(&self, recipient: &UserId, text: &str) -> Result<(), DeliveryError> {
        self.post("/direct", &DirectMessageRequest { recipient, text })
            .await
    }

    async fn update_listing(&self, listing: &Listing) -> Result<(), DeliveryError> {
        self.post("/listings", listing).await
    }
}

/// Tags each relay request with a correlation id and logs how it went.
struct DeliveryTracing;

#[async_trait]
impl Middleware for DeliveryTracing {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let correlation_id = Uuid::new_v4().simple().to_string();
        if let Ok(value) = correlation_id.parse() {
            req.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
        let url = req.url().clone();
        let started = Instant::now();

        let response = next.run(req, extensions).await;
        match &response {
            Ok(resp) => debug!(
                "Relay {} -> {} in {:?} [{}]",
                url,
                resp.status(),
                started.elapsed(),
                correlation_id
            ),
            Err(err) => warn!("Relay {} failed: {} [{}]", url, err, correlation_id),
        }
        response
    }
}

pub fn create_relay_client() -> Result<ClientWithMiddleware, DeliveryError> {
    let client = Client::builder()
        .user_agent(concat!("party-finder/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;

    Ok(ClientBuilder::new(client).with(DeliveryTracing).build())
}
