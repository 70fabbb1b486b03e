//! NATS integration for the automation engine.
//!
//! Two broker surfaces:
//!
//! - **Event intake**: peer services publish domain events to
//!   `crm.event.<kind>`; the engine consumes them from a JetStream stream
//!   through a durable consumer, so events survive engine restarts.
//! - **Service dispatch**: side-effecting actions issue request/reply
//!   calls on `crm.service.<service>.<operation>`.

use crate::envelope::Envelope;
use crate::interpreter::{ActionDispatcher, DispatchError, ServiceRequest};
use crate::matcher::DomainEvent;
use async_nats::jetstream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use std::future::Future;
use tracing::{error, warn};

/// Subject prefix for domain events.
const EVENT_SUBJECT_PREFIX: &str = "crm.event";

/// Subject prefix for peer-service requests.
const SERVICE_SUBJECT_PREFIX: &str = "crm.service";

/// Stream name for domain events.
const EVENTS_STREAM_NAME: &str = "CRM_EVENTS";

/// Durable consumer name for the engine.
const ENGINE_CONSUMER_NAME: &str = "amber-relay-engine";

/// Configuration for the NATS broker connection.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// NATS server URL.
    pub url: String,
    /// Stream name for events (defaults to CRM_EVENTS).
    pub events_stream_name: Option<String>,
    /// Durable consumer name (defaults to amber-relay-engine).
    pub consumer_name: Option<String>,
}

impl BrokerConfig {
    /// Creates a new config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            events_stream_name: None,
            consumer_name: None,
        }
    }

    fn events_stream(&self) -> &str {
        self.events_stream_name
            .as_deref()
            .unwrap_or(EVENTS_STREAM_NAME)
    }

    fn consumer(&self) -> &str {
        self.consumer_name.as_deref().unwrap_or(ENGINE_CONSUMER_NAME)
    }
}

/// Errors from broker operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Failed to connect to NATS.
    ConnectionFailed { message: String },
    /// Failed to set up the stream or consumer.
    SetupFailed { message: String },
    /// Failed while consuming messages.
    ConsumeFailed { message: String },
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "broker connection failed: {message}")
            }
            Self::SetupFailed { message } => write!(f, "broker setup failed: {message}"),
            Self::ConsumeFailed { message } => write!(f, "event consume failed: {message}"),
        }
    }
}

impl std::error::Error for BrokerError {}

/// JetStream-backed consumer of domain events.
pub struct NatsEventConsumer {
    consumer: jetstream::consumer::Consumer<jetstream::consumer::pull::Config>,
}

impl NatsEventConsumer {
    /// Connects to NATS and binds the durable engine consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = async_nats::connect(&config.url).await.map_err(|e| {
            BrokerError::ConnectionFailed {
                message: e.to_string(),
            }
        })?;

        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.events_stream().to_string(),
            subjects: vec![format!("{EVENT_SUBJECT_PREFIX}.>")],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        let stream = jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| BrokerError::SetupFailed {
                message: format!("failed to create events stream: {e}"),
            })?;

        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(config.consumer().to_string()),
            deliver_policy: jetstream::consumer::DeliverPolicy::All,
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(config.consumer(), consumer_config)
            .await
            .map_err(|e| BrokerError::SetupFailed {
                message: format!("failed to create consumer: {e}"),
            })?;

        Ok(Self { consumer })
    }

    /// Consumes events until the stream ends or fails.
    ///
    /// Each decoded event is handed to `handler`; undecodable messages
    /// are acked and dropped with a warning so one bad payload cannot
    /// wedge the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying message stream fails.
    pub async fn run<F, Fut>(&self, mut handler: F) -> Result<(), BrokerError>
    where
        F: FnMut(DomainEvent) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let mut messages =
            self.consumer
                .messages()
                .await
                .map_err(|e| BrokerError::ConsumeFailed {
                    message: e.to_string(),
                })?;

        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| BrokerError::ConsumeFailed {
                message: e.to_string(),
            })?;

            match Envelope::<DomainEvent>::from_json_bytes(&message.payload) {
                Ok(envelope) => {
                    if !envelope.is_current_version() {
                        warn!(version = envelope.version, "event envelope version mismatch");
                    }
                    handler(envelope.into_payload()).await;
                }
                Err(e) => {
                    warn!(error = %e, "dropping undecodable event");
                }
            }

            if let Err(e) = message.ack().await {
                error!(error = %e, "failed to ack event");
            }
        }

        Ok(())
    }
}

/// Request/reply dispatcher over core NATS.
pub struct NatsDispatcher {
    client: async_nats::Client,
}

impl NatsDispatcher {
    /// Connects to NATS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = async_nats::connect(&config.url).await.map_err(|e| {
            BrokerError::ConnectionFailed {
                message: e.to_string(),
            }
        })?;
        Ok(Self { client })
    }

    /// Creates a dispatcher over an existing client.
    #[must_use]
    pub fn with_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    fn subject_for(request: &ServiceRequest) -> String {
        format!(
            "{SERVICE_SUBJECT_PREFIX}.{}.{}",
            request.service, request.operation
        )
    }
}

#[async_trait]
impl ActionDispatcher for NatsDispatcher {
    async fn dispatch(&self, request: ServiceRequest) -> Result<JsonValue, DispatchError> {
        let subject = Self::subject_for(&request);
        let envelope = Envelope::new(request.payload.clone());
        let bytes = envelope
            .to_json_bytes()
            .map_err(|e| DispatchError::RequestFailed {
                service: request.service.clone(),
                operation: request.operation.clone(),
                message: format!("failed to serialize request: {e}"),
            })?;

        let reply = self
            .client
            .request(subject, bytes.into())
            .await
            .map_err(|e| DispatchError::RequestFailed {
                service: request.service.clone(),
                operation: request.operation.clone(),
                message: e.to_string(),
            })?;

        let envelope: Envelope<JsonValue> = Envelope::from_json_bytes(&reply.payload)
            .map_err(|e| DispatchError::InvalidReply {
                message: e.to_string(),
            })?;
        let payload = envelope.into_payload();

        // Peer services report handler failures in-band.
        if let Some(error) = payload.get("error").and_then(JsonValue::as_str) {
            return Err(DispatchError::RequestFailed {
                service: request.service,
                operation: request.operation,
                message: error.to_string(),
            });
        }

        Ok(payload)
    }
}
