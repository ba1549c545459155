//! SQS provider implementation using the HTTP query API.
//!
//! Calls go straight to the SQS query API (`Action=ReceiveMessage` and
//! friends, API version `2012-11-05`) over `reqwest`, which keeps the provider
//! testable against a mocked HTTP server and lets the same client talk to AWS
//! or to a local emulator such as LocalStack or ElasticMQ.
//!
//! ## Authentication
//!
//! Requests are signed with AWS Signature Version 4 when an access key pair is
//! configured. Without credentials requests go out unsigned, which local
//! emulators accept.
//!
//! ## Cancellation
//!
//! Every call races the caller's [`ShutdownSignal`]. A call overtaken by
//! shutdown is dropped and reported as an empty success.
//!
//! ## Example
//!
//! ```no_run
//! use queue_worker_runtime::{QueueClient, QueueUrl, ShutdownTrigger, SqsClient, SqsConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SqsClient::new(SqsConfig {
//!     endpoint: Some("http://localhost:4566".to_string()),
//!     ..Default::default()
//! })?;
//!
//! let queue = QueueUrl::new("http://localhost:4566/000000000000/orders")?;
//! let shutdown = ShutdownTrigger::new();
//! let messages = client.receive(&shutdown.subscribe(), &queue, 10).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::{clamp_batch_size, unless_shutdown, QueueClient};
use crate::error::{ConfigurationError, QueueError, TransportError};
use crate::message::{Message, MessageId, QueueUrl, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{SqsConfig, MAX_WAIT_TIME_SECONDS};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";

/// SQS limit on the size of a message body
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a request whose parameters travel in the form-encoded body.
    ///
    /// Returns the `Authorization` and `x-amz-date` headers to attach.
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical headers (must be sorted)
        let canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let signed_headers = "host;x-amz-date";

        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        // Parameters are in the body, so the canonical query string is empty
        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, path, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let canonical_request_hash = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        vec![
            ("Authorization".to_string(), authorization_header),
            ("x-amz-date".to_string(), amz_date),
        ]
    }

    /// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = Self::hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = Self::hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = Self::hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = Self::hmac_sha256(&k_service, b"aws4_request");
        let signature = Self::hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }

    fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

// ============================================================================
// SQS Client
// ============================================================================

/// SQS queue client.
///
/// Thread-safe; share it across tasks behind an `Arc`.
pub struct SqsClient {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    config: SqsConfig,
    endpoint: url::Url,
    host: String,
}

impl SqsClient {
    /// Create new SQS client
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the endpoint is not a valid URL,
    /// the region is empty, or the HTTP client cannot be built.
    pub fn new(config: SqsConfig) -> Result<Self, ConfigurationError> {
        if config.region.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "region".to_string(),
            });
        }

        let endpoint_str = config.endpoint_url();
        let endpoint = url::Url::parse(&endpoint_str).map_err(|e| ConfigurationError::Invalid {
            message: format!("invalid endpoint '{}': {}", endpoint_str, e),
        })?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ConfigurationError::Invalid {
                    message: format!("endpoint '{}' has no host", endpoint_str),
                })
            }
        };

        let signer = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => Some(AwsV4Signer::new(
                access_key.clone(),
                secret_key.clone(),
                config.region.clone(),
            )),
            _ => None,
        };

        // The request timeout has to outlast the long-poll wait
        let wait = config.wait_time_seconds.min(MAX_WAIT_TIME_SECONDS) as u64;
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(wait + 10))
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
            host,
        })
    }

    pub fn config(&self) -> &SqsConfig {
        &self.config
    }

    /// Check if requests are signed
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    fn receive_params(&self, queue: &QueueUrl, max_messages: u32) -> Vec<(String, String)> {
        let mut params = vec![
            ("Action".to_string(), "ReceiveMessage".to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
            ("QueueUrl".to_string(), queue.as_str().to_string()),
            (
                "MaxNumberOfMessages".to_string(),
                clamp_batch_size(max_messages).to_string(),
            ),
            (
                "WaitTimeSeconds".to_string(),
                self.config
                    .wait_time_seconds
                    .min(MAX_WAIT_TIME_SECONDS)
                    .to_string(),
            ),
            (
                "MessageAttributeName.1".to_string(),
                self.config.message_type_key.clone(),
            ),
            (
                "AttributeName.1".to_string(),
                "ApproximateReceiveCount".to_string(),
            ),
        ];

        if let Some(visibility) = self.config.visibility_timeout_seconds {
            params.push(("VisibilityTimeout".to_string(), visibility.to_string()));
        }

        params
    }

    fn delete_params(queue: &QueueUrl, message: &ReceivedMessage) -> Vec<(String, String)> {
        vec![
            ("Action".to_string(), "DeleteMessage".to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
            ("QueueUrl".to_string(), queue.as_str().to_string()),
            (
                "ReceiptHandle".to_string(),
                message.receipt_handle.as_str().to_string(),
            ),
        ]
    }

    fn send_params(queue: &QueueUrl, message: &Message) -> Vec<(String, String)> {
        let mut params = vec![
            ("Action".to_string(), "SendMessage".to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
            ("QueueUrl".to_string(), queue.as_str().to_string()),
            ("MessageBody".to_string(), message.body.clone()),
        ];

        // Attribute numbering must be stable for signing and for tests
        let mut attributes: Vec<_> = message.attributes.iter().collect();
        attributes.sort();
        for (index, (name, value)) in attributes.into_iter().enumerate() {
            let prefix = format!("MessageAttribute.{}", index + 1);
            params.push((format!("{}.Name", prefix), name.clone()));
            params.push((format!("{}.Value.StringValue", prefix), value.clone()));
            params.push((format!("{}.Value.DataType", prefix), "String".to_string()));
        }

        params
    }

    /// Make a signed (if credentials are configured) POST to the endpoint
    async fn call(&self, params: Vec<(String, String)>) -> Result<String, TransportError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();

        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header("content-type", "application/x-www-form-urlencoded");

        if let Some(signer) = &self.signer {
            let path = self.endpoint.path();
            for (key, value) in signer.sign_request("POST", &self.host, path, &body, &Utc::now()) {
                request = request.header(key, value);
            }
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Network(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                TransportError::Network(format!("Connection failed: {}", e))
            } else {
                TransportError::Network(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }
}

impl fmt::Debug for SqsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsClient")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

#[async_trait]
impl QueueClient for SqsClient {
    async fn receive(
        &self,
        shutdown: &ShutdownSignal,
        queue: &QueueUrl,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let params = self.receive_params(queue, max_messages);

        let response = match unless_shutdown(shutdown, self.call(params)).await {
            Some(response) => response,
            None => {
                debug!(queue = %queue, "Receive interrupted by shutdown");
                return Ok(Vec::new());
            }
        };

        response
            .and_then(|xml| parse_receive_message_response(&xml))
            .map_err(|source| QueueError::Receive {
                queue: queue.to_string(),
                source,
            })
    }

    async fn delete(
        &self,
        shutdown: &ShutdownSignal,
        message: &ReceivedMessage,
        queue: &QueueUrl,
    ) -> Result<(), QueueError> {
        let params = Self::delete_params(queue, message);

        match unless_shutdown(shutdown, self.call(params)).await {
            None => {
                debug!(queue = %queue, message_id = %message.message_id, "Delete interrupted by shutdown");
                Ok(())
            }
            Some(Ok(_)) => Ok(()),
            Some(Err(source)) => Err(QueueError::Delete {
                queue: queue.to_string(),
                message_id: message.message_id.to_string(),
                source,
            }),
        }
    }

    async fn send(
        &self,
        shutdown: &ShutdownSignal,
        message: Message,
        queue: &QueueUrl,
    ) -> Result<Option<MessageId>, QueueError> {
        if message.body.len() > MAX_MESSAGE_SIZE {
            return Err(QueueError::Send {
                queue: queue.to_string(),
                source: TransportError::MessageTooLarge {
                    size: message.body.len(),
                    max_size: MAX_MESSAGE_SIZE,
                },
            });
        }

        let params = Self::send_params(queue, &message);

        let response = match unless_shutdown(shutdown, self.call(params)).await {
            Some(response) => response,
            None => {
                debug!(queue = %queue, "Send interrupted by shutdown");
                return Ok(None);
            }
        };

        response
            .and_then(|xml| parse_send_message_response(&xml))
            .map(Some)
            .map_err(|source| QueueError::Send {
                queue: queue.to_string(),
                source,
            })
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(element, expected)| element == expected)
}

fn xml_error(e: impl fmt::Display) -> TransportError {
    TransportError::Serialization(format!("XML parsing error: {}", e))
}

/// Message fields collected while walking a `<Message>` element
#[derive(Default)]
struct PartialMessage {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: String,
    attributes: HashMap<String, String>,
    receive_count: u32,
}

impl PartialMessage {
    fn finish(self) -> Option<ReceivedMessage> {
        let receipt_handle = self.receipt_handle?;
        Some(ReceivedMessage {
            message_id: self
                .message_id
                .map(MessageId::from)
                .unwrap_or_else(MessageId::new),
            body: self.body,
            attributes: self.attributes,
            receipt_handle: ReceiptHandle::new(receipt_handle),
            receive_count: self.receive_count.max(1),
            received_at: Timestamp::now(),
        })
    }
}

/// Parse ReceiveMessage XML response
fn parse_receive_message_response(xml: &str) -> Result<Vec<ReceivedMessage>, TransportError> {
    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut current = PartialMessage::default();
    let mut path: Vec<String> = Vec::new();
    let mut attribute_name = String::new();
    let mut attribute_value = String::new();
    let mut buf = Vec::new();

    loop {
        let text = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "Message" => current = PartialMessage::default(),
                    "Attribute" | "MessageAttribute" => {
                        attribute_name.clear();
                        attribute_value.clear();
                    }
                    _ => {}
                }
                path.push(name);
                None
            }
            Ok(Event::Text(e)) => Some(e.unescape().map_err(xml_error)?.into_owned()),
            Ok(Event::CData(e)) => Some(String::from_utf8_lossy(&e.into_inner()).into_owned()),
            Ok(Event::End(_)) => {
                match path.pop().as_deref() {
                    Some("Message") => match std::mem::take(&mut current).finish() {
                        Some(message) => messages.push(message),
                        None => warn!("Skipping message without receipt handle"),
                    },
                    Some("Attribute") if attribute_name == "ApproximateReceiveCount" => {
                        current.receive_count = attribute_value.trim().parse().unwrap_or(1);
                    }
                    Some("MessageAttribute") if !attribute_name.is_empty() => {
                        current.attributes.insert(
                            std::mem::take(&mut attribute_name),
                            std::mem::take(&mut attribute_value),
                        );
                    }
                    _ => {}
                }
                None
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => None,
        };

        if let Some(text) = text {
            if ends_with(&path, &["Message", "MessageId"]) {
                current.message_id.get_or_insert_with(String::new).push_str(&text);
            } else if ends_with(&path, &["Message", "ReceiptHandle"]) {
                current
                    .receipt_handle
                    .get_or_insert_with(String::new)
                    .push_str(&text);
            } else if ends_with(&path, &["Message", "Body"]) {
                current.body.push_str(&text);
            } else if ends_with(&path, &["Attribute", "Name"])
                || ends_with(&path, &["MessageAttribute", "Name"])
            {
                attribute_name.push_str(&text);
            } else if ends_with(&path, &["Attribute", "Value"])
                || ends_with(&path, &["MessageAttribute", "Value", "StringValue"])
            {
                attribute_value.push_str(&text);
            }
        }

        buf.clear();
    }

    Ok(messages)
}

/// Parse SendMessage XML response
fn parse_send_message_response(xml: &str) -> Result<MessageId, TransportError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(e)) if ends_with(&path, &["SendMessageResult", "MessageId"]) => {
                let id = e.unescape().map_err(xml_error)?;
                return Ok(MessageId::from(id.trim()));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Err(TransportError::Serialization(
        "MessageId not found in response".to_string(),
    ))
}

/// Parse error response from XML
fn parse_error_response(xml: &str, status_code: u16) -> TransportError {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut error_code: Option<String> = None;
    let mut error_message: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().ok().map(|s| s.trim().to_string());
                if ends_with(&path, &["Error", "Code"]) {
                    error_code = text;
                } else if ends_with(&path, &["Error", "Message"]) {
                    error_message = text;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| format!("HTTP{}", status_code));
    let message = error_message.unwrap_or_else(|| "Unknown error".to_string());

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            TransportError::QueueNotFound(message)
        }
        "InvalidClientTokenId" | "UnrecognizedClientException" | "SignatureDoesNotMatch"
        | "MissingAuthenticationToken" | "AccessDenied" => {
            TransportError::Authentication(format!("{}: {}", code, message))
        }
        "ReceiptHandleIsInvalid" | "InvalidReceiptHandle" => {
            TransportError::InvalidReceipt(message)
        }
        _ if status_code == 401 || status_code == 403 => {
            TransportError::Authentication(format!("{}: {}", code, message))
        }
        _ => TransportError::Service { code, message },
    }
}
