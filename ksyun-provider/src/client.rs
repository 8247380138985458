//! Vendor API client seam
//!
//! Signing and transport live behind `ApiClient`; everything in this crate
//! talks to the vendor through `Context`, which adds logging and the retry
//! settings from the provider configuration.

use std::fmt;

use async_trait::async_trait;
use ksyun_core::provider::{ErrorKind, ProviderError};
use ksyun_core::retry::{
    Classify, ErrorClass, RetryError, RetryPolicy, retry, retry_delete, retry_until_found,
};
use ksyun_core::transcode::Payload;
use log::{debug, trace, warn};

use crate::config::ProviderConfig;

/// Vendor endpoint family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Compute, auto scaling, data guard groups
    Kec,
    /// Bare metal
    Epc,
    /// SSH keys
    Sks,
    /// DDoS mitigation
    Knad,
    Vpc,
    Krds,
    /// Redis
    Kcs,
    /// Projects
    Iam,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Kec => "kec",
            Service::Epc => "epc",
            Service::Sks => "sks",
            Service::Knad => "knad",
            Service::Vpc => "vpc",
            Service::Krds => "krds",
            Service::Kcs => "kcs",
            Service::Iam => "iam",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error answered by the vendor API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// HTTP status, when the transport saw one
    pub status: Option<u16>,
    pub request_id: Option<String>,
}

const TRANSIENT_CODES: &[&str] = &[
    "INTERNAL_FAILURE",
    "InternalError",
    "ServiceUnavailable",
    "Throttling",
    "RequestLimitExceeded",
    "TooManyRequests",
];

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
            request_id: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFound", message).with_status(404)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The target is still referenced by something else
    pub fn is_in_use(&self) -> bool {
        self.code.contains("InUse") || self.message.to_lowercase().contains("in use")
    }
}

impl Classify for ApiError {
    fn classify(&self) -> ErrorClass {
        let message = self.message.to_lowercase();
        if self.status == Some(404)
            || self.code.contains("NotFound")
            || message.contains("not exist")
            || message.contains("not found")
        {
            ErrorClass::NotFound
        } else if self.status.is_some_and(|s| s >= 500)
            || TRANSIENT_CODES.contains(&self.code.as_str())
        {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        let kind = match err.classify() {
            ErrorClass::NotFound => ErrorKind::NotFound,
            ErrorClass::Transient => ErrorKind::Transient,
            ErrorClass::Fatal => ErrorKind::Fatal,
        };
        ProviderError::new(kind, err.to_string()).with_cause(err)
    }
}

/// One call per vendor action
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(
        &self,
        service: Service,
        action: &str,
        request: &Payload,
    ) -> Result<Payload, ApiError>;
}

/// Client plus retry settings, handed to every resource operation
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub client: &'a dyn ApiClient,
    pub config: &'a ProviderConfig,
}

impl<'a> Context<'a> {
    pub fn new(client: &'a dyn ApiClient, config: &'a ProviderConfig) -> Self {
        Self { client, config }
    }

    /// A retry preset with the configured budget and interval
    pub fn policy(&self, base: RetryPolicy) -> RetryPolicy {
        base.with_max_retries(self.config.max_retries)
            .with_interval(self.config.retry_interval)
    }

    pub async fn call(
        &self,
        service: Service,
        action: &str,
        request: &Payload,
    ) -> Result<Payload, ApiError> {
        debug!("[{}] {} request: {:?}", service, action, request);
        match self.client.call(service, action, request).await {
            Ok(response) => {
                trace!("[{}] {} response: {:?}", service, action, response);
                Ok(response)
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", service, action, e);
                Err(e)
            }
        }
    }

    /// Call, retrying transient failures
    pub async fn call_with_retry(
        &self,
        base: RetryPolicy,
        service: Service,
        action: &str,
        request: &Payload,
    ) -> Result<Payload, RetryError<ApiError>> {
        retry(&self.policy(base), move || self.call(service, action, request)).await
    }

    /// Delete call; not-found counts as done
    pub async fn delete_with_retry(
        &self,
        base: RetryPolicy,
        service: Service,
        action: &str,
        request: &Payload,
    ) -> Result<(), RetryError<ApiError>> {
        retry_delete(&self.policy(base), move || self.call(service, action, request)).await
    }

    /// Run `op` until it stops answering not-found
    pub async fn until_found<T, F, Fut>(
        &self,
        base: RetryPolicy,
        op: F,
    ) -> Result<T, RetryError<ApiError>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ApiError>>,
    {
        retry_until_found(&self.policy(base), op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_failure_is_transient() {
        let err = ApiError::new("INTERNAL_FAILURE", "test")
            .with_status(500)
            .with_request_id("2efb29f4-ad46-4b22-996b-7499d4b0871e");
        assert_eq!(err.classify(), ErrorClass::Transient);

        let err = ApiError::new("InvalidActionOrVesion", "test").with_status(400);
        assert_eq!(err.classify(), ErrorClass::Fatal);
    }

    #[test]
    fn not_found_is_recognised_by_code_status_or_message() {
        assert_eq!(
            ApiError::new("ScalingGroupNotFound", "gone").classify(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ApiError::new("InvalidParameter", "x").with_status(404).classify(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ApiError::new("InvalidKey", "key 123 not exist").classify(),
            ErrorClass::NotFound
        );
    }

    #[test]
    fn in_use_detection() {
        assert!(ApiError::new("DataGuardGroupInUse", "busy").is_in_use());
        assert!(ApiError::new("Conflict", "group is in use").is_in_use());
        assert!(!ApiError::new("Conflict", "other").is_in_use());
    }

    #[test]
    fn provider_error_keeps_vendor_message() {
        let err: ProviderError = ApiError::new("InvalidParameter", "KeyName too long").into();
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert_eq!(err.message, "InvalidParameter: KeyName too long");
    }
}
