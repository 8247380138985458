//! Provider - Trait abstracting resource operations
//!
//! A Provider turns resource declarations into vendor API calls and reports
//! the resulting state back to the orchestrating framework.

use std::future::Future;
use std::pin::Pin;

use crate::identifier::IdentifierError;
use crate::resource::{Resource, ResourceId, State};
use crate::retry::RetryError;
use crate::schema::{ResourceSchema, TypeError};
use crate::transcode::MappingError;

/// What went wrong, as far as the caller needs to know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Schema constraint violated before any vendor call
    Validation,
    /// Transcoding failed in either direction
    Mapping,
    NotFound,
    /// Retry budget spent on rate limiting or backend hiccups
    Transient,
    /// Anything else; the vendor message is kept verbatim
    Fatal,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Collect schema violations into one error
    pub fn validation(errors: Vec<TypeError>) -> Self {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(ErrorKind::Validation, message)
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<MappingError> for ProviderError {
    fn from(err: MappingError) -> Self {
        ProviderError::new(ErrorKind::Mapping, err.to_string()).with_cause(err)
    }
}

impl From<IdentifierError> for ProviderError {
    fn from(err: IdentifierError) -> Self {
        ProviderError::new(ErrorKind::Validation, err.to_string()).with_cause(err)
    }
}

impl<E> From<RetryError<E>> for ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: RetryError<E>) -> Self {
        let (kind, message) = match &err {
            RetryError::NotFound(e) => (ErrorKind::NotFound, e.to_string()),
            RetryError::Fatal(e) => (ErrorKind::Fatal, e.to_string()),
            RetryError::Exhausted { .. } => (ErrorKind::Fatal, err.to_string()),
            RetryError::Timeout { .. } => (ErrorKind::Transient, err.to_string()),
        };
        ProviderError::new(kind, message).with_cause(err.into_inner())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "ksyun_ssh_key")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;

    /// Data sources only ever read
    fn is_data_source(&self) -> bool {
        false
    }
}

/// Main Provider trait
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "ksyun")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the vendor ID, bare or composite
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource; deleting something already gone succeeds
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Adopt an existing resource from its import string
    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Evaluate a data source
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, import_id)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Classify, ErrorClass};

    // Mock Provider for testing
    struct MockProvider;

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            let attrs = resource.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs).with_identifier("mock-id-123")) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let attrs = to.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs)) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
            self.read(id, import_id)
        }

        fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Err(ProviderError::fatal("no data sources").for_resource(id)) })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider = MockProvider;
        let id = ResourceId::new("test", "example");
        let state = provider.read(&id, "mock-id-123").await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn mock_provider_create_returns_existing() {
        let provider: Box<dyn Provider> = Box::new(MockProvider);
        let resource = Resource::new("test", "example");
        let state = provider.create(&resource).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.identifier, Some("mock-id-123".to_string()));
    }

    #[tokio::test]
    async fn error_display_names_the_resource() {
        let provider = MockProvider;
        let resource = Resource::new("ksyun_knads", "all").with_read_only(true);
        let err = provider.read_data_source(&resource).await.unwrap_err();
        assert_eq!(err.to_string(), "[ksyun_knads.all] no data sources");
        assert_eq!(err.kind, ErrorKind::Fatal);
    }

    #[derive(Debug)]
    struct VendorError(&'static str, ErrorClass);

    impl std::fmt::Display for VendorError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for VendorError {}

    impl Classify for VendorError {
        fn classify(&self) -> ErrorClass {
            self.1
        }
    }

    #[test]
    fn retry_errors_map_to_kinds() {
        let err: ProviderError =
            RetryError::Fatal(VendorError("InvalidParameter", ErrorClass::Fatal)).into();
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert_eq!(err.message, "InvalidParameter");

        let err: ProviderError = RetryError::Exhausted {
            attempts: 11,
            last: VendorError("Throttling", ErrorClass::Transient),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert!(err.message.contains("Throttling"));

        let err: ProviderError =
            RetryError::NotFound(VendorError("NotFound", ErrorClass::NotFound)).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn mapping_errors_keep_field_context() {
        let err: ProviderError = MappingError::MissingRequired {
            field: "key_name".to_string(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Mapping);
        assert!(err.message.contains("key_name"));
    }
}
