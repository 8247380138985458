//! Kingsoft Cloud provider implementation
//!
//! Dispatches resource and data source operations to their handlers. Every
//! operation validates the configured attributes against the schema before
//! the first vendor call.

use std::sync::Arc;

use ksyun_core::provider::{ErrorKind, ProviderError, ProviderResult};
use ksyun_core::resource::{Resource, ResourceId, State};
use ksyun_core::schema::ResourceSchema;
use log::{debug, info};

use crate::client::{ApiClient, Context};
use crate::config::ProviderConfig;
use crate::data_sources::{self, DataSourceHandler};
use crate::resources::{self, Attributes, ResourceHandler};

/// Kingsoft Cloud provider
pub struct KsyunProvider {
    client: Arc<dyn ApiClient>,
    config: ProviderConfig,
}

fn resource_handler(id: &ResourceId) -> ProviderResult<&'static dyn ResourceHandler> {
    resources::handler(&id.resource_type).ok_or_else(|| {
        ProviderError::new(
            ErrorKind::Validation,
            format!("Unknown resource type: {}", id.resource_type),
        )
        .for_resource(id.clone())
    })
}

fn data_source_handler(id: &ResourceId) -> ProviderResult<&'static dyn DataSourceHandler> {
    data_sources::handler(&id.resource_type).ok_or_else(|| {
        ProviderError::new(
            ErrorKind::Validation,
            format!("Unknown data source: {}", id.resource_type),
        )
        .for_resource(id.clone())
    })
}

/// Validated attributes with schema defaults filled in
fn prepare(
    schema: &ResourceSchema,
    id: &ResourceId,
    values: &Attributes,
) -> ProviderResult<Attributes> {
    schema
        .validate(values)
        .map_err(|errors| ProviderError::validation(errors).for_resource(id.clone()))?;
    let mut values = values.clone();
    schema.apply_defaults(&mut values);
    Ok(values)
}

impl KsyunProvider {
    pub fn new(client: Arc<dyn ApiClient>, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn context(&self) -> Context<'_> {
        Context::new(self.client.as_ref(), &self.config)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by identifier
    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let handler = resource_handler(id)?;
        let attributes = handler
            .read(self.context(), identifier, &Attributes::new())
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        Ok(match attributes {
            Some(attributes) => State::existing(id.clone(), attributes).with_identifier(identifier),
            None => {
                debug!("{}.{} ({}) no longer exists", id.resource_type, id.name, identifier);
                State::not_found(id.clone())
            }
        })
    }

    /// Create a resource and read it back
    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let handler = resource_handler(id)?;
        let values = prepare(&handler.schema(), id, &resource.attributes)?;

        let created = handler
            .create(self.context(), &values)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        info!(
            "Created {}.{} as {}",
            id.resource_type, id.name, created.identifier
        );

        let mut base = values;
        base.extend(created.attributes);
        let attributes = handler
            .read_after_create(self.context(), &created.identifier, &base)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        let attributes = attributes.ok_or_else(|| {
            ProviderError::new(
                ErrorKind::NotFound,
                format!("{} not found after create", created.identifier),
            )
            .for_resource(id.clone())
        })?;
        Ok(State::existing(id.clone(), attributes).with_identifier(created.identifier))
    }

    /// Update a resource in place and read it back
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let handler = resource_handler(id)?;
        let desired = prepare(&handler.schema(), id, &to.attributes)?;

        handler
            .update(self.context(), identifier, &from.attributes, &desired)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        let mut base = from.attributes.clone();
        base.extend(desired);
        let attributes = handler
            .read(self.context(), identifier, &base)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        Ok(match attributes {
            Some(attributes) => State::existing(id.clone(), attributes).with_identifier(identifier),
            None => State::not_found(id.clone()),
        })
    }

    /// Delete a resource
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let handler = resource_handler(id)?;
        handler
            .delete(self.context(), identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        info!("Deleted {}.{} ({})", id.resource_type, id.name, identifier);
        Ok(())
    }

    /// Adopt an existing resource
    pub async fn import_resource(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let handler = resource_handler(id)?;
        let identifier = handler
            .import_identifier(import_id)
            .map_err(|e| e.for_resource(id.clone()))?;

        let state = self.read_resource(id, &identifier).await?;
        if !state.exists {
            return Err(ProviderError::new(
                ErrorKind::NotFound,
                format!("Cannot import {}: not found", import_id),
            )
            .for_resource(id.clone()));
        }
        Ok(state)
    }

    // =========================================================================
    // Data Sources
    // =========================================================================

    pub async fn read_data_source_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let handler = data_source_handler(id)?;
        let filters = prepare(&handler.schema(), id, &resource.attributes)?;

        let (identifier, attributes) =
            data_sources::evaluate(handler, self.context(), &filters)
                .await
                .map_err(|e| e.for_resource(id.clone()))?;
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }
}
