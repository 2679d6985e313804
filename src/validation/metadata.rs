//! Resource metadata model and store.
//!
//! The backend describes each resource type at `resourceType/{name}` on the
//! extended endpoint: its fields, the enumerated values some of them accept,
//! and cross-references to other resources. Custom resources (reserved `cus`
//! prefix) that belong to the caller's organizational unit can be inlined
//! into the referencing field, giving the composed view used for validation
//! and payload splitting.

use crate::campaign_api::dispatcher::RequestDispatcher;
use crate::campaign_api::transport::Method;
use crate::campaign_api::types::{CampaignError, ClientError};
use crate::campaign_api::context::ClientContext;
use crate::config::ClientConfig;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

/// Name prefix reserved for custom resources
pub const CUSTOM_PREFIX: &str = "cus";

/// Backend marker mixed into enumerated values
pub const INVALID_VALUE_SENTINEL: &str = "__invalid_value__";

fn names_from_list_or_map<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    })
}

/// Schema of one resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: BTreeMap<String, FieldDescriptor>,
    /// Physical resources this logical resource maps onto
    #[serde(
        default,
        rename = "compatibleResources",
        deserialize_with = "names_from_list_or_map"
    )]
    pub compatible_resources: Vec<String>,
}

impl ResourceMetadata {
    /// Name of the physical resource that owns this resource's own fields
    pub fn physical_name(&self) -> &str {
        self.compatible_resources
            .first()
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// Custom resources referenced by this resource that `ownership` allows
    pub fn owned_targets<'a>(&'a self, ownership: &'a OrgUnitOwnership) -> impl Iterator<Item = &'a str> + 'a {
        self.content
            .values()
            .filter_map(|field| field.res_target.as_deref())
            .filter(move |target| ownership.owns(target))
    }
}

/// Description of one field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Enumerated values, as an object keyed by value or a list of values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    /// Resource this field links to
    #[serde(default, rename = "resTarget", skip_serializing_if = "Option::is_none")]
    pub res_target: Option<String>,
    /// Inlined metadata of `res_target`, present in composed metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Box<ResourceMetadata>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldDescriptor {
    /// Permitted values, without the backend's invalid-value sentinel
    pub fn allowed_values(&self) -> Option<Vec<String>> {
        let values: Vec<String> = match self.values.as_ref()? {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("value").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect(),
            _ => return None,
        };

        Some(
            values
                .into_iter()
                .filter(|v| v != INVALID_VALUE_SENTINEL)
                .collect(),
        )
    }
}

/// Custom resources the caller's organizational unit may touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgUnitOwnership {
    resources: HashSet<String>,
}

impl OrgUnitOwnership {
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `resource` is a custom resource owned by the org unit
    pub fn owns(&self, resource: &str) -> bool {
        resource.starts_with(CUSTOM_PREFIX) && self.resources.contains(resource)
    }
}

/// Inline owned custom resources into `name`'s metadata
///
/// `fetched` must hold every resource reachable from `name`. A resource
/// already on the current path is left as a plain reference.
pub fn compose(
    name: &str,
    fetched: &HashMap<String, ResourceMetadata>,
    ownership: &OrgUnitOwnership,
) -> Option<ResourceMetadata> {
    let mut path = Vec::new();
    compose_inner(name, fetched, ownership, &mut path)
}

fn compose_inner(
    name: &str,
    fetched: &HashMap<String, ResourceMetadata>,
    ownership: &OrgUnitOwnership,
    path: &mut Vec<String>,
) -> Option<ResourceMetadata> {
    let mut metadata = fetched.get(name)?.clone();
    path.push(name.to_string());

    for field in metadata.content.values_mut() {
        let Some(target) = field.res_target.clone() else {
            continue;
        };
        if !ownership.owns(&target) || path.contains(&target) {
            continue;
        }
        field.nested = compose_inner(&target, fetched, ownership, path).map(Box::new);
    }

    path.pop();
    Some(metadata)
}

/// Prefix separating persisted metadata of different tenants and org units
///
/// Derived from the base URI, the tenant (including any staging suffix) and
/// the org unit with its owned resources.
pub fn metadata_scope(config: &ClientConfig) -> String {
    let mut owned = config.org_unit_resources.clone();
    owned.sort();

    let mut hasher = Sha256::new();
    for part in [
        config.base_uri.as_str(),
        config.tenant.as_str(),
        config.org_unit.as_str(),
        owned.join(",").as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    format!("md.{}", &hex::encode(hasher.finalize())[..16])
}

/// Fetches and caches resource metadata for one major endpoint
///
/// Metadata is kept for the lifetime of the store, and written to the
/// context's persistent cache when one is configured, under keys scoped by
/// [`metadata_scope`].
pub struct MetadataStore {
    ctx: ClientContext,
    major_endpoint: String,
    ownership: OrgUnitOwnership,
    scope: String,
    metadata: RwLock<HashMap<String, ResourceMetadata>>,
    resources: RwLock<HashMap<String, Value>>,
}

impl MetadataStore {
    pub fn new(ctx: ClientContext, major_endpoint: impl Into<String>) -> Self {
        let ownership = OrgUnitOwnership::new(ctx.config.org_unit_resources.iter().cloned());
        let scope = metadata_scope(&ctx.config);
        Self {
            ctx,
            major_endpoint: major_endpoint.into(),
            ownership,
            scope,
            metadata: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
        }
    }

    pub fn ownership(&self) -> &OrgUnitOwnership {
        &self.ownership
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ctx.config.expiration)
    }

    fn endpoint_url(&self, major: &str, resource: &str) -> Result<String, CampaignError> {
        let endpoint = self.ctx.endpoints.get(major).ok_or_else(|| {
            CampaignError::Config(format!("Unknown major endpoint: {}", major))
        })?;
        Ok(endpoint.url(true, resource))
    }

    fn remembered(&self, resource: &str) -> Result<Option<ResourceMetadata>, CampaignError> {
        let metadata = self
            .metadata
            .read()
            .map_err(|e| CampaignError::Config(format!("Metadata lock poisoned: {}", e)))?;
        Ok(metadata.get(resource).cloned())
    }

    fn remember(&self, resource: &str, metadata: &ResourceMetadata) -> Result<(), CampaignError> {
        let mut cache = self
            .metadata
            .write()
            .map_err(|e| CampaignError::Config(format!("Metadata lock poisoned: {}", e)))?;
        cache.insert(resource.to_string(), metadata.clone());
        Ok(())
    }

    /// Metadata of `resource`, fetched on first use
    pub async fn get_metadata(
        &self,
        dispatcher: &RequestDispatcher,
        resource: &str,
    ) -> Result<ResourceMetadata, CampaignError> {
        if let Some(metadata) = self.remembered(resource)? {
            tracing::debug!("Metadata cache hit for {}", resource);
            return Ok(metadata);
        }

        let cache_key = format!("{}.Metadata_{}", self.scope, resource);
        if let Some(cache) = &self.ctx.cache {
            if let Some(value) = cache.get(&cache_key).await? {
                match serde_json::from_value::<ResourceMetadata>(value) {
                    Ok(metadata) => {
                        tracing::debug!("Metadata for {} loaded from persistent cache", resource);
                        self.remember(resource, &metadata)?;
                        return Ok(metadata);
                    }
                    Err(e) => tracing::warn!("Ignoring malformed cached metadata for {}: {}", resource, e),
                }
            }
        }

        let url = self.endpoint_url(&self.major_endpoint, &format!("resourceType/{}", resource))?;
        tracing::info!("Fetching metadata for {}", resource);
        let value = dispatcher.fetch(Method::Get, &url, None).await?;

        let mut metadata: ResourceMetadata = serde_json::from_value(value.clone()).map_err(|e| {
            tracing::error!("Failed to parse metadata for {}: {}", resource, e);
            ClientError::new(format!("Failed to parse metadata for {}: {}", resource, e), 502)
        })?;
        if metadata.name.is_empty() {
            metadata.name = resource.to_string();
        }

        if let Some(cache) = &self.ctx.cache {
            let value = serde_json::to_value(&metadata)
                .map_err(crate::storage::StorageError::from)?;
            cache.set(&cache_key, &value, Some(self.cache_ttl())).await?;
        }
        self.remember(resource, &metadata)?;

        Ok(metadata)
    }

    /// Metadata of `resource` with owned custom resources inlined
    pub async fn get_composed_metadata(
        &self,
        dispatcher: &RequestDispatcher,
        resource: &str,
    ) -> Result<ResourceMetadata, CampaignError> {
        let mut fetched: HashMap<String, ResourceMetadata> = HashMap::new();
        let mut pending = vec![resource.to_string()];

        while let Some(name) = pending.pop() {
            if fetched.contains_key(&name) {
                continue;
            }
            let metadata = self.get_metadata(dispatcher, &name).await?;
            pending.extend(
                metadata
                    .owned_targets(&self.ownership)
                    .filter(|target| !fetched.contains_key(*target))
                    .map(str::to_string),
            );
            fetched.insert(name, metadata);
        }

        compose(resource, &fetched, &self.ownership).ok_or_else(|| {
            CampaignError::Config(format!("Metadata for {} could not be composed", resource))
        })
    }

    /// Resource listing of a major endpoint
    pub async fn get_resources(
        &self,
        dispatcher: &RequestDispatcher,
        major_endpoint: &str,
    ) -> Result<Value, CampaignError> {
        {
            let resources = self
                .resources
                .read()
                .map_err(|e| CampaignError::Config(format!("Resources lock poisoned: {}", e)))?;
            if let Some(value) = resources.get(major_endpoint) {
                return Ok(value.clone());
            }
        }

        let cache_key = format!("{}.Resources_{}", self.scope, major_endpoint);
        let cached = match &self.ctx.cache {
            Some(cache) => cache.get(&cache_key).await?,
            None => None,
        };

        let value = match cached {
            Some(value) => value,
            None => {
                let url = self.endpoint_url(major_endpoint, "")?;
                let value = dispatcher.fetch(Method::Get, &url, None).await?;
                if let Some(cache) = &self.ctx.cache {
                    cache.set(&cache_key, &value, Some(self.cache_ttl())).await?;
                }
                value
            }
        };

        let mut resources = self
            .resources
            .write()
            .map_err(|e| CampaignError::Config(format!("Resources lock poisoned: {}", e)))?;
        resources.insert(major_endpoint.to_string(), value.clone());
        Ok(value)
    }
}
