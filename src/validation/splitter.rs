//! Split a logical payload into per-resource buckets.

use super::error::{FieldError, ValidationError};
use super::metadata::ResourceMetadata;
use super::validator::{FieldLocation, ResourceValidator};
use crate::campaign_api::dispatcher::RequestDispatcher;
use crate::campaign_api::transport::Method;
use crate::campaign_api::types::CampaignError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKey {
    pub resource: String,
    pub link: Option<String>,
    pub primary_key: Option<String>,
    pub href: Option<String>,
    /// Links between the top resource and `resource`
    pub depth: usize,
}

impl BucketKey {
    fn from_location(location: FieldLocation) -> Self {
        Self {
            resource: location.resource,
            link: location.link,
            primary_key: None,
            href: None,
            depth: location.depth,
        }
    }

    fn same_target(&self, location: &FieldLocation) -> bool {
        self.resource == location.resource
            && self.link == location.link
            && self.depth == location.depth
    }
}

/// `{resource}|{link}|{primaryKey}|{href}`, absent parts left out
impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource)?;
        for part in [&self.link, &self.primary_key, &self.href].into_iter().flatten() {
            write!(f, "|{}", part)?;
        }
        Ok(())
    }
}

/// Fields destined for one physical resource
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: BucketKey,
    pub fields: Map<String, Value>,
}

/// Buckets of one logical payload, the main resource first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitPayload {
    pub buckets: Vec<Bucket>,
}

impl SplitPayload {
    pub fn has_links(&self) -> bool {
        self.buckets.iter().any(|b| b.key.link.is_some())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Routes every payload field to the resource that owns it
#[derive(Debug, Clone, Default)]
pub struct PayloadSplitter {
    validator: ResourceValidator,
}

impl PayloadSplitter {
    pub fn new(validator: ResourceValidator) -> Self {
        Self { validator }
    }

    /// Split `payload` according to composed `metadata`
    ///
    /// Fails with [`ValidationError::Failed`] if any field cannot be placed.
    pub fn prepare(
        &self,
        payload: &Map<String, Value>,
        metadata: &ResourceMetadata,
    ) -> Result<SplitPayload, ValidationError> {
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut errors: BTreeMap<String, Vec<FieldError>> = BTreeMap::new();

        for (name, value) in payload {
            let location = match self.validator.locate(name, value, metadata) {
                Ok(location) => location,
                Err(e) => {
                    errors.insert(name.clone(), vec![e.to_field_error()]);
                    continue;
                }
            };

            match buckets.iter_mut().find(|b| b.key.same_target(&location)) {
                Some(bucket) => {
                    bucket.fields.insert(name.clone(), value.clone());
                }
                None => {
                    let mut fields = Map::new();
                    fields.insert(name.clone(), value.clone());
                    buckets.push(Bucket {
                        key: BucketKey::from_location(location),
                        fields,
                    });
                }
            }
        }

        if !errors.is_empty() {
            return Err(ValidationError::Failed(errors));
        }

        buckets.sort_by_key(|b| b.key.link.is_some());
        tracing::debug!(
            "Split payload into {} bucket(s): {}",
            buckets.len(),
            buckets
                .iter()
                .map(|b| b.key.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(SplitPayload { buckets })
    }

    /// Record the primary key and href of each directly linked bucket
    ///
    /// Issues one `GET url` when at least one bucket carries a link. Only
    /// links of the top resource are looked up; deeper links and links
    /// missing from the representation are left unresolved.
    pub async fn resolve_links(
        &self,
        dispatcher: &RequestDispatcher,
        url: &str,
        split: &mut SplitPayload,
    ) -> Result<(), CampaignError> {
        if !split.has_links() {
            return Ok(());
        }

        let representation = dispatcher.fetch(Method::Get, url, None).await?;

        for bucket in split.buckets.iter_mut().filter(|b| b.key.depth == 1) {
            let Some(link) = bucket.key.link.as_deref() else {
                continue;
            };
            let Some(target) = representation.get(link) else {
                tracing::debug!("Link '{}' not present at {}", link, url);
                continue;
            };
            bucket.key.primary_key = target
                .get("PKey")
                .and_then(Value::as_str)
                .map(str::to_string);
            bucket.key.href = target
                .get("href")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(())
    }
}
