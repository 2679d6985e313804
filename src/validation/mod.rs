//! Payload validation against backend resource metadata.
//!
//! Metadata is fetched per resource type by [`MetadataStore`], composed with
//! the custom resources owned by the caller's organizational unit, and then
//! used to validate ([`ResourceValidator`]) and split ([`PayloadSplitter`])
//! outgoing payloads.
//!
//! # Example
//!
//! ```
//! use campaign_sdk::validation::{OrgUnitOwnership, ResourceMetadata, ResourceValidator};
//! use serde_json::json;
//!
//! let metadata: ResourceMetadata = serde_json::from_value(json!({
//!     "name": "profile",
//!     "content": {"status": {"values": {"active": {}, "inactive": {}}}}
//! })).unwrap();
//!
//! let validator = ResourceValidator::new(OrgUnitOwnership::default());
//! let payload = json!({"status": "bogus"});
//! let result = validator
//!     .validate_resources(payload.as_object().unwrap(), &metadata, false)
//!     .unwrap();
//! assert!(!result.is_valid());
//! ```

pub mod error;
pub mod metadata;
pub mod splitter;
pub mod validator;

pub use error::{FieldError, ValidationError};
pub use metadata::{
    metadata_scope, FieldDescriptor, MetadataStore, OrgUnitOwnership, ResourceMetadata,
    CUSTOM_PREFIX,
};
pub use splitter::{Bucket, BucketKey, PayloadSplitter, SplitPayload};
pub use validator::{FieldLocation, FieldOutcome, ResourceValidator, ValidationResult};
