//! Campaign SDK
//!
//! A Rust library for the Adobe Campaign Standard REST API.
//!
//! This SDK provides:
//! - Service-account authentication: RS256-signed JWT assertion exchanged for an access token
//! - Access token and resource metadata caching (filesystem or in-memory)
//! - Payload validation and splitting against composed resource metadata
//! - A daily throttle that logs mutating calls past half the configured threshold
//! - Type definitions for configuration and error handling
//!
//! # Example
//!
//! ```no_run
//! use campaign_sdk::{CampaignClient, ClientConfig, WorkflowCommand};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_file("campaign.toml")?;
//! let client = CampaignClient::new(config)?;
//!
//! let profiles = client.get_profiles(Some(10)).await?;
//! if let Some(next) = client.get_next(&profiles).await? {
//!     println!("next page: {}", next);
//! }
//!
//! client.control_workflow("WKF12", WorkflowCommand::Start).await?;
//! # Ok(())
//! # }
//! ```

pub mod campaign_api;
pub mod config;
pub mod storage;
pub mod validation;

// Re-export commonly used types and functions
pub use campaign_api::{
    access_token::{token_cache_key, TokenProvider},
    client::CampaignClient,
    context::ClientContext,
    dispatcher::RequestDispatcher,
    endpoints::{Endpoint, EndpointRegistry},
    signer::{sign, SigningError, TokenAssertion},
    transport::Method,
    types::{AccessToken, CampaignError, ClientError, WorkflowCommand},
};
pub use config::ClientConfig;
pub use storage::{
    CacheStore, FileAccounting, FilesystemCache, MemoryAccounting, MemoryCache, RequestAccounting,
};
pub use validation::{ResourceMetadata, ResourceValidator, ValidationError};
