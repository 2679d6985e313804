/// Campaign API integration module
///
/// Authenticates against the Adobe I/O exchange endpoint and talks to the
/// Campaign tenant API.
///
/// ## Request Flow
///
/// 1. [`signer`] signs a JWT assertion for the technical account (RS256)
/// 2. [`access_token::TokenProvider`] exchanges it for an access token and caches it
/// 3. [`dispatcher::RequestDispatcher`] sends calls with the authorization headers,
///    counting mutating calls against the daily allowance
/// 4. [`client::CampaignClient`] validates profile payloads against composed
///    metadata and dispatches them per owning resource
pub mod access_token;
pub mod client;
pub mod context;
pub mod dispatcher;
pub mod endpoints;
pub mod signer;
pub mod transport;
pub mod types;

pub use access_token::{token_cache_key, TokenProvider};
pub use client::CampaignClient;
pub use context::ClientContext;
pub use dispatcher::RequestDispatcher;
pub use endpoints::{Endpoint, EndpointRegistry};
pub use signer::{SigningError, TokenAssertion};
pub use transport::{HttpTransport, Method};
pub use types::{AccessToken, CampaignError, ClientError, WorkflowCommand};
