//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use campaign_sdk::storage::{MemoryAccounting, MemoryCache};
use campaign_sdk::{ClientConfig, ClientContext};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const PRIVATE_KEY: &str = include_str!("../fixtures/test_private_key.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/test_public_key.pem");

pub const EXCHANGE_PATH: &str = "/ims/exchange/jwt";

/// Configuration pointing every endpoint at `server`
pub fn config_value(server: &MockServer) -> Value {
    json!({
        "private_key": PRIVATE_KEY,
        "api_key": "api-key",
        "tech_acct": "tech@techacct.adobe.com",
        "organization": "org@AdobeOrg",
        "client_secret": "s3cret",
        "tenant": "acme",
        "access_endpoint": "https://ims.example.com/s/ent_campaign_sdk",
        "exchange_endpoint": format!("{}{}", server.uri(), EXCHANGE_PATH),
        "audience": "https://ims.example.com/c/api-key",
        "org_unit": "emea",
        "staging": false,
        "cache": false,
        "base_uri": server.uri(),
    })
}

pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::from_value(config_value(server)).unwrap()
}

/// Context with an in-memory cache and accounting
pub fn context(config: ClientConfig) -> (ClientContext, Arc<MemoryAccounting>) {
    let accounting = Arc::new(MemoryAccounting::new());
    let ctx = ClientContext::with_parts(
        config,
        Some(Arc::new(MemoryCache::new())),
        accounting.clone(),
    );
    (ctx, accounting)
}

pub fn token_body() -> Value {
    json!({
        "token_type": "bearer",
        "access_token": "tok-123",
        "expires_in": 3600
    })
}

/// Mount a successful exchange endpoint
pub async fn mount_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(server)
        .await;
}

/// Profile metadata linking to the `cusLoyalty` custom resource
pub fn profile_metadata() -> Value {
    json!({
        "name": "profile",
        "content": {
            "email": {"type": "string"},
            "firstName": {"type": "string"},
            "status": {"values": {"active": {}, "inactive": {}, "__invalid_value__": {}}},
            "loyalty": {"resTarget": "cusLoyalty", "type": "link"}
        },
        "compatibleResources": ["profile"]
    })
}

pub fn loyalty_metadata() -> Value {
    json!({
        "name": "cusLoyalty",
        "content": {
            "tier": {"values": ["gold", "silver"]},
            "points": {"type": "long"}
        }
    })
}
