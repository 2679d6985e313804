use crate::campaign_api::context::ClientContext;
use crate::campaign_api::signer::{self, TokenAssertion};
use crate::campaign_api::transport::{Method, Request, RequestBody};
use crate::campaign_api::types::{AccessToken, CampaignError, ClientError};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Message used when the exchange endpoint gives no error detail
const EXCHANGE_FAILED: &str = "Unable to get an access token";

/// Cache key of the access token for one credential identity
///
/// Deterministic: the same api key, technical account and organization always
/// map to the same key.
pub fn token_cache_key(api_key: &str, tech_acct: &str, organization: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(b"|");
    hasher.update(tech_acct.as_bytes());
    hasher.update(b"|");
    hasher.update(organization.as_bytes());
    format!("aec.{}", hex::encode(hasher.finalize()))
}

/// Acquires access tokens and keeps them in the context cache
///
/// Flow: sign an assertion, exchange it for an access token, cache the
/// exchange body with a TTL of `expires_in`, return it. Later calls are served
/// from the cache until the entry expires, [`TokenProvider::flush`] is called,
/// or `force` is passed to [`TokenProvider::get`].
#[derive(Clone)]
pub struct TokenProvider {
    ctx: ClientContext,
    cache_key: String,
    expiration: u64,
}

impl TokenProvider {
    pub fn new(ctx: ClientContext) -> Self {
        let config = &ctx.config;
        let cache_key = token_cache_key(&config.api_key, &config.tech_acct, &config.organization);
        let expiration = config.expiration;

        Self {
            ctx,
            cache_key,
            expiration,
        }
    }

    /// Key the token is cached under
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Assertion lifetime and fallback cache TTL, in seconds
    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    /// Change the assertion lifetime
    ///
    /// Flushes the cached token so the next call signs with the new lifetime.
    pub async fn set_expiration(&mut self, seconds: u64) -> Result<(), CampaignError> {
        self.flush().await?;
        self.expiration = seconds;
        Ok(())
    }

    /// Return an access token
    ///
    /// With `force` the cache is bypassed and a fresh exchange always happens.
    pub async fn get(&self, force: bool) -> Result<AccessToken, CampaignError> {
        if !force {
            if let Some(token) = self.cached().await? {
                tracing::debug!("Access token cache hit: {}", self.cache_key);
                return Ok(token);
            }
            tracing::debug!("Access token cache miss: {}", self.cache_key);
        }

        self.exchange().await
    }

    /// Drop the cached token
    pub async fn flush(&self) -> Result<(), CampaignError> {
        if let Some(cache) = &self.ctx.cache {
            cache.delete(&self.cache_key).await?;
            tracing::debug!("Flushed access token cache: {}", self.cache_key);
        }
        Ok(())
    }

    async fn cached(&self) -> Result<Option<AccessToken>, CampaignError> {
        let Some(cache) = &self.ctx.cache else {
            return Ok(None);
        };

        let Some(value) = cache.get(&self.cache_key).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<AccessToken>(value) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!("Ignoring malformed cached access token: {}", e);
                Ok(None)
            }
        }
    }

    fn assertion(&self) -> TokenAssertion {
        let config = &self.ctx.config;
        TokenAssertion {
            issuer: config.organization.clone(),
            subject: config.tech_acct.clone(),
            audience: config.audience.clone(),
            access_endpoint: config.access_endpoint.clone(),
            expiration: self.expiration as i64,
            issued_at: chrono::Utc::now().timestamp(),
        }
    }

    async fn exchange(&self) -> Result<AccessToken, CampaignError> {
        let config = &self.ctx.config;
        let jwt = signer::sign_with_reference(&config.private_key, &self.assertion())?;

        let request = Request::new(Method::Post, config.exchange_endpoint.as_str()).with_body(
            RequestBody::Form(vec![
                ("client_id".to_string(), config.api_key.clone()),
                ("client_secret".to_string(), config.client_secret().to_string()),
                ("jwt_token".to_string(), jwt),
            ]),
        );

        tracing::info!("Exchanging assertion for access token at {}", config.exchange_endpoint);
        let response = self.ctx.transport.send(&request).await?;
        let content: Option<Value> = serde_json::from_str(&response.body).ok();

        if response.status != 200 {
            let message = content
                .as_ref()
                .and_then(|c| c.get("error"))
                .and_then(Value::as_str)
                .map(|error| {
                    let description = content
                        .as_ref()
                        .and_then(|c| c.get("error_description"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    format!("{}\n{}", error, description)
                })
                .unwrap_or_else(|| EXCHANGE_FAILED.to_string());

            tracing::error!("Token exchange failed: HTTP {}", response.status);
            return Err(CampaignError::TokenExchange {
                status: response.status,
                message,
            });
        }

        let mut content = content
            .filter(Value::is_object)
            .ok_or_else(|| ClientError::new("Failed to parse token exchange response", 502))?;

        let ttl = content
            .get("expires_in")
            .and_then(Value::as_u64)
            .filter(|seconds| *seconds > 0)
            .unwrap_or(self.expiration);

        if let Some(object) = content.as_object_mut() {
            object.insert("expires_in".to_string(), json!(ttl));
        }

        if config.debug {
            if let Some(object) = content.as_object_mut() {
                object.insert(
                    "debug".to_string(),
                    json!({
                        "tenant": config.tenant,
                        "cache_id": self.cache_key,
                        "cache_expiration": ttl,
                    }),
                );
            }
        }

        let token: AccessToken = serde_json::from_value(content.clone()).map_err(|e| {
            tracing::error!("Token exchange response is missing fields: {}", e);
            ClientError::new(format!("Failed to parse token exchange response: {}", e), 502)
        })?;

        if let Some(cache) = &self.ctx.cache {
            cache
                .set(&self.cache_key, &content, Some(Duration::from_secs(ttl)))
                .await?;
        }

        tracing::info!("Access token acquired, expires in {}s", token.expires_in);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = token_cache_key("key", "tech", "org");
        let b = token_cache_key("key", "tech", "org");
        assert_eq!(a, b);
        assert!(a.starts_with("aec."));
        assert_eq!(a.len(), "aec.".len() + 64);
    }

    #[test]
    fn test_cache_key_differs_per_identity() {
        assert_ne!(
            token_cache_key("key", "tech", "org"),
            token_cache_key("key", "tech", "other-org")
        );
        assert_ne!(
            token_cache_key("ab", "c", "org"),
            token_cache_key("a", "bc", "org")
        );
    }
}
