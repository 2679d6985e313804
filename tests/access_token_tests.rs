//! Access token exchange tests
//!
//! The exchange endpoint is mocked with wiremock; assertions are checked
//! against the public half of the fixture key pair.

mod common;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use campaign_sdk::{sign, CampaignError, SigningError, TokenAssertion, TokenProvider};
use common::*;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn assertion(issued_at: i64) -> TokenAssertion {
    TokenAssertion {
        issuer: "org@AdobeOrg".to_string(),
        subject: "tech@techacct.adobe.com".to_string(),
        audience: "https://ims.example.com/c/api-key".to_string(),
        access_endpoint: "https://ims.example.com/s/ent_campaign_sdk".to_string(),
        expiration: 3600,
        issued_at,
    }
}

#[tokio::test]
async fn test_cached_token_exchanged_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .and(body_string_contains("client_id=api-key"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains("jwt_token="))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (ctx, _) = context(config(&server));
    let provider = TokenProvider::new(ctx);

    let first = provider.get(false).await.unwrap();
    let second = provider.get(false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.access_token, "tok-123");
    assert_eq!(first.authorization(), "Bearer tok-123");
}

#[tokio::test]
async fn test_force_always_exchanges() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(3)
        .mount(&server)
        .await;

    let (ctx, _) = context(config(&server));
    let provider = TokenProvider::new(ctx);

    provider.get(false).await.unwrap();
    provider.get(true).await.unwrap();
    provider.get(true).await.unwrap();
}

#[tokio::test]
async fn test_flush_triggers_new_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(2)
        .mount(&server)
        .await;

    let (ctx, _) = context(config(&server));
    let provider = TokenProvider::new(ctx);

    provider.get(false).await.unwrap();
    provider.flush().await.unwrap();
    provider.get(false).await.unwrap();
}

#[tokio::test]
async fn test_exchange_rejected_with_error_detail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "bad secret"
        })))
        .mount(&server)
        .await;

    let (ctx, _) = context(config(&server));
    let err = TokenProvider::new(ctx).get(false).await.unwrap_err();

    assert_eq!(err.code(), 401);
    assert_eq!(err.to_string(), "invalid_client\nbad secret");
    assert!(matches!(err, CampaignError::TokenExchange { status: 401, .. }));
}

#[tokio::test]
async fn test_exchange_rejected_without_detail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let (ctx, _) = context(config(&server));
    let err = TokenProvider::new(ctx).get(false).await.unwrap_err();

    assert_eq!(err.code(), 500);
    assert_eq!(err.to_string(), "Unable to get an access token");
}

#[tokio::test]
async fn test_zero_expires_in_falls_back_to_expiration() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "bearer",
            "access_token": "tok-0",
            "expires_in": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut value = config_value(&server);
    value["debug"] = json!(true);
    value["expiration"] = json!(120);
    let (ctx, _) = context(campaign_sdk::ClientConfig::from_value(value).unwrap());
    let provider = TokenProvider::new(ctx);

    let token = provider.get(false).await.unwrap();
    let debug = token.debug.expect("debug payload");
    assert_eq!(debug["tenant"], "acme");
    assert_eq!(debug["cache_id"], provider.cache_key());
    assert_eq!(debug["cache_expiration"], 120);
    assert!(!debug.to_string().contains("s3cret"));

    // Still cached despite a zero expires_in
    provider.get(false).await.unwrap();
}

#[tokio::test]
async fn test_set_expiration_flushes_cache() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(2)
        .mount(&server)
        .await;

    let (ctx, _) = context(config(&server));
    let mut provider = TokenProvider::new(ctx);

    provider.get(false).await.unwrap();
    provider.set_expiration(600).await.unwrap();
    assert_eq!(provider.expiration(), 600);
    provider.get(false).await.unwrap();
}

#[tokio::test]
async fn test_missing_key_file_fails_before_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(0)
        .mount(&server)
        .await;

    let mut value = config_value(&server);
    value["private_key"] = json!("/nonexistent/private.key");
    let (ctx, _) = context(campaign_sdk::ClientConfig::from_value(value).unwrap());

    let err = TokenProvider::new(ctx).get(false).await.unwrap_err();
    assert!(matches!(
        err,
        CampaignError::TokenSigning(SigningError::KeyNotFound(_))
    ));
    assert_eq!(err.code(), 500);
}

#[test]
fn test_signed_assertion_verifies_with_public_key() {
    let token = sign(PRIVATE_KEY, &assertion(chrono::Utc::now().timestamp())).unwrap();

    let header: Value = serde_json::from_slice(
        &URL_SAFE_NO_PAD
            .decode(token.split('.').next().unwrap())
            .unwrap(),
    )
    .unwrap();
    assert_eq!(header["alg"], "RS256");
    assert_eq!(header["typ"], "JWT");

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["https://ims.example.com/c/api-key"]);
    validation.set_issuer(&["org@AdobeOrg"]);
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();

    let claims = decode::<Value>(&token, &key, &validation).unwrap().claims;
    assert_eq!(claims["sub"], "tech@techacct.adobe.com");
    assert_eq!(claims["https://ims.example.com/s/ent_campaign_sdk"], true);
}

#[test]
fn test_signing_is_deterministic() {
    let a = sign(PRIVATE_KEY, &assertion(1_700_000_000)).unwrap();
    let b = sign(PRIVATE_KEY, &assertion(1_700_000_000)).unwrap();
    let c = sign(PRIVATE_KEY, &assertion(1_700_000_001)).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.split('.').count(), 3);
}

#[tokio::test]
async fn test_absent_expires_in_uses_expiration() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "bearer",
            "access_token": "tok-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut value = config_value(&server);
    value["expiration"] = json!(300);
    let (ctx, _) = context(campaign_sdk::ClientConfig::from_value(value).unwrap());
    let provider = TokenProvider::new(ctx);

    let token = provider.get(false).await.unwrap();
    assert_eq!(token.access_token, "tok-1");
    assert_eq!(token.expires_in, 300);

    let cached = provider.get(false).await.unwrap();
    assert_eq!(cached, token);
}

#[tokio::test]
async fn test_unparseable_exchange_body_is_bad_gateway() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let (ctx, _) = context(config(&server));
    let err = TokenProvider::new(ctx).get(false).await.unwrap_err();

    assert!(matches!(err, CampaignError::Client(_)));
    assert_eq!(err.code(), 502);
}
