use crate::campaign_api::context::ClientContext;
use crate::campaign_api::dispatcher::RequestDispatcher;
use crate::campaign_api::endpoints::Endpoint;
use crate::campaign_api::transport::Method;
use crate::campaign_api::types::{CampaignError, WorkflowCommand};
use crate::config::ClientConfig;
use crate::validation::{MetadataStore, ResourceMetadata};
use serde_json::{json, Map, Value};

const PROFILE: &str = "profile";
const SERVICE: &str = "service";
const WORKFLOW: &str = "workflow";
const EVENT: &str = "event";

fn with_query(path: String, pairs: &[(&str, String)]) -> String {
    if pairs.is_empty() {
        return path;
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    format!("{}?{}", path, serializer.finish())
}

fn line_count(limit: Option<u32>) -> Vec<(&'static str, String)> {
    limit
        .map(|limit| vec![("_lineCount", limit.to_string())])
        .unwrap_or_default()
}

/// Client for the Campaign profile, service, event and workflow APIs
///
/// Profile writes are validated against the composed profile metadata and
/// split across the custom resources that own their fields.
///
/// # Example
///
/// ```no_run
/// use campaign_sdk::{CampaignClient, ClientConfig};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::from_file("campaign.toml")?;
/// let client = CampaignClient::new(config)?;
///
/// let profile = client.get_profile_by_email("jane@example.com").await?;
/// let payload = json!({"email": "jane@example.com", "firstName": "Jane"});
/// client.create_profile(payload.as_object().unwrap()).await?;
/// # Ok(())
/// # }
/// ```
pub struct CampaignClient {
    ctx: ClientContext,
    dispatcher: RequestDispatcher,
    metadata: MetadataStore,
}

impl CampaignClient {
    pub fn new(config: ClientConfig) -> Result<Self, CampaignError> {
        Ok(Self::from_context(ClientContext::new(config)?))
    }

    pub fn from_context(ctx: ClientContext) -> Self {
        tracing::debug!("Creating CampaignClient for tenant {}", ctx.config.tenant);
        let dispatcher = RequestDispatcher::new(ctx.clone());
        let metadata = MetadataStore::new(ctx.clone(), PROFILE);
        Self {
            ctx,
            dispatcher,
            metadata,
        }
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    fn endpoint(&self, major: &str) -> Result<&Endpoint, CampaignError> {
        self.ctx
            .endpoints
            .get(major)
            .ok_or_else(|| CampaignError::Config(format!("Unknown major endpoint: {}", major)))
    }

    async fn get(&self, url: &str) -> Result<Value, CampaignError> {
        self.dispatcher.fetch(Method::Get, url, None).await
    }

    // Metadata

    pub async fn get_metadata(&self, resource: &str) -> Result<ResourceMetadata, CampaignError> {
        self.metadata.get_metadata(&self.dispatcher, resource).await
    }

    pub async fn get_composed_metadata(
        &self,
        resource: &str,
    ) -> Result<ResourceMetadata, CampaignError> {
        self.metadata
            .get_composed_metadata(&self.dispatcher, resource)
            .await
    }

    pub async fn get_resources(&self, major_endpoint: &str) -> Result<Value, CampaignError> {
        self.metadata
            .get_resources(&self.dispatcher, major_endpoint)
            .await
    }

    // Profiles

    pub async fn get_profiles(&self, limit: Option<u32>) -> Result<Value, CampaignError> {
        let path = self.endpoint(PROFILE)?.url(false, PROFILE);
        self.get(&with_query(path, &line_count(limit))).await
    }

    pub async fn get_profile(&self, pkey: &str) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(PROFILE)?
            .url(false, &format!("{}/{}", PROFILE, pkey));
        self.get(&path).await
    }

    pub async fn get_profile_by_email(&self, email: &str) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(PROFILE)?
            .url(false, &format!("{}/byEmail", PROFILE));
        self.get(&with_query(path, &[("email", email.to_string())]))
            .await
    }

    /// Create a profile, including fields of owned custom resources
    pub async fn create_profile(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<Vec<Value>, CampaignError> {
        let metadata = self.get_composed_metadata(PROFILE).await?;
        let url = self.endpoint(PROFILE)?.url(true, PROFILE);
        tracing::info!("Creating profile with {} field(s)", payload.len());
        self.dispatcher
            .dispatch(Method::Post, &url, payload, Some(&metadata))
            .await
    }

    /// Update a profile, including fields of owned custom resources
    pub async fn update_profile(
        &self,
        pkey: &str,
        payload: &Map<String, Value>,
    ) -> Result<Vec<Value>, CampaignError> {
        let metadata = self.get_composed_metadata(PROFILE).await?;
        let url = self
            .endpoint(PROFILE)?
            .url(true, &format!("{}/{}", PROFILE, pkey));
        tracing::info!("Updating profile {} with {} field(s)", pkey, payload.len());
        self.dispatcher
            .dispatch(Method::Patch, &url, payload, Some(&metadata))
            .await
    }

    pub async fn delete_profile(&self, pkey: &str) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(PROFILE)?
            .url(false, &format!("{}/{}", PROFILE, pkey));
        self.dispatcher.fetch(Method::Delete, &path, None).await
    }

    // Services

    pub async fn get_services(&self, limit: Option<u32>) -> Result<Value, CampaignError> {
        let path = self.endpoint(SERVICE)?.url(false, SERVICE);
        self.get(&with_query(path, &line_count(limit))).await
    }

    pub async fn get_service_by_name(&self, name: &str) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(SERVICE)?
            .url(false, &format!("{}/byName", SERVICE));
        self.get(&with_query(path, &[("name", name.to_string())]))
            .await
    }

    // Subscriptions

    pub async fn get_subscriptions_by_profile(&self, pkey: &str) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(PROFILE)?
            .url(false, &format!("{}/{}/subscriptions", PROFILE, pkey));
        self.get(&path).await
    }

    pub async fn subscribe(
        &self,
        service_pkey: &str,
        profile_pkey: &str,
    ) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(SERVICE)?
            .url(false, &format!("{}/{}/subscriptions", SERVICE, service_pkey));
        let body = json!({"subscriber": {"PKey": profile_pkey}});
        self.dispatcher.fetch(Method::Post, &path, Some(body)).await
    }

    /// Remove a subscription by its href
    pub async fn unsubscribe(&self, href: &str) -> Result<Value, CampaignError> {
        self.dispatcher.fetch(Method::Delete, href, None).await
    }

    // Transactional events

    pub async fn send_event(
        &self,
        transactional_api: &str,
        event_id: &str,
        payload: Value,
    ) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(EVENT)?
            .url(false, &format!("{}/{}", transactional_api, event_id));
        self.dispatcher.fetch(Method::Post, &path, Some(payload)).await
    }

    pub async fn get_event(
        &self,
        transactional_api: &str,
        event_id: &str,
        event_pkey: &str,
    ) -> Result<Value, CampaignError> {
        let path = self.endpoint(EVENT)?.url(
            false,
            &format!("{}/{}/{}", transactional_api, event_id, event_pkey),
        );
        self.get(&path).await
    }

    // Workflows

    pub async fn get_workflow(&self, id: &str) -> Result<Value, CampaignError> {
        let path = self.endpoint(WORKFLOW)?.url(false, id);
        self.get(&path).await
    }

    pub async fn control_workflow(
        &self,
        id: &str,
        command: WorkflowCommand,
    ) -> Result<Value, CampaignError> {
        let path = self
            .endpoint(WORKFLOW)?
            .url(false, &format!("{}/commands", id));
        tracing::info!("Sending {} to workflow {}", command.as_str(), id);
        self.dispatcher
            .fetch(Method::Post, &path, Some(json!({"method": command.as_str()})))
            .await
    }

    /// Follow `next.href` of a paginated response
    ///
    /// Returns `None` on the last page.
    pub async fn get_next(&self, response: &Value) -> Result<Option<Value>, CampaignError> {
        let Some(href) = response
            .get("next")
            .and_then(|next| next.get("href"))
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };
        self.get(href).await.map(Some)
    }

    /// Drop the cached access token and the memoized authorization header
    pub async fn flush_token(&self) -> Result<(), CampaignError> {
        self.dispatcher.tokens().flush().await?;
        self.dispatcher.reset_authorization();
        Ok(())
    }

    /// Change the assertion lifetime used for future token exchanges
    pub async fn set_token_expiration(&mut self, seconds: u64) -> Result<(), CampaignError> {
        self.dispatcher.tokens_mut().set_expiration(seconds).await?;
        self.dispatcher.reset_authorization();
        Ok(())
    }

    /// Non-secret diagnostics about this client
    pub fn debug_info(&self) -> Value {
        let config = &self.ctx.config;
        json!({
            "tenant": config.tenant,
            "base_uri": self.ctx.tenant_uri(),
            "staging": config.staging,
            "cache": config.cache,
            "cache_id": self.dispatcher.tokens().cache_key(),
            "expiration": self.dispatcher.tokens().expiration(),
            "daily_threshold": config.daily_threshold,
            "org_unit": config.org_unit,
            "endpoints": self.ctx.endpoints.names(),
        })
    }
}
