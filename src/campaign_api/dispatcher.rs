use crate::campaign_api::access_token::TokenProvider;
use crate::campaign_api::context::ClientContext;
use crate::campaign_api::transport::{Method, Request, RequestBody};
use crate::campaign_api::types::{CampaignError, ClientError};
use crate::storage::LoggedRequest;
use crate::validation::{
    OrgUnitOwnership, PayloadSplitter, ResourceMetadata, ResourceValidator,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::RwLock;

/// Sends authorized calls to the tenant API
///
/// Every call carries `Authorization`, `Cache-Control: no-cache` and
/// `X-Api-Key`. The authorization header is built once from the
/// [`TokenProvider`] and reused until [`RequestDispatcher::reset_authorization`].
pub struct RequestDispatcher {
    ctx: ClientContext,
    tokens: TokenProvider,
    authorization: RwLock<Option<String>>,
    validator: ResourceValidator,
    splitter: PayloadSplitter,
}

impl RequestDispatcher {
    pub fn new(ctx: ClientContext) -> Self {
        let ownership = OrgUnitOwnership::new(ctx.config.org_unit_resources.iter().cloned());
        let validator = ResourceValidator::new(ownership);
        let splitter = PayloadSplitter::new(validator.clone());
        let tokens = TokenProvider::new(ctx.clone());

        Self {
            ctx,
            tokens,
            authorization: RwLock::new(None),
            validator,
            splitter,
        }
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenProvider {
        &mut self.tokens
    }

    pub fn validator(&self) -> &ResourceValidator {
        &self.validator
    }

    /// Forget the memoized authorization header
    pub fn reset_authorization(&self) {
        if let Ok(mut authorization) = self.authorization.write() {
            *authorization = None;
        }
    }

    async fn authorization(&self) -> Result<String, CampaignError> {
        if let Ok(authorization) = self.authorization.read() {
            if let Some(value) = authorization.as_ref() {
                return Ok(value.clone());
            }
        }

        let token = self.tokens.get(false).await?;
        let value = token.authorization();
        if let Ok(mut authorization) = self.authorization.write() {
            *authorization = Some(value.clone());
        }
        Ok(value)
    }

    fn with_org_unit(&self, method: Method, url: &str) -> String {
        let config = &self.ctx.config;
        let Some(param) = config.org_unit_param.as_deref() else {
            return url.to_string();
        };
        if !matches!(method, Method::Post | Method::Patch) {
            return url.to_string();
        }

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(param, &config.org_unit)
            .finish();
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", url, separator, query)
    }

    /// Count a mutating call and hold it back once the daily allowance is used
    ///
    /// Returns the sentinel response when the call was logged instead of sent.
    async fn throttle(
        &self,
        method: Method,
        request: &Request,
        body: Option<&Value>,
    ) -> Result<Option<Value>, CampaignError> {
        if !method.is_mutating() {
            return Ok(None);
        }
        let Some(allowance) = self.ctx.config.daily_allowance() else {
            return Ok(None);
        };

        let now = Utc::now();
        let today = now.date_naive();
        let count = self.ctx.accounting.increment(today).await?;
        if count <= allowance {
            tracing::debug!("Mutating call {} of {} allowed today", count, allowance);
            return Ok(None);
        }

        let logged = LoggedRequest {
            timestamp: now,
            method: method.as_str().to_string(),
            url: request.full_url(),
            body: body.cloned(),
        };
        self.ctx.accounting.record(today, &logged).await?;
        tracing::info!(
            "Daily allowance of {} reached, logged {} {} instead of sending",
            allowance,
            logged.method,
            logged.url
        );

        Ok(Some(json!({"code": 200, "message": "request logged"})))
    }

    /// Perform one call and decode its body
    ///
    /// Relative URLs resolve against `{base_uri}/{tenant}/`. Status 409 maps
    /// to [`CampaignError::Conflict`], any other status from 400 up to
    /// [`CampaignError::Client`] with the decoded body as data.
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, CampaignError> {
        let url = self.with_org_unit(method, url);
        let mut request = Request::new(method, url).with_base_uri(self.ctx.tenant_uri());

        if let Some(sentinel) = self.throttle(method, &request, body.as_ref()).await? {
            return Ok(sentinel);
        }

        request = request
            .with_header("Authorization", self.authorization().await?)
            .with_header("Cache-Control", "no-cache")
            .with_header("X-Api-Key", self.ctx.config.api_key.as_str());
        if let Some(body) = body {
            request = request.with_body(RequestBody::Json(body));
        }

        let response = self.ctx.transport.send(&request).await?;
        let decoded = response.decode();

        match response.status {
            409 => {
                tracing::warn!("{} {} conflicted", method, request.full_url());
                Err(CampaignError::Conflict {
                    message: response.reason,
                    data: Some(decoded),
                })
            }
            status if status >= 400 => {
                if status == 401 {
                    self.tokens.flush().await?;
                    self.reset_authorization();
                }
                tracing::error!("{} {} failed: HTTP {}", method, request.full_url(), status);
                Err(ClientError::new(response.reason, status)
                    .with_data(decoded)
                    .into())
            }
            _ => Ok(decoded),
        }
    }

    /// Send a logical payload, split across the resources that own its fields
    ///
    /// Without metadata the payload goes out as one call. With metadata it is
    /// validated, split and each bucket is sent in order:
    ///
    /// - a bucket without a link goes to `url` with `verb`;
    /// - a linked bucket with a primary key and href goes to the href with `verb`;
    /// - a linked bucket without href, when the payload has an `email`, goes
    ///   with the opposite verb to `url` with the main resource segment
    ///   replaced by the bucket's resource.
    ///
    /// Anything else, fields owned by a resource more than one link away, and
    /// any verb other than POST or PATCH, is a
    /// [`CampaignError::DispatchConfiguration`].
    pub async fn dispatch(
        &self,
        verb: Method,
        url: &str,
        payload: &Map<String, Value>,
        metadata: Option<&ResourceMetadata>,
    ) -> Result<Vec<Value>, CampaignError> {
        let secondary = match verb {
            Method::Post => Method::Patch,
            Method::Patch => Method::Post,
            other => {
                return Err(CampaignError::DispatchConfiguration(format!(
                    "Unsupported verb {}",
                    other
                )))
            }
        };

        let Some(metadata) = metadata else {
            let response = self
                .fetch(verb, url, Some(Value::Object(payload.clone())))
                .await?;
            return Ok(vec![response]);
        };

        self.validator.validate_resources(payload, metadata, true)?;
        let mut split = self.splitter.prepare(payload, metadata)?;
        if let Some(deep) = split.buckets.iter().find(|b| b.key.depth > 1) {
            return Err(CampaignError::DispatchConfiguration(format!(
                "Bucket {} is not linked from the top resource",
                deep.key
            )));
        }
        self.splitter.resolve_links(self, url, &mut split).await?;

        let has_email = payload.contains_key("email");
        let main_resource = metadata.physical_name();
        let mut responses = Vec::with_capacity(split.len());

        for bucket in split.buckets {
            let key = bucket.key;
            let body = Some(Value::Object(bucket.fields));

            let response = match (&key.link, &key.primary_key, &key.href) {
                (None, _, _) => self.fetch(verb, url, body).await?,
                (Some(_), Some(_), Some(href)) => self.fetch(verb, href, body).await?,
                (Some(_), _, None) if has_email => {
                    let target = resource_url(url, main_resource, &key.resource)?;
                    self.fetch(secondary, &target, body).await?
                }
                _ => {
                    return Err(CampaignError::DispatchConfiguration(format!(
                        "No dispatch rule for bucket {}",
                        key
                    )))
                }
            };
            responses.push(response);
        }

        Ok(responses)
    }
}

/// Replace the main resource segment of `url` with `resource`
///
/// Segments after the main resource (a primary key) and the query are
/// dropped.
pub fn resource_url(url: &str, main_resource: &str, resource: &str) -> Result<String, CampaignError> {
    let path = url.split('?').next().unwrap_or(url);
    let segments: Vec<&str> = path.split('/').collect();
    let position = segments
        .iter()
        .rposition(|segment| *segment == main_resource)
        .ok_or_else(|| {
            CampaignError::DispatchConfiguration(format!(
                "Resource '{}' not found in {}",
                main_resource, url
            ))
        })?;

    let mut rebuilt: Vec<&str> = segments[..position].to_vec();
    rebuilt.push(resource);
    Ok(rebuilt.join("/"))
}
