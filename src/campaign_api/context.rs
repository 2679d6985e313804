use crate::campaign_api::endpoints::EndpointRegistry;
use crate::campaign_api::transport::HttpTransport;
use crate::campaign_api::types::CampaignError;
use crate::config::ClientConfig;
use crate::storage::{
    CacheStore, FileAccounting, FilesystemCache, MemoryAccounting, RequestAccounting,
};
use std::sync::Arc;

/// Shared state handed to every component
///
/// Owns the credentials, the cache backend (absent when caching is disabled),
/// the request accounting used by the throttle, the transport and the
/// endpoint registry. Cheap to clone.
#[derive(Clone)]
pub struct ClientContext {
    pub config: Arc<ClientConfig>,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub accounting: Arc<dyn RequestAccounting>,
    pub transport: HttpTransport,
    pub endpoints: EndpointRegistry,
}

impl ClientContext {
    /// Build the production context for `config`
    ///
    /// Caching uses a [`FilesystemCache`] at `cache_dir` (or the user cache
    /// directory). Accounting is file-backed under `log_dir` when `log` is
    /// set, in-memory otherwise.
    pub fn new(config: ClientConfig) -> Result<Self, CampaignError> {
        let cache: Option<Arc<dyn CacheStore>> = if config.cache {
            let dir = match &config.cache_dir {
                Some(dir) => dir.clone(),
                None => FilesystemCache::default_path()?,
            };
            tracing::debug!("Using filesystem cache at {:?}", dir);
            Some(Arc::new(FilesystemCache::new(dir)?))
        } else {
            None
        };

        let accounting: Arc<dyn RequestAccounting> = if config.log {
            let dir = config.log_dir.clone().ok_or_else(|| {
                CampaignError::Config("log is enabled but log_dir is not set".to_string())
            })?;
            Arc::new(FileAccounting::new(dir)?)
        } else {
            Arc::new(MemoryAccounting::new())
        };

        let transport = HttpTransport::new().with_capture(config.debug);

        Ok(Self {
            config: Arc::new(config),
            cache,
            accounting,
            transport,
            endpoints: EndpointRegistry::default(),
        })
    }

    /// Context with explicit collaborators, no filesystem access
    pub fn with_parts(
        config: ClientConfig,
        cache: Option<Arc<dyn CacheStore>>,
        accounting: Arc<dyn RequestAccounting>,
    ) -> Self {
        let transport = HttpTransport::new().with_capture(config.debug);
        Self {
            config: Arc::new(config),
            cache,
            accounting,
            transport,
            endpoints: EndpointRegistry::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: EndpointRegistry) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Base URI of domain calls, `{base_uri}/{tenant}`
    pub fn tenant_uri(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_uri.trim_end_matches('/'),
            self.config.tenant
        )
    }
}
