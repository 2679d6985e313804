//! Declarative endpoint registry.
//!
//! Each major endpoint (`profile`, `service`, ...) maps onto an API path
//! under the tenant. Some paths have an extended variant (`...Ext`) that
//! exposes custom resources and fields.

use std::collections::HashMap;

/// One API endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Path under the tenant, e.g. `campaign/profileAndServices`
    pub path: String,
    /// Whether an `Ext` variant exists
    pub extended: bool,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, extended: bool) -> Self {
        Self {
            path: path.into(),
            extended,
        }
    }

    /// Root path of the endpoint, extended when requested and available
    pub fn root(&self, ext: bool) -> String {
        if ext && self.extended {
            format!("{}Ext", self.path)
        } else {
            self.path.clone()
        }
    }

    /// Path of `resource` below the endpoint root
    pub fn url(&self, ext: bool, resource: &str) -> String {
        let resource = resource.trim_matches('/');
        if resource.is_empty() {
            self.root(ext)
        } else {
            format!("{}/{}", self.root(ext), resource)
        }
    }
}

/// Major endpoint name -> endpoint
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Endpoint>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("profile", Endpoint::new("campaign/profileAndServices", true));
        registry.register("service", Endpoint::new("campaign/profileAndServices", true));
        registry.register("workflow", Endpoint::new("campaign/workflow/execution", false));
        registry.register("event", Endpoint::new("campaign", false));
        registry
    }
}

impl EndpointRegistry {
    pub fn empty() -> Self {
        Self {
            endpoints: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, endpoint: Endpoint) {
        self.endpoints.insert(name.into(), endpoint);
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    /// Names of all registered major endpoints, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
