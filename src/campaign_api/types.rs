use crate::campaign_api::signer::SigningError;
use crate::storage::StorageError;
use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Campaign SDK error type
///
/// Every variant maps onto an HTTP-equivalent status through [`CampaignError::code`],
/// and may carry structured data through [`CampaignError::data`].
#[derive(Debug)]
pub enum CampaignError {
    /// The exchange assertion could not be built or signed
    TokenSigning(SigningError),
    /// The authorization server refused the exchange
    TokenExchange { status: u16, message: String },
    /// Transport or backend failure
    Client(ClientError),
    /// Payload rejected against resource metadata
    Validation(ValidationError),
    /// Backend reported a conflict (e.g. duplicate profile)
    Conflict { message: String, data: Option<Value> },
    /// Unrecognized verb or bucket combination in the dispatcher
    DispatchConfiguration(String),
    /// Configuration error
    Config(String),
    /// Cache or accounting storage failure
    Storage(StorageError),
}

impl CampaignError {
    /// HTTP-equivalent status code
    pub fn code(&self) -> u16 {
        match self {
            CampaignError::TokenSigning(_) => 500,
            CampaignError::TokenExchange { status, .. } => *status,
            CampaignError::Client(err) => err.code,
            CampaignError::Validation(_) => 400,
            CampaignError::Conflict { .. } => 409,
            CampaignError::DispatchConfiguration(_) => 500,
            CampaignError::Config(_) => 500,
            CampaignError::Storage(_) => 500,
        }
    }

    /// Structured payload attached to the error, if any
    pub fn data(&self) -> Option<Value> {
        match self {
            CampaignError::Client(err) => err.data.clone(),
            CampaignError::Validation(err) => Some(err.data()),
            CampaignError::Conflict { data, .. } => data.clone(),
            _ => None,
        }
    }
}

impl fmt::Display for CampaignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignError::TokenSigning(err) => write!(f, "Token signing failed: {}", err),
            CampaignError::TokenExchange { message, .. } => write!(f, "{}", message),
            CampaignError::Client(err) => write!(f, "{}", err),
            CampaignError::Validation(err) => write!(f, "{}", err),
            CampaignError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
            CampaignError::DispatchConfiguration(msg) => {
                write!(f, "Dispatch configuration error: {}", msg)
            }
            CampaignError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CampaignError::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for CampaignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CampaignError::TokenSigning(err) => Some(err),
            CampaignError::Client(err) => std::error::Error::source(err),
            CampaignError::Validation(err) => Some(err),
            CampaignError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SigningError> for CampaignError {
    fn from(err: SigningError) -> Self {
        CampaignError::TokenSigning(err)
    }
}

impl From<ClientError> for CampaignError {
    fn from(err: ClientError) -> Self {
        CampaignError::Client(err)
    }
}

impl From<ValidationError> for CampaignError {
    fn from(err: ValidationError) -> Self {
        CampaignError::Validation(err)
    }
}

impl From<StorageError> for CampaignError {
    fn from(err: StorageError) -> Self {
        CampaignError::Storage(err)
    }
}

impl From<reqwest::Error> for CampaignError {
    fn from(err: reqwest::Error) -> Self {
        CampaignError::Client(ClientError::from(err))
    }
}

/// Transport or backend failure
///
/// `code` is the HTTP status when one was received, `0` for failures before
/// any response (connection refused, timeout).
#[derive(Debug)]
pub struct ClientError {
    pub message: String,
    pub code: u16,
    pub data: Option<Value>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ClientError {
    pub fn new(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code,
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "Client error: {}", self.message)
        } else {
            write!(f, "HTTP {} error: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let code = err.status().map(|s| s.as_u16()).unwrap_or(0);
        let message = if err.is_timeout() {
            "Request timeout".to_string()
        } else if err.is_connect() {
            format!("Connection failed: {}", err)
        } else {
            err.to_string()
        };
        ClientError::new(message, code).with_source(err)
    }
}

/// Access token returned by the exchange endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token_type: String,
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

impl AccessToken {
    /// `Authorization` header value, with the token type capitalized
    pub fn authorization(&self) -> String {
        let mut chars = self.token_type.chars();
        let token_type = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        format!("{} {}", token_type, self.access_token)
    }
}

/// Workflow control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowCommand {
    Start,
    Pause,
    Resume,
    Stop,
}

impl WorkflowCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowCommand::Start => "start",
            WorkflowCommand::Pause => "pause",
            WorkflowCommand::Resume => "resume",
            WorkflowCommand::Stop => "stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_authorization_header_capitalizes_type() {
        let token = AccessToken {
            token_type: "bearer".to_string(),
            access_token: "abc".to_string(),
            expires_in: 60,
            debug: None,
        };
        assert_eq!(token.authorization(), "Bearer abc");
    }

    #[test]
    fn test_error_codes() {
        let exchange = CampaignError::TokenExchange {
            status: 401,
            message: "invalid_client\nbad secret".to_string(),
        };
        assert_eq!(exchange.code(), 401);
        assert_eq!(exchange.to_string(), "invalid_client\nbad secret");

        let conflict = CampaignError::Conflict {
            message: "Conflict".to_string(),
            data: Some(json!({"code": 409})),
        };
        assert_eq!(conflict.code(), 409);
        assert_eq!(conflict.data(), Some(json!({"code": 409})));
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::new("Not Found", 404).with_data(json!({"code": 404}));
        assert_eq!(err.to_string(), "HTTP 404 error: Not Found");
        assert_eq!(CampaignError::from(err).code(), 404);

        let err = ClientError::new("Connection failed", 0);
        assert_eq!(err.to_string(), "Client error: Connection failed");
    }
}
