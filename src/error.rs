//! Error types for crm-bridge.

/// Top-level error type for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Webhook errors carry a wire contract in their message (the numeric
    // prefix on 422/451), so they pass through undecorated.
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    #[error("Conversations error: {0}")]
    Conversations(#[from] ConversationsError),
}

impl Error {
    /// HTTP status the transport layer answers with for this error.
    pub fn status(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Webhook(e) => e.status(),
            Error::Crm(CrmError::RecordNotFound { .. }) => 404,
            Error::Crm(_) | Error::Conversations(_) => 502,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Webhook dispatch and policy errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("422 Unknown event type: {event_type}")]
    UnrecognizedEventType { event_type: String },

    #[error("422 Unknown location: {location}")]
    UnrecognizedLocation { location: String },

    #[error("Missing required field {field} for {event_type}")]
    MalformedEvent {
        event_type: &'static str,
        field: &'static str,
    },

    #[error("Invalid {field} for {event_type}: {message}")]
    InvalidField {
        event_type: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("451 Customer has opted out from messages")]
    CustomerOptedOut,

    #[error("Routing failed: no workers are assigned to any customer. Conversation SID: {conversation_sid}")]
    RoutingFailed { conversation_sid: String },
}

impl WebhookError {
    pub fn status(&self) -> u16 {
        match self {
            WebhookError::UnrecognizedEventType { .. }
            | WebhookError::UnrecognizedLocation { .. } => 422,
            WebhookError::MalformedEvent { .. } | WebhookError::InvalidField { .. } => 400,
            WebhookError::CustomerOptedOut => 451,
            WebhookError::RoutingFailed { .. } => 500,
        }
    }
}

/// CRM collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("CRM request failed: {0}")]
    Http(String),

    #[error("CRM returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode CRM response: {0}")]
    Decode(String),

    #[error("No customer record with {field} = {value}")]
    RecordNotFound { field: String, value: String },
}

/// Conversations platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ConversationsError {
    #[error("Conversations request failed: {0}")]
    Http(String),

    #[error("Conversations API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Participant attributes are not valid JSON: {0}")]
    InvalidAttributes(String),
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;
