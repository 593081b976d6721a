use thiserror::Error;

/// Failure talking to the Polar API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Polar request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Polar returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Polar response parse error: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("pagination did not terminate after {max_pages} pages")]
    PaginationExhausted { max_pages: u32 },
}

/// Why a webhook delivery was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("Invalid JSON in request body: {0}")]
    MalformedBody(String),

    #[error("Missing required webhook headers (webhook-id, webhook-timestamp, webhook-signature)")]
    MissingHeaders,

    #[error(
        "Webhook timestamp is too old. Time difference: {difference} seconds, tolerance: {tolerance} seconds"
    )]
    TimestampOutOfTolerance { difference: u64, tolerance: u64 },

    #[error("Webhook timestamp is not a valid integer (tolerance: {tolerance} seconds)")]
    InvalidTimestamp { tolerance: u64 },

    #[error(
        "Invalid webhook signature. Please verify your webhook secret matches the one configured in Polar settings."
    )]
    InvalidSignature,

    #[error("Webhook secret is required for authentication")]
    MissingSecret,
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("missing required field: {0}")]
    MissingParameter(&'static str),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl OperationError {
    /// Extra context surfaced next to the message in continue-on-fail output.
    pub fn details(&self) -> String {
        match self {
            OperationError::Api(ApiError::Status { body, .. })
            | OperationError::Fetch(FetchError::Api(ApiError::Status { body, .. }))
                if !body.is_empty() =>
            {
                body.clone()
            }
            _ => "No additional details available".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
