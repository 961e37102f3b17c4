use std::fmt;
use thiserror::Error;

/// Which part of the page a scrape was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeField {
    Title,
    Funding,
}

impl fmt::Display for ScrapeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeField::Title => write!(f, "title"),
            ScrapeField::Funding => write!(f, "funding"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeErrorKind {
    ElementTimeout,
    ParseError,
    DriverFault,
}

#[derive(Error, Debug, Clone)]
#[error("Scrape of {url} failed ({kind:?}{}): {message}", field_suffix(.field))]
pub struct ScrapeError {
    pub kind: ScrapeErrorKind,
    pub field: Option<ScrapeField>,
    pub url: String,
    pub message: String,
}

fn field_suffix(field: &Option<ScrapeField>) -> String {
    field.map(|f| format!(", field: {}", f)).unwrap_or_default()
}

impl ScrapeError {
    pub fn timeout(url: &str, field: ScrapeField, selector: &str) -> Self {
        Self {
            kind: ScrapeErrorKind::ElementTimeout,
            field: Some(field),
            url: url.to_string(),
            message: format!("element `{}` did not become visible", selector),
        }
    }

    pub fn parse(url: &str, field: ScrapeField, text: &str) -> Self {
        Self {
            kind: ScrapeErrorKind::ParseError,
            field: Some(field),
            url: url.to_string(),
            message: format!("could not parse `{}` as an amount", text),
        }
    }

    pub fn driver(url: &str, err: DriverError) -> Self {
        Self {
            kind: ScrapeErrorKind::DriverFault,
            field: None,
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_driver_fault(&self) -> bool {
        self.kind == ScrapeErrorKind::DriverFault
    }
}

/// Failures reported by the browser automation layer.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("WebDriver returned `{error}`: {message}")]
    Protocol { error: String, message: String },

    #[error("WebDriver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected WebDriver response: {message}")]
    InvalidResponse { message: String },
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to start browser session: {message}")]
    SessionInit { message: String },

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("Store update `{path}` for tenant {tenant} failed after {attempts} attempt(s): {message}")]
    Store {
        tenant: String,
        path: String,
        attempts: u32,
        message: String,
    },

    #[error("Delivery to {destination} failed: {message}")]
    Dispatch { destination: String, message: String },

    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in `{field}`: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value `{value}` for `{field}`: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Rejected: {message}")]
    Rejected { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MonitorError {
    pub fn rejected(message: impl Into<String>) -> Self {
        MonitorError::Rejected {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        MonitorError::NotFound {
            message: message.into(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MonitorError::Dispatch { .. } => ErrorSeverity::Low,
            MonitorError::Scrape(_)
            | MonitorError::ApiError(_)
            | MonitorError::Store { .. } => ErrorSeverity::Medium,
            MonitorError::NotFound { .. }
            | MonitorError::Rejected { .. }
            | MonitorError::ValidationError { .. }
            | MonitorError::SerializationError(_) => ErrorSeverity::High,
            MonitorError::SessionInit { .. }
            | MonitorError::IoError(_)
            | MonitorError::ConfigError { .. }
            | MonitorError::ConfigValidationError { .. }
            | MonitorError::InvalidConfigValueError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            MonitorError::SessionInit { .. } => {
                "The browser could not be started. Check that chromedriver is installed.".to_string()
            }
            MonitorError::Scrape(_) => "Failed to read the project page.".to_string(),
            MonitorError::Store { .. } => "Saving the watch list failed.".to_string(),
            MonitorError::NotFound { message } | MonitorError::Rejected { message } => {
                message.clone()
            }
            MonitorError::ConfigError { .. }
            | MonitorError::ConfigValidationError { .. }
            | MonitorError::InvalidConfigValueError { .. } => format!("Configuration problem: {}", self),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
