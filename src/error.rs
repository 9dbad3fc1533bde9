use reqwest::StatusCode;
use thiserror::Error;

/// Reasons a response body cannot be read as a list of homeworks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("response body is {found}, expected an object")]
    NotAnObject { found: &'static str },

    #[error("response body has no \"homeworks\" key")]
    MissingHomeworks,

    #[error("\"homeworks\" is {found}, expected a list")]
    HomeworksNotAList { found: &'static str },

    #[error("latest homework record is {found}, expected an object")]
    RecordNotAnObject { found: &'static str },
}

/// Everything that can go wrong inside one polling cycle.
#[derive(Error, Debug)]
pub enum HomeworkError {
    /// The request never produced a usable response.
    #[error("failed to reach the homework API: {source}")]
    ApiConnect {
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected API response status: {0}")]
    HttpStatus(StatusCode),

    #[error("malformed API response: {0}")]
    ResponseShape(#[from] ShapeError),

    #[error("homework record has no \"{0}\" key")]
    MissingField(&'static str),

    #[error("homework field \"{field}\" is {found}, expected a string")]
    InvalidField {
        field: &'static str,
        found: &'static str,
    },

    #[error("undocumented homework status: {0}")]
    UnknownStatus(String),

    /// The bot transport failed or the Bot API rejected the message.
    #[error("failed to deliver message to the chat: {reason}")]
    NotifyDelivery { reason: String },
}

/// Flat tag for [`HomeworkError`], used for logging and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ApiConnect,
    HttpStatus,
    ResponseShape,
    MissingField,
    UnknownStatus,
    NotifyDelivery,
}

impl HomeworkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HomeworkError::ApiConnect { .. } => ErrorKind::ApiConnect,
            HomeworkError::HttpStatus(_) => ErrorKind::HttpStatus,
            HomeworkError::ResponseShape(_) => ErrorKind::ResponseShape,
            HomeworkError::MissingField(_) | HomeworkError::InvalidField { .. } => {
                ErrorKind::MissingField
            }
            HomeworkError::UnknownStatus(_) => ErrorKind::UnknownStatus,
            HomeworkError::NotifyDelivery { .. } => ErrorKind::NotifyDelivery,
        }
    }
}

/// JSON type name used in shape errors.
pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}

pub type Result<T> = std::result::Result<T, HomeworkError>;
