use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{json_type, Result, ShapeError};

/// Checks the API body against the documented shape and returns the most
/// recent homework record. `Ok(None)` means nothing was submitted in the window.
pub fn extract_latest(body: &Value) -> Result<Option<&Map<String, Value>>> {
    let object = body.as_object().ok_or(ShapeError::NotAnObject {
        found: json_type(body),
    })?;

    let homeworks = object
        .get("homeworks")
        .ok_or(ShapeError::MissingHomeworks)?;

    let homeworks = homeworks
        .as_array()
        .ok_or(ShapeError::HomeworksNotAList {
            found: json_type(homeworks),
        })?;

    debug!(count = homeworks.len(), "API response shape is valid");

    match homeworks.last() {
        None => Ok(None),
        Some(record) => record
            .as_object()
            .map(Some)
            .ok_or_else(|| {
                ShapeError::RecordNotAnObject {
                    found: json_type(record),
                }
                .into()
            }),
    }
}

/// Server time of the response, used to move the polling window forward.
pub fn current_date(body: &Value) -> Option<i64> {
    body.get("current_date")?.as_i64()
}
