//! JSON body extractor that also runs `validator` rules.
//!
//! Rejections go through [`ApiError`], so a bad request body produces the same
//! envelope as any other failed call: 415 without a JSON content type, 400 for
//! broken JSON, 422 for a body of the wrong shape or one that breaks a rule.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError, ValidationErrors};

use super::ApiError;

pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(body_rejected)?;
        value.validate().map_err(rules_broken)?;
        Ok(ValidatedJson(value))
    }
}

fn body_rejected(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Request body must be sent as application/json",
        ),
        JsonRejection::JsonSyntaxError(e) => {
            ApiError::bad_request(format!("Request body is not valid JSON: {}", e.body_text()))
        }
        JsonRejection::JsonDataError(e) => ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Request body has the wrong shape: {}", e.body_text()),
        ),
        other => ApiError::new(other.status(), other.body_text()),
    }
}

fn rules_broken(errors: ValidationErrors) -> ApiError {
    let mut problems: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| errs.iter().map(move |e| format!("{} {}", field, describe(e))))
        .collect();
    problems.sort();

    let message = if problems.is_empty() {
        "Request body failed validation".to_string()
    } else {
        format!("Invalid request: {}", problems.join("; "))
    };
    ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, message)
}

/// The rule's own message, else a sentence built from its bounds.
fn describe(e: &ValidationError) -> String {
    if let Some(message) = &e.message {
        return message.to_string();
    }
    let bound = |name: &str| e.params.get(name).map(|v| v.to_string());
    match (&*e.code, bound("min"), bound("max")) {
        ("range", Some(min), Some(max)) => format!("must be between {} and {}", min, max),
        ("range", Some(min), None) => format!("must be at least {}", min),
        ("range", None, Some(max)) => format!("must be at most {}", max),
        ("length", Some(min), Some(max)) => format!("must be {} to {} characters", min, max),
        ("length", Some(min), None) => format!("must be at least {} characters", min),
        ("length", None, Some(max)) => format!("must be at most {} characters", max),
        (code, _, _) => format!("is invalid ({})", code),
    }
}
