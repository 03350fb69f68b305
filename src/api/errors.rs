use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use validator::ValidationErrors;

use crate::schemas::ErrorResponse;
use crate::services::data_url::DataUrlError;
use crate::services::upstream::UpstreamError;

/// User-facing name of the service behind an endpoint, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Surface {
    ImageProcessing,
    Tutoring,
}

impl Surface {
    fn noun(self) -> &'static str {
        match self {
            Self::ImageProcessing => "image processing service",
            Self::Tutoring => "tutoring service",
        }
    }
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadInput(String),
    UpstreamUnreachable { surface: Surface, details: String },
    UpstreamRejected { surface: Surface, status: StatusCode, details: String },
    MalformedUpstreamResponse { surface: Surface, details: String },
}

impl ApiError {
    pub(crate) fn upstream(surface: Surface, err: UpstreamError) -> Self {
        let details = err.to_string();
        match err {
            UpstreamError::Unreachable { .. } => Self::UpstreamUnreachable { surface, details },
            UpstreamError::Rejected { status, .. } => {
                Self::UpstreamRejected { surface, status, details }
            }
            UpstreamError::Malformed { .. } => Self::MalformedUpstreamResponse { surface, details },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BadInput(_) => "bad_input",
            Self::UpstreamUnreachable { .. } => "upstream_unreachable",
            Self::UpstreamRejected { .. } => "upstream_rejected",
            Self::MalformedUpstreamResponse { .. } => "malformed_upstream_response",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadInput(message) => message.clone(),
            Self::UpstreamUnreachable { surface, .. } => {
                format!("Failed to connect to the {}. Please try again.", surface.noun())
            }
            Self::UpstreamRejected { status, .. } if *status == StatusCode::SERVICE_UNAVAILABLE => {
                "The service is temporarily unavailable. Please try again in a few moments."
                    .to_string()
            }
            Self::UpstreamRejected { surface: Surface::ImageProcessing, .. } => {
                "An error occurred while processing your image.".to_string()
            }
            Self::UpstreamRejected { surface: Surface::Tutoring, .. } => {
                "An error occurred while preparing the tutor's reply.".to_string()
            }
            Self::MalformedUpstreamResponse { surface, .. } => {
                format!("Invalid response format from the {}", surface.noun())
            }
        }
    }

    fn details(&self) -> &str {
        match self {
            Self::BadInput(message) => message,
            Self::UpstreamUnreachable { details, .. }
            | Self::UpstreamRejected { details, .. }
            | Self::MalformedUpstreamResponse { details, .. } => details,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadInput(rejection.body_text())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        // The validator reports fields in an unordered map; messages follow field name order.
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|left, right| left.0.cmp(&right.0));

        let messages: Vec<String> = fields
            .into_iter()
            .flat_map(|(_, field_errors)| field_errors.iter())
            .filter_map(|error| error.message.as_ref().map(ToString::to_string))
            .collect();

        if messages.is_empty() {
            Self::BadInput(errors.to_string())
        } else {
            Self::BadInput(messages.join("; "))
        }
    }
}

impl From<DataUrlError> for ApiError {
    fn from(err: DataUrlError) -> Self {
        Self::BadInput(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        match &self {
            Self::BadInput(message) => {
                tracing::warn!(kind, detail = %message, "Rejected request input");
            }
            _ => {
                tracing::error!(kind, detail = %self.details(), "Upstream request failed");
            }
        }

        let body = ErrorResponse { error: self.message(), details: self.details().to_string() };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
