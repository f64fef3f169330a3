use actix_web::{
    body::BoxBody, get, http::StatusCode, HttpRequest, HttpResponse, Responder, ResponseError,
};
use domain_upload::{exception::UploadException, model::entity::SessionKey};
use serde::Serialize;

pub mod dtos;
pub mod upload;

/// Body of every response.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    status: u16,
    message: String,
    content: Option<T>,
}

/// Successful response carrying `T` as content.
pub struct ApiResponder<T: Serialize>(pub T);

impl<T: Serialize> Responder for ApiResponder<T> {
    type Body = BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
        HttpResponse::Ok().json(Envelope {
            status: StatusCode::OK.as_u16(),
            message: "ok".to_string(),
            content: Some(self.0),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Upload(#[from] UploadException),
    #[error("Invalid request: {error_description}")]
    InvalidRequest { error_description: String },
}

pub type ApiResult<T> = Result<ApiResponder<T>, ApiError>;

impl ApiError {
    pub fn invalid(error_description: impl ToString) -> Self {
        ApiError::InvalidRequest {
            error_description: error_description.to_string(),
        }
    }

    fn content(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Upload(UploadException::IncompleteUpload { missing_chunks, .. }) => {
                Some(serde_json::json!({ "missingChunks": missing_chunks }))
            }
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Upload(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{self:?}");
        } else {
            tracing::debug!("{self}");
        }
        HttpResponse::build(status).json(Envelope {
            status: status.as_u16(),
            message: self.to_string(),
            content: self.content(),
        })
    }
}

fn session_key(owner_id: i64, session_id: &str) -> Result<SessionKey, ApiError> {
    SessionKey::explicit(owner_id, session_id).map_err(ApiError::invalid)
}

#[get("healthz")]
pub async fn healthz() -> ApiResult<&'static str> {
    Ok(ApiResponder("healthy"))
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;

    use super::*;

    async fn body_of(e: ApiError) -> (StatusCode, serde_json::Value) {
        let response = e.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn incomplete_upload_lists_missing_chunks() {
        let (status, body) = body_of(
            UploadException::IncompleteUpload {
                session_id: "s".to_string(),
                missing_chunks: vec![2, 4],
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);
        assert_eq!(body["content"]["missingChunks"], serde_json::json!([2, 4]));
    }

    #[actix_web::test]
    async fn errors_map_to_their_status() {
        let (status, body) = body_of(
            UploadException::SessionNotFound {
                session_id: "s".to_string(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["content"].is_null());
        let (status, _) = body_of(ApiError::invalid("no file")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
