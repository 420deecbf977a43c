//! 统一的 API 错误类型，以及到 JSON 响应的唯一映射点。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::storage::StorageError;

pub const TOO_MANY_FILES_MESSAGE: &str = "only a single file may be uploaded for the given field";
pub const INVALID_TYPE_MESSAGE: &str = "invalid file type — only PDF accepted";
pub const UNEXPECTED_MESSAGE: &str = "internal server error";

#[derive(Debug)]
pub enum ApiError {
    /// 同一请求中出现第二个文件，或文件出现在非预期字段。
    TooManyFiles,
    /// multipart 解析层的错误（含大小超限），消息原样返回。
    Parser(String),
    /// 类型过滤拒绝（MIME 或扩展名不含 pdf）。
    InvalidType,
    BadRequest(String),
    /// 其余错误；细节只写日志，不回给客户端。
    Unexpected(String),
}

/// 所有响应共用的信封结构。
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: true,
            status_code: status.as_u16(),
            message: message.into(),
            data,
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: false,
            status_code: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::TooManyFiles => TOO_MANY_FILES_MESSAGE.to_string(),
            ApiError::Parser(msg) | ApiError::BadRequest(msg) => msg.clone(),
            ApiError::InvalidType => INVALID_TYPE_MESSAGE.to_string(),
            ApiError::Unexpected(_) => UNEXPECTED_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Unexpected(detail) = &self {
            error!(error = %detail, "request failed");
        }
        Envelope::<()>::failure(self.status(), self.message()).into_response()
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Unexpected(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::BadRequest("invalid path".into()),
            StorageError::Io(err) => ApiError::Unexpected(err.to_string()),
        }
    }
}
