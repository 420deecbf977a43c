//! 报告的下游处理器：接收确认、删除与用量查询。

use axum::extract::{Extension, Query, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::config::UPLOAD_FIELD_NAME;
use crate::error::{ApiError, Envelope};
use crate::ledger::SizeLedger;
use crate::storage::Storage;
use crate::upload::StoredFile;

#[derive(Deserialize)]
pub struct ReportNameQuery {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    total_size: u64,
}

/// 删除文件并从账本扣除其大小；任何一步失败都记录日志并返回 false。
pub async fn delete_report_file(ledger: &SizeLedger, path: &Path) -> bool {
    let result: Result<u64, std::io::Error> = async {
        let size = fs::metadata(path).await?.len();
        fs::remove_file(path).await?;
        let delta = i64::try_from(size).unwrap_or(i64::MAX);
        ledger.adjust(-delta).await
    }
    .await;

    match result {
        Ok(total) => {
            info!(path = ?path, total, "report deleted");
            true
        }
        Err(err) => {
            warn!(path = ?path, error = %err, "failed to delete report");
            false
        }
    }
}

/// 上传中间件之后的处理器，确认已保存的报告。
pub async fn accept_report(request: Request) -> Result<Response, ApiError> {
    let Some(stored) = request.extensions().get::<StoredFile>().cloned() else {
        return Err(ApiError::BadRequest(format!(
            "a PDF file is required in the `{UPLOAD_FIELD_NAME}` field"
        )));
    };
    Ok(Envelope::success(StatusCode::CREATED, "report uploaded", Some(stored)).into_response())
}

/// 按存储文件名删除报告。
pub async fn delete_report(
    Query(ReportNameQuery { name }): Query<ReportNameQuery>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(ledger): Extension<Arc<SizeLedger>>,
) -> Result<Response, ApiError> {
    let target = storage.resolve_report_name(&name).await?;
    if delete_report_file(&ledger, &target).await {
        return Ok(Envelope::<()>::success(StatusCode::OK, "report deleted", None).into_response());
    }
    Ok(Envelope::<()>::failure(StatusCode::UNPROCESSABLE_ENTITY, "unable to delete report")
        .into_response())
}

/// 返回账本中的累计字节数。
pub async fn report_usage(Extension(ledger): Extension<Arc<SizeLedger>>) -> Response {
    let usage = Usage {
        total_size: ledger.read().await,
    };
    Envelope::success(StatusCode::OK, "ok", Some(usage)).into_response()
}
