//! `report_pdf` 单文件上传中间件：类型过滤、大小限制、落盘与账本计数。
//!
//! 类型检查发生在读取任何字节之前，被拒绝的文件不会触碰磁盘。通过检查的
//! 字节先写入目标目录下的隐藏临时文件，整个 multipart 请求解析完毕且无错误
//! 后才 rename 到最终路径；任何失败都会删除临时文件，账本不变。

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Extension, FromRequest, Multipart, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::atomic::AtomicFile;
use crate::config::UPLOAD_FIELD_NAME;
use crate::error::ApiError;
use crate::ledger::SizeLedger;
use crate::naming::client_file_name;
use crate::storage::Storage;

pub const FILE_TOO_LARGE_MESSAGE: &str = "File too large";
/// 请求体上限在单文件上限之外留出的余量（边界、头部与文本字段）。
pub const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(Debug)]
pub struct UploadConfig {
    pub max_file_size: u64,
}

impl UploadConfig {
    /// 整个请求体允许的最大字节数。
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_file_size.saturating_add(MULTIPART_OVERHEAD))
            .unwrap_or(usize::MAX)
    }
}

/// 已落盘的上传文件，供下游处理器读取。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub path: PathBuf,
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// 请求中的非文件字段。
#[derive(Clone, Debug, Default)]
pub struct ReportFields(pub HashMap<String, String>);

impl ReportFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

struct PendingReport {
    file: AtomicFile,
    original_name: String,
    mime_type: String,
}

/// MIME 与扩展名都必须包含 `pdf`（不区分大小写的子串匹配）。
pub fn is_accepted_type(content_type: &str, file_name: &str) -> bool {
    let mime_matches = content_type.to_ascii_lowercase().contains("pdf");
    let extension = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    mime_matches && extension.contains("pdf")
}

fn parser_error(err: MultipartError) -> ApiError {
    ApiError::Parser(err.body_text())
}

/// 上传中间件：成功时把 [`StoredFile`] 和 [`ReportFields`] 放入请求扩展后交给下游。
pub async fn handle_file_upload(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(ledger): Extension<Arc<SizeLedger>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let mut multipart_request = Request::new(body);
    *multipart_request.headers_mut() = parts.headers.clone();
    *multipart_request.extensions_mut() = parts.extensions.clone();

    let (stored, fields) =
        match receive_report(multipart_request, &storage, &ledger, &upload).await {
            Ok(received) => received,
            Err(err) => {
                warn!(message = %err.message(), status = %err.status(), "upload rejected");
                return err.into_response();
            }
        };

    if let Some(stored) = stored {
        parts.extensions.insert(stored);
    }
    parts.extensions.insert(fields);
    next.run(Request::from_parts(parts, Body::empty())).await
}

async fn receive_report(
    request: Request,
    storage: &Storage,
    ledger: &SizeLedger,
    upload: &UploadConfig,
) -> Result<(Option<StoredFile>, ReportFields), ApiError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| ApiError::Parser(rejection.body_text()))?;

    let mut pending = None;
    let mut fields = ReportFields::default();
    if let Err(err) = read_fields(&mut multipart, storage, upload, &mut pending, &mut fields).await
    {
        if let Some(report) = pending {
            report.file.cleanup().await;
        }
        return Err(err);
    }

    let Some(report) = pending else {
        debug!("multipart request carried no report file");
        return Ok((None, fields));
    };
    let stored = persist_report(report, ledger).await?;
    Ok((Some(stored), fields))
}

async fn read_fields(
    multipart: &mut Multipart,
    storage: &Storage,
    upload: &UploadConfig,
    pending: &mut Option<PendingReport>,
    fields: &mut ReportFields,
) -> Result<(), ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(parser_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            let value = field.text().await.map_err(parser_error)?;
            fields.0.insert(name, value);
            continue;
        };

        if name != UPLOAD_FIELD_NAME || pending.is_some() {
            return Err(ApiError::TooManyFiles);
        }
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !is_accepted_type(&mime_type, &file_name) {
            return Err(ApiError::InvalidType);
        }

        let original_name = client_file_name(&file_name);
        let file = AtomicFile::new(&storage.upload_target(&original_name)).await?;
        let report = pending.insert(PendingReport {
            file,
            original_name,
            mime_type,
        });

        while let Some(chunk) = field.chunk().await.map_err(parser_error)? {
            if report.file.written() + chunk.len() as u64 > upload.max_file_size {
                return Err(ApiError::Parser(FILE_TOO_LARGE_MESSAGE.into()));
            }
            report.file.write_all(&chunk).await?;
        }
    }
    Ok(())
}

async fn persist_report(
    report: PendingReport,
    ledger: &SizeLedger,
) -> Result<StoredFile, ApiError> {
    let path = report.file.target().to_path_buf();
    let size = report.file.finalize().await?;

    if size > 0 {
        let delta = i64::try_from(size).unwrap_or(i64::MAX);
        if let Err(err) = ledger.adjust(delta).await {
            let _ = fs::remove_file(&path).await;
            return Err(ApiError::Unexpected(format!("ledger update failed: {err}")));
        }
    }

    let stored_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(
        name = stored_name,
        original = report.original_name,
        size,
        "report stored"
    );
    Ok(StoredFile {
        path,
        stored_name,
        original_name: report.original_name,
        mime_type: report.mime_type,
        size,
    })
}
