//! Router assembly for the report endpoints.

use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use std::convert::Infallible;
use std::sync::Arc;

use crate::files;
use crate::http::{add_security_headers, build_cors_layer};
use crate::ledger::SizeLedger;
use crate::storage::Storage;
use crate::upload::{UploadConfig, handle_file_upload};

pub fn build_router(
    storage: Arc<Storage>,
    ledger: Arc<SizeLedger>,
    upload: Arc<UploadConfig>,
    cors_origins: &[String],
) -> Router {
    let body_limit = upload.body_limit();
    let mut app = Router::new()
        .route(
            "/api/reports",
            post(files::accept_report)
                .layer::<_, Infallible>(middleware::from_fn(handle_file_upload))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/reports", delete(files::delete_report))
        .route("/api/reports/usage", get(files::report_usage))
        .layer(middleware::from_fn(add_security_headers))
        .layer(Extension(storage))
        .layer(Extension(ledger))
        .layer(Extension(upload));

    if let Some(cors_layer) = build_cors_layer(cors_origins) {
        app = app.layer(cors_layer);
    }
    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::config::UPLOAD_FIELD_NAME;
    use crate::error::{INVALID_TYPE_MESSAGE, TOO_MANY_FILES_MESSAGE, UNEXPECTED_MESSAGE};
    use crate::upload::{FILE_TOO_LARGE_MESSAGE, ReportFields};

    const BOUNDARY: &str = "report-intake-test-boundary";

    struct Part<'a> {
        field: &'a str,
        file_name: Option<&'a str>,
        content_type: Option<&'a str>,
        data: &'a [u8],
    }

    fn file_part<'a>(
        field: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    ) -> Part<'a> {
        Part {
            field,
            file_name: Some(file_name),
            content_type: Some(content_type),
            data,
        }
    }

    fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.field);
            if let Some(file_name) = part.file_name {
                disposition.push_str(&format!("; filename=\"{file_name}\""));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            if let Some(content_type) = part.content_type {
                body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("build request")
    }

    struct TestApp {
        _temp: tempfile::TempDir,
        storage: Arc<Storage>,
        ledger: Arc<SizeLedger>,
        upload: Arc<UploadConfig>,
    }

    impl TestApp {
        fn new(max_file_size: u64) -> Self {
            let temp = tempdir().expect("tempdir");
            let root = temp.path().join("reports");
            std::fs::create_dir_all(&root).expect("create storage root");
            Self {
                storage: Arc::new(Storage::new(root)),
                ledger: Arc::new(SizeLedger::new(temp.path().join("data").join("size.json"))),
                upload: Arc::new(UploadConfig { max_file_size }),
                _temp: temp,
            }
        }

        fn router(&self) -> Router {
            build_router(
                self.storage.clone(),
                self.ledger.clone(),
                self.upload.clone(),
                &[],
            )
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router().oneshot(request).await.expect("infallible")
        }

        fn stored_names(&self) -> Vec<String> {
            std::fs::read_dir(self.storage.root_path())
                .expect("read storage root")
                .map(|entry| {
                    entry
                        .expect("entry")
                        .file_name()
                        .to_string_lossy()
                        .into_owned()
                })
                .collect()
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn valid_pdf_is_stored_and_counted() {
        let app = TestApp::new(1024);
        let data = b"%PDF-1.7 minimal";
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "q3 report.pdf", "application/pdf", data)],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let body = body_json(response).await;
        assert_eq!(body["status"], true);
        assert_eq!(body["status_code"], 201);
        assert_eq!(body["data"]["originalName"], "q3 report.pdf");
        assert_eq!(body["data"]["size"], data.len());

        let names = app.stored_names();
        assert_eq!(names.len(), 1);
        assert_eq!(body["data"]["storedName"], names[0].as_str());
        assert!(names[0].ends_with("-q3 report.pdf"));
        let mut segments = names[0].splitn(3, '-');
        assert!(segments.next().expect("millis").parse::<i64>().is_ok());
        assert!(segments.next().expect("random").parse::<u32>().expect("random") < 1_000_000_000);

        let stored = std::fs::read(app.storage.root_path().join(&names[0])).expect("read stored");
        assert_eq!(stored, data);
        assert_eq!(app.ledger.read().await, data.len() as u64);
    }

    #[tokio::test]
    async fn forged_mime_with_wrong_extension_is_rejected() {
        let app = TestApp::new(1024);
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "a b.txt", "application/pdf", b"hello")],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], false);
        assert_eq!(body["status_code"], 400);
        assert_eq!(body["message"], INVALID_TYPE_MESSAGE);
        assert!(app.stored_names().is_empty());
        assert!(!app.ledger.path().exists());
    }

    #[tokio::test]
    async fn non_pdf_mime_is_rejected() {
        let app = TestApp::new(1024);
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "photo.pdf", "image/jpeg", &[0xFF, 0xD8, 0xFF])],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], INVALID_TYPE_MESSAGE);
        assert_eq!(app.ledger.read().await, 0);
    }

    #[tokio::test]
    async fn oversized_upload_leaves_no_file_and_no_ledger_change() {
        let app = TestApp::new(16);
        let data = vec![b'x'; 64];
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "big.pdf", "application/pdf", &data)],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], FILE_TOO_LARGE_MESSAGE);
        assert!(app.stored_names().is_empty(), "partial upload must be removed");
        assert_eq!(app.ledger.read().await, 0);
    }

    #[tokio::test]
    async fn upload_at_exact_limit_is_accepted() {
        let app = TestApp::new(16);
        let data = vec![b'x'; 16];
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "edge.pdf", "application/pdf", &data)],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(app.ledger.read().await, 16);
    }

    #[tokio::test]
    async fn second_file_is_too_many_files() {
        let app = TestApp::new(1024);
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[
                    file_part(UPLOAD_FIELD_NAME, "one.pdf", "application/pdf", b"first"),
                    file_part(UPLOAD_FIELD_NAME, "two.pdf", "application/pdf", b"second"),
                ],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], TOO_MANY_FILES_MESSAGE);
        assert!(app.stored_names().is_empty(), "first file must not be kept");
        assert_eq!(app.ledger.read().await, 0);
    }

    #[tokio::test]
    async fn file_under_unexpected_field_is_too_many_files() {
        let app = TestApp::new(1024);
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part("attachment", "one.pdf", "application/pdf", b"first")],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], TOO_MANY_FILES_MESSAGE);
    }

    #[tokio::test]
    async fn missing_file_is_reported_by_downstream() {
        let app = TestApp::new(1024);
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[Part {
                    field: "title",
                    file_name: None,
                    content_type: None,
                    data: b"Q3",
                }],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], false);
        assert!(
            body["message"]
                .as_str()
                .expect("message")
                .contains(UPLOAD_FIELD_NAME)
        );
    }

    #[tokio::test]
    async fn non_multipart_body_is_a_parser_error() {
        let app = TestApp::new(1024);
        let request = Request::builder()
            .method("POST")
            .uri("/api/reports")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .expect("build request");
        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status_code"], 400);
        assert!(!body["message"].as_str().expect("message").is_empty());
    }

    #[tokio::test]
    async fn text_fields_reach_downstream_handler() {
        let app = TestApp::new(1024);
        let router = Router::new()
            .route(
                "/upload",
                post(|Extension(fields): Extension<ReportFields>| async move {
                    fields.get("title").unwrap_or_default().to_string()
                })
                .layer(middleware::from_fn(handle_file_upload)),
            )
            .layer(Extension(app.storage.clone()))
            .layer(Extension(app.ledger.clone()))
            .layer(Extension(app.upload.clone()));

        let request = multipart_request(
            "/upload",
            &[
                Part {
                    field: "title",
                    file_name: None,
                    content_type: None,
                    data: b"Quarterly",
                },
                file_part(UPLOAD_FIELD_NAME, "q.pdf", "application/pdf", b"%PDF"),
            ],
        );
        let response = router.oneshot(request).await.expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(&bytes[..], b"Quarterly");
        assert_eq!(app.ledger.read().await, 4);
    }

    #[tokio::test]
    async fn delete_removes_file_and_decrements_ledger() {
        let app = TestApp::new(1024);
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "gone.pdf", "application/pdf", b"0123456789")],
            ))
            .await;
        let body = body_json(response).await;
        let stored_name = body["data"]["storedName"]
            .as_str()
            .expect("stored name")
            .to_string();
        assert_eq!(app.ledger.read().await, 10);

        let delete_request = |name: &str| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/reports?name={name}"))
                .body(Body::empty())
                .expect("build request")
        };

        let encoded = stored_name.replace(' ', "%20");
        let response = app.send(delete_request(&encoded)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], true);
        assert!(!app.storage.root_path().join(&stored_name).exists());
        assert_eq!(app.ledger.read().await, 0);

        let response = app.send(delete_request(&encoded)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["status"], false);
    }

    #[tokio::test]
    async fn delete_rejects_traversal() {
        let app = TestApp::new(1024);
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/reports?name=..%2Fdata%2Fsize.json")
            .body(Body::empty())
            .expect("build request");
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "invalid path");
    }

    #[tokio::test]
    async fn delete_refuses_in_flight_temp_files() {
        let app = TestApp::new(1024);
        let data = vec![b'a'; 100];
        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "a.pdf", "application/pdf", &data)],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(app.ledger.read().await, 100);

        let temp_file = app.storage.root_path().join(".b.pdf.tmp.1234");
        std::fs::write(&temp_file, vec![b'b'; 60]).expect("write temp file");

        for name in [".b.pdf.tmp.1234", "nested%2Fa.pdf"] {
            let request = Request::builder()
                .method("DELETE")
                .uri(format!("/api/reports?name={name}"))
                .body(Body::empty())
                .expect("build request");
            let response = app.send(request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "name {name}");
            assert_eq!(body_json(response).await["message"], "invalid path");
        }

        assert!(temp_file.exists());
        assert_eq!(app.ledger.read().await, 100);
    }

    #[tokio::test]
    async fn ledger_failure_removes_stored_file() {
        let app = TestApp::new(1024);
        let ledger_dir = app.storage.root_path().parent().expect("parent").join("ledger-dir");
        std::fs::create_dir_all(&ledger_dir).expect("create ledger dir");
        std::fs::write(ledger_dir.join("keep"), b"x").expect("populate ledger dir");
        let router = build_router(
            app.storage.clone(),
            Arc::new(SizeLedger::new(ledger_dir.clone())),
            app.upload.clone(),
            &[],
        );

        let response = router
            .oneshot(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "q3.pdf", "application/pdf", b"%PDF-1.7")],
            ))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], false);
        assert_eq!(body["status_code"], 500);
        assert_eq!(body["message"], UNEXPECTED_MESSAGE);
        assert!(app.stored_names().is_empty(), "stored file must be rolled back");
        assert!(ledger_dir.is_dir());
    }

    #[tokio::test]
    async fn missing_storage_root_is_an_unexpected_error() {
        let app = TestApp::new(1024);
        std::fs::remove_dir_all(app.storage.root_path()).expect("remove storage root");

        let response = app
            .send(multipart_request(
                "/api/reports",
                &[file_part(UPLOAD_FIELD_NAME, "q3.pdf", "application/pdf", b"%PDF-1.7")],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status_code"], 500);
        assert_eq!(body["message"], UNEXPECTED_MESSAGE);
        assert_eq!(app.ledger.read().await, 0);
    }

    #[tokio::test]
    async fn usage_reports_ledger_total() {
        let app = TestApp::new(1024);
        app.ledger.adjust(1234).await.expect("seed ledger");
        let request = Request::builder()
            .uri("/api/reports/usage")
            .body(Body::empty())
            .expect("build request");
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["totalSize"], 1234);
    }
}
