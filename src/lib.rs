//! PDF report intake.
//!
//! An axum middleware that accepts one PDF per request under the
//! `report_pdf` multipart field, stores it under a collision-resistant name
//! and keeps a JSON ledger of the total bytes stored. Deleting a report
//! through [`files::delete_report_file`] gives the bytes back.

pub mod atomic;
pub mod background;
pub mod config;
pub mod error;
pub mod files;
pub mod http;
pub mod ledger;
pub mod logging;
pub mod naming;
pub mod router;
pub mod storage;
pub mod upload;
