//! CLI arguments and server configuration defaults.

use clap::Parser;

/// Multipart field that carries the uploaded report.
pub const UPLOAD_FIELD_NAME: &str = "report_pdf";
pub const DEFAULT_STORAGE_DIR: &str = "uploads/reports";
pub const DEFAULT_LEDGER_PATH: &str = "data/report-size.json";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;
pub const DEFAULT_UPLOAD_TEMP_TTL_SECS: u64 = 60 * 60;
pub const UPLOAD_SWEEP_INTERVAL_SECS: u64 = 900;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(
    name = "report-intake",
    version,
    about = "PDF report upload service"
)]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "REPORT_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Directory uploaded reports are stored in"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'l',
        long,
        env = "REPORT_LEDGER_PATH",
        default_value = DEFAULT_LEDGER_PATH,
        help = "JSON file tracking the total stored bytes"
    )]
    pub ledger_path: String,
    #[arg(
        short = 'b',
        long,
        env = "REPORT_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "REPORT_HTTP_PORT",
        default_value_t = 5005,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        long,
        env = "REPORT_CORS_ORIGINS",
        value_delimiter = ',',
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Vec<String>,
    #[arg(
        long,
        env = "REPORT_MAX_FILE_SIZE",
        default_value_t = DEFAULT_MAX_FILE_SIZE,
        help = "Max size of a single uploaded report in bytes"
    )]
    pub max_file_size: u64,
    #[arg(
        long,
        env = "REPORT_UPLOAD_TEMP_TTL_SECS",
        default_value_t = DEFAULT_UPLOAD_TEMP_TTL_SECS,
        help = "Age after which abandoned partial uploads are removed (0 to disable)"
    )]
    pub upload_temp_ttl_secs: u64,
}
