use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::OperationFilter;
use crate::io::{ExportFormat, ExportPipeline, ExportSummary};
use crate::storage::Database;

use super::AppError;

/// Where report files go and how the pipeline is sized.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub dir: PathBuf,
    pub channel_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            channel_capacity: 1,
        }
    }
}

/// A report request as it arrives from the transport layer.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    /// `"csv"` or `"json"`; JSON when absent
    pub format: Option<String>,
    /// 1-based; absent means the first page
    pub page: Option<u32>,
    /// Absent or 0 turns paging off
    pub per_page: Option<u32>,
    /// `YYYY-MM-DD`, exact calendar-day match
    pub date: Option<String>,
}

impl ExportRequest {
    pub fn format(&self) -> Result<ExportFormat, AppError> {
        match self.format.as_deref() {
            None => Ok(ExportFormat::default()),
            Some(s) => ExportFormat::from_str(s).ok_or_else(|| {
                AppError::InvalidRequest(format!("format must be csv or json, got {:?}", s))
            }),
        }
    }

    pub fn filter(&self) -> Result<OperationFilter, AppError> {
        let mut filter = OperationFilter::all();

        if let Some(date) = &self.date {
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
                AppError::InvalidRequest(format!("date must be YYYY-MM-DD, got {:?}", date))
            })?;
            filter = filter.on_date(date);
        }

        if self.page == Some(0) {
            return Err(AppError::InvalidRequest("page must be at least 1".to_string()));
        }
        if let Some(per_page) = self.per_page {
            filter = filter.paged(self.page.unwrap_or(1), per_page);
        }

        Ok(filter)
    }
}

/// A finished report, reopened for reading.
#[derive(Debug)]
pub struct ExportedReport {
    pub file: File,
    pub path: PathBuf,
    pub size: u64,
    pub content_type: &'static str,
    pub summary: ExportSummary,
}

/// Produces operation reports through the export pipeline.
pub struct ReportService {
    db: Database,
    config: ExportConfig,
}

impl ReportService {
    pub fn new(db: Database, config: ExportConfig) -> Self {
        Self { db, config }
    }

    /// Export into a fresh file under the configured directory.
    pub async fn export(&self, request: &ExportRequest) -> Result<ExportedReport, AppError> {
        let format = request.format()?;
        let filter = request.filter()?;

        tokio::fs::create_dir_all(&self.config.dir).await?;
        let path = self.config.dir.join(format!(
            "operations-{}.{}",
            Uuid::new_v4(),
            format.extension()
        ));

        let summary = self.export_to(&path, format, filter).await?;

        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();
        let file = file.into_std().await;

        Ok(ExportedReport {
            file,
            path,
            size,
            content_type: format.content_type(),
            summary,
        })
    }

    /// Export into a caller-chosen path. A failed export leaves no file behind.
    pub async fn export_to(
        &self,
        path: &Path,
        format: ExportFormat,
        filter: OperationFilter,
    ) -> Result<ExportSummary, AppError> {
        let file = tokio::fs::File::create(path).await?.into_std().await;
        let marshaler = format.marshaler(file)?;

        let result = ExportPipeline::new(self.db.clone())
            .with_channel_capacity(self.config.channel_capacity)
            .run(filter, marshaler)
            .await;

        match result {
            Ok(summary) => {
                info!(
                    path = %path.display(),
                    format = %format,
                    rows = summary.written,
                    "report exported"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %e, "failed to remove partial report");
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(page: Option<u32>, per_page: Option<u32>, date: Option<&str>) -> ExportRequest {
        ExportRequest {
            format: None,
            page,
            per_page,
            date: date.map(String::from),
        }
    }

    #[test]
    fn test_no_paging_by_default() {
        let filter = request(None, None, None).filter().unwrap();
        assert_eq!(filter, OperationFilter::all());
    }

    #[test]
    fn test_first_page_equals_absent_page() {
        let absent = request(None, Some(10), None).filter().unwrap();
        let first = request(Some(1), Some(10), None).filter().unwrap();
        assert_eq!(absent, first);
        assert_eq!(first.offset, 0);
        assert_eq!(first.limit, Some(10));
    }

    #[test]
    fn test_later_pages_offset() {
        let filter = request(Some(3), Some(25), None).filter().unwrap();
        assert_eq!(filter.offset, 50);
        assert_eq!(filter.limit, Some(25));
    }

    #[test]
    fn test_zero_per_page_disables_paging() {
        let filter = request(Some(4), Some(0), None).filter().unwrap();
        assert_eq!(filter.limit, None);
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn test_page_without_per_page_is_full_scan() {
        let filter = request(Some(2), None, None).filter().unwrap();
        assert_eq!(filter.limit, None);
    }

    #[test]
    fn test_date_alone_filters_without_paging() {
        let filter = request(None, None, Some("2024-01-15")).filter().unwrap();
        assert_eq!(filter.date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(filter.limit, None);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            request(Some(0), Some(10), None).filter(),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            request(None, None, Some("15/01/2024")).filter(),
            Err(AppError::InvalidRequest(_))
        ));

        let bad_format = ExportRequest {
            format: Some("xml".into()),
            ..Default::default()
        };
        assert!(bad_format.format().unwrap_err().is_validation());
    }
}
