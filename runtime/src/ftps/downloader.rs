//! Period- and batch-level transfers built on [`FtpsClient`].

use std::path::Path;
use std::sync::Arc;

use gazette::{BatchStats, DownloadStats, FileOutcome, LinkIndex};
use percent_encoding::percent_decode_str;
use tracing::{error, info, warn};
use url::Url;

use super::client::FtpsClient;
use super::{TransferError, TransferResult};
use crate::progress::{Progress, ProgressEventKind};

/// Predicate over a file name or year key.
pub type NameFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Selection policy for a batch download.
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Keep only remote files for which this returns true.
    pub file_filter: Option<NameFilter>,
    /// Keep only years for which this returns true. Applied before any
    /// network traffic.
    pub year_filter: Option<NameFilter>,
    /// Cap on files per period, applied after `file_filter`. Zero means no
    /// cap.
    pub max_files_per_period: Option<usize>,
}

impl BatchOptions {
    /// Only names ending in `.xml`, case-insensitively.
    pub fn xml_only() -> NameFilter {
        Arc::new(|name: &str| name.to_lowercase().ends_with(".xml"))
    }

    /// Only the given year key.
    pub fn single_year(year: impl Into<String>) -> NameFilter {
        let year = year.into();
        Arc::new(move |y: &str| y == year)
    }
}

impl std::fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("file_filter", &self.file_filter.is_some())
            .field("year_filter", &self.year_filter.is_some())
            .field("max_files_per_period", &self.max_files_per_period)
            .finish()
    }
}

/// Host, port and path of an `ftps://` transfer URL. The path is
/// percent-decoded, since the server expects it verbatim in `CWD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl TransferTarget {
    pub fn parse(raw: &str, default_port: u16) -> TransferResult<Self> {
        let invalid = |reason: &str| TransferError::InvalidUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };
        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "ftps" | "ftp") {
            return Err(invalid("scheme must be ftps"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let path = percent_decode_str(url.path())
            .decode_utf8()
            .map_err(|e| invalid(&format!("path is not UTF-8: {e}")))?;
        let path = if path.is_empty() { "/".to_string() } else { path.into_owned() };
        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or(default_port),
            path,
        })
    }
}

impl FtpsClient {
    /// Download every selected file of one period. Reconnects when the URL
    /// names a different host or port than the current connection, or when
    /// that connection has died. Errors mean the period could not be listed
    /// at all; a missing remote directory is an empty period.
    pub fn download_from_transfer_url(
        &mut self,
        url: &str,
        local_dir: &Path,
        file_filter: Option<&NameFilter>,
        max_files: Option<usize>,
    ) -> TransferResult<DownloadStats> {
        let target = TransferTarget::parse(url, self.options().default_port)?;

        if self.connected_endpoint() != Some((target.host.as_str(), target.port)) {
            self.connect_to(&target)?;
        }

        let mut files = match self.try_list(&target.path) {
            Ok(names) => names,
            Err(e) if self.connected_host().is_none() => {
                warn!("{}: {e}, reconnecting", target.path);
                self.connect_to(&target)?;
                self.try_list(&target.path)?
            }
            Err(e) => {
                error!("listing {} failed: {e}", target.path);
                Vec::new()
            }
        };
        info!("{}: {} remote files", target.path, files.len());
        if let Some(filter) = file_filter {
            files.retain(|name| filter(name.as_str()));
        }
        if let Some(max) = max_files.filter(|max| *max > 0) {
            files.truncate(max);
        }

        let mut stats = DownloadStats::with_total(files.len());
        for (i, name) in files.iter().enumerate() {
            let outcome = if local_dir.join(name).exists() {
                FileOutcome::Skipped
            } else if self.download_file(&target.path, name, local_dir) {
                FileOutcome::Downloaded
            } else {
                FileOutcome::Failed
            };
            stats.record(outcome);
            match outcome {
                FileOutcome::Downloaded => info!("[{}/{}] downloaded {name}", i + 1, files.len()),
                FileOutcome::Skipped => info!("[{}/{}] already present {name}", i + 1, files.len()),
                FileOutcome::Failed => warn!("[{}/{}] failed {name}", i + 1, files.len()),
            }
        }

        info!(
            "period done: {} downloaded, {} skipped, {} failed of {}",
            stats.success, stats.skipped, stats.failed, stats.total
        );
        Ok(stats)
    }

    fn connect_to(&mut self, target: &TransferTarget) -> TransferResult<()> {
        if self.connect(&target.host, target.port) {
            Ok(())
        } else {
            Err(TransferError::ConnectFailed {
                host: target.host.clone(),
                port: target.port,
            })
        }
    }

    /// Download every period of a link index into
    /// `<base_dir>/<year>/vol<volume>_iss<issue>`. A failing period is
    /// recorded and the batch moves on.
    pub fn download_from_link_index(
        &mut self,
        index: &LinkIndex,
        base_dir: &Path,
        options: &BatchOptions,
        progress: &Progress,
    ) -> BatchStats {
        let mut batch = BatchStats::default();

        for (year, entries) in index.iter() {
            if let Some(filter) = &options.year_filter {
                if !filter(year) {
                    info!("skipping year {year}");
                    continue;
                }
            }

            for entry in entries {
                batch.total_periods += 1;

                if entry.transfer_url.is_empty() {
                    warn!("{year} {}: no transfer URL, skipping", entry.title);
                    continue;
                }

                let local_dir = base_dir.join(year).join(entry.period_dir_name());
                info!("downloading {year} {} into {}", entry.title, local_dir.display());

                match self.download_from_transfer_url(
                    &entry.transfer_url,
                    &local_dir,
                    options.file_filter.as_ref(),
                    options.max_files_per_period,
                ) {
                    Ok(stats) => {
                        batch.absorb(&stats);
                        progress.emit(ProgressEventKind::PeriodDownloaded {
                            year: year.to_string(),
                            title: entry.title.clone(),
                            total: stats.total,
                            success: stats.success,
                            failed: stats.failed,
                            skipped: stats.skipped,
                        });
                    }
                    Err(e) => {
                        let message = format!("{year} {}: {e}", entry.title);
                        error!("period failed: {message}");
                        progress.warn(message.clone());
                        batch.errors.push(message);
                    }
                }
            }
        }

        info!(
            "batch done: {}/{} periods, {} downloaded, {} skipped, {} failed",
            batch.completed_periods,
            batch.total_periods,
            batch.success_files,
            batch.skipped_files,
            batch.failed_files
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_target_parse() {
        let t = TransferTarget::parse("ftps://ftp.example.gov/Patent/114/52_29", 990).unwrap();
        assert_eq!(t.host, "ftp.example.gov");
        assert_eq!(t.port, 990);
        assert_eq!(t.path, "/Patent/114/52_29");

        let t = TransferTarget::parse("ftps://127.0.0.1:2121/x", 990).unwrap();
        assert_eq!(t.port, 2121);

        let t = TransferTarget::parse("ftps://ftp.example.gov/公報 A/114", 990).unwrap();
        assert_eq!(t.path, "/公報 A/114");
        let t = TransferTarget::parse("ftps://ftp.example.gov/already%20encoded", 990).unwrap();
        assert_eq!(t.path, "/already encoded");
        let t = TransferTarget::parse("ftps://ftp.example.gov", 990).unwrap();
        assert_eq!(t.path, "/");

        assert!(TransferTarget::parse("https://host/x", 990).is_err());
        assert!(TransferTarget::parse("not a url", 990).is_err());
    }

    #[test]
    fn test_filters() {
        let xml = BatchOptions::xml_only();
        assert!(xml("I1.XML"));
        assert!(!xml("patent.dtd"));
        let year = BatchOptions::single_year("114");
        assert!(year("114"));
        assert!(!year("99"));
    }
}
