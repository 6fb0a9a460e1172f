// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model artifact downloading.
//!
//! [`HttpFetcher`] streams a model artifact from a URL into the local cache.
//! Downloads go to a temporary `.part` file and are atomically renamed into
//! the cache path only on full, successful completion, so an interrupted or
//! concurrent fetch never leaves a partial file where a subsequent load could
//! mistake it for a complete artifact.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{DetectError, Result};

/// URL of the generic fallback detection model. Published on the Ultralytics
/// GitHub releases and always resolvable; it is substituted when the
/// specialized artifact cannot be provisioned.
pub const FALLBACK_MODEL_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n.onnx";

/// Default connection timeout in seconds.
const CONNECT_TIMEOUT: u64 = 30;

/// Default read timeout for the whole body in seconds.
const READ_TIMEOUT: u64 = 300;

/// Fetches a remote artifact into a local file.
///
/// Contract: on success the destination contains the complete artifact; on
/// failure the destination is untouched (implementations must stage writes and
/// only move into place when complete). Failures are reported as
/// [`DetectError::Acquisition`] carrying the identifier and the cause.
pub trait Fetcher {
    /// Fetch the artifact named by `identifier` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Acquisition`] on any network or write failure.
    fn fetch(&self, identifier: &str, dest: &Path) -> Result<()>;
}

/// HTTP(S) fetcher with connect/read timeouts and atomic staging.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT),
            read_timeout: Duration::from_secs(READ_TIMEOUT),
        }
    }
}

impl HttpFetcher {
    /// Create a fetcher with custom timeouts.
    #[must_use]
    pub const fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, identifier: &str, dest: &Path) -> Result<()> {
        download_file(identifier, dest, self.connect_timeout, self.read_timeout)
    }
}

/// Format bytes as a human-readable string (e.g., "10.4MB").
fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.1}GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{bytes:.0}B")
    }
}

/// Format a time duration in seconds.
fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let mins = (seconds / 60.0) as u32;
        let secs = seconds % 60.0;
        format!("{mins}:{secs:04.1}")
    } else {
        let hours = (seconds / 3600.0) as u32;
        let mins = ((seconds % 3600.0) / 60.0) as u32;
        let secs = seconds % 60.0;
        format!("{hours}:{mins:02}:{secs:04.1}")
    }
}

/// Generate a progress bar string.
fn generate_bar(progress: f64, width: usize) -> String {
    let filled = (progress * width as f64) as usize;
    let partial = progress * width as f64 - filled as f64;

    let mut bar = "━".repeat(filled);
    if filled < width {
        if partial > 0.5 {
            bar.push('╸');
            bar.push_str(&"─".repeat(width - filled - 1));
        } else {
            bar.push_str(&"─".repeat(width - filled));
        }
    }
    bar
}

fn acquisition_error(identifier: &str, reason: impl Into<String>) -> DetectError {
    DetectError::Acquisition {
        identifier: identifier.to_string(),
        reason: reason.into(),
    }
}

/// Download a URL to the destination path with a progress bar.
///
/// Streams into `<dest>.part` and renames into place on completion. The
/// canonical destination is never partially written.
fn download_file(
    url: &str,
    dest: &Path,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| acquisition_error(url, format!("failed to create cache directory: {e}")))?;
    }

    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(connect_timeout))
        .timeout_recv_body(Some(read_timeout))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call().map_err(|e| {
        let reason = match &e {
            ureq::Error::Timeout(_) => "connection timed out".to_string(),
            ureq::Error::Io(io_err) => format!("network error: {io_err}"),
            _ => e.to_string(),
        };
        acquisition_error(url, reason)
    })?;

    let content_length: Option<u64> = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s: &str| s.parse().ok());
    let total_size = content_length.unwrap_or(0);

    // Temp file in the same directory so the final rename is atomic
    let temp_path = dest.with_extension("part");
    let _ = fs::remove_file(&temp_path);

    let temp_file = File::create(&temp_path)
        .map_err(|e| acquisition_error(url, format!("failed to create temp file: {e}")))?;
    let mut writer = BufWriter::new(temp_file);

    let mut reader = response.into_body().into_reader();
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 65536];
    let start_time = Instant::now();
    let mut last_update = Instant::now();

    const BAR_WIDTH: usize = 12;
    const MIN_UPDATE_INTERVAL: f64 = 0.1;

    let desc = format!("Downloading {} to '{}'", url, dest.display());

    let download_result: Result<()> = (|| {
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| acquisition_error(url, format!("failed to read from network: {e}")))?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| acquisition_error(url, format!("failed to write temp file: {e}")))?;

            downloaded += bytes_read as u64;

            // Rate-limit progress updates
            let now = Instant::now();
            if now.duration_since(last_update).as_secs_f64() < MIN_UPDATE_INTERVAL {
                continue;
            }
            last_update = now;

            let elapsed = start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                downloaded as f64 / elapsed
            } else {
                0.0
            };

            if total_size > 0 {
                let progress = (downloaded as f64 / total_size as f64).min(1.0);
                let percent = (progress * 100.0) as u8;
                let bar = generate_bar(progress, BAR_WIDTH);

                eprint!(
                    "\r\x1b[K{}: {}% {} {}/{} {}/s {}",
                    desc,
                    percent,
                    bar,
                    format_bytes(downloaded as f64),
                    format_bytes(total_size as f64),
                    format_bytes(rate),
                    format_time(elapsed)
                );
            } else {
                eprint!(
                    "\r\x1b[K{}: {} {}/s {}",
                    desc,
                    format_bytes(downloaded as f64),
                    format_bytes(rate),
                    format_time(elapsed)
                );
            }
            std::io::stderr().flush().ok();
        }

        // A known content length that we fell short of means a truncated body
        if total_size > 0 && downloaded < total_size {
            return Err(acquisition_error(
                url,
                format!(
                    "truncated download: got {} of {}",
                    format_bytes(downloaded as f64),
                    format_bytes(total_size as f64)
                ),
            ));
        }

        writer
            .flush()
            .map_err(|e| acquisition_error(url, format!("failed to flush temp file: {e}")))?;

        Ok(())
    })();

    // On failure remove the temp file; the canonical path stays untouched
    if let Err(e) = download_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        downloaded as f64 / elapsed
    } else {
        0.0
    };
    eprintln!(
        "\r\x1b[K{}: 100% {} {} {}/s {}",
        desc,
        generate_bar(1.0, BAR_WIDTH),
        format_bytes(downloaded as f64),
        format_bytes(rate),
        format_time(elapsed)
    );

    // Atomic rename from temp file to final destination
    fs::rename(&temp_path, dest).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        acquisition_error(url, format!("failed to move download into place: {e}"))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500.0), "500B");
        assert_eq!(format_bytes(1024.0), "1.0KB");
        assert_eq!(format_bytes(1048576.0), "1.0MB");
        assert_eq!(format_bytes(1073741824.0), "1.0GB");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(5.5), "5.5s");
        assert_eq!(format_time(65.0), "1:05.0");
    }

    #[test]
    fn test_generate_bar() {
        assert_eq!(generate_bar(0.0, 10), "──────────");
        assert_eq!(generate_bar(1.0, 10), "━━━━━━━━━━");
        assert_eq!(generate_bar(0.5, 10), "━━━━━─────");
    }

    #[test]
    fn test_unreachable_url_is_acquisition_error() {
        // Reserved TLD, resolves nowhere; no file must appear at the destination
        let fetcher =
            HttpFetcher::with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
        let dest = std::env::temp_dir().join("pipe-detect-download-test.onnx");
        let _ = fs::remove_file(&dest);

        let result = fetcher.fetch("http://model-host.invalid/best.onnx", &dest);
        assert!(matches!(result, Err(DetectError::Acquisition { .. })));
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
