//! RRD file reader
//!
//! Opens and refreshes [`Source`]s backed by RRD files that live either on
//! the local filesystem or behind an HTTP(S) URL.

use super::rrd::Header;
use super::{Reader, ReaderError, Source, SubSeries};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for remote retrieval
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Validate server certificates. Off by default so self-signed
    /// collectors keep working.
    pub verify_tls: bool,
    /// Whole-request timeout for remote fetches
    pub timeout: Duration,
    /// Directory for the temporary copies of remote files; the system
    /// temp directory when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            verify_tls: false,
            timeout: Duration::from_secs(30),
            temp_dir: None,
        }
    }
}

/// Reader for local and remote RRD files
#[derive(Debug, Clone)]
pub struct RrdReader {
    client: reqwest::Client,
    temp_dir: PathBuf,
}

impl RrdReader {
    pub fn new(config: &ReaderConfig) -> Result<Self, ReaderError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReaderError::unavailable("http client", e))?;
        let temp_dir = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        Ok(Self { client, temp_dir })
    }

    /// Read and decode the header at `location`
    async fn header(&self, location: &str) -> Result<Header, ReaderError> {
        let data = if is_url(location) {
            self.fetch_remote(location).await?
        } else {
            read_local(location, Path::new(location)).await?
        };

        Header::parse(&data).map_err(|e| ReaderError::format(location, e))
    }

    /// Download into a fresh temporary copy and read it back
    ///
    /// The copy only exists while it is being written and read back. It is
    /// removed before this returns, whatever the outcome.
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, ReaderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReaderError::unavailable(url, format!("failed to download RRD: {}", e)))?;

        if !response.status().is_success() {
            return Err(ReaderError::unavailable(
                url,
                format!("bad status: {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ReaderError::unavailable(url, format!("failed to download RRD: {}", e)))?;

        tracing::trace!(url, bytes = body.len(), "Downloaded RRD");

        let dir = self.temp_dir.clone();
        tokio::task::spawn_blocking(move || copy_through(&dir, &body))
            .await
            .map_err(|e| ReaderError::unavailable(url, format!("failed to save RRD: {}", e)))?
            .map_err(|e| ReaderError::unavailable(url, format!("failed to save RRD: {}", e)))
    }
}

impl Reader for RrdReader {
    async fn open(&self, location: &str, name: &str) -> Result<Source, ReaderError> {
        let header = self.header(location).await?;

        let mut source = Source::new(location, name, header.step).with_last_update(header.last_update);
        for ds in &header.data_sources {
            let value = ds.value().map_err(|e| ReaderError::format(location, e))?;
            source.insert_series(SubSeries {
                name: ds.name.clone(),
                kind: ds.kind.clone(),
                index: ds.index,
                last_value: value,
            });
        }

        tracing::debug!(
            location,
            name,
            interval_secs = header.step.as_secs(),
            series = source.series_count(),
            "Opened RRD source"
        );
        Ok(source)
    }

    async fn refresh(&self, source: &mut Source) -> Result<(), ReaderError> {
        let location = source.location().to_string();
        let header = self.header(&location).await?;

        // validate everything before touching the source so a bad read
        // never leaves it half updated
        let mut values = Vec::with_capacity(source.series_count());
        for series in source.series() {
            if let Some(ds) = header.data_source(&series.name) {
                let value = ds.value().map_err(|e| ReaderError::format(&location, e))?;
                values.push((series.name.clone(), value));
            }
        }

        source.set_last_update(header.last_update);
        for (name, value) in values {
            source.set_value(&name, value);
        }
        Ok(())
    }
}

async fn read_local(location: &str, path: &Path) -> Result<Vec<u8>, ReaderError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ReaderError::unavailable(location, e))
}

/// Whether `location` names a remote file
pub fn is_url(location: &str) -> bool {
    match location.split_once("://") {
        Some((scheme, rest)) => {
            !rest.is_empty() && (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
        }
        None => false,
    }
}

/// Write `body` to a fresh temp file in `dir`, read it back and remove it
fn copy_through(dir: &Path, body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut tmp = tempfile::Builder::new().prefix("rrd-").tempfile_in(dir)?;
    tmp.write_all(body)?;
    tmp.flush()?;
    let data = std::fs::read(tmp.path())?;
    tmp.close()?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::rrd::encode;
    use crate::sources::SeriesKind;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn port1_bytes(traffic_in: &str, traffic_out: &str) -> Vec<u8> {
        encode(
            3,
            60,
            1735589344,
            &[("traffic_in", "COUNTER", traffic_in), ("traffic_out", "COUNTER", traffic_out)],
            1,
        )
    }

    fn write_fixture(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn reader() -> RrdReader {
        RrdReader::new(&ReaderConfig::default()).unwrap()
    }

    fn reader_in(dir: &Path) -> RrdReader {
        RrdReader::new(&ReaderConfig {
            temp_dir: Some(dir.to_path_buf()),
            ..Default::default()
        })
        .unwrap()
    }

    fn leftover_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    /// Serve a single canned HTTP response per connection
    async fn serve(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = [0u8; 1024];
                    let _ = stream.read(&mut request).await;
                    let head = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{}/port1.rrd", addr)
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("http://host/port1.rrd"));
        assert!(is_url("HTTPS://host/port1.rrd"));
        assert!(!is_url("testdata/port1.rrd"));
        assert!(!is_url("/var/lib/rrd/port1.rrd"));
        assert!(!is_url("ftp://host/port1.rrd"));
        assert!(!is_url("http://"));
    }

    #[tokio::test]
    async fn test_open_local_file() {
        let file = write_fixture(&port1_bytes("321105865553987", "53340229448019"));
        let location = file.path().to_str().unwrap();

        let source = reader().open(location, "port1").await.unwrap();

        assert_eq!(source.location(), location);
        assert_eq!(source.name(), "port1");
        assert_eq!(source.interval(), Duration::from_secs(60));
        assert_eq!(source.last_update().timestamp(), 1735589344);
        assert_eq!(source.series_count(), 2);
        let inbound = source.get("traffic_in").unwrap();
        assert_eq!(inbound.kind, SeriesKind::Counter);
        assert_eq!(inbound.last_value, 321105865553987);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let err = reader().open("nonexistent.rrd", "port1").await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(err.location(), "nonexistent.rrd");
    }

    #[tokio::test]
    async fn test_open_garbage_file() {
        let file = write_fixture(b"definitely not an rrd file");
        let err = reader().open(file.path().to_str().unwrap(), "junk").await.unwrap_err();
        assert!(matches!(err, ReaderError::Format { .. }));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_values() {
        let file = write_fixture(&port1_bytes("1", "2"));
        let location = file.path().to_str().unwrap().to_string();
        let reader = reader();
        let mut source = reader.open(&location, "port1").await.unwrap();

        std::fs::write(&location, port1_bytes("10", "20")).unwrap();
        reader.refresh(&mut source).await.unwrap();

        assert_eq!(source.get("traffic_in").unwrap().last_value, 10);
        assert_eq!(source.get("traffic_out").unwrap().last_value, 20);
    }

    #[tokio::test]
    async fn test_refresh_ignores_new_series() {
        let file = write_fixture(&encode(3, 60, 0, &[("a", "GAUGE", "1")], 1));
        let location = file.path().to_str().unwrap().to_string();
        let reader = reader();
        let mut source = reader.open(&location, "x").await.unwrap();

        std::fs::write(&location, encode(3, 60, 5, &[("a", "GAUGE", "2"), ("b", "GAUGE", "3")], 1)).unwrap();
        reader.refresh(&mut source).await.unwrap();

        assert_eq!(source.series_count(), 1);
        assert_eq!(source.get("a").unwrap().last_value, 2);
        assert_eq!(source.last_update().timestamp(), 5);
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_source_untouched() {
        let file = write_fixture(&port1_bytes("1", "2"));
        let location = file.path().to_str().unwrap().to_string();
        let reader = reader();
        let mut source = reader.open(&location, "port1").await.unwrap();

        std::fs::write(&location, port1_bytes("5", "U")).unwrap();
        let err = reader.refresh(&mut source).await.unwrap_err();

        assert!(matches!(err, ReaderError::Format { .. }));
        assert_eq!(source.get("traffic_in").unwrap().last_value, 1);
        assert_eq!(source.get("traffic_out").unwrap().last_value, 2);
    }

    #[tokio::test]
    async fn test_refresh_bad_location() {
        let file = write_fixture(&port1_bytes("1", "2"));
        let reader = reader();
        let mut source = reader.open(file.path().to_str().unwrap(), "port1").await.unwrap();

        drop(file);
        let err = reader.refresh(&mut source).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_open_over_http() {
        let url = serve("200 OK", port1_bytes("7", "8")).await;

        let source = reader().open(&url, "port2").await.unwrap();

        assert_eq!(source.location(), url);
        assert_eq!(source.name(), "port2");
        assert_eq!(source.interval(), Duration::from_secs(60));
        assert_eq!(source.get("traffic_out").unwrap().last_value, 8);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let url = serve("500 Internal Server Error", Vec::new()).await;

        let err = reader().open(&url, "port1").await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(err.to_string().contains("bad status"));
    }

    #[tokio::test]
    async fn test_remote_copy_removed_after_open() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve("200 OK", port1_bytes("7", "8")).await;
        let reader = reader_in(dir.path());

        let mut source = reader.open(&url, "port2").await.unwrap();
        assert_eq!(leftover_files(&dir), 0);

        reader.refresh(&mut source).await.unwrap();
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_remote_copy_removed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader_in(dir.path());

        let url = serve("500 Internal Server Error", Vec::new()).await;
        assert!(reader.open(&url, "port1").await.unwrap_err().is_unavailable());
        assert_eq!(leftover_files(&dir), 0);

        let url = serve("200 OK", b"not an rrd file".to_vec()).await;
        let err = reader.open(&url, "port1").await.unwrap_err();
        assert!(!err.is_unavailable());
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_remote_copy_needs_usable_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let url = serve("200 OK", port1_bytes("7", "8")).await;

        let err = reader_in(&missing).open(&url, "port1").await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(err.to_string().contains("failed to save RRD"));
    }
}
