//! Access to the public NOAA GOES archive on S3.
//!
//! Scene objects live under `{product}/{year}/{doy:03}/{hour:02}/` in one
//! bucket per platform, named like
//! `OR_ABI-L2-CMIPF-M6C13_G16_s20190601700211_e..._c....nc`. The `s` field is
//! the scan start: year, day of year, hour, minute, second, tenths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures::StreamExt;
use goes_common::{Satellite, SceneRequest};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::error::ArchiveError;

/// A scene file downloaded to local disk.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    pub path: PathBuf,
    /// Archive object name, kept as provenance.
    pub source_id: String,
}

/// The archive collaborator: find the scene for a request and download it.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    async fn resolve_and_download(
        &self,
        request: &SceneRequest,
        dest_dir: &Path,
    ) -> Result<ArchiveFile, ArchiveError>;
}

/// Settings for [`NoaaArchive`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoaaArchiveConfig {
    /// Base URL for object downloads; `{bucket}` is substituted.
    pub download_url: String,
    pub region: String,
    pub request_timeout_secs: u64,
    /// Upper bound on keys listed per hour directory.
    pub max_listed_keys: usize,
}

impl Default for NoaaArchiveConfig {
    fn default() -> Self {
        Self {
            download_url: "https://{bucket}.s3.amazonaws.com".to_string(),
            region: "us-east-1".to_string(),
            request_timeout_secs: 600,
            max_listed_keys: 4000,
        }
    }
}

/// GOES platform number serving a satellite slot on a date.
///
/// GOES-19 replaced GOES-16 as East on 2025-04-07; GOES-18 replaced
/// GOES-17 as West on 2023-01-04.
pub fn platform_for(satellite: Satellite, date: NaiveDate) -> u8 {
    match satellite {
        Satellite::East => {
            if date >= NaiveDate::from_ymd_opt(2025, 4, 7).unwrap_or(NaiveDate::MAX) {
                19
            } else {
                16
            }
        }
        Satellite::West => {
            if date >= NaiveDate::from_ymd_opt(2023, 1, 4).unwrap_or(NaiveDate::MAX) {
                18
            } else {
                17
            }
        }
    }
}

pub fn bucket_for(platform: u8) -> String {
    format!("noaa-goes{}", platform)
}

/// Hour directory holding the request's scans.
pub fn listing_prefix(request: &SceneRequest) -> String {
    format!(
        "{}/{}/{:03}/{:02}/",
        request.domain.product(),
        request.time.year,
        request.time.day_of_year(),
        request.time.hour
    )
}

/// Fields of an archive object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneKey {
    /// Product and sector token, e.g. `CMIPF` or `CMIPM1`.
    pub product: String,
    pub band: u8,
    pub platform: u8,
    pub scan_start: DateTime<Utc>,
}

/// Parse an object key (with or without its directory prefix).
pub fn parse_scene_key(key: &str) -> Option<SceneKey> {
    let name = key.rsplit('/').next()?;
    let stem = name.strip_suffix(".nc")?;
    let mut fields = stem.split('_');

    if fields.next()? != "OR" {
        return None;
    }
    // ABI-L2-CMIPF-M6C13
    let product_field = fields.next()?;
    let rest = product_field.strip_prefix("ABI-L2-")?;
    let (product, mode_band) = rest.rsplit_once('-')?;
    let band_pos = mode_band.find('C')?;
    let band = mode_band[band_pos + 1..].parse().ok()?;

    let platform = fields.next()?.strip_prefix('G')?.parse().ok()?;
    let start = fields.next()?.strip_prefix('s')?;
    let scan_start = parse_scan_time(start)?;

    Some(SceneKey {
        product: product.to_string(),
        band,
        platform,
        scan_start,
    })
}

/// `YYYYDDDHHMMSSt` → UTC time (tenths of a second dropped).
fn parse_scan_time(s: &str) -> Option<DateTime<Utc>> {
    if s.len() < 13 || !s.is_ascii() {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let doy: u32 = s[4..7].parse().ok()?;
    let hour: u32 = s[7..9].parse().ok()?;
    let minute: u32 = s[9..11].parse().ok()?;
    let second: u32 = s[11..13].parse().ok()?;
    let date = NaiveDate::from_yo_opt(year, doy)?;
    let naive = date.and_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Pick the key whose scan start is nearest the request time.
///
/// Only keys for the request's sector, band and platform are considered;
/// ties go to the earlier scan.
pub fn select_nearest<'a>(
    keys: &'a [String],
    request: &SceneRequest,
    platform: u8,
) -> Option<&'a str> {
    let target = request.time.to_datetime()?;
    let token = request.domain.file_token().trim_end_matches('-');

    keys.iter()
        .filter_map(|key| parse_scene_key(key).map(|parsed| (key, parsed)))
        .filter(|(_, parsed)| {
            parsed.product == token
                && parsed.band == request.channel.band()
                && parsed.platform == platform
        })
        .min_by_key(|(_, parsed)| ((parsed.scan_start - target).num_seconds().abs(), parsed.scan_start))
        .map(|(key, _)| key.as_str())
}

/// [`ArchiveClient`] over the NOAA open-data buckets.
pub struct NoaaArchive {
    s3: aws_sdk_s3::Client,
    http: Client,
    config: NoaaArchiveConfig,
}

impl NoaaArchive {
    /// Build clients for unsigned access to the public buckets.
    pub async fn new(config: NoaaArchiveConfig) -> Result<Self, ArchiveError> {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .no_credentials() // Use unsigned requests for public buckets
            .load()
            .await;
        let s3 = aws_sdk_s3::Client::new(&aws_config);

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ArchiveError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { s3, http, config })
    }

    /// List keys under a prefix, starting after `start_after`.
    async fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: &str,
    ) -> Result<Vec<String>, ArchiveError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .s3
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .max_keys(1000);

            if let Some(ref token) = continuation_token {
                request = request.continuation_token(token.clone());
            } else {
                // Only use start_after on the first request
                request = request.start_after(start_after);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ArchiveError::Network(format!("S3 list_objects_v2 failed: {}", e)))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                    if keys.len() >= self.config.max_listed_keys {
                        return Ok(keys);
                    }
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }

    /// Stream an object to `{dest_dir}/{name}.partial`, then rename it.
    async fn download(&self, bucket: &str, key: &str, dest_dir: &Path) -> Result<PathBuf, ArchiveError> {
        let name = key.rsplit('/').next().unwrap_or(key);
        let temp_path = dest_dir.join(format!("{}.partial", name));
        let final_path = dest_dir.join(name);

        let result = self.stream_to_file(bucket, key, &temp_path).await;
        if let Err(e) = result {
            fs::remove_file(&temp_path).await.ok();
            return Err(e);
        }

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| ArchiveError::Network(format!("Failed to finalize download: {}", e)))?;
        Ok(final_path)
    }

    async fn stream_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), ArchiveError> {
        let base = self.config.download_url.replace("{bucket}", bucket);
        let url = format!("{}/{}", base.trim_end_matches('/'), key);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ArchiveError::Network(format!("HTTP request failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                return Err(ArchiveError::NotFound(format!("{} returned {}", url, response.status())));
            }
            status => return Err(ArchiveError::Network(format!("HTTP error: {}", status))),
        }

        let expected: Option<u64> = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let mut file = fs::File::create(path)
            .await
            .map_err(|e| ArchiveError::Network(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ArchiveError::Network(format!("Error reading response chunk: {}", e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ArchiveError::Network(format!("Error writing to file: {}", e)))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ArchiveError::Network(format!("Error flushing file: {}", e)))?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(ArchiveError::Network(format!(
                    "Download size mismatch: expected {} bytes, got {}",
                    expected, written
                )));
            }
        }

        debug!(bytes = written, "Download complete");
        Ok(())
    }
}

#[async_trait]
impl ArchiveClient for NoaaArchive {
    #[instrument(skip(self, dest_dir), fields(request = %request))]
    async fn resolve_and_download(
        &self,
        request: &SceneRequest,
        dest_dir: &Path,
    ) -> Result<ArchiveFile, ArchiveError> {
        let date = NaiveDate::from_ymd_opt(request.time.year, request.time.month, request.time.day)
            .ok_or_else(|| ArchiveError::NotFound(format!("invalid date in {}", request)))?;
        let platform = platform_for(request.satellite, date);
        let bucket = bucket_for(platform);
        let prefix = listing_prefix(request);
        // Keys sort by product token first; skip other sectors
        let start_after = format!("{}OR_ABI-L2-{}", prefix, request.domain.file_token());

        let keys = self.list_keys(&bucket, &prefix, &start_after).await?;
        let key = select_nearest(&keys, request, platform)
            .ok_or_else(|| {
                ArchiveError::NotFound(format!("no {} scan in s3://{}/{}", request.channel, bucket, prefix))
            })?
            .to_string();

        info!(bucket = %bucket, key = %key, "Downloading scene");
        let path = self.download(&bucket, &key, dest_dir).await?;
        let source_id = key.rsplit('/').next().unwrap_or(&key).to_string();

        Ok(ArchiveFile { path, source_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goes_common::{Channel, CoarsenFactor, Domain, TimePoint};

    fn request(domain: Domain, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> SceneRequest {
        SceneRequest {
            satellite: Satellite::East,
            domain,
            channel: Channel::new(13).unwrap(),
            coarsen: CoarsenFactor::X2,
            time: TimePoint::new(year, month, day, hour, minute).unwrap(),
        }
    }

    #[test]
    fn test_platform_transitions() {
        let d = |y, m, dd| NaiveDate::from_ymd_opt(y, m, dd).unwrap();
        assert_eq!(platform_for(Satellite::East, d(2025, 4, 6)), 16);
        assert_eq!(platform_for(Satellite::East, d(2025, 4, 7)), 19);
        assert_eq!(platform_for(Satellite::West, d(2023, 1, 3)), 17);
        assert_eq!(platform_for(Satellite::West, d(2023, 1, 4)), 18);
    }

    #[test]
    fn test_listing_prefix() {
        let req = request(Domain::FullDisk, 2019, 3, 1, 17, 0);
        assert_eq!(listing_prefix(&req), "ABI-L2-CMIPF/2019/060/17/");
    }

    #[test]
    fn test_parse_scene_key() {
        let key = "ABI-L2-CMIPM/2020/061/17/OR_ABI-L2-CMIPM2-M6C13_G16_s20200611701250_e20200611701307_c20200611701364.nc";
        let parsed = parse_scene_key(key).unwrap();
        assert_eq!(parsed.product, "CMIPM2");
        assert_eq!(parsed.band, 13);
        assert_eq!(parsed.platform, 16);
        assert_eq!(
            parsed.scan_start,
            Utc.with_ymd_and_hms(2020, 3, 1, 17, 1, 25).unwrap()
        );

        assert!(parse_scene_key("OR_ABI-L1b-RadF-M6C13_G16_s2020061.nc").is_none());
        assert!(parse_scene_key("index.html").is_none());
    }

    #[test]
    fn test_select_nearest_scan() {
        let prefix = "ABI-L2-CMIPF/2019/060/17/";
        let keys: Vec<String> = [
            "OR_ABI-L2-CMIPF-M3C13_G16_s20190601700341_e1_c1.nc",
            "OR_ABI-L2-CMIPF-M3C13_G16_s20190601715341_e1_c1.nc",
            "OR_ABI-L2-CMIPF-M3C14_G16_s20190601700341_e1_c1.nc",
            "OR_ABI-L2-CMIPF-M3C13_G17_s20190601659341_e1_c1.nc",
        ]
        .iter()
        .map(|name| format!("{}{}", prefix, name))
        .collect();

        let at_1700 = request(Domain::FullDisk, 2019, 3, 1, 17, 0);
        assert_eq!(select_nearest(&keys, &at_1700, 16), Some(keys[0].as_str()));

        let at_1712 = request(Domain::FullDisk, 2019, 3, 1, 17, 12);
        assert_eq!(select_nearest(&keys, &at_1712, 16), Some(keys[1].as_str()));

        let conus = request(Domain::Conus, 2019, 3, 1, 17, 0);
        assert_eq!(select_nearest(&keys, &conus, 16), None);
    }
}
