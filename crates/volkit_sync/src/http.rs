//! HTTP implementations of the remote interfaces.
//!
//! The HTTP client is abstracted behind [`HttpClient`] so the services can
//! be exercised against canned responses. [`ReqwestClient`] is the
//! production client.
//!
//! Endpoints used:
//!
//! | call                  | request                                                   |
//! |-----------------------|-----------------------------------------------------------|
//! | lookup                | `GET {master}/dir/lookup?volumeId={vid}`                  |
//! | list volumes          | `GET {master}/vol/list`                                   |
//! | sync status           | `GET {server}/admin/sync/status?volume={vid}`             |
//! | incremental fetch     | `GET {server}/admin/sync/incremental?volume={vid}&since=` |
//! | timestamp             | `GET {time}/random_timestamp?passed={days}`               |

use crate::error::{SyncError, SyncResult};
use crate::service::{Location, VolumeService, VolumeSummary, VolumeSyncStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use volkit_core::{CoreError, CoreResult, SystemClock, TimeSource, VolumeId};

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    fn get(&self, url: &str) -> SyncResult<Vec<u8>>;
}

/// Blocking `reqwest` client with a request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> SyncResult<Vec<u8>> {
        let response = self.client.get(url).send().map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(SyncError::transport_retryable(format!("HTTP {status} from {url}")));
        }
        if !status.is_success() {
            return Err(SyncError::transport_fatal(format!("HTTP {status} from {url}")));
        }
        let body = response.bytes().map_err(map_reqwest_error)?;
        Ok(body.to_vec())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else if e.is_builder() {
        SyncError::transport_fatal(e.to_string())
    } else {
        SyncError::transport_retryable(e.to_string())
    }
}

/// Prefixes `http://` unless `address` already has a scheme.
pub fn http_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8], what: &str) -> SyncResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| SyncError::Protocol(format!("failed to decode {what}: {e}")))
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    locations: Vec<Location>,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
struct VolumeListResponse {
    #[serde(default)]
    volumes: Vec<VolumeSummary>,
}

/// [`VolumeService`] talking to a master and its volume servers over HTTP.
pub struct HttpVolumeService<C: HttpClient> {
    master_url: String,
    client: C,
}

impl<C: HttpClient> HttpVolumeService<C> {
    /// Creates a service for the master at `master`.
    pub fn new(master: &str, client: C) -> Self {
        Self {
            master_url: http_url(master),
            client,
        }
    }

    /// Returns the master URL.
    pub fn master_url(&self) -> &str {
        &self.master_url
    }

    fn get(&self, url: String) -> SyncResult<Vec<u8>> {
        debug!(url = %url, "GET");
        self.client.get(&url)
    }
}

impl<C: HttpClient> VolumeService for HttpVolumeService<C> {
    fn lookup(&self, vid: VolumeId) -> SyncResult<Vec<Location>> {
        let body = self.get(format!("{}/dir/lookup?volumeId={vid}", self.master_url))?;
        let response: LookupResponse = decode_json(&body, "lookup response")?;
        if !response.error.is_empty() {
            return Err(SyncError::ServerError(response.error));
        }
        Ok(response.locations)
    }

    fn sync_status(&self, location: &Location, vid: VolumeId) -> SyncResult<VolumeSyncStatus> {
        let body = self.get(format!(
            "{}/admin/sync/status?volume={vid}",
            http_url(&location.url)
        ))?;
        decode_json(&body, "sync status")
    }

    fn fetch_incremental(
        &self,
        location: &Location,
        vid: VolumeId,
        since_ns: u64,
    ) -> SyncResult<Vec<u8>> {
        self.get(format!(
            "{}/admin/sync/incremental?volume={vid}&since={since_ns}",
            http_url(&location.url)
        ))
    }

    fn list_volumes(&self) -> SyncResult<Vec<VolumeSummary>> {
        let body = self.get(format!("{}/vol/list", self.master_url))?;
        let response: VolumeListResponse = decode_json(&body, "volume list")?;
        Ok(response.volumes)
    }
}

#[derive(Deserialize)]
struct TimestampResponse {
    status: String,
    time: u64,
}

/// Time source asking a timestamp server for a random time within the
/// last `passed_days` days.
///
/// Falls back to the system clock when the server cannot be reached or
/// answers with anything but `"OK"`.
pub struct HttpTimeSource<C: HttpClient> {
    url: String,
    client: C,
}

impl<C: HttpClient> HttpTimeSource<C> {
    /// Creates a time source for the server at `base_url`.
    pub fn new(base_url: &str, passed_days: u32, client: C) -> Self {
        Self {
            url: format!("{}/random_timestamp?passed={passed_days}", http_url(base_url)),
            client,
        }
    }

    fn fetch(&self) -> SyncResult<u64> {
        let body = self.client.get(&self.url)?;
        let response: TimestampResponse = decode_json(&body, "timestamp")?;
        if response.status != "OK" {
            return Err(SyncError::ServerError(format!(
                "timestamp server answered {:?}",
                response.status
            )));
        }
        Ok(response.time)
    }
}

impl<C: HttpClient> TimeSource for HttpTimeSource<C> {
    fn now_secs(&self) -> CoreResult<u64> {
        match self.fetch() {
            Ok(secs) => Ok(secs),
            Err(e) => {
                warn!(url = %self.url, error = %e, "timestamp fetch failed, using system clock");
                SystemClock
                    .now_secs()
                    .map_err(|clock| CoreError::time_source(format!("{e}; {clock}")))
            }
        }
    }
}
