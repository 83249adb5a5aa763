//! Sync gateway for the remote record store.
//!
//! Pull mirrors the configured group's records into local storage before the
//! pipeline runs; push sends every dirty record back afterwards. One
//! record's push failure never blocks the rest, and the dirty flag survives
//! until the remote acknowledges the send.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use refsync_shared::{
    ApiConfig, Record, RefsyncError, Result, fingerprint, parse_timestamp,
};
use refsync_storage::Storage;

/// User-Agent string for sync requests.
const USER_AGENT: &str = concat!("refsync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A record as returned by the bulk API.
#[derive(Debug, Deserialize)]
struct WireRecord {
    id: i64,
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    reference: String,
    group_id: i64,
    #[serde(default)]
    created_by: String,
    created_at: String,
    updated_at: String,
}

/// `action=get_records` response body.
#[derive(Debug, Deserialize)]
struct PullResponse {
    records: Vec<WireRecord>,
}

/// Summary of a push pass.
#[derive(Debug, Default, Clone)]
pub struct PushSummary {
    /// Records acknowledged by the remote store.
    pub pushed: usize,
    /// Records whose send failed; their dirty flag is retained.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// SyncGateway
// ---------------------------------------------------------------------------

/// Client for the remote record store's bulk API.
pub struct SyncGateway {
    client: Client,
    bulk_api_url: String,
    bearer_token: String,
    group_id: i64,
}

impl SyncGateway {
    /// Create a gateway from the `[api]` configuration section.
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RefsyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            bulk_api_url: api.bulk_api_url.clone(),
            bearer_token: api.bearer_token.clone(),
            group_id: api.group_id,
        })
    }

    /// Pull all records for the configured group and upsert them locally.
    ///
    /// Returns the number of records mirrored. The fingerprint is recomputed
    /// from the incoming text rather than trusted from the wire.
    #[instrument(skip_all, fields(group_id = self.group_id))]
    pub async fn pull(&self, storage: &Storage) -> Result<usize> {
        let url = format!(
            "{}?action=get_records&group_id={}",
            self.bulk_api_url, self.group_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| RefsyncError::Network(format!("pull: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefsyncError::Network(format!("pull: HTTP {status}")));
        }

        let body: PullResponse = response
            .json()
            .await
            .map_err(|e| RefsyncError::parse(format!("pull response: {e}")))?;

        let mut count = 0;
        for wire in body.records {
            let record = match to_record(wire) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "skipping malformed pulled record");
                    continue;
                }
            };
            storage.upsert_record(&record).await?;
            count += 1;
        }

        info!(count, "pulled records");
        Ok(count)
    }

    /// Push every dirty record individually, clearing the flag only on an
    /// acknowledged send.
    #[instrument(skip_all)]
    pub async fn push(&self, storage: &Storage) -> Result<PushSummary> {
        let dirty = storage.dirty_records().await?;
        let url = format!("{}?action=update_record", self.bulk_api_url);

        let mut summary = PushSummary::default();
        for record in dirty {
            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.bearer_token)
                .json(&serde_json::json!({ "id": record.id, "text": record.text }))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    storage.clear_dirty(record.id).await?;
                    summary.pushed += 1;
                    debug!(id = record.id, "push acknowledged");
                }
                Ok(response) => {
                    warn!(id = record.id, status = %response.status(), "push rejected");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(id = record.id, error = %e, "push failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            pushed = summary.pushed,
            failed = summary.failed,
            "push complete"
        );
        Ok(summary)
    }
}

/// Convert a wire record into a stored record, recomputing the fingerprint
/// from the incoming text.
fn to_record(wire: WireRecord) -> Result<Record> {
    let created_at = parse_timestamp(&wire.created_at)?;
    let updated_at = parse_timestamp(&wire.updated_at)?;
    let hash = fingerprint(&wire.text);

    Ok(Record {
        id: wire.id,
        title: wire.title,
        text: wire.text,
        reference: wire.reference,
        group_id: wire.group_id,
        created_by: wire.created_by,
        created_at,
        updated_at,
        deleted: false,
        hash,
        update_flg: false,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use refsync_shared::fingerprint;
    use wiremock::matchers::{body_json, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_config(server: &MockServer) -> ApiConfig {
        ApiConfig {
            bearer_token: "test-token".into(),
            group_id: 7,
            bulk_api_url: format!("{}/bulk", server.uri()),
        }
    }

    async fn test_storage() -> (tempfile::TempDir, Storage) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let storage = Storage::open(&tmp.path().join("records.db"))
            .await
            .expect("open test db");
        (tmp, storage)
    }

    #[tokio::test]
    async fn pull_upserts_records_with_recomputed_fingerprint() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "records": [
                {
                    "id": 1,
                    "title": "First",
                    "text": "alpha",
                    "reference": "/srv/a.txt",
                    "group_id": 7,
                    "created_by": "importer",
                    "created_at": "2020-01-01 00:00:00",
                    "updated_at": "2020-06-01 12:00:00"
                },
                {
                    "id": 2,
                    "title": "Second",
                    "text": "",
                    "reference": "",
                    "group_id": 7,
                    "created_by": "importer",
                    "created_at": "2020-01-01 00:00:00",
                    "updated_at": "2020-01-01 00:00:00"
                }
            ]
        });

        Mock::given(method("GET"))
            .and(query_param("action", "get_records"))
            .and(query_param("group_id", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let (_tmp, storage) = test_storage().await;
        let gateway = SyncGateway::new(&api_config(&server)).unwrap();

        let count = gateway.pull(&storage).await.expect("pull");
        assert_eq!(count, 2);

        let first = storage.get_record(1).await.unwrap().unwrap();
        assert_eq!(first.title, "First");
        assert_eq!(first.hash, fingerprint("alpha"));
        assert_eq!(first.updated_at.to_rfc3339(), "2020-06-01T12:00:00+00:00");

        // Empty text maps to an empty fingerprint.
        let second = storage.get_record(2).await.unwrap().unwrap();
        assert_eq!(second.hash, "");
    }

    #[tokio::test]
    async fn pull_updates_existing_rows_in_place() {
        let server = MockServer::start().await;
        let make_body = |text: &str| {
            serde_json::json!({
                "records": [{
                    "id": 1,
                    "title": "Doc",
                    "text": text,
                    "reference": "/srv/a.txt",
                    "group_id": 7,
                    "created_by": "importer",
                    "created_at": "2020-01-01 00:00:00",
                    "updated_at": "2020-01-01 00:00:00"
                }]
            })
        };

        let (_tmp, storage) = test_storage().await;
        let gateway = SyncGateway::new(&api_config(&server)).unwrap();

        let first = Mock::given(method("GET"))
            .and(query_param("action", "get_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(make_body("v1")))
            .up_to_n_times(1)
            .mount_as_scoped(&server)
            .await;
        gateway.pull(&storage).await.unwrap();
        drop(first);

        Mock::given(method("GET"))
            .and(query_param("action", "get_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(make_body("v2")))
            .mount(&server)
            .await;
        gateway.pull(&storage).await.unwrap();

        let all = storage.list_records().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "v2");
        assert_eq!(all[0].hash, fingerprint("v2"));
    }

    #[tokio::test]
    async fn pull_http_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (_tmp, storage) = test_storage().await;
        let gateway = SyncGateway::new(&api_config(&server)).unwrap();

        let err = gateway.pull(&storage).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert!(storage.list_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_clears_flag_only_on_acknowledgement() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(query_param("action", "update_record"))
            .and(body_json(serde_json::json!({ "id": 1, "text": "alpha" })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(query_param("action", "update_record"))
            .and(body_json(serde_json::json!({ "id": 2, "text": "beta" })))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (_tmp, storage) = test_storage().await;
        for (id, text) in [(1, "alpha"), (2, "beta")] {
            let record = Record {
                id,
                title: format!("record {id}"),
                text: text.into(),
                reference: String::new(),
                group_id: 7,
                created_by: "tester".into(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
                deleted: false,
                hash: fingerprint(text),
                update_flg: false,
                error: None,
            };
            storage.upsert_record(&record).await.unwrap();
            storage.set_converted(id, text, &fingerprint(text)).await.unwrap();
        }

        let gateway = SyncGateway::new(&api_config(&server)).unwrap();
        let summary = gateway.push(&storage).await.expect("push");

        // The failing record does not block the batch...
        assert_eq!(summary.pushed, 1);
        assert_eq!(summary.failed, 1);

        // ...and keeps its dirty flag for the next run.
        let dirty = storage.dirty_records().await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id, 2);
    }

    #[tokio::test]
    async fn push_with_nothing_dirty_is_a_no_op() {
        let server = MockServer::start().await;
        let (_tmp, storage) = test_storage().await;
        let gateway = SyncGateway::new(&api_config(&server)).unwrap();

        let summary = gateway.push(&storage).await.unwrap();
        assert_eq!(summary.pushed, 0);
        assert_eq!(summary.failed, 0);
    }
}
