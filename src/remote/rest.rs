use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{Credentials, RemoteStore};
use crate::core::config::RemoteSettings;
use crate::core::error::{Result, StorageFailure};

const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

/// Row shape written on upsert
#[derive(Debug, Serialize)]
struct KvRow<'a> {
    key: &'a str,
    value: &'a str,
    updated_at: DateTime<Utc>,
}

/// Row shape returned by `select=value`
#[derive(Debug, Deserialize)]
struct ValueRow {
    value: Option<String>,
}

/// PostgREST client for one key/value table
pub struct RestClient {
    http: reqwest::Client,
    table_url: Url,
    table: String,
}

impl RestClient {
    /// Build a client without contacting the server.
    pub fn new(credentials: &Credentials, settings: &RemoteSettings) -> Result<Self> {
        let table_url = table_url(&credentials.url, &settings.table)?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&credentials.api_key)?);
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", credentials.api_key))?,
        );

        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent())
            .timeout(settings.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            table_url,
            table: settings.table.clone(),
        })
    }

    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    fn select_url(&self, key: &str) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "value")
            .append_pair("key", &format!("eq.{key}"));
        url
    }

    fn upsert_url(&self) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut().append_pair("on_conflict", "key");
        url
    }

    fn ping_url(&self) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "key")
            .append_pair("limit", "1");
        url
    }
}

/// `<endpoint>/rest/v1/<table>`, keeping any path prefix of the endpoint.
fn table_url(endpoint: &str, table: &str) -> Result<Url> {
    let invalid = |source| StorageFailure::InvalidEndpoint {
        url: endpoint.to_string(),
        source,
    };

    let mut base = Url::parse(endpoint.trim()).map_err(invalid)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("rest/v1/{table}")).map_err(invalid)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| StorageFailure::InvalidApiKey)
}

/// Turn a non-success response into [`StorageFailure::Status`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageFailure::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for RestClient {
    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        let response = self.http.get(self.select_url(key)).send().await?;
        let rows: Vec<ValueRow> = check(response).await?.json().await?;

        debug!(table = %self.table, key, rows = rows.len(), "Fetched remote row");
        Ok(rows.into_iter().next().and_then(|row| row.value))
    }

    async fn upsert(&self, key: &str, value: &str) -> Result<()> {
        let rows = [KvRow {
            key,
            value,
            updated_at: Utc::now(),
        }];

        let response = self
            .http
            .post(self.upsert_url())
            .header("Prefer", UPSERT_PREFERENCE)
            .json(&rows)
            .send()
            .await?;
        check(response).await?;

        debug!(table = %self.table, key, "Upserted remote row");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let response = self.http.get(self.ping_url()).send().await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> RestClient {
        let credentials = Credentials {
            url: url.to_string(),
            api_key: "anon-key".to_string(),
        };
        RestClient::new(&credentials, &RemoteSettings::default()).unwrap()
    }

    #[test]
    fn table_url_appends_rest_path() {
        let c = client("https://abc.example.co");
        assert_eq!(c.table_url().as_str(), "https://abc.example.co/rest/v1/kv_store");
    }

    #[test]
    fn table_url_keeps_path_prefix() {
        let c = client("https://gateway.example.com/db");
        assert_eq!(
            c.table_url().as_str(),
            "https://gateway.example.com/db/rest/v1/kv_store"
        );

        let c = client("https://gateway.example.com/db/");
        assert_eq!(
            c.table_url().as_str(),
            "https://gateway.example.com/db/rest/v1/kv_store"
        );
    }

    #[test]
    fn select_url_filters_on_key() {
        let c = client("https://abc.example.co");
        let url = c.select_url("crm contacts&x");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), "value".to_string()),
                ("key".to_string(), "eq.crm contacts&x".to_string()),
            ]
        );
    }

    #[test]
    fn upsert_url_names_conflict_column() {
        let c = client("https://abc.example.co");
        assert_eq!(c.upsert_url().query(), Some("on_conflict=key"));
        assert_eq!(c.ping_url().query(), Some("select=key&limit=1"));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let credentials = Credentials {
            url: "not a url".to_string(),
            api_key: "k".to_string(),
        };
        let err = RestClient::new(&credentials, &RemoteSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, StorageFailure::InvalidEndpoint { .. }));
    }

    #[test]
    fn api_key_with_newline_is_rejected() {
        let credentials = Credentials {
            url: "https://abc.example.co".to_string(),
            api_key: "bad\nkey".to_string(),
        };
        let err = RestClient::new(&credentials, &RemoteSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, StorageFailure::InvalidApiKey));
    }

    #[test]
    fn upsert_row_serializes_timestamp() {
        let row = KvRow {
            key: "k",
            value: "v",
            updated_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value([row]).unwrap();
        assert_eq!(json[0]["key"], "k");
        assert_eq!(json[0]["value"], "v");
        assert_eq!(json[0]["updated_at"], "2026-01-02T03:04:05Z");
    }
}
