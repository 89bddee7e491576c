use crate::sync::{QueryFetcher, QueryKey};
use crate::types::constants::OWNER_COLUMN;
use crate::types::{RealtimeError, Result};
use serde_json::Value;
use url::Url;

/// Reads rows from the backend's REST endpoint to refill stale cache entries.
///
/// A query key `[table, user_id, ..]` maps to
/// `GET {base}/rest/v1/{table}?select=*&user_id=eq.{user_id}`. Extra key segments
/// only distinguish cache entries and do not change the request.
pub struct PostgrestFetcher {
    base_endpoint: String,
    api_key: String,
    access_token: Option<String>,
    http: reqwest::Client,
}

impl PostgrestFetcher {
    pub fn new(base_endpoint: String, api_key: String, access_token: Option<String>) -> Self {
        Self {
            base_endpoint,
            api_key,
            access_token,
            http: reqwest::Client::new(),
        }
    }

    /// Builds a fetcher that talks to the same project as a realtime endpoint
    pub fn for_realtime_endpoint(
        ws_endpoint: &str,
        api_key: String,
        access_token: Option<String>,
    ) -> Result<Self> {
        let base = rest_base_url(ws_endpoint)?;
        Ok(Self::new(base, api_key, access_token))
    }

    pub fn rows_url(&self, key: &QueryKey) -> Result<Url> {
        let (Some(table), Some(user_id)) = (key.segment(0), key.segment(1)) else {
            return Err(RealtimeError::InvalidQueryKey(key.to_string()));
        };

        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_endpoint, table))?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair(OWNER_COLUMN, &format!("eq.{}", user_id));
        Ok(url)
    }
}

impl QueryFetcher for PostgrestFetcher {
    async fn fetch(&self, key: &QueryKey) -> Result<Value> {
        let url = self.rows_url(key)?;

        let mut request = self
            .http
            .get(url.clone())
            .header("apikey", &self.api_key)
            .header("Accept", "application/json");

        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(RealtimeError::Connection(format!(
                "REST read for '{}' failed with status: {}",
                key,
                response.status()
            )));
        }

        let rows: Value = response.json().await?;
        tracing::debug!("Fetched {} from {}", key, url);
        Ok(rows)
    }
}

/// Converts WebSocket endpoint to HTTP endpoint
pub fn ws_to_http_endpoint(ws_endpoint: &str) -> String {
    ws_endpoint
        .replace("ws://", "http://")
        .replace("wss://", "https://")
        .split('?')
        .next()
        .unwrap_or(ws_endpoint)
        .to_string()
}

/// Scheme, host and port of the project behind a realtime endpoint
pub fn rest_base_url(ws_endpoint: &str) -> Result<String> {
    let url = Url::parse(&ws_to_http_endpoint(ws_endpoint))?;
    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_to_http_endpoint() {
        assert_eq!(
            ws_to_http_endpoint("wss://proj.supabase.co/realtime/v1?apikey=x"),
            "https://proj.supabase.co/realtime/v1"
        );
        assert_eq!(
            ws_to_http_endpoint("ws://localhost:4000/realtime/v1"),
            "http://localhost:4000/realtime/v1"
        );
    }

    #[test]
    fn test_rest_base_url_strips_path() {
        assert_eq!(
            rest_base_url("wss://proj.supabase.co/realtime/v1").unwrap(),
            "https://proj.supabase.co"
        );
        assert_eq!(
            rest_base_url("ws://localhost:54321/realtime/v1").unwrap(),
            "http://localhost:54321"
        );
    }

    #[test]
    fn test_rows_url_from_query_key() {
        let fetcher = PostgrestFetcher::for_realtime_endpoint(
            "wss://proj.supabase.co/realtime/v1",
            "anon".to_string(),
            None,
        )
        .unwrap();

        let url = fetcher
            .rows_url(&QueryKey::new(["expenses", "u1", "2025-11"]))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://proj.supabase.co/rest/v1/expenses?select=*&user_id=eq.u1"
        );
    }

    #[test]
    fn test_rows_url_needs_table_and_user() {
        let fetcher = PostgrestFetcher::new(
            "https://proj.supabase.co".to_string(),
            "anon".to_string(),
            None,
        );
        assert!(matches!(
            fetcher.rows_url(&QueryKey::new(["expenses"])),
            Err(RealtimeError::InvalidQueryKey(_))
        ));
    }
}
