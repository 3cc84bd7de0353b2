//! Supabase REST API client using service_role key

use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::Config;

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    /// Authenticated request against a table, with an optional PostgREST query
    fn request(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        let mut url = format!("{}/rest/v1/{}", self.base_url, table);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        self.client
            .request(method, url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .header(header::CONTENT_TYPE, "application/json")
    }

    async fn send(request: RequestBuilder) -> Result<Response, SupabaseError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api { status, body });
        }
        Ok(response)
    }

    /// Rows matching `query`
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, SupabaseError> {
        let response = Self::send(self.request(Method::GET, table, query)).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Number of rows matching `query`, without transferring them
    pub async fn count(&self, table: &str, query: &str) -> Result<u64, SupabaseError> {
        let request = self
            .request(Method::HEAD, table, query)
            .header("Prefer", "count=exact");
        let response = Self::send(request).await?;

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or(SupabaseError::MissingCount)
    }

    /// Insert one row and return it as stored
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let request = self
            .request(Method::POST, table, "")
            .header("Prefer", "return=representation")
            .json(data);
        let response = Self::send(request).await?;

        // PostgREST returns an array, get first element
        let rows: Vec<R> = response.json().await.map_err(SupabaseError::Parse)?;
        rows.into_iter().next().ok_or(SupabaseError::NoRowReturned)
    }

    /// Insert, ignoring a row that conflicts on `on_conflict`
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        data: &T,
        on_conflict: &str,
    ) -> Result<(), SupabaseError> {
        let query = format!("on_conflict={}", on_conflict);
        let request = self
            .request(Method::POST, table, &query)
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(data);
        Self::send(request).await?;
        Ok(())
    }
}

/// Total from a PostgREST `Content-Range` header (`0-24/3573`, `*/0`)
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.parse().ok()
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,

    #[error("Response carried no row count")]
    MissingCount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
