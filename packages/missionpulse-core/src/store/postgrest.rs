//! Row store backed by the hosted datastore's PostgREST interface.
//!
//! Tables are exposed at `{base_url}/rest/v1/{table}`. Filters use the
//! `column=eq.value` syntax; writes ask for `return=representation` so the
//! stored row (with its assigned id) comes back in the response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;

use super::{FetchQuery, RowStore};
use crate::error::StoreError;
use crate::record::{Fields, Record, RecordId};

/// HTTP client for a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PostgrestStore {
    /// Creates a store for `base_url` authenticated with a service key.
    ///
    /// # Arguments
    /// * `base_url` - Project URL, e.g. `https://xyz.supabase.co`
    /// * `api_key` - Service role key sent as `apikey` and bearer token
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    /// `StoreError::Connection` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }

    fn returning(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, table)
            .header("Prefer", "return=representation")
    }
}

/// Builds the query-string pairs for a bulk read.
pub(crate) fn fetch_query_pairs(query: &FetchQuery) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    for (field, value) in &query.filters {
        pairs.push((field.clone(), eq_filter(value)));
    }
    if let Some(field) = &query.order_by {
        let direction = if query.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{}", field, direction)));
    }
    pairs.push(("limit".to_string(), query.limit.to_string()));
    pairs
}

fn eq_filter(value: &Value) -> String {
    match value {
        Value::String(s) => format!("eq.{}", s),
        other => format!("eq.{}", other),
    }
}

fn id_pair(id: &RecordId) -> [(String, String); 1] {
    [("id".to_string(), format!("eq.{}", id))]
}

fn map_transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else if e.is_connect() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

async fn read_rows(response: Response) -> Result<Vec<Record>, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Backend(format!("{}: {}", status, body)));
    }

    let rows: Vec<Value> = response
        .json()
        .await
        .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;

    rows.into_iter()
        .map(|row| {
            Record::from_row(row)
                .ok_or_else(|| StoreError::MalformedResponse("Row without id".to_string()))
        })
        .collect()
}

#[async_trait]
impl RowStore for PostgrestStore {
    async fn fetch_all(&self, table: &str, query: &FetchQuery) -> Result<Vec<Record>, StoreError> {
        let response = self
            .request(Method::GET, table)
            .query(&fetch_query_pairs(query))
            .send()
            .await
            .map_err(map_transport_error)?;
        read_rows(response).await
    }

    async fn fetch_one(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*"), ("limit", "1")])
            .query(&id_pair(id))
            .send()
            .await
            .map_err(map_transport_error)?;
        Ok(read_rows(response).await?.into_iter().next())
    }

    async fn insert(&self, table: &str, fields: Fields) -> Result<Record, StoreError> {
        let response = self
            .returning(Method::POST, table)
            .json(&fields)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::MalformedResponse("Insert returned no row".to_string()))
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Option<Record>, StoreError> {
        let response = self
            .returning(Method::PATCH, table)
            .query(&id_pair(id))
            .json(&fields)
            .send()
            .await
            .map_err(map_transport_error)?;
        Ok(read_rows(response).await?.into_iter().next())
    }

    async fn delete(&self, table: &str, id: &RecordId) -> Result<bool, StoreError> {
        let response = self
            .returning(Method::DELETE, table)
            .query(&id_pair(id))
            .send()
            .await
            .map_err(map_transport_error)?;
        Ok(!read_rows(response).await?.is_empty())
    }
}
