//! Hosted backend speaking the PostgREST dialect.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;

use super::realtime::{self, RealtimeChannel};
use super::{ChangeFeed, RemoteBackend, SortOrder, Table};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

pub struct PostgrestBackend {
    client: Client,
    base_url: String,
    anon_key: String,
    channel_prefix: String,
}

impl PostgrestBackend {
    pub fn new(remote: &RemoteConfig, channel_prefix: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: remote.url.trim_end_matches('/').to_string(),
            anon_key: remote.anon_key.clone(),
            channel_prefix: channel_prefix.to_string(),
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, body))
    }
}

/// Map a non-success status onto the two failure kinds.
fn classify(status: u16, body: String) -> RemoteError {
    let message = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };
    match status {
        400 | 409 | 422 => RemoteError::Rejected(message),
        _ => RemoteError::Unavailable(message),
    }
}

fn order_param(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "created_at.asc",
        SortOrder::Descending => "created_at.desc",
    }
}

fn id_filter(id: &str) -> String {
    format!("eq.{}", id)
}

#[async_trait]
impl RemoteBackend for PostgrestBackend {
    async fn select(&self, table: Table, order: SortOrder) -> Result<Vec<Value>, RemoteError> {
        let request = self
            .request(Method::GET, table)
            .query(&[("select", "*"), ("order", order_param(order))]);
        let response = self.send(request).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("decode {}: {}", table, e)))
    }

    async fn insert(&self, table: Table, row: Value) -> Result<(), RemoteError> {
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }

    async fn update(&self, table: Table, id: &str, fields: Value) -> Result<(), RemoteError> {
        let request = self
            .request(Method::PATCH, table)
            .query(&[("id", id_filter(id))])
            .header("Prefer", "return=minimal")
            .json(&fields);
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), RemoteError> {
        let request = self
            .request(Method::DELETE, table)
            .query(&[("id", id_filter(id))]);
        self.send(request).await?;
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> Result<ChangeFeed, RemoteError> {
        let channel = RealtimeChannel::new(
            &self.base_url,
            &self.anon_key,
            format!("{}-{}", self.channel_prefix, table),
            table,
        )?;
        let (tx, feed) = ChangeFeed::channel(table);
        realtime::spawn(channel, tx);
        Ok(feed)
    }
}
