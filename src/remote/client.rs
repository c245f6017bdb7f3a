// SPDX-License-Identifier: MPL-2.0

use crate::cache::BoundingBox;
use crate::config::APP_NAME;
use crate::remote::types::{Runestone, RunestoneRow, VisitedRow};
use crate::remote::{RemoteDataSource, RemoteError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use url::Url;

/// Talks to the Supabase PostgREST RPC endpoints backing the catalog.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    /// User access token; visited-status calls require it
    access_token: RwLock<Option<String>>,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, RemoteError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidResponse(format!("invalid API url: {e}")))?;

        // Url::join replaces the last segment unless the path ends in a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            access_token: RwLock::new(None),
        })
    }

    /// Install or drop the signed-in user's access token.
    pub fn set_access_token(&self, token: Option<String>) {
        let mut guard = self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = token;
    }

    fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn rpc_url(&self, function: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(&format!("rest/v1/rpc/{function}"))
            .map_err(|e| RemoteError::InvalidResponse(format!("invalid RPC url: {e}")))
    }

    /// POST an RPC call; `null` or an empty body decodes as `None`.
    async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        args: serde_json::Value,
        bearer: &str,
    ) -> Result<Option<T>, RemoteError> {
        let url = self.rpc_url(function)?;

        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .json(&args)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(function, status = status.as_u16(), "RPC call failed");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn catalog_rpc(
        &self,
        function: &str,
        args: serde_json::Value,
    ) -> Result<Vec<Runestone>, RemoteError> {
        let rows: Option<Vec<RunestoneRow>> = self.rpc(function, args, &self.api_key).await?;
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .map(Runestone::from)
            .collect())
    }

    async fn user_rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        args: serde_json::Value,
    ) -> Result<Option<T>, RemoteError> {
        let token = self.access_token().ok_or(RemoteError::NotAuthenticated)?;
        self.rpc(function, args, &token).await
    }
}

#[async_trait]
impl RemoteDataSource for SupabaseClient {
    async fn fetch_all(&self) -> Result<Vec<Runestone>, RemoteError> {
        self.catalog_rpc("get_all_runestones", json!({})).await
    }

    async fn fetch_by_bounds(&self, bbox: BoundingBox) -> Result<Vec<Runestone>, RemoteError> {
        self.catalog_rpc(
            "get_visible_runestones",
            json!({
                "p_west": bbox.west,
                "p_south": bbox.south,
                "p_east": bbox.east,
                "p_north": bbox.north,
            }),
        )
        .await
    }

    async fn fetch_visited_ids(&self, user_id: &str) -> Result<Vec<i64>, RemoteError> {
        let rows: Option<Vec<VisitedRow>> = self
            .user_rpc("get_all_visited_runestones", json!({ "p_user_id": user_id }))
            .await?;
        Ok(rows.unwrap_or_default().into_iter().map(|r| r.id).collect())
    }

    async fn mark_visited(&self, item_id: i64, user_id: &str) -> Result<bool, RemoteError> {
        let recorded: Option<bool> = self
            .user_rpc(
                "mark_runestone_as_visited",
                json!({ "p_signature_id": item_id, "p_user_id": user_id }),
            )
            .await?;
        Ok(recorded.unwrap_or(false))
    }

    async fn unmark_visited(&self, item_id: i64, user_id: &str) -> Result<bool, RemoteError> {
        let removed: Option<bool> = self
            .user_rpc(
                "delete_runestone_visited",
                json!({ "p_signature_id": item_id, "p_user_id": user_id }),
            )
            .await?;
        Ok(removed.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    /// What the stub server saw for one request.
    #[derive(Debug)]
    struct Seen {
        path: String,
        apikey: Option<String>,
        authorization: Option<String>,
        body: serde_json::Value,
    }

    fn header(request: &tiny_http::Request, name: &'static str) -> Option<String> {
        request
            .headers()
            .iter()
            .find(|h| h.field.equiv(name))
            .map(|h| h.value.as_str().to_string())
    }

    /// Serve one canned reply per entry, then hand back what was requested.
    fn stub_server(replies: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<Vec<Seen>>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();

        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in replies {
                let mut request = server.recv().unwrap();
                let mut raw = String::new();
                request.as_reader().read_to_string(&mut raw).unwrap();
                seen.push(Seen {
                    path: request.url().to_string(),
                    apikey: header(&request, "apikey"),
                    authorization: header(&request, "Authorization"),
                    body: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
                });
                let content_type =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(content_type);
                request.respond(response).unwrap();
            }
            seen
        });

        (format!("http://127.0.0.1:{port}"), handle)
    }

    #[tokio::test]
    async fn fetch_by_bounds_posts_bound_arguments() {
        let (url, server) = stub_server(vec![(
            200,
            r#"[{"id": 1, "signature_text": "U 1", "latitude": 59.8, "longitude": 17.6, "lost": 0}]"#,
        )]);
        let client = SupabaseClient::new(&url, "anon-key").unwrap();

        let stones = client
            .fetch_by_bounds(BoundingBox::new(17.0, 59.0, 18.0, 60.0))
            .await
            .unwrap();

        assert_eq!(stones.len(), 1);
        assert_eq!(stones[0].signature_text.as_deref(), Some("U 1"));

        let seen = server.join().unwrap();
        assert_eq!(seen[0].path, "/rest/v1/rpc/get_visible_runestones");
        assert_eq!(seen[0].apikey.as_deref(), Some("anon-key"));
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer anon-key"));
        assert_eq!(seen[0].body["p_west"], 17.0);
        assert_eq!(seen[0].body["p_north"], 60.0);
    }

    #[tokio::test]
    async fn null_body_is_an_empty_catalog() {
        let (url, server) = stub_server(vec![(200, "null")]);
        let client = SupabaseClient::new(&url, "anon-key").unwrap();

        assert!(client.fetch_all().await.unwrap().is_empty());
        server.join().unwrap();
    }

    #[tokio::test]
    async fn server_error_carries_status() {
        let (url, server) = stub_server(vec![(503, r#"{"message":"down"}"#)]);
        let client = SupabaseClient::new(&url, "anon-key").unwrap();

        let err = client.fetch_all().await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 503, .. }));
        assert!(err.is_retryable());
        server.join().unwrap();
    }

    #[tokio::test]
    async fn visited_calls_need_a_token() {
        let client = SupabaseClient::new("http://127.0.0.1:9", "anon-key").unwrap();

        let err = client.mark_visited(5, "user-1").await.unwrap_err();
        assert!(matches!(err, RemoteError::NotAuthenticated));
    }

    #[tokio::test]
    async fn visited_calls_use_the_user_token() {
        let (url, server) = stub_server(vec![(200, r#"[{"id": 3}, {"id": 9}]"#), (200, "true")]);
        let client = SupabaseClient::new(&url, "anon-key").unwrap();
        client.set_access_token(Some("user-jwt".to_string()));

        let ids = client.fetch_visited_ids("user-1").await.unwrap();
        assert_eq!(ids, vec![3, 9]);
        assert!(client.mark_visited(5, "user-1").await.unwrap());

        let seen = server.join().unwrap();
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer user-jwt"));
        assert_eq!(seen[0].body["p_user_id"], "user-1");
        assert_eq!(seen[1].path, "/rest/v1/rpc/mark_runestone_as_visited");
        assert_eq!(seen[1].body["p_signature_id"], 5);
    }
}
