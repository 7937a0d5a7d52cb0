//! [`ApiClient`] over the walrus HTTP API.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{decode_events, ApiClient, EventStream};
use crate::config::ClientConfig;
use crate::error::{check_status, status_error, ManifestError, ManifestResult};
use crate::object::ObjectScope;

/// HTTP client authenticating with a bearer token.
pub struct HttpApiClient {
    config: ClientConfig,
    client: Client,
    /// Client without request timeout, for long-lived watches.
    watch_client: Client,
}

impl HttpApiClient {
    pub fn new(config: ClientConfig) -> ManifestResult<Self> {
        let mut builder = Client::builder().danger_accept_invalid_certs(config.insecure);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        let watch_client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            config,
            client,
            watch_client,
        })
    }

    /// `<server>/v1/projects/{p}/environments/{e}/{group}[/suffix]`
    fn url(&self, group: &str, scope: &ObjectScope, suffix: Option<&str>) -> String {
        let mut url = format!(
            "{}/v1/projects/{}/environments/{}/{}",
            self.config.server.trim_end_matches('/'),
            scope.project,
            scope.environment,
            group
        );
        if let Some(suffix) = suffix {
            url.push('/');
            url.push_str(suffix);
        }
        url
    }

    fn request(&self, client: &Client, method: Method, url: &str) -> RequestBuilder {
        debug!("{} {}", method, url);
        let req = client.request(method, url);
        if self.config.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.config.token)
        }
    }

    async fn send(&self, req: RequestBuilder) -> ManifestResult<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), body))
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn get_object(
        &self,
        group: &str,
        scope: &ObjectScope,
        name: &str,
    ) -> ManifestResult<Option<Value>> {
        let url = self.url(group, scope, Some(name));
        let resp = self.request(&self.client, Method::GET, &url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        check_status(status, body.as_str())?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn create_objects(&self, group: &str, scope: &ObjectScope, body: &Value) -> ManifestResult<()> {
        let url = self.url(group, scope, Some("_/batch"));
        self.send(self.request(&self.client, Method::POST, &url).json(body))
            .await?;
        Ok(())
    }

    async fn patch_object(
        &self,
        group: &str,
        scope: &ObjectScope,
        name: &str,
        body: &Value,
    ) -> ManifestResult<()> {
        let url = self.url(group, scope, Some(name));
        self.send(self.request(&self.client, Method::PATCH, &url).json(body))
            .await?;
        Ok(())
    }

    async fn delete_objects(&self, group: &str, scope: &ObjectScope, names: &[String]) -> ManifestResult<()> {
        let url = self.url(group, scope, None);
        let items: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
        self.send(
            self.request(&self.client, Method::DELETE, &url)
                .json(&json!({ "items": items })),
        )
        .await?;
        Ok(())
    }

    async fn watch(&self, group: &str, scope: &ObjectScope) -> ManifestResult<EventStream> {
        let url = self.url(group, scope, None);
        let resp = self
            .send(
                self.request(&self.watch_client, Method::GET, &url)
                    .query(&[("watch", "true")])
                    .header(reqwest::header::ACCEPT, "text/event-stream"),
            )
            .await?;

        Ok(decode_events(resp.bytes_stream().map_err(ManifestError::from)))
    }
}
