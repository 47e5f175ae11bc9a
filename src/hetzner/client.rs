//! `reqwest` implementation of [`CloudApi`].

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::api::{
    Action, CloudApi, CloudFuture, CreateNetwork, CreateServer, CreatedServer, Labels, Network,
    Server,
};
use super::error::CloudError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 50;

/// Authenticated HTTP client for the Hetzner Cloud API.
#[derive(Clone, Debug)]
pub struct HttpCloudApi {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Default, Deserialize)]
struct Meta {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct Pagination {
    next_page: Option<u32>,
}

#[derive(Deserialize)]
struct NetworkPage {
    networks: Vec<Network>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Deserialize)]
struct ServerPage {
    servers: Vec<Server>,
    #[serde(default)]
    meta: Meta,
}

trait Page: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<u32>);
}

impl Page for NetworkPage {
    type Item = Network;

    fn into_parts(self) -> (Vec<Network>, Option<u32>) {
        (self.networks, self.meta.pagination.and_then(|p| p.next_page))
    }
}

impl Page for ServerPage {
    type Item = Server;

    fn into_parts(self) -> (Vec<Server>, Option<u32>) {
        (self.servers, self.meta.pagination.and_then(|p| p.next_page))
    }
}

#[derive(Deserialize)]
struct NetworkEnvelope {
    network: Network,
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

impl HttpCloudApi {
    /// Builds a client for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::Transport`] when the TLS backend cannot be
    /// initialised.
    pub fn new(base_url: &str, token: &str) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("devkube/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| CloudError::Transport {
                endpoint: base_url.to_owned(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<String, CloudError> {
        let response = request.send().await.map_err(|err| CloudError::Transport {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|err| CloudError::Transport {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })?;
        if status.is_success() {
            return Ok(body);
        }
        Err(api_error(endpoint, status, &body))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, CloudError> {
        let endpoint = format!("{method} {path}");
        let mut request = self.request(method, path);
        if let Some(payload) = body {
            request = request.json(&payload);
        }
        let raw = self.send(&endpoint, request).await?;
        serde_json::from_str(&raw).map_err(|err| CloudError::Decode {
            endpoint,
            message: err.to_string(),
        })
    }

    async fn list_all<P: Page>(
        &self,
        path: &str,
        selector: &str,
    ) -> Result<Vec<P::Item>, CloudError> {
        let endpoint = format!("GET {path}");
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let request = self.request(Method::GET, path).query(&[
                ("label_selector", selector.to_owned()),
                ("page", page.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ]);
            let raw = self.send(&endpoint, request).await?;
            let parsed: P = serde_json::from_str(&raw).map_err(|err| CloudError::Decode {
                endpoint: endpoint.clone(),
                message: err.to_string(),
            })?;
            let (batch, next) = parsed.into_parts();
            items.extend(batch);
            match next {
                Some(next_page) if next_page > page => page = next_page,
                _ => return Ok(items),
            }
        }
    }
}

fn api_error(endpoint: &str, status: StatusCode, body: &str) -> CloudError {
    let (code, message) = serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| (String::from("unknown"), body.trim().to_owned()),
        |envelope| (envelope.error.code, envelope.error.message),
    );
    CloudError::Api {
        endpoint: endpoint.to_owned(),
        status: status.as_u16(),
        code,
        message,
    }
}

impl CloudApi for HttpCloudApi {
    fn list_networks<'a>(&'a self, selector: &'a str) -> CloudFuture<'a, Vec<Network>> {
        Box::pin(self.list_all::<NetworkPage>("/networks", selector))
    }

    fn create_network<'a>(&'a self, request: &'a CreateNetwork) -> CloudFuture<'a, Network> {
        Box::pin(async move {
            let body = serde_json::to_value(request).map_err(|err| CloudError::Decode {
                endpoint: String::from("POST /networks"),
                message: err.to_string(),
            })?;
            let envelope: NetworkEnvelope =
                self.call(Method::POST, "/networks", Some(body)).await?;
            Ok(envelope.network)
        })
    }

    fn update_network_labels<'a>(
        &'a self,
        id: u64,
        labels: &'a Labels,
    ) -> CloudFuture<'a, Network> {
        Box::pin(async move {
            let envelope: NetworkEnvelope = self
                .call(
                    Method::PUT,
                    &format!("/networks/{id}"),
                    Some(json!({ "labels": labels })),
                )
                .await?;
            Ok(envelope.network)
        })
    }

    fn delete_network(&self, id: u64) -> CloudFuture<'_, ()> {
        Box::pin(async move {
            let path = format!("/networks/{id}");
            let endpoint = format!("DELETE {path}");
            self.send(&endpoint, self.request(Method::DELETE, &path))
                .await
                .map(|_| ())
        })
    }

    fn list_servers<'a>(&'a self, selector: &'a str) -> CloudFuture<'a, Vec<Server>> {
        Box::pin(self.list_all::<ServerPage>("/servers", selector))
    }

    fn get_server(&self, id: u64) -> CloudFuture<'_, Option<Server>> {
        Box::pin(async move {
            match self
                .call::<ServerEnvelope>(Method::GET, &format!("/servers/{id}"), None)
                .await
            {
                Ok(envelope) => Ok(Some(envelope.server)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            }
        })
    }

    fn create_server<'a>(&'a self, request: &'a CreateServer) -> CloudFuture<'a, CreatedServer> {
        Box::pin(async move {
            let body = serde_json::to_value(request).map_err(|err| CloudError::Decode {
                endpoint: String::from("POST /servers"),
                message: err.to_string(),
            })?;
            self.call(Method::POST, "/servers", Some(body)).await
        })
    }

    fn update_server_labels<'a>(&'a self, id: u64, labels: &'a Labels) -> CloudFuture<'a, Server> {
        Box::pin(async move {
            let envelope: ServerEnvelope = self
                .call(
                    Method::PUT,
                    &format!("/servers/{id}"),
                    Some(json!({ "labels": labels })),
                )
                .await?;
            Ok(envelope.server)
        })
    }

    fn attach_to_network(&self, server: u64, network: u64) -> CloudFuture<'_, Action> {
        Box::pin(async move {
            let envelope: ActionEnvelope = self
                .call(
                    Method::POST,
                    &format!("/servers/{server}/actions/attach_to_network"),
                    Some(json!({ "network": network })),
                )
                .await?;
            Ok(envelope.action)
        })
    }

    fn power_on(&self, server: u64) -> CloudFuture<'_, Action> {
        Box::pin(async move {
            let envelope: ActionEnvelope = self
                .call(
                    Method::POST,
                    &format!("/servers/{server}/actions/poweron"),
                    None,
                )
                .await?;
            Ok(envelope.action)
        })
    }

    fn delete_server(&self, id: u64) -> CloudFuture<'_, Action> {
        Box::pin(async move {
            let envelope: ActionEnvelope = self
                .call(Method::DELETE, &format!("/servers/{id}"), None)
                .await?;
            Ok(envelope.action)
        })
    }

    fn get_action(&self, id: u64) -> CloudFuture<'_, Action> {
        Box::pin(async move {
            let envelope: ActionEnvelope = self
                .call(Method::GET, &format!("/actions/{id}"), None)
                .await?;
            Ok(envelope.action)
        })
    }
}
