//! HTTP adapter for the WhatsApp web-gateway sidecar.
//!
//! Implements `wrb_core`'s `TransportPort` against the gateway's REST
//! surface and exposes the push-event stream reader. All reqwest failures
//! are mapped into `Error::Transport` at this boundary.

mod events;

pub use events::spawn_event_stream;

use async_trait::async_trait;
use reqwest::multipart;
use serde::{Deserialize, Serialize};

use wrb_core::{
    config::Config,
    domain::{AttachmentName, PhoneNumber},
    transport::{
        port::TransportPort,
        types::{LocalFile, OutgoingBundle, SessionStatus, UploadOutcome},
    },
    Error, Result,
};

pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(into_transport)?;
        Ok(Self {
            http,
            base_url: cfg.gateway_url.clone(),
            token: cfg.gateway_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn post_ok(&self, path: &str) -> Result<()> {
        let resp = self
            .authorized(self.http.post(self.url(path)))
            .send()
            .await
            .map_err(into_transport)?;
        ensure_success(resp).await.map(|_| ())
    }
}

fn into_transport(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Transport(format!("gateway returned {status}: {body}")))
}

#[derive(Serialize)]
struct SendBody<'a> {
    phone: &'a str,
    text: &'a str,
    attachments: Vec<&'a str>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

#[async_trait]
impl TransportPort for GatewayClient {
    async fn start_session(&self) -> Result<()> {
        self.post_ok("session/start").await
    }

    async fn stop_session(&self) -> Result<()> {
        self.post_ok("session/stop").await
    }

    async fn rekey_session(&self) -> Result<()> {
        self.post_ok("session/rekey").await
    }

    async fn session_status(&self) -> Result<SessionStatus> {
        let resp = self
            .authorized(self.http.get(self.url("session/status")))
            .send()
            .await
            .map_err(into_transport)?;
        let body: StatusBody = ensure_success(resp)
            .await?
            .json()
            .await
            .map_err(into_transport)?;
        Ok(SessionStatus::parse(&body.status))
    }

    async fn send_message(&self, to: &PhoneNumber, bundle: &OutgoingBundle) -> Result<()> {
        let body = SendBody {
            phone: &to.0,
            text: &bundle.text,
            attachments: bundle.attachments.iter().map(|a| a.0.as_str()).collect(),
        };
        let resp = self
            .authorized(self.http.post(self.url("messages")).json(&body))
            .send()
            .await
            .map_err(into_transport)?;
        ensure_success(resp).await.map(|_| ())
    }

    async fn upload_files(&self, files: Vec<LocalFile>) -> Result<UploadOutcome> {
        let mut form = multipart::Form::new();
        for f in files {
            let part = multipart::Part::bytes(f.bytes)
                .file_name(f.name)
                .mime_str(&f.mime)
                .map_err(into_transport)?;
            form = form.part("files", part);
        }

        let resp = self
            .authorized(self.http.post(self.url("files")).multipart(form))
            .send()
            .await
            .map_err(into_transport)?;
        let raw = ensure_success(resp)
            .await?
            .text()
            .await
            .map_err(into_transport)?;
        Ok(parse_upload_response(&raw))
    }

    async fn delete_file(&self, name: &AttachmentName) -> Result<()> {
        let resp = self
            .authorized(self.http.delete(self.url(&format!("files/{}", name.0))))
            .send()
            .await
            .map_err(into_transport)?;
        ensure_success(resp).await.map(|_| ())
    }
}

/// `{"names": [...]}` is the documented response shape; anything else
/// degrades to `Unparsed` so the caller can fall back to local names.
fn parse_upload_response(raw: &str) -> UploadOutcome {
    #[derive(Deserialize)]
    struct Names {
        names: Vec<String>,
    }

    match serde_json::from_str::<Names>(raw) {
        Ok(n) if !n.names.is_empty() => UploadOutcome::Named(n.names),
        _ => UploadOutcome::Unparsed,
    }
}
