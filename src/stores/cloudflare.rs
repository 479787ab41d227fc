//! Cloudflare zone custom certificates.
//!
//! Create: `POST {api}/zones/{zone}/custom_certificates`
//! Update: `PATCH {api}/zones/{zone}/custom_certificates/{id}`
//!
//! Authenticates with the global API key (`X-Auth-Key` / `X-Auth-Email`).
//! Cloudflare keeps the certificate id stable across updates.
//!
//! Before creating, the zone's certificates are listed and one already
//! holding the same leaf (same hosts and expiry) is updated instead. A sync
//! whose id write-back was lost therefore converges on the object it created.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{StoreBackend, StoreError, StoreKind, StoreObjectId, StoreRequirements, UpsertRequest};
use crate::certificate::CertificateInfo;
use crate::config::CloudflareConfig;
use crate::credentials::Credentials;

const STORE: StoreKind = StoreKind::Cloudflare;

pub const API_KEY_FIELD: &str = "api_key";
pub const EMAIL_FIELD: &str = "email";

/// Cloudflare treats this as "best compatibility" chain bundling
const BUNDLE_METHOD: &str = "ubiquitous";

const LIST_PAGE_SIZE: u32 = 50;

#[derive(Debug, Serialize)]
struct CustomCertificateRequest<'a> {
    certificate: &'a str,
    private_key: &'a str,
    bundle_method: &'static str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct CustomCertificate {
    id: String,
    #[serde(default)]
    hosts: Vec<String>,
    expires_on: Option<String>,
}

impl CustomCertificate {
    /// Whether this object was uploaded from the leaf described by `info`
    fn holds(&self, info: &CertificateInfo) -> bool {
        let expires = self
            .expires_on
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.timestamp());
        if expires != Some(info.not_after.timestamp()) {
            return false;
        }

        let remote: BTreeSet<&str> = self.hosts.iter().map(String::as_str).collect();
        let local: BTreeSet<&str> = info.hosts.iter().map(String::as_str).collect();
        !local.is_empty() && remote == local
    }
}

/// [`StoreBackend`] for Cloudflare custom certificates
#[derive(Debug, Clone)]
pub struct CloudflareStore {
    http: Client,
    api_url: String,
    timeout: Duration,
}

impl CloudflareStore {
    /// Build a backend on a shared HTTP client
    pub fn new(http: Client, config: &CloudflareConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        }
    }

    /// Zone certificates URL; annotation values are escaped as single segments
    fn certificates_url(&self, zone: &str, id: Option<&str>) -> Result<Url, StoreError> {
        let invalid = |reason: String| StoreError::RemoteRejected {
            store: STORE,
            message: format!("invalid Cloudflare API URL '{}': {}", self.api_url, reason),
        };

        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        {
            let mut segments =
                url.path_segments_mut().map_err(|_| invalid("not a base URL".to_string()))?;
            segments.pop_if_empty().extend(["zones", zone, "custom_certificates"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        credentials: &Credentials,
        body: Option<&CustomCertificateRequest<'_>>,
        target: Target<'_>,
    ) -> Result<Envelope<T>, StoreError> {
        debug!(method = %method, path = %url.path(), "calling Cloudflare API");

        let mut request = self
            .http
            .request(method, url)
            .timeout(self.timeout)
            .header("X-Auth-Key", credentials.expose(API_KEY_FIELD))
            .header("X-Auth-Email", credentials.expose(EMAIL_FIELD));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(request_error)?;

        let status = response.status();
        debug!(status = %status, "Cloudflare API responded");

        let text = response.text().await.map_err(request_error)?;
        let envelope = serde_json::from_str::<Envelope<T>>(&text).ok();
        let message = envelope
            .as_ref()
            .map(describe_errors)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status));

        if let Some(error) = classify_status(status, target, message.clone()) {
            return Err(error);
        }

        let envelope = envelope.ok_or_else(|| StoreError::TransientFailure {
            store: STORE,
            message: format!("unreadable response body (HTTP {})", status),
        })?;

        if !envelope.success {
            return Err(StoreError::RemoteRejected { store: STORE, message });
        }
        Ok(envelope)
    }

    /// Id of a zone certificate already holding this leaf, if any
    async fn find_existing(
        &self,
        zone: &str,
        info: &CertificateInfo,
        credentials: &Credentials,
    ) -> Result<Option<String>, StoreError> {
        let mut page = 1;
        loop {
            let mut url = self.certificates_url(zone, None)?;
            url.query_pairs_mut()
                .append_pair("per_page", &LIST_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let envelope: Envelope<Vec<CustomCertificate>> =
                self.send(Method::GET, url, credentials, None, Target::Zone(zone)).await?;

            let certificates = envelope.result.unwrap_or_default();
            if let Some(found) = certificates.into_iter().find(|c| c.holds(info)) {
                return Ok(Some(found.id));
            }

            let total_pages = envelope.result_info.map(|i| i.total_pages).unwrap_or(1);
            if page >= total_pages {
                return Ok(None);
            }
            page += 1;
        }
    }
}

/// What a request addresses, for 404 classification
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Zone(&'a str),
    Certificate(&'a str),
}

#[async_trait]
impl StoreBackend for CloudflareStore {
    fn kind(&self) -> StoreKind {
        STORE
    }

    fn requirements(&self) -> StoreRequirements {
        StoreRequirements {
            credential_fields: &[API_KEY_FIELD, EMAIL_FIELD],
            scope_key: "zone-id",
            scope_required: true,
            required_keys: &[],
            optional_keys: &[],
        }
    }

    async fn upsert(&self, request: UpsertRequest<'_>) -> Result<StoreObjectId, StoreError> {
        let zone = request.scope;
        let existing = match request.existing_id {
            Some(id) => Some(id.to_string()),
            None => {
                let found =
                    self.find_existing(zone, &request.certificate.info, request.credentials).await?;
                if let Some(id) = &found {
                    info!(id = %id, zone = %zone, "certificate already uploaded; updating it");
                }
                found
            }
        };

        let body = CustomCertificateRequest {
            certificate: &request.certificate.full_chain_pem,
            private_key: request.certificate.private_key.expose_secret(),
            bundle_method: BUNDLE_METHOD,
        };

        let envelope: Envelope<CustomCertificate> = match existing.as_deref() {
            Some(id) => {
                let url = self.certificates_url(zone, Some(id))?;
                let target = Target::Certificate(id);
                self.send(Method::PATCH, url, request.credentials, Some(&body), target).await?
            }
            None => {
                let url = self.certificates_url(zone, None)?;
                let target = Target::Zone(zone);
                self.send(Method::POST, url, request.credentials, Some(&body), target).await?
            }
        };

        match envelope.result {
            Some(cert) if !cert.id.is_empty() => Ok(StoreObjectId::new(cert.id)),
            _ => Err(StoreError::RemoteRejected {
                store: STORE,
                message: "response did not include a certificate id".to_string(),
            }),
        }
    }
}

fn request_error(error: reqwest::Error) -> StoreError {
    if error.is_builder() {
        // Only the credential headers can make a request unbuildable
        StoreError::AuthenticationFailed {
            store: STORE,
            message: format!("credentials cannot be sent as HTTP headers: {}", error),
        }
    } else {
        StoreError::TransientFailure { store: STORE, message: error.to_string() }
    }
}

fn classify_status(status: StatusCode, target: Target<'_>, message: String) -> Option<StoreError> {
    if status.is_success() {
        return None;
    }

    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::AuthenticationFailed { store: STORE, message }
        }
        StatusCode::NOT_FOUND => match target {
            Target::Certificate(id) => StoreError::NotFound { store: STORE, id: id.to_string() },
            Target::Zone(zone) => {
                StoreError::ScopeNotFound { store: STORE, scope: zone.to_string(), message }
            }
        },
        StatusCode::TOO_MANY_REQUESTS => StoreError::TransientFailure { store: STORE, message },
        s if s.is_server_error() => StoreError::TransientFailure { store: STORE, message },
        _ => StoreError::RemoteRejected { store: STORE, message },
    };
    Some(error)
}

fn describe_errors<T>(envelope: &Envelope<T>) -> String {
    envelope
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}
