//! Jenkins adapter for the [`IdentityProvider`] capabilities.
//!
//! Users are managed through the built-in security realm and tokens through
//! the `ApiTokenProperty` descriptor of the configured (admin) user.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::ConnectionConfig;

use super::{ApiToken, ClientFactory, DownstreamError, IdentityProvider, UserRecord};

const TOKEN_DESCRIPTOR: &str = "/me/descriptorByName/jenkins.security.ApiTokenProperty";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Crumb {
    crumb: String,
    crumb_request_field: String,
}

#[derive(Debug, Deserialize)]
struct GenerateTokenResponse {
    status: String,
    data: Option<GeneratedToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedToken {
    token_name: String,
    token_uuid: String,
    token_value: String,
}

/// Jenkins REST client bound to one configuration.
pub struct JenkinsClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: SecretString,
    crumb: Mutex<CrumbState>,
}

#[derive(Debug, Clone)]
enum CrumbState {
    Unknown,
    Disabled,
    Issued(Crumb),
}

impl JenkinsClient {
    pub fn new(config: &ConnectionConfig, timeout: Option<Duration>) -> Result<Self, DownstreamError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| DownstreamError::InvalidConfig(format!("url {base_url:?}: {e}")))?;

        // Jenkins answers successful form posts with a redirect; keep it
        // visible instead of following it. The cookie store keeps the session
        // that crumbs are bound to.
        let mut builder = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: SecretString::from(config.password.clone()),
            crumb: Mutex::new(CrumbState::Unknown),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    /// The CSRF crumb for this client's session, fetched on first use. A 404
    /// from the issuer means crumbs are disabled.
    async fn crumb(&self) -> Result<Option<Crumb>, DownstreamError> {
        let mut state = self.crumb.lock().await;
        if let CrumbState::Unknown = *state {
            *state = match self.fetch_crumb().await? {
                Some(crumb) => CrumbState::Issued(crumb),
                None => CrumbState::Disabled,
            };
        }
        Ok(match &*state {
            CrumbState::Issued(crumb) => Some(crumb.clone()),
            CrumbState::Unknown | CrumbState::Disabled => None,
        })
    }

    async fn fetch_crumb(&self) -> Result<Option<Crumb>, DownstreamError> {
        let response = self
            .authed(self.http.get(self.url("/crumbIssuer/api/json")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let crumb: Crumb = check(response).await?.json().await?;
        Ok(Some(crumb))
    }

    async fn send_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Response, DownstreamError> {
        let mut request = self.authed(self.http.post(self.url(path))).form(form);
        if let Some(crumb) = self.crumb().await? {
            request = request.header(crumb.crumb_request_field.as_str(), crumb.crumb.as_str());
        }
        Ok(request.send().await?)
    }

    /// POST a form. A 403 that blames the crumb (expired session) refetches
    /// it and retries once.
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Response, DownstreamError> {
        let response = self.send_form(path, form).await?;
        if response.status() != StatusCode::FORBIDDEN {
            return check(response).await;
        }

        let body = response.text().await.unwrap_or_default();
        if !body.to_lowercase().contains("crumb") {
            return Err(DownstreamError::Status {
                status: StatusCode::FORBIDDEN.as_u16(),
                body,
            });
        }

        tracing::debug!(path = %path, "Crumb rejected, refetching");
        *self.crumb.lock().await = CrumbState::Unknown;
        let response = self.send_form(path, form).await?;
        check(response).await
    }
}

async fn check(response: Response) -> Result<Response, DownstreamError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(DownstreamError::NotFound);
    }
    if status.is_success() || status.is_redirection() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DownstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IdentityProvider for JenkinsClient {
    async fn validate(&self) -> Result<(), DownstreamError> {
        let response = self.authed(self.http.get(self.url("/api/json"))).send().await?;
        check(response).await?;
        Ok(())
    }

    async fn create_user(
        &self,
        username: &str,
        password: &SecretString,
        fullname: &str,
        email: &str,
    ) -> Result<UserRecord, DownstreamError> {
        let password = password.expose_secret();
        let response = self
            .post_form(
                "/securityRealm/createAccountByAdmin",
                &[
                    ("username", username),
                    ("password1", password),
                    ("password2", password),
                    ("fullname", fullname),
                    ("email", email),
                ],
            )
            .await?;

        // Success redirects; a rejected form (taken name, bad email) is
        // re-rendered with 200.
        if !response.status().is_redirection() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DownstreamError::InvalidResponse(format!(
                "account creation answered {status} instead of a redirect: {body}"
            )));
        }

        Ok(UserRecord {
            username: username.to_string(),
            fullname: fullname.to_string(),
            email: email.to_string(),
        })
    }

    async fn delete_user(&self, username: &str) -> Result<(), DownstreamError> {
        let path = format!(
            "/securityRealm/user/{}/doDelete",
            urlencoding::encode(username)
        );
        self.post_form(&path, &[]).await?;
        Ok(())
    }

    async fn generate_token(&self, name: &str) -> Result<ApiToken, DownstreamError> {
        let response = self
            .post_form(
                &format!("{TOKEN_DESCRIPTOR}/generateNewToken"),
                &[("newTokenName", name)],
            )
            .await?;

        let body: GenerateTokenResponse = response.json().await?;
        if body.status != "ok" {
            return Err(DownstreamError::InvalidResponse(format!(
                "token generation returned status {:?}",
                body.status
            )));
        }
        let data = body.data.ok_or_else(|| {
            DownstreamError::InvalidResponse("token generation returned no data".to_string())
        })?;

        Ok(ApiToken {
            name: data.token_name,
            id: data.token_uuid,
            value: SecretString::from(data.token_value),
        })
    }

    async fn revoke_token(&self, token_id: &str) -> Result<(), DownstreamError> {
        self.post_form(
            &format!("{TOKEN_DESCRIPTOR}/revoke"),
            &[("tokenUuid", token_id)],
        )
        .await?;
        Ok(())
    }
}

/// Builds [`JenkinsClient`]s with a shared request timeout.
#[derive(Debug, Clone, Default)]
pub struct JenkinsClientFactory {
    timeout: Option<Duration>,
}

impl JenkinsClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ClientFactory for JenkinsClientFactory {
    fn build(&self, config: &ConnectionConfig) -> Result<Arc<dyn IdentityProvider>, DownstreamError> {
        Ok(Arc::new(JenkinsClient::new(config, self.timeout)?))
    }
}
