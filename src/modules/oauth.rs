//! Google 凭证获取 (Application Default Credentials)
//!
//! Resolution order:
//! 1. `GOOGLE_OAUTH_ACCESS_TOKEN`
//! 2. `GOOGLE_APPLICATION_CREDENTIALS`, falling back to the gcloud well-known file
//!    (`service_account` or `authorized_user`)
//! 3. The GCE / Cloud Run metadata server

use std::path::PathBuf;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::modules::logger;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// No expiry is known for a raw env token; assume it is short-lived.
const ENV_TOKEN_LIFETIME_SECS: i64 = 600;

/// A freshly issued access token and its lifetime in seconds.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: i64,
}

/// Source of OAuth access tokens for the Vertex AI API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> AppResult<AccessToken>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl From<TokenResponse> for AccessToken {
    fn from(res: TokenResponse) -> Self {
        Self {
            token: res.access_token,
            expires_in: res.expires_in,
        }
    }
}

/// Credential file formats understood by the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

impl CredentialsFile {
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AppError::OAuth(format!("Invalid credentials file: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// ADC-backed token source.
pub struct GoogleCredentials {
    http: Client,
    token_url: String,
    metadata_url: String,
}

impl GoogleCredentials {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            token_url: TOKEN_URL.to_string(),
            metadata_url: METADATA_TOKEN_URL.to_string(),
        }
    }

    /// Overrides the OAuth token endpoint used for refresh-token grants.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Overrides the metadata server token endpoint.
    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    /// Explicit credentials path, or the gcloud well-known file if it exists.
    fn credentials_path() -> Option<(PathBuf, bool)> {
        if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), true));
            }
        }

        let gcloud_dir = if cfg!(windows) {
            dirs::config_dir().map(|d| d.join("gcloud"))
        } else {
            dirs::home_dir().map(|d| d.join(".config").join("gcloud"))
        };
        let well_known = gcloud_dir?.join("application_default_credentials.json");

        well_known.exists().then_some((well_known, false))
    }

    pub async fn load_credentials_file(path: &PathBuf) -> AppResult<CredentialsFile> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::OAuth(format!("Failed to read credentials {:?}: {}", path, e)))?;
        CredentialsFile::from_json(&content)
    }

    async fn from_credentials(&self, creds: &CredentialsFile) -> AppResult<AccessToken> {
        match creds {
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => {
                let aud = token_uri.as_deref().unwrap_or(&self.token_url);
                self.exchange_jwt(client_email, private_key, aud).await
            }
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => {
                self.refresh_access_token(client_id, client_secret, refresh_token)
                    .await
            }
        }
    }

    /// Service account JWT bearer grant.
    async fn exchange_jwt(
        &self,
        client_email: &str,
        private_key: &str,
        aud: &str,
    ) -> AppResult<AccessToken> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
            .map_err(|e| AppError::OAuth(format!("Invalid RSA private key (PEM): {}", e)))?;
        let assertion = encode(&header, &claims, &key)
            .map_err(|e| AppError::OAuth(format!("Failed to sign JWT: {}", e)))?;

        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        self.post_token_form(aud, &params).await
    }

    /// 使用 refresh_token 刷新 access_token
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> AppResult<AccessToken> {
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.post_token_form(&self.token_url, &params).await
    }

    async fn post_token_form(&self, url: &str, params: &[(&str, &str)]) -> AppResult<AccessToken> {
        let response = self
            .http
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::OAuth(format!("Token request failed: {}", e)))?;

        if response.status().is_success() {
            let token = response
                .json::<TokenResponse>()
                .await
                .map_err(|e| AppError::OAuth(format!("Token response parse failed: {}", e)))?;
            tracing::debug!("Token refreshed, expires in {}s", token.expires_in);
            Ok(token.into())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::OAuth(format!(
                "Token endpoint returned {}: {}",
                status, error_text
            )))
        }
    }

    pub(crate) async fn from_metadata_server(&self) -> AppResult<AccessToken> {
        let response = self
            .http
            .get(&self.metadata_url)
            .query(&[("scopes", CLOUD_PLATFORM_SCOPE)])
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AppError::OAuth(format!("Metadata server request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::OAuth(format!(
                "Metadata server returned {}",
                response.status()
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::OAuth(format!("Metadata token parse failed: {}", e)))?;
        Ok(token.into())
    }
}

#[async_trait]
impl TokenSource for GoogleCredentials {
    async fn fetch_token(&self) -> AppResult<AccessToken> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(AccessToken {
                    token,
                    expires_in: ENV_TOKEN_LIFETIME_SECS,
                });
            }
        }

        if let Some((path, explicit)) = Self::credentials_path() {
            match Self::load_credentials_file(&path).await {
                Ok(creds) => return self.from_credentials(&creds).await,
                // An explicitly configured file must be usable.
                Err(e) if explicit => return Err(e),
                Err(e) => logger::log_warn(&format!(
                    "Ignoring gcloud default credentials: {}",
                    e
                )),
            }
        }

        self.from_metadata_server().await
    }
}
