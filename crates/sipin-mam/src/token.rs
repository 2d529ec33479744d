//! OAuth2 resource-owner password (ROPC) grant for MediaHaven.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const TOKEN_PATH: &str = "/auth/ropc.php";

/// Tokens are refreshed this long before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Credentials for the ROPC grant. Do not log; `Debug` is redacted.
#[derive(Clone)]
pub struct RopcGrant {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RopcGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RopcGrant")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct CachedToken {
    pub(crate) access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => now < at,
            None => true,
        }
    }
}

impl RopcGrant {
    /// Request a new access token from `{base_url}/auth/ropc.php`.
    pub(crate) async fn request_token(
        &self,
        http: &reqwest::Client,
        base_url: &str,
    ) -> Result<CachedToken> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH);
        let resp = http
            .post(url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .context("mediahaven token request failed")?;

        let status = resp.status();
        if !status.is_success() {
            // Body may echo the submitted form; never include it.
            return Err(anyhow!(
                "mediahaven token request rejected status={}",
                status.as_u16()
            ));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .context("mediahaven token response json decode failed")?;

        let expires_at = body
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(EXPIRY_MARGIN));

        Ok(CachedToken {
            access_token: body.access_token,
            expires_at,
        })
    }
}
