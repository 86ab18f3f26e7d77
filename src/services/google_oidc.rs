// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Verification of the OIDC ID tokens Cloud Tasks attaches to `/tasks/*`
//! callbacks.
//!
//! A token is accepted when it is an RS256 Google ID token whose audience
//! is this service's URL and whose verified email is the service account
//! that creates our tasks.

use crate::config::{tasks_service_account, Config};
use anyhow::Context;
use axum::http::HeaderValue;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const FALLBACK_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Caller identity of a verified task callback.
#[derive(Debug, Clone)]
pub struct TaskPrincipal {
    pub email: String,
    pub subject: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OidcError {
    /// Token missing, malformed or issued for someone else
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Key material could not be fetched; the task should be retried
    #[error("transient: {0}")]
    Transient(String),
}

enum KeySource {
    /// Google's published JWKS, cached per `Cache-Control`
    Google {
        http: reqwest::Client,
        jwks_uri: RwLock<Option<Cached<String>>>,
        keys: RwLock<Option<Cached<HashMap<String, Arc<DecodingKey>>>>>,
        refresh: Mutex<()>,
    },
    /// A single fixed key, for local runs and tests
    Static {
        kid: String,
        key: Arc<DecodingKey>,
    },
}

struct Cached<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Cached<T> {
    fn fresh(&self) -> Option<&T> {
        (self.expires_at > Instant::now()).then_some(&self.value)
    }
}

/// Verifier for Cloud Tasks OIDC tokens.
pub struct GoogleOidcVerifier {
    audience: String,
    service_account_email: String,
    source: KeySource,
}

impl GoogleOidcVerifier {
    /// Production verifier backed by Google's JWKS.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        let verifier = Self::with_source(
            config,
            KeySource::Google {
                http,
                jwks_uri: RwLock::new(None),
                keys: RwLock::new(None),
                refresh: Mutex::new(()),
            },
        );
        tracing::info!(
            audience = %verifier.audience,
            service_account = %verifier.service_account_email,
            "Initialized Cloud Tasks OIDC verifier"
        );
        Ok(verifier)
    }

    /// Verifier that trusts one RSA public key under `kid`.
    pub fn with_static_key(
        config: &Config,
        kid: impl Into<String>,
        key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static OIDC kid must not be empty");
        }
        Ok(Self::with_source(
            config,
            KeySource::Static {
                kid,
                key: Arc::new(key),
            },
        ))
    }

    fn with_source(config: &Config, source: KeySource) -> Self {
        Self {
            audience: config.service_url.trim_end_matches('/').to_string(),
            service_account_email: tasks_service_account(&config.gcp_project_id),
            source,
        }
    }

    /// Check the bearer token of a task callback.
    pub async fn verify(&self, auth_header: Option<&HeaderValue>) -> Result<TaskPrincipal, OidcError> {
        let token = bearer_token(auth_header)?;

        let header = decode_header(token)
            .map_err(|e| OidcError::Forbidden(format!("invalid JWT header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(OidcError::Forbidden(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| OidcError::Forbidden("missing JWT kid".to_string()))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdTokenClaims>(token, key.as_ref(), &validation)
            .map_err(|e| OidcError::Forbidden(format!("JWT validation failed: {e}")))?
            .claims;

        match claims.iat {
            None => return Err(OidcError::Forbidden("missing iat claim".to_string())),
            Some(iat) if iat > now_unix_secs() + CLOCK_SKEW_SECS => {
                return Err(OidcError::Forbidden("iat claim is in the future".to_string()))
            }
            Some(_) => {}
        }

        let email = claims
            .email
            .ok_or_else(|| OidcError::Forbidden("missing email claim".to_string()))?;
        if email != self.service_account_email {
            return Err(OidcError::Forbidden(format!(
                "unexpected service account email: {email}"
            )));
        }
        if claims.email_verified != Some(true) {
            return Err(OidcError::Forbidden("email is not verified".to_string()));
        }

        Ok(TaskPrincipal {
            email,
            subject: claims.sub,
        })
    }

    async fn key_for(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        let (http, jwks_uri, keys, refresh) = match &self.source {
            KeySource::Static { kid: known, key } if known == kid => return Ok(key.clone()),
            KeySource::Static { .. } => {
                return Err(OidcError::Forbidden(format!("unknown JWT kid: {kid}")))
            }
            KeySource::Google {
                http,
                jwks_uri,
                keys,
                refresh,
            } => (http, jwks_uri, keys, refresh),
        };

        let cached = |keys: &Option<Cached<HashMap<String, Arc<DecodingKey>>>>| {
            keys.as_ref()
                .and_then(Cached::fresh)
                .and_then(|by_kid| by_kid.get(kid).cloned())
        };
        if let Some(key) = cached(&*keys.read().await) {
            return Ok(key);
        }

        // A kid we have not seen may mean Google rotated keys: refetch once
        // from the cached location, then once more after rediscovery.
        let _guard = refresh.lock().await;
        for rediscover in [false, true] {
            let uri = resolve_jwks_uri(http, jwks_uri, rediscover).await;
            let (fetched, ttl) = fetch_jwks(http, &uri).await?;
            *keys.write().await = Some(Cached {
                value: fetched,
                expires_at: Instant::now() + ttl,
            });
            if let Some(key) = cached(&*keys.read().await) {
                return Ok(key);
            }
        }

        Err(OidcError::Forbidden(format!(
            "JWT kid not found in JWKS: {kid}"
        )))
    }
}

async fn resolve_jwks_uri(
    http: &reqwest::Client,
    cache: &RwLock<Option<Cached<String>>>,
    force: bool,
) -> String {
    let previous = {
        let cache = cache.read().await;
        if !force {
            if let Some(uri) = cache.as_ref().and_then(Cached::fresh) {
                return uri.clone();
            }
        }
        cache.as_ref().map(|c| c.value.clone())
    };
    let fallback = || previous.clone().unwrap_or_else(|| FALLBACK_JWKS_URL.to_string());

    let response = match http.get(DISCOVERY_URL).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            tracing::warn!(status = %response.status(), "OIDC discovery failed; using fallback JWKS URI");
            return fallback();
        }
        Err(e) => {
            tracing::warn!(error = %e, "OIDC discovery failed; using fallback JWKS URI");
            return fallback();
        }
    };
    let ttl = cache_ttl(response.headers());
    match response.json::<OpenIdConfig>().await {
        Ok(discovery) => {
            *cache.write().await = Some(Cached {
                value: discovery.jwks_uri.clone(),
                expires_at: Instant::now() + ttl,
            });
            discovery.jwks_uri
        }
        Err(e) => {
            tracing::warn!(error = %e, "Invalid OIDC discovery document");
            fallback()
        }
    }
}

async fn fetch_jwks(
    http: &reqwest::Client,
    uri: &str,
) -> Result<(HashMap<String, Arc<DecodingKey>>, Duration), OidcError> {
    tracing::debug!(jwks_uri = %uri, "Refreshing Google JWKS");
    let response = http
        .get(uri)
        .send()
        .await
        .map_err(|e| OidcError::Transient(format!("JWKS request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(OidcError::Transient(format!(
            "JWKS request returned status {}",
            response.status()
        )));
    }
    let ttl = cache_ttl(response.headers());
    let jwks: Jwks = response
        .json()
        .await
        .map_err(|e| OidcError::Transient(format!("invalid JWKS JSON: {e}")))?;

    let keys = usable_keys(jwks);
    if keys.is_empty() {
        return Err(OidcError::Transient(
            "JWKS has no usable RSA signing keys".to_string(),
        ));
    }
    Ok((keys, ttl))
}

/// RSA signing keys by kid; anything else in the set is skipped.
fn usable_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    jwks.keys
        .into_iter()
        .filter(|jwk| jwk.kty == "RSA" && !jwk.kid.trim().is_empty())
        .filter(|jwk| jwk.alg.as_deref().map_or(true, |alg| alg == "RS256"))
        .filter(|jwk| jwk.use_.as_deref().map_or(true, |use_| use_ == "sig"))
        .filter_map(|jwk| match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => Some((jwk.kid, Arc::new(key))),
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid JWKS key");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: Option<u64>,
    email: Option<String>,
    email_verified: Option<bool>,
}

fn bearer_token(auth_header: Option<&HeaderValue>) -> Result<&str, OidcError> {
    let value = auth_header
        .ok_or_else(|| OidcError::Forbidden("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| OidcError::Forbidden("invalid Authorization header".to_string()))?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        Some(_) => Err(OidcError::Forbidden("Bearer token is empty".to_string())),
        None => Err(OidcError::Forbidden(
            "Authorization header must be a Bearer token".to_string(),
        )),
    }
}

fn cache_ttl(headers: &HeaderMap) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(max_age)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_CACHE_TTL)
}

/// `max-age` of a Cache-Control value.
fn max_age(cache_control: &str) -> Option<u64> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse().ok())
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
