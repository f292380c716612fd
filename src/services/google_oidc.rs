// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Verification of Google-signed ID tokens presented by internal callers.
//!
//! Cloud Scheduler (for `/tasks/*`) and the job-creation client (for
//! `/jobs`) both call with an ID token minted for the internal service
//! account. A token is accepted only if it is RS256-signed by a current
//! Google key, addressed to this service, and names the expected, verified
//! service account email.

use crate::config::Config;
use anyhow::Context;
use axum::http::HeaderValue;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const FALLBACK_KEY_TTL: Duration = Duration::from_secs(300);
const LEEWAY_SECS: u64 = 60;

/// The internal caller a token was issued to.
#[derive(Debug, Clone)]
pub struct VerifiedServicePrincipal {
    pub email: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub enum OidcError {
    /// Bad or missing token, or claims that don't match. Never retry.
    Forbidden(String),
    /// Google's key endpoint could not be reached; the caller may retry.
    Transient(String),
}

fn forbidden(reason: impl Into<String>) -> OidcError {
    OidcError::Forbidden(reason.into())
}

/// Where signing keys come from.
enum KeySource {
    /// Google's published JWKS, cached for its advertised lifetime.
    Google {
        http: reqwest::Client,
        cached: RwLock<Option<CachedKeys>>,
        // Serializes refetches so a burst of unknown kids costs one request.
        refetch: Mutex<()>,
    },
    /// A single fixed key, for tests.
    Pinned {
        kid: String,
        key: Arc<DecodingKey>,
    },
}

struct CachedKeys {
    by_kid: HashMap<String, Arc<DecodingKey>>,
    fresh_until: Instant,
}

impl CachedKeys {
    fn get(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        if self.fresh_until <= Instant::now() {
            return None;
        }
        self.by_kid.get(kid).cloned()
    }
}

pub struct GoogleOidcVerifier {
    audience: String,
    service_account: String,
    keys: KeySource,
}

impl GoogleOidcVerifier {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed building JWKS HTTP client")?;

        let verifier = Self::build(
            config,
            KeySource::Google {
                http,
                cached: RwLock::new(None),
                refetch: Mutex::new(()),
            },
        );
        tracing::info!(
            audience = %verifier.audience,
            service_account = %verifier.service_account,
            "Service token verifier ready"
        );
        Ok(verifier)
    }

    /// Verifier that trusts exactly one key, identified by `kid`.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        anyhow::ensure!(!kid.trim().is_empty(), "pinned key id must not be empty");
        Ok(Self::build(
            config,
            KeySource::Pinned {
                kid,
                key: Arc::new(key),
            },
        ))
    }

    fn build(config: &Config, keys: KeySource) -> Self {
        Self {
            audience: config.api_url.trim_end_matches('/').to_string(),
            service_account: config.internal_service_account(),
            keys,
        }
    }

    /// Check the `Authorization: Bearer` header of an internal request.
    pub async fn verify_service_token(
        &self,
        authorization: Option<&HeaderValue>,
    ) -> Result<VerifiedServicePrincipal, OidcError> {
        let token = bearer_token(authorization)?;

        let header =
            decode_header(token).map_err(|e| forbidden(format!("unreadable token header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(forbidden(format!("token signed with {:?}", header.alg)));
        }
        let kid = header.kid.ok_or_else(|| forbidden("token has no kid"))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS[..]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = LEEWAY_SECS;

        let claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| forbidden(format!("token rejected: {e}")))?
            .claims;

        self.principal_from(claims, Utc::now().timestamp())
    }

    /// The checks `jsonwebtoken` doesn't do for us.
    fn principal_from(
        &self,
        claims: IdTokenClaims,
        now: i64,
    ) -> Result<VerifiedServicePrincipal, OidcError> {
        match claims.iat {
            None => return Err(forbidden("token has no iat")),
            Some(iat) if iat > now + LEEWAY_SECS as i64 => {
                return Err(forbidden("token issued in the future"))
            }
            Some(_) => {}
        }

        let email = match (claims.email, claims.email_verified) {
            (Some(email), Some(true)) if email == self.service_account => email,
            (Some(email), Some(true)) => {
                return Err(forbidden(format!("token is for {email}")));
            }
            (Some(_), _) => return Err(forbidden("token email is not verified")),
            (None, _) => return Err(forbidden("token has no email")),
        };

        Ok(VerifiedServicePrincipal {
            email,
            subject: claims.sub,
        })
    }

    async fn key_for(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        let (http, cached, refetch) = match &self.keys {
            KeySource::Pinned { kid: pinned, key } if pinned == kid => return Ok(key.clone()),
            KeySource::Pinned { .. } => return Err(forbidden(format!("unknown kid {kid}"))),
            KeySource::Google {
                http,
                cached,
                refetch,
            } => (http, cached, refetch),
        };

        if let Some(key) = cached.read().await.as_ref().and_then(|c| c.get(kid)) {
            return Ok(key);
        }

        let _guard = refetch.lock().await;
        // Another request may have refreshed the set while we waited.
        if let Some(key) = cached.read().await.as_ref().and_then(|c| c.get(kid)) {
            return Ok(key);
        }

        let fresh = fetch_google_keys(http).await?;
        let key = fresh.by_kid.get(kid).cloned();
        *cached.write().await = Some(fresh);

        key.ok_or_else(|| forbidden(format!("kid {kid} is not a current Google key")))
    }
}

async fn fetch_google_keys(http: &reqwest::Client) -> Result<CachedKeys, OidcError> {
    let transient = |what: &str, e: &dyn std::fmt::Display| {
        OidcError::Transient(format!("Google JWKS {what}: {e}"))
    };

    let response = http
        .get(GOOGLE_JWKS_URL)
        .send()
        .await
        .map_err(|e| transient("request failed", &e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(transient("returned", &status));
    }

    let ttl = max_age(response.headers()).unwrap_or(FALLBACK_KEY_TTL);
    let jwks: Jwks = response
        .json()
        .await
        .map_err(|e| transient("body unreadable", &e))?;

    let by_kid: HashMap<_, _> = jwks
        .keys
        .into_iter()
        .filter(Jwk::is_rs256_signing_key)
        .filter_map(|jwk| match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => Some((jwk.kid, Arc::new(key))),
            Err(e) => {
                tracing::warn!(kid = %jwk.kid, error = %e, "Ignoring malformed JWKS key");
                None
            }
        })
        .collect();

    if by_kid.is_empty() {
        return Err(OidcError::Transient(
            "Google JWKS contained no usable keys".to_string(),
        ));
    }

    tracing::debug!(keys = by_kid.len(), ttl_secs = ttl.as_secs(), "Fetched Google JWKS");
    Ok(CachedKeys {
        by_kid,
        fresh_until: Instant::now() + ttl,
    })
}

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    #[serde(rename = "use")]
    usage: Option<String>,
    n: String,
    e: String,
}

impl Jwk {
    fn is_rs256_signing_key(&self) -> bool {
        self.kty == "RSA"
            && !self.kid.trim().is_empty()
            && self.alg.as_deref().is_none_or(|alg| alg == "RS256")
            && self.usage.as_deref().is_none_or(|u| u == "sig")
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: Option<i64>,
    email: Option<String>,
    email_verified: Option<bool>,
}

fn bearer_token(authorization: Option<&HeaderValue>) -> Result<&str, OidcError> {
    let value = authorization
        .ok_or_else(|| forbidden("no Authorization header"))?
        .to_str()
        .map_err(|_| forbidden("Authorization header is not ASCII"))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        Some(_) => Err(forbidden("empty bearer token")),
        None => Err(forbidden("Authorization is not a bearer token")),
    }
}

/// `max-age` from a Cache-Control header, if present and numeric.
fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(CACHE_CONTROL)?
        .to_str()
        .ok()?
        .split(',')
        .find_map(|directive| directive.trim().strip_prefix("max-age="))
        .and_then(|secs| secs.trim_matches('"').parse().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> GoogleOidcVerifier {
        let config = Config {
            api_url: "https://sync.example.run.app/".to_string(),
            ..Config::default()
        };
        GoogleOidcVerifier::new_with_static_key(&config, "k1", DecodingKey::from_secret(b"x"))
            .unwrap()
    }

    fn claims(email: Option<&str>, verified: Option<bool>, iat: Option<i64>) -> IdTokenClaims {
        IdTokenClaims {
            sub: "1234".to_string(),
            iat,
            email: email.map(str::to_string),
            email_verified: verified,
        }
    }

    #[test]
    fn test_audience_drops_trailing_slash() {
        assert_eq!(verifier().audience, "https://sync.example.run.app");
    }

    #[test]
    fn test_expected_service_account_accepted() {
        let v = verifier();
        let sa = v.service_account.clone();
        let principal = v
            .principal_from(claims(Some(&sa), Some(true), Some(1000)), 1000)
            .unwrap();
        assert_eq!(principal.email, sa);
        assert_eq!(principal.subject, "1234");
    }

    #[test]
    fn test_claim_mismatches_forbidden() {
        let v = verifier();
        let sa = v.service_account.clone();
        let cases = [
            claims(Some("someone@else.iam.gserviceaccount.com"), Some(true), Some(1000)),
            claims(Some(&sa), Some(false), Some(1000)),
            claims(Some(&sa), None, Some(1000)),
            claims(None, Some(true), Some(1000)),
            claims(Some(&sa), Some(true), None),
            claims(Some(&sa), Some(true), Some(1000 + 61)),
        ];
        for c in cases {
            let debug = format!("{c:?}");
            assert!(
                matches!(v.principal_from(c, 1000), Err(OidcError::Forbidden(_))),
                "{debug}"
            );
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        let ok = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(bearer_token(Some(&ok)).unwrap(), "abc.def.ghi");

        for bad in ["Basic abc", "Bearer ", "bearer abc"] {
            let value = HeaderValue::from_static(bad);
            assert!(bearer_token(Some(&value)).is_err(), "{bad}");
        }
        assert!(bearer_token(None).is_err());
    }

    #[test]
    fn test_max_age() {
        let mut headers = HeaderMap::new();
        assert_eq!(max_age(&headers), None);

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=21600"));
        assert_eq!(max_age(&headers), Some(Duration::from_secs(21600)));

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=soon"));
        assert_eq!(max_age(&headers), None);
    }
}
