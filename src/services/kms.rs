// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token encryption with Cloud KMS.
//!
//! Tokens are encrypted directly with a symmetric KMS key. Each ciphertext
//! carries the credential's document ID as additional authenticated data, so
//! a token copied onto another athlete's record will not decrypt.

use crate::error::SyncError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use google_cloud_googleapis::cloud::kms::v1::{DecryptRequest, EncryptRequest};
use google_cloud_kms::client::{Client, ClientConfig};
use std::sync::Arc;

const KEY_RING: &str = "activity-sync";

fn crypto(context: &str, e: impl std::fmt::Display) -> SyncError {
    SyncError::Crypto(format!("{context}: {e}"))
}

#[derive(Clone)]
enum Backend {
    Cloud(Arc<Client>),
    /// Reversible encoding that still enforces the AAD binding.
    #[cfg(debug_assertions)]
    Mock,
}

#[derive(Clone)]
pub struct KmsService {
    /// `projects/{p}/locations/{l}/keyRings/{ring}/cryptoKeys/{key}`
    key_path: String,
    backend: Backend,
}

impl KmsService {
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, SyncError> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| crypto("KMS auth", e))?;
        let client = Client::new(config)
            .await
            .map_err(|e| crypto("KMS client", e))?;

        Ok(Self {
            key_path: format!(
                "projects/{project_id}/locations/{location}/keyRings/{KEY_RING}/cryptoKeys/{key_name}"
            ),
            backend: Backend::Cloud(Arc::new(client)),
        })
    }

    /// Offline stand-in for tests. Not available in release builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: format!("projects/mock/locations/mock/keyRings/{KEY_RING}/cryptoKeys/mock"),
            backend: Backend::Mock,
        }
    }

    /// Encrypt `plaintext` bound to `aad`; returns base64 ciphertext.
    pub async fn encrypt(&self, plaintext: &str, aad: &[u8]) -> Result<String, SyncError> {
        let ciphertext = match &self.backend {
            Backend::Cloud(client) => {
                let request = EncryptRequest {
                    name: self.key_path.clone(),
                    plaintext: plaintext.as_bytes().to_vec(),
                    additional_authenticated_data: aad.to_vec(),
                    ..Default::default()
                };
                client
                    .encrypt(request, None)
                    .await
                    .map_err(|e| crypto("KMS encrypt", e))?
                    .ciphertext
            }
            #[cfg(debug_assertions)]
            Backend::Mock => format!("{}:{}", BASE64.encode(aad), plaintext).into_bytes(),
        };

        Ok(BASE64.encode(ciphertext))
    }

    /// Decrypt base64 ciphertext that was sealed with the same `aad`.
    pub async fn decrypt(&self, ciphertext_b64: &str, aad: &[u8]) -> Result<String, SyncError> {
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| crypto("ciphertext is not base64", e))?;

        let plaintext = match &self.backend {
            Backend::Cloud(client) => {
                let request = DecryptRequest {
                    name: self.key_path.clone(),
                    ciphertext,
                    additional_authenticated_data: aad.to_vec(),
                    ..Default::default()
                };
                client
                    .decrypt(request, None)
                    .await
                    .map_err(|e| crypto("KMS decrypt", e))?
                    .plaintext
            }
            #[cfg(debug_assertions)]
            Backend::Mock => {
                let prefix = format!("{}:", BASE64.encode(aad));
                ciphertext
                    .strip_prefix(prefix.as_bytes())
                    .ok_or_else(|| SyncError::Crypto("KMS decrypt: AAD mismatch".to_string()))?
                    .to_vec()
            }
        };

        String::from_utf8(plaintext).map_err(|e| crypto("token is not UTF-8", e))
    }

    /// Encrypt an access/refresh pair under the same AAD.
    pub async fn seal_pair(
        &self,
        access_token: &str,
        refresh_token: &str,
        aad: &[u8],
    ) -> Result<(String, String), SyncError> {
        let access = self.encrypt(access_token, aad).await?;
        let refresh = self.encrypt(refresh_token, aad).await?;
        Ok((access, refresh))
    }
}
