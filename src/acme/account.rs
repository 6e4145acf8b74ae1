// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME account identity and its persisted form.
//!
//! The account lives in the `clusterdomain-acme-account` secret. Only the operator
//! configurable inputs (contact email and which CA environment the directory URL points
//! at) feed the settings hash. The key and registration are assigned by the CA, so a
//! changed hash means the stored account no longer matches the configuration and must be
//! re-registered.

use super::AcmeError;
use crate::config::{FeatureConfig, LetsEncryptMode};
use crate::constants::{
    ACCOUNT_EMAIL_KEY, ACCOUNT_PRIVATE_KEY_KEY, ACCOUNT_REGISTRATION_KEY, ACCOUNT_URL_KEY,
    ACME_ACCOUNT_SECRET_NAME, DEFAULT_ACME_EMAIL, LETSENCRYPT_PRODUCTION_URL,
    LETSENCRYPT_STAGING_URL,
};
use crate::dns::state::secret_value;
use crate::labels::{
    ACCOUNT_HASH_ANNOTATION, K8S_MANAGED_BY, MANAGED_BY_CLUSTERDOMAIN, MANAGED_LABEL,
    MANAGED_LABEL_VALUE,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Operator-configurable inputs of an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSettings {
    pub email: String,
    pub directory_url: String,
}

impl AccountSettings {
    /// Derive the account settings from the feature configuration.
    ///
    /// Production (`enabled`) requires an email; every other mode uses the staging CA
    /// and falls back to a default contact.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::Configuration`] when production is selected without an email.
    pub fn from_config(config: &FeatureConfig) -> Result<Self, AcmeError> {
        let email = config.lets_encrypt_email.trim();
        let directory_url = if config.lets_encrypt == LetsEncryptMode::Enabled {
            if email.is_empty() {
                return Err(AcmeError::Configuration(
                    "letsEncryptEmail is required when letsEncrypt is enabled".to_string(),
                ));
            }
            LETSENCRYPT_PRODUCTION_URL
        } else {
            LETSENCRYPT_STAGING_URL
        };

        Ok(Self {
            email: if email.is_empty() {
                DEFAULT_ACME_EMAIL.to_string()
            } else {
                email.to_string()
            },
            directory_url: directory_url.to_string(),
        })
    }

    #[must_use]
    pub fn hash(&self) -> String {
        settings_hash(&self.directory_url, &self.email)
    }
}

/// Registered account as persisted in the account secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcmeAccount {
    pub email: String,
    pub directory_url: String,
    /// CA credentials as JSON (`instant_acme::AccountCredentials`)
    pub registration: String,
    /// Account key, PKCS#8 PEM
    pub private_key_pem: String,
}

impl AcmeAccount {
    /// Hash of the configurable fields, compared against [`AccountSettings::hash`].
    #[must_use]
    pub fn settings_hash(&self) -> String {
        settings_hash(&self.directory_url, &self.email)
    }

    /// Decode an account secret.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::AccountCreation`] when the secret carries no registration.
    pub fn from_secret(secret: &Secret) -> Result<Self, AcmeError> {
        let registration = secret_value(secret, ACCOUNT_REGISTRATION_KEY);
        if registration.is_empty() {
            return Err(AcmeError::AccountCreation(format!(
                "account secret {} has no registration",
                secret.metadata.name.as_deref().unwrap_or(ACME_ACCOUNT_SECRET_NAME)
            )));
        }
        Ok(Self {
            email: secret_value(secret, ACCOUNT_EMAIL_KEY),
            directory_url: secret_value(secret, ACCOUNT_URL_KEY),
            registration,
            private_key_pem: secret_value(secret, ACCOUNT_PRIVATE_KEY_KEY),
        })
    }

    /// Build the account secret in `namespace`.
    #[must_use]
    pub fn to_secret(&self, namespace: &str) -> Secret {
        let data = [
            (ACCOUNT_EMAIL_KEY, &self.email),
            (ACCOUNT_PRIVATE_KEY_KEY, &self.private_key_pem),
            (ACCOUNT_REGISTRATION_KEY, &self.registration),
            (ACCOUNT_URL_KEY, &self.directory_url),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.clone().into_bytes())))
        .collect();

        Secret {
            metadata: ObjectMeta {
                name: Some(ACME_ACCOUNT_SECRET_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([
                    (MANAGED_LABEL.to_string(), MANAGED_LABEL_VALUE.to_string()),
                    (
                        K8S_MANAGED_BY.to_string(),
                        MANAGED_BY_CLUSTERDOMAIN.to_string(),
                    ),
                ])),
                annotations: Some(BTreeMap::from([(
                    ACCOUNT_HASH_ANNOTATION.to_string(),
                    self.settings_hash(),
                )])),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    /// Parse the stored credentials for use with instant-acme.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::Serialization`] if the registration is not valid credentials JSON.
    pub fn credentials(&self) -> Result<instant_acme::AccountCredentials, AcmeError> {
        Ok(serde_json::from_str(&self.registration)?)
    }
}

/// Map a directory URL to the environment name used in the settings hash.
#[must_use]
pub fn environment_for_url(directory_url: &str) -> &'static str {
    match directory_url {
        LETSENCRYPT_STAGING_URL => "staging",
        LETSENCRYPT_PRODUCTION_URL => "enabled",
        _ => "disabled",
    }
}

/// SHA-256 hex digest of `"{environment}-{email}"`.
#[must_use]
pub fn settings_hash(directory_url: &str, email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{email}", environment_for_url(directory_url)).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Encode the account key of `credentials` as PKCS#8 PEM.
///
/// # Errors
///
/// Returns [`AcmeError::AccountCreation`] if the key is not a usable private key.
pub fn private_key_pem(
    credentials: &instant_acme::AccountCredentials,
) -> Result<String, AcmeError> {
    let der = credentials.private_key().secret_pkcs8_der();
    let key = rcgen::KeyPair::try_from(der)
        .map_err(|e| AcmeError::AccountCreation(format!("unreadable account key: {e}")))?;
    Ok(key.serialize_pem())
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod account_tests;
