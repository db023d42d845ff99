// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing algorithms accepted for gateway tokens.
//!
//! The set is closed: only RSA families can be represented, so `none` and
//! the HMAC families can never be allowed, whatever the configuration says.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::ConfigError;

/// RSA signing algorithms a gateway may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SigningAlgorithm {
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
}

impl SigningAlgorithm {
    /// Parse a JOSE `alg` name. Matching is exact, as JOSE names are case-sensitive.
    pub fn from_name(name: &str) -> Option<SigningAlgorithm> {
        match name {
            "RS256" => Some(SigningAlgorithm::RS256),
            "RS384" => Some(SigningAlgorithm::RS384),
            "RS512" => Some(SigningAlgorithm::RS512),
            "PS256" => Some(SigningAlgorithm::PS256),
            "PS384" => Some(SigningAlgorithm::PS384),
            "PS512" => Some(SigningAlgorithm::PS512),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
            SigningAlgorithm::PS256 => "PS256",
            SigningAlgorithm::PS384 => "PS384",
            SigningAlgorithm::PS512 => "PS512",
        }
    }

    pub fn to_jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            SigningAlgorithm::RS256 => jsonwebtoken::Algorithm::RS256,
            SigningAlgorithm::RS384 => jsonwebtoken::Algorithm::RS384,
            SigningAlgorithm::RS512 => jsonwebtoken::Algorithm::RS512,
            SigningAlgorithm::PS256 => jsonwebtoken::Algorithm::PS256,
            SigningAlgorithm::PS384 => jsonwebtoken::Algorithm::PS384,
            SigningAlgorithm::PS512 => jsonwebtoken::Algorithm::PS512,
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty, duplicate-free allow-list of signing algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedAlgorithms(Vec<SigningAlgorithm>);

impl AllowedAlgorithms {
    /// Build an allow-list. Returns `None` when `algorithms` is empty.
    pub fn new(algorithms: impl IntoIterator<Item = SigningAlgorithm>) -> Option<Self> {
        let mut list = Vec::new();
        for alg in algorithms {
            if !list.contains(&alg) {
                list.push(alg);
            }
        }
        (!list.is_empty()).then_some(AllowedAlgorithms(list))
    }

    /// Parse a comma separated list such as `RS256,RS512`.
    ///
    /// `none`, HMAC and any other non-RSA name is a configuration error.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut algorithms = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let alg = SigningAlgorithm::from_name(name)
                .ok_or_else(|| ConfigError::UnsupportedAlgorithm(name.to_string()))?;
            algorithms.push(alg);
        }
        Self::new(algorithms).ok_or(ConfigError::Invalid {
            name: crate::config::ALGORITHMS_ENV,
            reason: "at least one algorithm is required".to_string(),
        })
    }

    pub fn contains(&self, alg: SigningAlgorithm) -> bool {
        self.0.contains(&alg)
    }

    /// Resolve a header `alg` value against the allow-list.
    pub fn permit(&self, name: &str) -> Option<SigningAlgorithm> {
        SigningAlgorithm::from_name(name).filter(|alg| self.contains(*alg))
    }

    pub fn iter(&self) -> impl Iterator<Item = SigningAlgorithm> + '_ {
        self.0.iter().copied()
    }
}

impl Default for AllowedAlgorithms {
    /// RS256 and RS512.
    fn default() -> Self {
        AllowedAlgorithms(vec![SigningAlgorithm::RS256, SigningAlgorithm::RS512])
    }
}

impl From<SigningAlgorithm> for AllowedAlgorithms {
    fn from(alg: SigningAlgorithm) -> Self {
        AllowedAlgorithms(vec![alg])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_is_case_sensitive() {
        assert_eq!(SigningAlgorithm::from_name("RS256"), Some(SigningAlgorithm::RS256));
        assert_eq!(SigningAlgorithm::from_name("rs256"), None);
    }

    #[test]
    fn hmac_and_none_are_unrepresentable() {
        for name in ["none", "None", "HS256", "HS384", "HS512", "ES256", "EdDSA"] {
            assert_eq!(SigningAlgorithm::from_name(name), None, "{name}");
        }
    }

    #[test]
    fn parse_rejects_hmac_even_alongside_rsa() {
        let err = AllowedAlgorithms::parse("RS256, HS512").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedAlgorithm(name) if name == "HS512"));
        assert!(AllowedAlgorithms::parse("none").is_err());
        assert!(AllowedAlgorithms::parse(" , ").is_err());
    }

    #[test]
    fn parse_deduplicates() {
        let allowed = AllowedAlgorithms::parse("RS256,RS256,PS256").unwrap();
        assert_eq!(allowed.iter().count(), 2);
    }

    #[test]
    fn permit_intersects_header_with_list() {
        let allowed = AllowedAlgorithms::from(SigningAlgorithm::RS256);
        assert_eq!(allowed.permit("RS256"), Some(SigningAlgorithm::RS256));
        assert_eq!(allowed.permit("RS512"), None);
        assert_eq!(allowed.permit("HS256"), None);
        assert_eq!(allowed.permit("none"), None);
    }

    #[test]
    fn default_is_rs256_and_rs512() {
        let allowed = AllowedAlgorithms::default();
        assert!(allowed.contains(SigningAlgorithm::RS256));
        assert!(allowed.contains(SigningAlgorithm::RS512));
        assert!(!allowed.contains(SigningAlgorithm::PS256));
    }
}
