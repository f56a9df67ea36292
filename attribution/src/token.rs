use std::error::Error;
use std::fmt::Display;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Header carrying the encoded tenant credentials on every match request.
pub const TENANT_TOKEN_HEADER: &str = "x-tenant-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidTokenReason {
    EmptyTenantId,
    EmptyTenantKey,
}

impl InvalidTokenReason {
    pub fn reason(&self) -> &str {
        match *self {
            Self::EmptyTenantId => "empty_tenant_id",
            Self::EmptyTenantKey => "empty_tenant_key",
        }
    }
}

impl Display for InvalidTokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl Error for InvalidTokenReason {}

/// A tenant's id and key, checked to be non-blank.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantCredentials {
    tenant_id: String,
    tenant_key: String,
}

impl TenantCredentials {
    pub fn new(tenant_id: &str, tenant_key: &str) -> Result<Self, InvalidTokenReason> {
        if tenant_id.trim().is_empty() {
            return Err(InvalidTokenReason::EmptyTenantId);
        }

        if tenant_key.trim().is_empty() {
            return Err(InvalidTokenReason::EmptyTenantKey);
        }

        Ok(Self {
            tenant_id: tenant_id.to_owned(),
            tenant_key: tenant_key.to_owned(),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn token(&self) -> Result<String, InvalidTokenReason> {
        encode_tenant_token(&self.tenant_id, &self.tenant_key)
    }
}

// Keep the key out of logs.
impl std::fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Encode a tenant id and key into the value sent in the `x-tenant-token` header.
///
/// This is `base64(id + ";" + key)` using the standard alphabet with padding. It only keeps the
/// credentials header-safe: anyone holding the token can decode the key back out of it.
pub fn encode_tenant_token(tenant_id: &str, tenant_key: &str) -> Result<String, InvalidTokenReason> {
    if tenant_id.is_empty() {
        return Err(InvalidTokenReason::EmptyTenantId);
    }

    if tenant_key.is_empty() {
        return Err(InvalidTokenReason::EmptyTenantKey);
    }

    let combined = format!("{tenant_id};{tenant_key}");

    Ok(STANDARD.encode(combined.as_bytes()))
}
