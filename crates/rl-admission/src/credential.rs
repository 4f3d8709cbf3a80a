//! Fetcher credential format: `{prefix}{key_id}_{secret}`.
//!
//! The prefix is an environment tag. A key minted for `test` must never be
//! accepted by a `live` deployment and vice versa.

use uuid::Uuid;

pub const PREFIX_LIVE: &str = "cleanapp_fk_live_";
pub const PREFIX_TEST: &str = "cleanapp_fk_test_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    Live,
    Test,
}

impl KeyPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPrefix::Live => PREFIX_LIVE,
            KeyPrefix::Test => PREFIX_TEST,
        }
    }
}

/// Which prefixes a deployment accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEnvironment {
    Live,
    Test,
    /// Unconfigured (local scripts, dev boxes): both prefixes pass.
    Any,
}

impl KeyEnvironment {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "prod" | "production" => KeyEnvironment::Live,
            "test" | "dev" | "development" => KeyEnvironment::Test,
            _ => KeyEnvironment::Any,
        }
    }

    pub fn allows(&self, prefix: KeyPrefix) -> bool {
        match self {
            KeyEnvironment::Live => prefix == KeyPrefix::Live,
            KeyEnvironment::Test => prefix == KeyPrefix::Test,
            KeyEnvironment::Any => true,
        }
    }

    /// Prefix used when minting new keys. Unconfigured environments mint test keys.
    pub fn issuing_prefix(&self) -> KeyPrefix {
        match self {
            KeyEnvironment::Live => KeyPrefix::Live,
            KeyEnvironment::Test | KeyEnvironment::Any => KeyPrefix::Test,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ParsedCredential {
    pub prefix: KeyPrefix,
    pub key_id: String,
    pub secret: String,
}

impl std::fmt::Debug for ParsedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedCredential")
            .field("prefix", &self.prefix)
            .field("key_id", &self.key_id)
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

/// Split a raw credential. `None` when the structure does not parse.
pub fn parse_credential(raw: &str) -> Option<ParsedCredential> {
    let (prefix, rest) = if let Some(rest) = raw.strip_prefix(PREFIX_LIVE) {
        (KeyPrefix::Live, rest)
    } else if let Some(rest) = raw.strip_prefix(PREFIX_TEST) {
        (KeyPrefix::Test, rest)
    } else {
        return None;
    };

    let (key_id, secret) = rest.split_once('_')?;
    if key_id.is_empty() || secret.is_empty() {
        return None;
    }

    Some(ParsedCredential {
        prefix,
        key_id: key_id.to_string(),
        secret: secret.to_string(),
    })
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// A freshly minted credential. `token` is shown to the operator exactly once.
#[derive(Clone)]
pub struct IssuedCredential {
    pub prefix: KeyPrefix,
    pub key_id: String,
    pub secret: String,
    pub token: String,
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("prefix", &self.prefix)
            .field("key_id", &self.key_id)
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

/// Mint a new credential: uuid key id (hyphen-free so it cannot contain `_`)
/// and 32 random bytes of hex secret.
pub fn generate_credential(prefix: KeyPrefix) -> IssuedCredential {
    let key_id = Uuid::new_v4().simple().to_string();
    let secret_bytes: [u8; 32] = rand::random();
    let secret = hex::encode(secret_bytes);
    let token = format!("{}{}_{}", prefix.as_str(), key_id, secret);
    IssuedCredential {
        prefix,
        key_id,
        secret,
        token,
    }
}
