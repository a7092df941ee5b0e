//! Validated cache keys.
//!
//! Cache keys end up in the hosted store's keyspace and in its dashboards,
//! so they must never carry personal data. A [`CacheKey`] can only be built
//! through constructors that restrict every segment to a small ASCII
//! alphabet: numeric practice ids and fixed namespaces go in, e-mail
//! addresses and names (which need `@` or whitespace) are rejected.

use std::fmt;

use praxis_core::ValidationError;

/// Prefix of every key built with [`CacheKey::scoped`].
pub const KEY_PREFIX: &str = "praxis";

/// Segment separator.
pub const SEPARATOR: char = ':';

/// Upper bound on the encoded key length.
pub const MAX_KEY_LEN: usize = 256;

/// A store key that passed validation.
///
/// The inner string is private, so a `CacheKey` cannot be constructed
/// without going through [`CacheKey::new`] or [`CacheKey::scoped`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: String,
}

impl CacheKey {
    /// Accept a complete key such as `"badges:practice:42"`.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        validate(&raw, true)?;
        Ok(Self { inner: raw })
    }

    /// Key for one practice's view of `namespace`: `praxis:{namespace}:{practice_id}`.
    pub fn scoped(namespace: &str, practice_id: u64) -> Result<Self, ValidationError> {
        validate(namespace, false)?;
        Ok(Self {
            inner: format!("{KEY_PREFIX}{SEPARATOR}{namespace}{SEPARATOR}{practice_id}"),
        })
    }

    /// Append one segment.
    pub fn with_segment(self, segment: impl fmt::Display) -> Result<Self, ValidationError> {
        let segment = segment.to_string();
        validate(&segment, false)?;
        let inner = format!("{}{SEPARATOR}{segment}", self.inner);
        check_len(&inner)?;
        Ok(Self { inner })
    }

    /// Append a numeric id. Digits are always valid.
    pub fn with_id(self, id: u64) -> Self {
        Self {
            inner: format!("{}{SEPARATOR}{id}", self.inner),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn into_string(self) -> String {
        self.inner
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

fn validate(raw: &str, allow_separator: bool) -> Result<(), ValidationError> {
    let reject = |reason: &str| ValidationError::InvalidCacheKey {
        key: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.is_empty() {
        return Err(reject("key segment is empty"));
    }
    check_len(raw)?;
    for c in raw.chars() {
        match c {
            '@' => return Err(reject("'@' is not allowed; keys must not contain e-mail addresses")),
            c if c.is_whitespace() => {
                return Err(reject("whitespace is not allowed; keys must not contain names"))
            }
            SEPARATOR if !allow_separator => {
                return Err(reject("':' separates segments and cannot appear inside one"))
            }
            SEPARATOR => {}
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => {}
            other => return Err(reject(&format!("character {other:?} is not allowed"))),
        }
    }
    if allow_separator && raw.split(SEPARATOR).any(str::is_empty) {
        return Err(reject("key contains an empty segment"));
    }
    Ok(())
}

fn check_len(raw: &str) -> Result<(), ValidationError> {
    if raw.len() > MAX_KEY_LEN {
        return Err(ValidationError::InvalidCacheKey {
            key: raw.chars().take(32).collect::<String>() + "...",
            reason: format!("key is longer than {MAX_KEY_LEN} bytes"),
        });
    }
    Ok(())
}
