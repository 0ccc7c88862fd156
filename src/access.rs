//! Access checks for private records.
//!
//! The engine only asks an [`AccessPolicy`] whether a caller may see a
//! private record; how the caller proves it lives behind the trait.

use sha2::{Digest, Sha256};

use crate::config::AppConfig;
use crate::models::file::FileRecord;

/// What the transport knows about the caller of a view.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub referer: Option<String>,
    pub origin: Option<String>,
    /// Capability proof presented by the caller.
    pub token: Option<String>,
}

pub trait AccessPolicy: Send + Sync + 'static {
    fn allows(&self, record: &FileRecord, ctx: &AccessContext) -> bool;

    /// Mint a proof that this policy will accept for `record`, if it can.
    fn issue(&self, _record: &FileRecord) -> Option<String> {
        None
    }
}

/// Refuses every private view.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl AccessPolicy for DenyAll {
    fn allows(&self, _record: &FileRecord, _ctx: &AccessContext) -> bool {
        false
    }
}

/// Admits callers whose `Referer` or `Origin` matches a trusted site.
/// Headers are caller-controlled, so this only suits trusted networks.
#[derive(Debug, Clone)]
pub struct RefererAllowList {
    allowed: Vec<String>,
}

impl RefererAllowList {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|s| normalize_site(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    fn matches(&self, header: Option<&str>) -> bool {
        header
            .map(normalize_site)
            .is_some_and(|h| self.allowed.iter().any(|a| *a == h))
    }
}

fn normalize_site(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_ascii_lowercase()
}

impl AccessPolicy for RefererAllowList {
    fn allows(&self, _record: &FileRecord, ctx: &AccessContext) -> bool {
        self.matches(ctx.referer.as_deref()) || self.matches(ctx.origin.as_deref())
    }
}

/// Admits callers presenting `hex(sha256(secret ":" lookup_key))`.
pub struct SignedAccessToken {
    secret: String,
}

impl SignedAccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, lookup_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(lookup_key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl AccessPolicy for SignedAccessToken {
    fn allows(&self, record: &FileRecord, ctx: &AccessContext) -> bool {
        let expected = self.sign(&record.lookup_key);
        ctx.token
            .as_deref()
            .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
    }

    fn issue(&self, record: &FileRecord) -> Option<String> {
        Some(self.sign(&record.lookup_key))
    }
}

/// Admits a caller if any member policy does.
pub struct AnyOf {
    policies: Vec<Box<dyn AccessPolicy>>,
}

impl AnyOf {
    pub fn new(policies: Vec<Box<dyn AccessPolicy>>) -> Self {
        Self { policies }
    }
}

impl AccessPolicy for AnyOf {
    fn allows(&self, record: &FileRecord, ctx: &AccessContext) -> bool {
        self.policies.iter().any(|p| p.allows(record, ctx))
    }

    fn issue(&self, record: &FileRecord) -> Option<String> {
        self.policies.iter().find_map(|p| p.issue(record))
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Build the policy described by the configuration: signed tokens when a
/// secret is set, the referer allow list when it is non-empty, both when
/// both are configured, otherwise nothing gets through.
pub fn from_config(config: &AppConfig) -> Box<dyn AccessPolicy> {
    let mut policies: Vec<Box<dyn AccessPolicy>> = Vec::new();
    if let Some(secret) = &config.access_token_secret {
        policies.push(Box::new(SignedAccessToken::new(secret.clone())));
    }
    if !config.trusted_referers.is_empty() {
        policies.push(Box::new(RefererAllowList::new(&config.trusted_referers)));
    }

    match policies.len() {
        0 => Box::new(DenyAll),
        1 => policies.remove(0),
        _ => Box::new(AnyOf::new(policies)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(key: &str) -> FileRecord {
        let now = Utc::now();
        FileRecord {
            id: Uuid::new_v4(),
            original_name: "secret.pdf".into(),
            storage_name: "x_secret.pdf".into(),
            path: "x_secret.pdf".into(),
            size: 1,
            mime_type: "application/pdf".into(),
            extension: ".pdf".into(),
            description: String::new(),
            private: true,
            lookup_key: key.into(),
            url: String::new(),
            views: 0,
            last_accessed_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn referer_list_matches_referer_or_origin() {
        let policy = RefererAllowList::new(["http://localhost:3002/"]);
        let rec = record("k");

        let by_referer = AccessContext {
            referer: Some("http://localhost:3002".into()),
            ..Default::default()
        };
        let by_origin = AccessContext {
            origin: Some("HTTP://LOCALHOST:3002/".into()),
            ..Default::default()
        };
        let stranger = AccessContext {
            referer: Some("http://evil.test/".into()),
            ..Default::default()
        };

        assert!(policy.allows(&rec, &by_referer));
        assert!(policy.allows(&rec, &by_origin));
        assert!(!policy.allows(&rec, &stranger));
        assert!(!policy.allows(&rec, &AccessContext::default()));
    }

    #[test]
    fn signed_token_is_bound_to_the_lookup_key() {
        let policy = SignedAccessToken::new("s3cret");
        let a = record("key-a");
        let b = record("key-b");
        let token = policy.issue(&a).unwrap();

        let ctx = AccessContext {
            token: Some(token),
            ..Default::default()
        };
        assert!(policy.allows(&a, &ctx));
        assert!(!policy.allows(&b, &ctx));
    }

    #[test]
    fn any_of_issues_from_first_capable_member() {
        let policy = AnyOf::new(vec![
            Box::new(RefererAllowList::new(["http://trusted.test"])),
            Box::new(SignedAccessToken::new("s")),
        ]);
        let rec = record("k");
        let token = policy.issue(&rec).unwrap();
        assert_eq!(token, SignedAccessToken::new("s").sign("k"));
        assert!(!DenyAll.allows(&rec, &AccessContext::default()));
    }

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
