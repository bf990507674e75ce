//! # Config Hashing
//!
//! Deterministic content hashes used for drift detection.
//!
//! A hash covers the canonical JSON form of a spec (object keys sorted at every
//! level) plus a truncated digest of every referenced secret value. Secret
//! references that cannot be resolved contribute a fixed sentinel instead of
//! failing, so a status can always be produced even while dependencies are
//! still missing.

use crate::crd::SecretKeyRef;
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Length of every hash produced here (hex characters)
pub const HASH_LEN: usize = 32;

/// Length of the per-secret digest folded into a hash
const SECRET_DIGEST_LEN: usize = 16;

/// Sentinel folded in when the referenced secret does not exist
pub const REF_NOT_FOUND: &str = "ref-not-found";

/// Sentinel folded in when the secret exists but lacks the key
pub const KEY_NOT_FOUND: &str = "key-not-found";

/// Outcome of resolving one secret reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Value(Vec<u8>),
    SecretNotFound,
    KeyNotFound,
}

/// Source of secret payloads for hashing
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, namespace: &str, secret_ref: &SecretKeyRef)
        -> Result<Resolved, StoreError>;
}

/// Resolves secrets through an [`ObjectStore`]
#[derive(Debug)]
pub struct StoreSecretResolver<'a, S: ObjectStore> {
    store: &'a S,
}

impl<'a, S: ObjectStore> StoreSecretResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<'a, S: ObjectStore> SecretResolver for StoreSecretResolver<'a, S> {
    async fn resolve(
        &self,
        namespace: &str,
        secret_ref: &SecretKeyRef,
    ) -> Result<Resolved, StoreError> {
        let Some(secret) = self.store.get::<Secret>(namespace, &secret_ref.name).await? else {
            return Ok(Resolved::SecretNotFound);
        };
        if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(&secret_ref.key)) {
            return Ok(Resolved::Value(bytes.0.clone()));
        }
        // stringData is write-only on a real cluster but shows up in fixtures
        if let Some(text) = secret
            .string_data
            .as_ref()
            .and_then(|d| d.get(&secret_ref.key))
        {
            return Ok(Resolved::Value(text.as_bytes().to_vec()));
        }
        Ok(Resolved::KeyNotFound)
    }
}

/// Serialize a JSON value with object keys sorted at every level
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash of raw bytes, truncated to [`HASH_LEN`]
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hex = sha256_hex(bytes);
    hex.truncate(HASH_LEN);
    hex
}

/// Hash of a JSON value in canonical form
#[must_use]
pub fn hash_value(value: &Value) -> String {
    hash_bytes(canonical_json(value).as_bytes())
}

/// Hash a spec together with the content of the secrets it references
///
/// # Errors
///
/// Fails only when the spec cannot be serialized or the store itself is
/// unreachable. Missing secrets and keys are folded in as sentinels.
pub async fn hash_spec<T, R>(
    spec: &T,
    namespace: &str,
    secret_refs: &[&SecretKeyRef],
    resolver: &R,
) -> Result<String, crate::controller::reconciler::ReconcilerError>
where
    T: Serialize + Sync,
    R: SecretResolver + ?Sized,
{
    let value = serde_json::to_value(spec).map_err(|e| anyhow::anyhow!("serialize spec: {e}"))?;
    let mut input = canonical_json(&value);
    for secret_ref in secret_refs {
        input.push(':');
        match resolver.resolve(namespace, secret_ref).await? {
            Resolved::Value(bytes) => {
                let mut digest = sha256_hex(&bytes);
                digest.truncate(SECRET_DIGEST_LEN);
                input.push_str(&digest);
            }
            Resolved::SecretNotFound => input.push_str(REF_NOT_FOUND),
            Resolved::KeyNotFound => input.push_str(KEY_NOT_FOUND),
        }
    }
    Ok(hash_bytes(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    /// Resolver backed by a fixed map; absent names are missing secrets
    struct FixedResolver(HashMap<String, HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl SecretResolver for FixedResolver {
        async fn resolve(
            &self,
            _namespace: &str,
            secret_ref: &SecretKeyRef,
        ) -> Result<Resolved, StoreError> {
            Ok(match self.0.get(&secret_ref.name) {
                None => Resolved::SecretNotFound,
                Some(data) => data
                    .get(&secret_ref.key)
                    .map_or(Resolved::KeyNotFound, |v| Resolved::Value(v.clone())),
            })
        }
    }

    fn resolver(value: &str) -> FixedResolver {
        FixedResolver(HashMap::from([(
            "creds".to_string(),
            HashMap::from([("token".to_string(), value.as_bytes().to_vec())]),
        )]))
    }

    fn token_ref() -> SecretKeyRef {
        SecretKeyRef {
            name: "creds".to_string(),
            key: "token".to_string(),
        }
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"z": [ {"y": 1, "x": 2} ], "c": null}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"c":null,"z":[{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_hash_ignores_key_order_but_not_values() {
        let a = json!({"image": "a", "port": 8080});
        let b = json!({"port": 8080, "image": "a"});
        let c = json!({"port": 8081, "image": "a"});
        assert_eq!(hash_value(&a), hash_value(&b));
        assert_ne!(hash_value(&a), hash_value(&c));
        assert_eq!(hash_value(&a).len(), HASH_LEN);
    }

    #[tokio::test]
    async fn test_hash_is_stable_for_identical_input() {
        let spec = json!({"type": "headerInjection"});
        let r = token_ref();
        let first = hash_spec(&spec, "default", &[&r], &resolver("s3cret")).await.unwrap();
        let second = hash_spec(&spec, "default", &[&r], &resolver("s3cret")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_secret_rotation_changes_hash() {
        let spec = json!({"type": "headerInjection"});
        let r = token_ref();
        let before = hash_spec(&spec, "default", &[&r], &resolver("one")).await.unwrap();
        let after = hash_spec(&spec, "default", &[&r], &resolver("two")).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_missing_secret_and_key_use_distinct_sentinels() {
        let spec = json!({"type": "headerInjection"});
        let missing_secret = SecretKeyRef {
            name: "absent".to_string(),
            key: "token".to_string(),
        };
        let missing_key = SecretKeyRef {
            name: "creds".to_string(),
            key: "absent".to_string(),
        };
        let r = resolver("value");
        let a = hash_spec(&spec, "default", &[&missing_secret], &r).await.unwrap();
        let b = hash_spec(&spec, "default", &[&missing_key], &r).await.unwrap();
        let c = hash_spec(&spec, "default", &[&token_ref()], &r).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[tokio::test]
    async fn test_every_mutation_changes_hash() {
        let base = json!({
            "type": "tokenExchange",
            "tokenExchange": {
                "tokenUrl": "https://sts.example.com/token",
                "clientId": "mcp",
                "audience": "github",
                "scopes": ["repo"]
            }
        });
        let mutations = [
            ("/tokenExchange/tokenUrl", json!("https://other.example.com/token")),
            ("/tokenExchange/clientId", json!("other")),
            ("/tokenExchange/audience", json!("gitlab")),
            ("/tokenExchange/scopes", json!(["repo", "read:org"])),
            ("/type", json!("headerInjection")),
        ];
        let r = resolver("s");
        let original = hash_spec(&base, "default", &[], &r).await.unwrap();
        for (pointer, replacement) in mutations {
            let mut mutated = base.clone();
            *mutated.pointer_mut(pointer).unwrap() = replacement;
            let hash = hash_spec(&mutated, "default", &[], &r).await.unwrap();
            assert_ne!(hash, original, "mutating {pointer} must change the hash");
        }
    }
}
