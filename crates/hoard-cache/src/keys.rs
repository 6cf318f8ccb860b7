//! Cache key builder for consistent key naming.

use hoard_config::{CacheConfig, CacheScope, KeyStrategy};

/// Suffix appended to a key to form its lock key.
const LOCK_SUFFIX: &str = "lock";

/// Request attributes used to derive a scoped cache key.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyContext<'a> {
    /// Request path, e.g. `/users/42`.
    pub path: &'a str,
    /// Raw query string without the leading `?`.
    pub query: Option<&'a str>,
    /// Authenticated user, if any.
    pub user_id: Option<&'a str>,
}

/// Builds every key the cache service reads or writes.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
    scope: CacheScope,
    strategy: KeyStrategy,
}

impl CacheKeys {
    /// Create a key builder with the given prefix and default keying.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            scope: CacheScope::default(),
            strategy: KeyStrategy::default(),
        }
    }

    /// Create a key builder from cache configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            scope: config.default_scope,
            strategy: config.key_strategy,
        }
    }

    /// The namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Entry key: `prefix:part1:part2`.
    pub fn entry<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part.as_ref());
        }
        key
    }

    /// Glob matching every entry below `parts`: `prefix:part1:*`.
    pub fn pattern<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        format!("{}:*", self.entry(parts))
    }

    /// Tag member set key: `prefix:tag:<tag>`.
    #[must_use]
    pub fn tag(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.prefix, tag)
    }

    /// Lock key guarding `key`: `<key>:lock`.
    #[must_use]
    pub fn lock(key: &str) -> String {
        format!("{}:{}", key, LOCK_SUFFIX)
    }

    /// Request key using the configured scope and strategy.
    #[must_use]
    pub fn scoped(&self, ctx: &KeyContext<'_>) -> String {
        self.scoped_with(ctx, self.scope, self.strategy)
    }

    /// Request key with an explicit scope and strategy.
    ///
    /// User scope without a user id falls back to the global entry.
    #[must_use]
    pub fn scoped_with(&self, ctx: &KeyContext<'_>, scope: CacheScope, strategy: KeyStrategy) -> String {
        let owner = match (scope, ctx.user_id) {
            (CacheScope::User, Some(user_id)) => format!("user:{}", user_id),
            _ => "global".to_string(),
        };

        let mut key = format!("{}:route:{}:{}", self.prefix, owner, ctx.path);

        if strategy == KeyStrategy::PathWithQuery {
            if let Some(query) = ctx.query.map(normalize_query).filter(|q| !q.is_empty()) {
                key.push('?');
                key.push_str(&query);
            }
        }

        key
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new("hoard")
    }
}

/// Sorts query pairs so parameter order does not split entries.
fn normalize_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .collect();
    pairs.sort_unstable();
    pairs.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_and_pattern() {
        let keys = CacheKeys::new("shop");
        assert_eq!(keys.entry(["user", "42"]), "shop:user:42");
        assert_eq!(keys.pattern(["user"]), "shop:user:*");
        assert_eq!(keys.entry(Vec::<String>::new()), "shop");
    }

    #[test]
    fn test_tag_and_lock_keys() {
        let keys = CacheKeys::new("shop");
        assert_eq!(keys.tag("products"), "shop:tag:products");
        assert_eq!(CacheKeys::lock("shop:user:42"), "shop:user:42:lock");
    }

    #[test]
    fn test_scoped_global_ignores_query_by_default() {
        let keys = CacheKeys::new("shop");
        let ctx = KeyContext {
            path: "/products",
            query: Some("page=2"),
            user_id: Some("u1"),
        };
        assert_eq!(keys.scoped(&ctx), "shop:route:global:/products");
    }

    #[test]
    fn test_scoped_user_with_query() {
        let config = CacheConfig {
            key_prefix: "shop".to_string(),
            default_scope: CacheScope::User,
            key_strategy: KeyStrategy::PathWithQuery,
            ..Default::default()
        };
        let keys = CacheKeys::from_config(&config);
        let ctx = KeyContext {
            path: "/orders",
            query: Some("b=2&a=1&"),
            user_id: Some("u1"),
        };
        assert_eq!(keys.scoped(&ctx), "shop:route:user:u1:/orders?a=1&b=2");
    }

    #[test]
    fn test_user_scope_without_user_falls_back_to_global() {
        let keys = CacheKeys::new("shop");
        let ctx = KeyContext {
            path: "/orders",
            ..Default::default()
        };
        assert_eq!(
            keys.scoped_with(&ctx, CacheScope::User, KeyStrategy::PathWithQuery),
            "shop:route:global:/orders"
        );
    }
}
