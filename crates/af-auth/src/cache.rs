//! RBAC decision cache, keyed by `(jti, permission)` and expiring with the
//! token's own lifetime — never longer, since revocation must still apply
//! once the cache entry is gone.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

struct CacheEntry {
    allowed: bool,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RbacCache {
    entries: DashMap<(Uuid, String), CacheEntry>,
}

impl RbacCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, jti: Uuid, permission: &str, now: DateTime<Utc>) -> Option<bool> {
        let key = (jti, permission.to_string());
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > now => Some(entry.allowed),
            Some(_) => {
                drop(self.entries.remove(&key));
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, jti: Uuid, permission: &str, allowed: bool, expires_at: DateTime<Utc>) {
        self.entries.insert((jti, permission.to_string()), CacheEntry { allowed, expires_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_expires_with_the_token_not_separately() {
        let cache = RbacCache::new();
        let jti = Uuid::new_v4();
        let now = Utc::now();
        cache.insert(jti, "workflow:write", true, now + chrono::Duration::seconds(1));

        assert_eq!(cache.get(jti, "workflow:write", now), Some(true));
        assert_eq!(
            cache.get(jti, "workflow:write", now + chrono::Duration::seconds(2)),
            None
        );
    }
}
