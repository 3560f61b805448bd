//! In-memory lock registry.
//!
//! Unlike the resource backend, the lock registry is not pluggable: it is
//! one HashMap-backed table guarded by a single `RwLock`, matching how
//! writes to it are always a single atomic step (add/remove/refresh) while
//! conflict queries (which walk every lock covering a path) only need read
//! access.
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use uuid::Uuid;

/// Longest timeout a client may request; `Timeout: Infinite` clamps to this.
pub(crate) const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockScope {
    Exclusive,
    Shared,
}

/// A single active lock.
#[derive(Debug, Clone)]
pub(crate) struct Lock {
    pub token:     String,
    pub path:      String,
    pub scope:     LockScope,
    pub deep:      bool,
    pub owner:     Option<String>,
    pub timeout:   Duration,
    pub expires_at: SystemTime,
}

impl Lock {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }

    /// Whether this lock, rooted at `self.path`, covers `path` — itself, or
    /// (if `deep`) anything nested under it.
    fn covers(&self, path: &str) -> bool {
        if self.path == path {
            return true;
        }
        if !self.deep {
            return false;
        }
        let prefix = if self.path.ends_with('/') { self.path.clone() } else { format!("{}/", self.path) };
        path.starts_with(&prefix)
    }
}

#[derive(Default)]
struct Registry {
    by_path:  HashMap<String, Vec<String>>,
    by_token: HashMap<String, Lock>,
}

/// Thread-safe table of active locks, keyed by path and by opaque token.
#[derive(Default)]
pub(crate) struct LockRegistry {
    inner: RwLock<Registry>,
}

fn new_token(path: &str, now: SystemTime) -> String {
    // opaquelocktoken per RFC 4918 §6.4; a random UUID is unique enough on
    // its own, the path/time mix just avoids leaking raw randomness as the
    // sole source of the token's uniqueness.
    let nonce = Uuid::new_v4();
    let secs = now.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    format!("opaquelocktoken:{:x}-{}", secs ^ (path.len() as u128), nonce)
}

impl LockRegistry {
    pub(crate) fn new() -> LockRegistry {
        LockRegistry { inner: RwLock::new(Registry::default()) }
    }

    /// Create and insert a new lock, returning its token.
    pub(crate) fn add(
        &self,
        path: &str,
        scope: LockScope,
        deep: bool,
        owner: Option<String>,
        timeout: Duration,
        now: SystemTime,
    ) -> String {
        let timeout = timeout.min(MAX_TIMEOUT);
        let token = new_token(path, now);
        let lock = Lock {
            token: token.clone(),
            path: path.to_string(),
            scope,
            deep,
            owner,
            timeout,
            expires_at: now + timeout,
        };
        let mut inner = self.inner.write();
        inner.by_path.entry(path.to_string()).or_default().push(token.clone());
        inner.by_token.insert(token.clone(), lock);
        token
    }

    /// Extend a held lock's expiry; fails if the token is unknown or expired.
    pub(crate) fn refresh(&self, token: &str, timeout: Duration, now: SystemTime) -> Option<Lock> {
        let timeout = timeout.min(MAX_TIMEOUT);
        let mut inner = self.inner.write();
        let lock = inner.by_token.get_mut(token)?;
        if lock.is_expired(now) {
            return None;
        }
        lock.timeout = timeout;
        lock.expires_at = now + timeout;
        Some(lock.clone())
    }

    pub(crate) fn remove(&self, token: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.by_token.remove(token) {
            Some(lock) => {
                if let Some(v) = inner.by_path.get_mut(&lock.path) {
                    v.retain(|t| t != token);
                    if v.is_empty() {
                        inner.by_path.remove(&lock.path);
                    }
                }
                true
            },
            None => false,
        }
    }

    pub(crate) fn by_token(&self, token: &str, now: SystemTime) -> Option<Lock> {
        let inner = self.inner.read();
        inner.by_token.get(token).filter(|l| !l.is_expired(now)).cloned()
    }

    /// All non-expired locks whose root is exactly `path`.
    pub(crate) fn by_id(&self, path: &str, now: SystemTime) -> Vec<Lock> {
        let inner = self.inner.read();
        inner
            .by_path
            .get(path)
            .map(|tokens| tokens.iter().filter_map(|t| inner.by_token.get(t)).filter(|l| !l.is_expired(now)).cloned().collect())
            .unwrap_or_default()
    }

    /// Every non-expired lock that covers `path` (its own lock, plus any
    /// deep lock rooted above it).
    pub(crate) fn all_locks(&self, path: &str, now: SystemTime) -> Vec<Lock> {
        let inner = self.inner.read();
        inner.by_token.values().filter(|l| !l.is_expired(now) && l.covers(path)).cloned().collect()
    }

    pub(crate) fn exclusive_locks(&self, path: &str, now: SystemTime) -> Vec<Lock> {
        self.all_locks(path, now).into_iter().filter(|l| l.scope == LockScope::Exclusive).collect()
    }

    pub(crate) fn shared_locks(&self, path: &str, now: SystemTime) -> Vec<Lock> {
        self.all_locks(path, now).into_iter().filter(|l| l.scope == LockScope::Shared).collect()
    }

    /// Locks covering `path` that are not satisfied by `tokens` held by the
    /// caller: any exclusive lock is always a conflict; a shared lock is a
    /// conflict only if the caller wants to take an exclusive lock.
    pub(crate) fn conflict_locks(&self, path: &str, want: LockScope, tokens: &[String], now: SystemTime) -> Vec<Lock> {
        self.all_locks(path, now)
            .into_iter()
            .filter(|l| !tokens.iter().any(|t| t == &l.token))
            .filter(|l| l.scope == LockScope::Exclusive || want == LockScope::Exclusive)
            .collect()
    }

    /// Deep locks rooted strictly *below* `path`, not satisfied by `tokens`
    /// held by the caller and optionally narrowed to a single `scope`.
    ///
    /// Pass `scope: None` when any descendant lock (shared or exclusive)
    /// must block the operation — acquiring a deep exclusive lock, or
    /// DELETE/MOVE recursing into a subtree. Pass `scope:
    /// Some(LockScope::Exclusive)` when only a descendant exclusive lock
    /// blocks — acquiring a deep shared lock, where a descendant shared
    /// lock is compatible.
    pub(crate) fn dependent_locks(&self, path: &str, scope: Option<LockScope>, tokens: &[String], now: SystemTime) -> Vec<Lock> {
        let prefix = if path.ends_with('/') { path.to_string() } else { format!("{}/", path) };
        let inner = self.inner.read();
        inner
            .by_token
            .values()
            .filter(|l| !l.is_expired(now) && l.path != path && l.path.starts_with(&prefix))
            .filter(|l| scope.is_none_or(|s| l.scope == s))
            .filter(|l| !tokens.iter().any(|t| t == &l.token))
            .cloned()
            .collect()
    }

    /// Drop every expired lock. Called opportunistically from the handlers
    /// that touch the registry; there is no background sweeper task.
    pub(crate) fn purge_expired(&self, now: SystemTime) {
        let mut inner = self.inner.write();
        let expired: Vec<String> =
            inner.by_token.iter().filter(|(_, l)| l.is_expired(now)).map(|(t, _)| t.clone()).collect();
        for token in expired {
            if let Some(lock) = inner.by_token.remove(&token) {
                if let Some(v) = inner.by_path.get_mut(&lock.path) {
                    v.retain(|t| t != &token);
                    if v.is_empty() {
                        inner.by_path.remove(&lock.path);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_conflicts_with_exclusive() {
        let reg = LockRegistry::new();
        let now = SystemTime::now();
        let tok = reg.add("/a", LockScope::Exclusive, false, None, Duration::from_secs(60), now);
        let conflicts = reg.conflict_locks("/a", LockScope::Exclusive, &[], now);
        assert_eq!(conflicts.len(), 1);
        let conflicts = reg.conflict_locks("/a", LockScope::Exclusive, &[tok], now);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn deep_lock_covers_descendant() {
        let reg = LockRegistry::new();
        let now = SystemTime::now();
        reg.add("/a", LockScope::Exclusive, true, None, Duration::from_secs(60), now);
        assert_eq!(reg.all_locks("/a/b/c", now).len(), 1);
        assert_eq!(reg.all_locks("/other", now).len(), 0);
    }

    #[test]
    fn shared_locks_do_not_conflict_with_shared() {
        let reg = LockRegistry::new();
        let now = SystemTime::now();
        reg.add("/a", LockScope::Shared, false, None, Duration::from_secs(60), now);
        let conflicts = reg.conflict_locks("/a", LockScope::Shared, &[], now);
        assert!(conflicts.is_empty());
        let conflicts = reg.conflict_locks("/a", LockScope::Exclusive, &[], now);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn refresh_extends_expiry_and_rejects_unknown_token() {
        let reg = LockRegistry::new();
        let now = SystemTime::now();
        let tok = reg.add("/a", LockScope::Exclusive, false, None, Duration::from_secs(1), now);
        let later = now + Duration::from_secs(10);
        assert!(reg.refresh(&tok, Duration::from_secs(60), later).is_some());
        assert!(reg.refresh("bogus", Duration::from_secs(60), later).is_none());
    }

    #[test]
    fn purge_expired_removes_stale_entries() {
        let reg = LockRegistry::new();
        let now = SystemTime::now();
        reg.add("/a", LockScope::Exclusive, false, None, Duration::from_secs(1), now);
        let later = now + Duration::from_secs(10);
        reg.purge_expired(later);
        assert!(reg.by_id("/a", later).is_empty());
    }
}
