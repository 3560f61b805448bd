//! Evaluator for the `If` header (RFC 4918 §10.4).
//!
//! `davheaders::If` only tokenizes the grammar; this module decides whether
//! a parsed header is satisfied given the lock tokens a client actually
//! submitted and the current ETag of the affected resource(s).
use crate::davheaders::{If, IfItem};
use crate::davpath::DavPathRef;
use crate::fs::DavMetaData;
use crate::locks::LockRegistry;

/// Evaluate one condition: does the submitted token/etag match, given which
/// lock tokens the caller currently holds and the resource's etag.
fn condition_holds(item: &IfItem, held_tokens: &[String], etag: Option<&str>) -> bool {
    match item {
        IfItem::StateToken(tok) => held_tokens.iter().any(|t| t == tok),
        IfItem::ETag(want) => etag
            .map(|have| want.to_string() == format!("\"{}\"", have))
            .unwrap_or(false),
    }
}

/// Returns `true` if `hdr` is satisfied for `path`, given the lock tokens
/// submitted in the `If` header that are actually held on `path` (resolved
/// by the caller via the lock registry) and the resource's current etag.
///
/// Per RFC 4918 §10.4.2: the whole header is satisfied if *any* `IfList* is
/// satisfied; an `IfList` is satisfied if *every* condition in it matches
/// (taking `Not` into account), restricted to state-tokens actually known to
/// the server (unknown tokens are simply "not held", not a parse failure).
pub(crate) fn if_header_holds(hdr: &If, resource_tag_path: Option<&str>, held_tokens: &[String], etag: Option<&str>) -> bool {
    hdr.0.iter().any(|list| {
        if let (Some(want), Some(have)) = (&list.resource_tag, resource_tag_path) {
            if want.path() != have {
                return false;
            }
        }
        list.conditions.iter().all(|c| {
            let holds = condition_holds(&c.item, held_tokens, etag);
            holds != c.not
        })
    })
}

/// Collects every lock token held by the caller (per the submitted `If`
/// header) that covers `path`, by cross-referencing the header's state
/// tokens against the registry's live locks.
pub(crate) fn submitted_tokens_for(hdr: &If, path: &DavPathRef, locks: &LockRegistry, now: std::time::SystemTime) -> Vec<String> {
    let live = locks.all_locks(path.as_url_string().as_str(), now);
    let mut out = Vec::new();
    for list in &hdr.0 {
        for cond in &list.conditions {
            if cond.not {
                continue;
            }
            if let IfItem::StateToken(tok) = &cond.item {
                if live.iter().any(|l| &l.token == tok) {
                    out.push(tok.clone());
                }
            }
        }
    }
    out
}

/// Checks the precondition for a write-type operation on `path`: if the
/// caller sent an `If` header it must hold, and any lock covering `path`
/// not satisfied by a held token fails the request with a lock conflict.
pub(crate) fn check_precondition(
    hdr: Option<&If>,
    path: &DavPathRef,
    meta: Option<&dyn DavMetaData>,
    locks: &LockRegistry,
    now: std::time::SystemTime,
) -> Result<Vec<String>, crate::fs::FsError> {
    let uri = path.as_url_string();
    let etag = meta.and_then(|m| m.etag());
    let held = match hdr {
        Some(h) => submitted_tokens_for(h, path, locks, now),
        None => Vec::new(),
    };

    if let Some(h) = hdr {
        if !if_header_holds(h, Some(uri.as_str()), &held, etag.as_deref()) {
            return Err(crate::fs::FsError::LockConflict);
        }
    }

    let conflicting = locks.conflict_locks(uri.as_str(), crate::locks::LockScope::Exclusive, &held, now);
    if !conflicting.is_empty() {
        return Err(crate::fs::FsError::LockConflict);
    }
    Ok(held)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::davheaders::{IfCondition, IfList};

    fn token_list(tok: &str, not: bool) -> If {
        If(vec![IfList { resource_tag: None, conditions: vec![IfCondition { not, item: IfItem::StateToken(tok.into()) }] }])
    }

    #[test]
    fn holds_when_token_is_held() {
        let hdr = token_list("opaquelocktoken:abc", false);
        assert!(if_header_holds(&hdr, None, &["opaquelocktoken:abc".to_string()], None));
        assert!(!if_header_holds(&hdr, None, &[], None));
    }

    #[test]
    fn not_inverts_the_match() {
        let hdr = token_list("opaquelocktoken:abc", true);
        assert!(!if_header_holds(&hdr, None, &["opaquelocktoken:abc".to_string()], None));
        assert!(if_header_holds(&hdr, None, &[], None));
    }
}
