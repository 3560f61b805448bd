//! Dead property storage, decoupled from the resource backend.
//!
//! RFC 4918 properties are stored here rather than inside `DavFileSystem`
//! implementations: a `memfs`/`localfs` backend only needs to answer "does
//! this resource exist" and "what's its data", while PROPFIND/PROPPATCH
//! bookkeeping (including keeping properties consistent under COPY/MOVE/
//! DELETE of whole subtrees) lives in one place.
use std::collections::HashMap;

use parking_lot::RwLock;
use xmltree::Element;

/// A single property: `{namespace}name` plus its XML value tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PropName {
    pub ns:   String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct DavProp {
    pub name:  PropName,
    pub value: Option<Element>,
}

/// One PROPPATCH operation.
#[derive(Debug, Clone)]
pub(crate) enum PatchOp {
    Set(DavProp),
    Remove(PropName),
}

/// Outcome of applying one `PatchOp`, always 200 unless something about the
/// whole request failed and every op rolled back (reported as 424).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatchStatus {
    Ok,
    FailedDependency,
    Forbidden,
}

pub(crate) trait PropertyBackend: Send + Sync {
    fn select(&self, path: &str, names: &[PropName]) -> Vec<DavProp>;
    fn all(&self, path: &str) -> Vec<DavProp>;
    fn patch(&self, path: &str, ops: &[PatchOp]) -> Vec<(PropName, PatchStatus)>;
    fn delete_resource(&self, path: &str);
    fn copy_subtree(&self, from: &str, to: &str);
    fn move_subtree(&self, from: &str, to: &str);
    fn delete_subtree(&self, path: &str);
}

#[derive(Default)]
pub(crate) struct MemPropDb {
    // path -> (namespace, name) -> property
    store: RwLock<HashMap<String, HashMap<(String, String), DavProp>>>,
}

impl MemPropDb {
    pub(crate) fn new() -> MemPropDb {
        MemPropDb::default()
    }

    fn is_protected(name: &PropName) -> bool {
        // Live properties (getcontentlength, getetag, ...) are computed by
        // the handler from DavMetaData and can't be stored as dead props.
        // getcontenttype and displayname are DAV-namespace but mutable: a
        // PROPPATCH may set or remove them, and handle_props falls back to
        // a computed default only when nothing is stored.
        name.ns == "DAV:"
            && matches!(
                name.name.as_str(),
                "getcontentlength"
                    | "getetag"
                    | "getlastmodified"
                    | "creationdate"
                    | "resourcetype"
                    | "lockdiscovery"
                    | "supportedlock"
            )
    }
}

impl PropertyBackend for MemPropDb {
    fn select(&self, path: &str, names: &[PropName]) -> Vec<DavProp> {
        let store = self.store.read();
        let Some(props) = store.get(path) else { return Vec::new() };
        names.iter().filter_map(|n| props.get(&(n.ns.clone(), n.name.clone())).cloned()).collect()
    }

    fn all(&self, path: &str) -> Vec<DavProp> {
        let store = self.store.read();
        store.get(path).map(|props| props.values().cloned().collect()).unwrap_or_default()
    }

    // Two passes: validate every op can apply, then apply them all. This
    // keeps a PROPPATCH atomic — either every property in the request
    // changes, or (on the first rejection) none of them do.
    fn patch(&self, path: &str, ops: &[PatchOp]) -> Vec<(PropName, PatchStatus)> {
        for op in ops {
            let name = match op {
                PatchOp::Set(p) => &p.name,
                PatchOp::Remove(n) => n,
            };
            if Self::is_protected(name) {
                let mut results: Vec<(PropName, PatchStatus)> = ops
                    .iter()
                    .map(|o| {
                        let n = match o {
                            PatchOp::Set(p) => p.name.clone(),
                            PatchOp::Remove(n) => n.clone(),
                        };
                        (n, PatchStatus::FailedDependency)
                    })
                    .collect();
                if let Some(entry) = results.iter_mut().find(|(n, _)| n == name) {
                    entry.1 = PatchStatus::Forbidden;
                }
                return results;
            }
        }

        let mut store = self.store.write();
        let props = store.entry(path.to_string()).or_default();
        for op in ops {
            match op {
                PatchOp::Set(p) => {
                    props.insert((p.name.ns.clone(), p.name.name.clone()), p.clone());
                },
                PatchOp::Remove(n) => {
                    props.remove(&(n.ns.clone(), n.name.clone()));
                },
            }
        }
        ops.iter()
            .map(|o| {
                let n = match o {
                    PatchOp::Set(p) => p.name.clone(),
                    PatchOp::Remove(n) => n.clone(),
                };
                (n, PatchStatus::Ok)
            })
            .collect()
    }

    fn delete_resource(&self, path: &str) {
        self.store.write().remove(path);
    }

    fn copy_subtree(&self, from: &str, to: &str) {
        let mut store = self.store.write();
        let prefix = if from.ends_with('/') { from.to_string() } else { format!("{}/", from) };
        let matches: Vec<(String, HashMap<(String, String), DavProp>)> = store
            .iter()
            .filter(|(p, _)| p.as_str() == from || p.starts_with(&prefix))
            .map(|(p, v)| (p.clone(), v.clone()))
            .collect();
        for (p, v) in matches {
            let suffix = &p[from.len()..];
            store.insert(format!("{}{}", to, suffix), v);
        }
    }

    fn move_subtree(&self, from: &str, to: &str) {
        self.copy_subtree(from, to);
        self.delete_subtree(from);
    }

    fn delete_subtree(&self, path: &str) {
        let mut store = self.store.write();
        let prefix = if path.ends_with('/') { path.to_string() } else { format!("{}/", path) };
        store.retain(|p, _| p.as_str() != path && !p.starts_with(&prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> PropName {
        PropName { ns: "http://example.com/".into(), name: n.into() }
    }

    #[test]
    fn set_then_select() {
        let db = MemPropDb::new();
        let prop = DavProp { name: name("color"), value: Some(Element::new("color")) };
        let res = db.patch("/a", &[PatchOp::Set(prop.clone())]);
        assert_eq!(res[0].1, PatchStatus::Ok);
        let got = db.select("/a", &[name("color")]);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn protected_property_is_rejected_atomically() {
        let db = MemPropDb::new();
        let protected = PropName { ns: "DAV:".into(), name: "getetag".into() };
        let ops = vec![
            PatchOp::Set(DavProp { name: name("color"), value: Some(Element::new("color")) }),
            PatchOp::Set(DavProp { name: protected.clone(), value: None }),
        ];
        let res = db.patch("/a", &ops);
        assert!(res.iter().all(|(_, s)| *s != PatchStatus::Ok));
        assert!(db.select("/a", &[name("color")]).is_empty());
    }

    #[test]
    fn move_subtree_relocates_descendant_props() {
        let db = MemPropDb::new();
        db.patch("/a/b", &[PatchOp::Set(DavProp { name: name("x"), value: None })]);
        db.move_subtree("/a", "/z");
        assert!(db.select("/a/b", &[name("x")]).is_empty());
        assert_eq!(db.select("/z/b", &[name("x")]).len(), 1);
    }
}
