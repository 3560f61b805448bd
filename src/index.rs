//! Minimal HTML directory index, returned from GET on a collection when the
//! request doesn't look like a WebDAV client (no XML body expected).
use htmlescape::encode_minimal as esc;

use crate::davpath::DavPathRef;
use crate::fs::DavMetaData;
use crate::util::systemtime_to_rfc3339;

pub(crate) struct IndexEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<std::time::SystemTime>,
}

impl IndexEntry {
    pub(crate) fn from_meta(name: String, meta: &dyn DavMetaData) -> IndexEntry {
        IndexEntry { name, is_dir: meta.is_dir(), size: meta.len(), modified: meta.modified().ok() }
    }
}

/// Render a listing of `path`'s children as a small HTML page.
pub(crate) fn render(path: &DavPathRef, mut entries: Vec<IndexEntry>) -> String {
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let title = format!("Index of {}", esc(&path.as_url_string()));
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("<meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", title));
    out.push_str("<style type=\"text/css\">body{font-family:sans-serif}</style>\n</head>\n<body>\n");
    out.push_str(&format!("<h1>{}</h1>\n<table>\n", title));
    out.push_str("<tr><th align=\"left\">Name</th><th>Size</th><th>Last modified</th></tr>\n");
    out.push_str("<tr><td colspan=\"3\"><hr></td></tr>\n");

    if !path.as_bytes().eq(b"/") {
        out.push_str("<tr><td colspan=\"3\"><a href=\"..\">..</a></td></tr>\n");
    }

    for e in &entries {
        let href = if e.is_dir { format!("{}/", esc(&e.name)) } else { esc(&e.name) };
        let size = if e.is_dir { "-".to_string() } else { e.size.to_string() };
        let modified = e.modified.map(systemtime_to_rfc3339).unwrap_or_default();
        out.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td align=\"right\">{}</td><td>{}</td></tr>\n",
            href,
            esc(&e.name),
            size,
            esc(&modified)
        ));
    }

    out.push_str("<tr><td colspan=\"3\"><hr></td></tr>\n</table>\n</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::davpath::DavPath;

    #[test]
    fn renders_parent_link_except_at_root() {
        let root = DavPath::new("/").unwrap();
        let html = render(&root, Vec::new());
        assert!(!html.contains(">..<"));

        let sub = DavPath::new("/a/").unwrap();
        let html = render(&sub, Vec::new());
        assert!(html.contains(">..<"));
    }
}
