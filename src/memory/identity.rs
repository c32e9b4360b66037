//! Stable document identity and deterministic session ids.
//!
//! A task pane reports whatever it knows about the open document. The key
//! prefers the strongest signal so that renaming a file does not fork its
//! memory while two unsaved documents with the same name still stay apart
//! as long as the host gives them distinct ids.

use serde::{Deserialize, Serialize};

use crate::utils::sanitize::sha256_hex;

/// Length of the hex digest embedded in session ids.
pub const SESSION_HASH_LEN: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentity {
    /// OS-level file identity (device + inode) when the caller resolved it.
    #[serde(default, alias = "fileIdentity", skip_serializing_if = "Option::is_none")]
    pub file_identity: Option<String>,
    #[serde(default, alias = "fullPath", alias = "full_path", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, alias = "docId", skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DocumentIdentity {
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            file_identity: local_file_identity(&path),
            path: Some(path),
            ..Default::default()
        }
    }

    /// Fill `file_identity` from the local filesystem if the path exists.
    pub fn resolve_local(mut self) -> Self {
        if self.file_identity.is_none() {
            if let Some(path) = non_empty(&self.path) {
                self.file_identity = local_file_identity(path);
            }
        }
        self
    }

    /// Strongest available key: file identity, normalised path, doc id, name.
    pub fn document_key(&self) -> Option<String> {
        if let Some(fid) = non_empty(&self.file_identity) {
            return Some(format!("file:{}", fid));
        }
        if let Some(path) = non_empty(&self.path) {
            return Some(format!("path:{}", normalize_path(path)));
        }
        if let Some(id) = non_empty(&self.doc_id) {
            return Some(format!("doc:{}", id));
        }
        non_empty(&self.name).map(|n| format!("name:{}", n))
    }

    /// Deterministic `session_<hex>` id namespaced by host and client.
    ///
    /// Documents with no identity at all share the `anonymous` key, so the
    /// client id is what keeps their sessions apart.
    pub fn session_id(&self, host: Option<&str>, client_id: Option<&str>) -> String {
        let mut parts = vec![self.document_key().unwrap_or_else(|| "anonymous".into())];
        if let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) {
            parts.push(format!("host:{}", host.to_lowercase()));
        }
        if let Some(client) = client_id.map(str::trim).filter(|c| !c.is_empty()) {
            parts.push(format!("client:{}", client));
        }
        let digest = sha256_hex(&parts.join("|"));
        format!("session_{}", &digest[..SESSION_HASH_LEN])
    }
}

/// File name for a document key on disk.
pub fn document_file_stem(document_key: &str) -> String {
    sha256_hex(document_key)[..SESSION_HASH_LEN].to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Normalise a document path so that `C:\Docs\A.docx` and
/// `file:///c:/docs/a.docx` agree.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let without_scheme = trimmed
        .strip_prefix("file:///")
        .or_else(|| trimmed.strip_prefix("file://"))
        .unwrap_or(trimmed);
    let mut out = String::with_capacity(without_scheme.len());
    let mut last_slash = false;
    for c in without_scheme.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_slash {
                continue;
            }
            last_slash = true;
        } else {
            last_slash = false;
        }
        out.extend(c.to_lowercase());
    }
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

#[cfg(unix)]
fn local_file_identity(path: &str) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path).ok()?;
    Some(format!("{}:{}", meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn local_file_identity(_path: &str) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_key_precedence() {
        let mut id = DocumentIdentity {
            file_identity: None,
            path: Some("C:\\Bids\\Tender.docx".into()),
            doc_id: Some("42".into()),
            name: Some("Tender.docx".into()),
        };
        assert_eq!(id.document_key().unwrap(), "path:c:/bids/tender.docx");
        id.file_identity = Some("7:99".into());
        assert_eq!(id.document_key().unwrap(), "file:7:99");
        let only_name = DocumentIdentity {
            name: Some("草稿".into()),
            ..Default::default()
        };
        assert_eq!(only_name.document_key().unwrap(), "name:草稿");
        assert!(DocumentIdentity::default().document_key().is_none());
    }

    #[test]
    fn test_path_normalisation_agrees() {
        assert_eq!(
            normalize_path("file:///C:/Docs//A.docx"),
            normalize_path("c:\\docs\\a.docx")
        );
    }

    #[test]
    fn test_session_id_is_deterministic_and_namespaced() {
        let id = DocumentIdentity {
            doc_id: Some("abc".into()),
            ..Default::default()
        };
        let a = id.session_id(Some("wps"), Some("pane-1"));
        assert_eq!(a, id.session_id(Some("WPS"), Some("pane-1")));
        assert_ne!(a, id.session_id(Some("et"), Some("pane-1")));
        assert_ne!(a, id.session_id(Some("wps"), Some("pane-2")));
        assert!(a.starts_with("session_"));
        assert_eq!(a.len(), "session_".len() + SESSION_HASH_LEN);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_file_identity_survives_rename() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.docx");
        std::fs::File::create(&first).unwrap().write_all(b"x").unwrap();
        let before = DocumentIdentity::from_path(first.to_string_lossy()).document_key();
        let second = dir.path().join("b.docx");
        std::fs::rename(&first, &second).unwrap();
        let after = DocumentIdentity::from_path(second.to_string_lossy()).document_key();
        assert_eq!(before, after);
        assert!(before.unwrap().starts_with("file:"));
    }
}
