//! The capability every persisted type implements.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::conventions::identity::Identity;
use crate::storage::path;

/// A type-erased, shared document (or raw blob) as held by a document set.
pub type SharedDocument = Arc<dyn Any + Send + Sync>;

/// A typed, identity-bearing object stored at a convention-derived path.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Project {
///     id: String,
///     name: String,
///     #[serde(skip)]
///     description: Option<String>,
/// }
///
/// impl Document for Project {
///     const PATH_TEMPLATE: &'static str = "projects/{id}/project.json";
///     const ATTACHMENTS: &'static [&'static str] = &["readme.md"];
///
///     fn identity(&self) -> Identity {
///         Identity::from(&self.id)
///     }
///
///     fn assign_identity(&mut self, identity: Identity) {
///         self.id = identity.to_string();
///     }
///
///     fn write_attachments(&self, attachments: &mut Attachments) {
///         if let Some(text) = &self.description {
///             attachments.insert_text("readme.md", text);
///         }
///     }
///
///     fn read_attachments(&mut self, attachments: &Attachments) {
///         self.description = attachments.text("readme.md");
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Where documents of this type live, e.g. `machines/{id}.json`.
    const PATH_TEMPLATE: &'static str;

    /// Suffixes of the sibling files holding this type's external fields.
    const ATTACHMENTS: &'static [&'static str] = &[];

    fn identity(&self) -> Identity;

    fn assign_identity(&mut self, identity: Identity);

    /// Move external fields into `attachments` before the document is encoded.
    fn write_attachments(&self, _attachments: &mut Attachments) {}

    /// Restore external fields after the document is decoded.
    fn read_attachments(&mut self, _attachments: &Attachments) {}

    /// Name used for per-type bookkeeping such as identity allocation.
    fn type_name() -> &'static str {
        short_type_name::<Self>()
    }
}

/// `std::any::type_name` without the module path.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = match full.find('<') {
        Some(index) => &full[..index],
        None => full,
    };
    match base.rfind("::") {
        Some(index) => &full[index + 2..],
        None => full,
    }
}

/// External field contents keyed by attachment suffix.
///
/// Passed explicitly through encode and decode so the codec stays reentrant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, suffix: &str, contents: impl Into<Vec<u8>>) {
        self.entries.insert(suffix.to_string(), contents.into());
    }

    pub fn insert_text(&mut self, suffix: &str, text: &str) {
        self.insert(suffix, text.as_bytes());
    }

    pub fn get(&self, suffix: &str) -> Option<&[u8]> {
        self.entries.get(suffix).map(Vec::as_slice)
    }

    /// The attachment as UTF-8 text; `None` if absent or not valid UTF-8.
    pub fn text(&self, suffix: &str) -> Option<String> {
        self.get(suffix)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(str::to_string)
    }

    pub fn contains(&self, suffix: &str) -> bool {
        self.entries.contains_key(suffix)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Sibling path of an attachment: `<owner dir>/<owner stem>.<suffix>`.
pub fn attachment_path(owner_path: &str, suffix: &str) -> String {
    let name = format!("{}.{}", path::file_stem(owner_path), suffix);
    path::join(path::parent(owner_path), &name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    mod nested {
        pub struct Wrapper<T>(pub T);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Plain>(), "Plain");
        assert_eq!(short_type_name::<nested::Wrapper<Plain>>().split('<').next(), Some("Wrapper"));
        assert_eq!(short_type_name::<u64>(), "u64");
    }

    #[test]
    fn test_attachment_path() {
        assert_eq!(
            attachment_path("projects/acme/project.json", "readme.md"),
            "projects/acme/project.readme.md"
        );
        assert_eq!(attachment_path("environments/env-1.json", "notes.txt"), "environments/env-1.notes.txt");
        assert_eq!(attachment_path("top.json", "md"), "top.md");
    }

    #[test]
    fn test_attachments_text() {
        let mut attachments = Attachments::new();
        attachments.insert_text("readme.md", "# ACME");
        attachments.insert("logo.png", vec![0xff, 0xfe]);

        assert_eq!(attachments.text("readme.md").as_deref(), Some("# ACME"));
        assert_eq!(attachments.text("logo.png"), None);
        assert_eq!(attachments.get("logo.png"), Some(&[0xff, 0xfe][..]));
        assert!(!attachments.contains("missing"));
    }
}
