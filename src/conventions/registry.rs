//! The conventions registry: type ↔ path template ↔ identity.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::codec::{json, CodecResult};
use crate::conventions::document::{attachment_path, Attachments, Document, SharedDocument};
use crate::conventions::error::{ConventionError, ConventionResult};
use crate::conventions::identity::Identity;
use crate::conventions::template::PathTemplate;

type DecodeFn = fn(&[u8], &Attachments) -> CodecResult<SharedDocument>;
type EncodeFn = fn(&(dyn Any + Send + Sync), &mut dyn Write, &mut Attachments) -> CodecResult<()>;
type IdentityFn = fn(&(dyn Any + Send + Sync)) -> Option<Identity>;
type AssignFn = fn(&mut SharedDocument, Identity) -> bool;

/// Everything the store knows about one registered document type.
///
/// Built once per type at registration and shared afterwards; the function
/// table lets type-erased code decode, encode and re-identify documents.
pub struct DocumentType {
    type_id: TypeId,
    name: &'static str,
    template: PathTemplate,
    attachments: &'static [&'static str],
    decode: DecodeFn,
    encode: EncodeFn,
    identity: IdentityFn,
    assign: AssignFn,
}

impl DocumentType {
    fn of<T: Document>(template: PathTemplate) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::type_name(),
            template,
            attachments: T::ATTACHMENTS,
            decode: json::decode_document::<T>,
            encode: json::encode_document::<T>,
            identity: erased_identity::<T>,
            assign: erased_assign::<T>,
        }
    }

    /// `TypeId` of the registered Rust type.
    pub fn document_type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn attachments(&self) -> &'static [&'static str] {
        self.attachments
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Storage path for `identity`.
    pub fn path_for(&self, identity: &Identity) -> ConventionResult<String> {
        if identity.is_unset() {
            return Err(ConventionError::MissingIdentity { type_name: self.name });
        }
        if !identity.is_valid() {
            return Err(ConventionError::InvalidIdentity {
                type_name: self.name,
                identity: identity.to_string(),
            });
        }
        Ok(self.template.render(&identity.to_string()))
    }

    /// Storage path of a type-erased instance of this type.
    pub fn path_of(&self, value: &(dyn Any + Send + Sync)) -> ConventionResult<String> {
        let identity = self
            .identity_of(value)
            .ok_or_else(|| ConventionError::NotRegistered(format!("value is not a {}", self.name)))?;
        self.path_for(&identity)
    }

    /// Identity embedded in `path`, when `path` belongs to this type.
    pub fn identity_in(&self, path: &str) -> Option<Identity> {
        self.template.match_path(path).map(Identity::from)
    }

    pub fn identity_of(&self, value: &(dyn Any + Send + Sync)) -> Option<Identity> {
        (self.identity)(value)
    }

    /// `(suffix, sibling path)` for every declared attachment of the document at `owner_path`.
    pub fn attachment_paths(&self, owner_path: &str) -> Vec<(&'static str, String)> {
        self.attachments
            .iter()
            .map(|suffix| (*suffix, attachment_path(owner_path, suffix)))
            .collect()
    }

    pub(crate) fn decode(&self, input: &[u8], attachments: &Attachments) -> CodecResult<SharedDocument> {
        (self.decode)(input, attachments)
    }

    pub(crate) fn encode(
        &self,
        value: &(dyn Any + Send + Sync),
        output: &mut dyn Write,
        attachments: &mut Attachments,
    ) -> CodecResult<()> {
        (self.encode)(value, output, attachments)
    }

    /// Set the identity of a shared instance; clones it first if it is not unique.
    pub(crate) fn assign(&self, value: &mut SharedDocument, identity: Identity) -> bool {
        (self.assign)(value, identity)
    }
}

impl fmt::Debug for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentType")
            .field("name", &self.name)
            .field("template", &self.template.as_str())
            .field("attachments", &self.attachments)
            .finish()
    }
}

fn erased_identity<T: Document>(value: &(dyn Any + Send + Sync)) -> Option<Identity> {
    value.downcast_ref::<T>().map(T::identity)
}

fn erased_assign<T: Document>(value: &mut SharedDocument, identity: Identity) -> bool {
    if let Some(document) = Arc::get_mut(value).and_then(|v| v.downcast_mut::<T>()) {
        document.assign_identity(identity);
        return true;
    }
    match value.downcast_ref::<T>() {
        Some(document) => {
            let mut copy = document.clone();
            copy.assign_identity(identity);
            *value = Arc::new(copy) as SharedDocument;
            true
        }
        None => false,
    }
}

#[derive(Default)]
struct Registry {
    /// registration order; reverse lookups test templates in this order
    types: Vec<Arc<DocumentType>>,
    by_id: HashMap<TypeId, Arc<DocumentType>>,
    generation: u64,
}

/// Maps document types to storage paths and back.
///
/// Lookups share a read lock; registration takes the write lock.
#[derive(Default)]
pub struct Conventions {
    registry: RwLock<Registry>,
}

impl Conventions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` with its declared template. Registering again is a no-op.
    pub fn register<T: Document>(&self) -> ConventionResult<Arc<DocumentType>> {
        self.register_as::<T>(T::PATH_TEMPLATE)
    }

    /// Register `T` with an explicit template.
    ///
    /// A type keeps the template it was first registered with.
    pub fn register_as<T: Document>(&self, template: &str) -> ConventionResult<Arc<DocumentType>> {
        if let Some(existing) = self.lookup(TypeId::of::<T>()) {
            return Ok(existing);
        }

        let parsed = PathTemplate::parse(template).map_err(|reason| ConventionError::InvalidTemplate {
            type_name: T::type_name(),
            template: template.to_string(),
            reason,
        })?;

        let mut registry = self.registry.write();
        if let Some(existing) = registry.by_id.get(&TypeId::of::<T>()) {
            return Ok(Arc::clone(existing));
        }

        let document_type = Arc::new(DocumentType::of::<T>(parsed));
        registry.types.push(Arc::clone(&document_type));
        registry.by_id.insert(TypeId::of::<T>(), Arc::clone(&document_type));
        registry.generation += 1;

        debug!(
            type_name = document_type.name(),
            template = document_type.template().as_str(),
            "registered document type"
        );
        Ok(document_type)
    }

    /// The registration of `T`, registering it from its declared template if needed.
    pub fn document_type<T: Document>(&self) -> ConventionResult<Arc<DocumentType>> {
        self.register::<T>()
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.registry.read().by_id.contains_key(&TypeId::of::<T>())
    }

    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<DocumentType>> {
        self.registry.read().by_id.get(&type_id).cloned()
    }

    /// Like [`lookup`](Self::lookup) but fails for unknown types.
    pub fn require(&self, type_id: TypeId, type_name: &str) -> ConventionResult<Arc<DocumentType>> {
        self.lookup(type_id)
            .ok_or_else(|| ConventionError::NotRegistered(type_name.to_string()))
    }

    /// Bumped on every new registration.
    pub fn generation(&self) -> u64 {
        self.registry.read().generation
    }

    pub fn registered(&self) -> Vec<Arc<DocumentType>> {
        self.registry.read().types.clone()
    }

    /// GetPath(type, identity)
    pub fn path_for<T: Document>(&self, identity: &Identity) -> ConventionResult<String> {
        self.document_type::<T>()?.path_for(identity)
    }

    /// GetPath(instance)
    pub fn path_of<T: Document>(&self, document: &T) -> ConventionResult<String> {
        self.path_for::<T>(&document.identity())
    }

    /// The directory holding every document of `T`.
    pub fn parent_path<T: Document>(&self) -> ConventionResult<String> {
        Ok(self.document_type::<T>()?.template().parent_path().to_string())
    }

    /// Reverse lookup: the first registered type whose template matches `path`.
    pub fn type_of(&self, path: &str) -> Option<Arc<DocumentType>> {
        self.registry
            .read()
            .types
            .iter()
            .find(|t| t.template().match_path(path).is_some())
            .cloned()
    }

    /// Identity embedded in `path`, if any registered type claims it.
    pub fn identity_in(&self, path: &str) -> Option<Identity> {
        self.type_of(path).and_then(|t| t.identity_in(path))
    }

    /// Set the identity of `document` from the path it was stored at.
    pub fn assign_id_from_path<T: Document>(&self, path: &str, document: &mut T) -> ConventionResult<()> {
        let identity = self
            .document_type::<T>()?
            .identity_in(path)
            .ok_or_else(|| ConventionError::PathMismatch {
                type_name: T::type_name(),
                path: path.to_string(),
            })?;
        document.assign_identity(identity);
        Ok(())
    }

    pub fn assign_id<T: Document>(document: &mut T, identity: impl Into<Identity>) {
        document.assign_identity(identity.into());
    }

    pub fn id_of<T: Document>(document: &T) -> Identity {
        document.identity()
    }
}

impl fmt::Debug for Conventions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("Conventions")
            .field("types", &registry.types)
            .field("generation", &registry.generation)
            .finish()
    }
}
