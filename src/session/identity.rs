//! Sequential integer identities for documents stored without one.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conventions::{Document, Identity};
use crate::session::error::SessionResult;
use crate::session::extension::{ExtensionContext, StagedDocument, WriteSessionExtension};
use crate::session::read::DocumentReader;
use crate::storage::{Anchor, AnchorId};

/// The allocation record: last integer handed out per type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAllocations {
    pub id: String,
    #[serde(default)]
    pub next_identity: BTreeMap<String, u64>,
}

impl IdentityAllocations {
    /// identity of the single allocation record
    pub const ID: &'static str = "ids";

    pub fn new() -> Self {
        Self {
            id: Self::ID.to_string(),
            next_identity: BTreeMap::new(),
        }
    }

    /// Allocate the next identity for `type_name`, starting at 1.
    pub fn next(&mut self, type_name: &str) -> u64 {
        let last = self.next_identity.entry(type_name.to_string()).or_insert(0);
        *last += 1;
        *last
    }

    /// the identity most recently allocated for `type_name`
    pub fn last(&self, type_name: &str) -> Option<u64> {
        self.next_identity.get(type_name).copied()
    }
}

impl Document for IdentityAllocations {
    const PATH_TEMPLATE: &'static str = "meta/{id}.json";

    fn identity(&self) -> Identity {
        Identity::from(&self.id)
    }

    fn assign_identity(&mut self, identity: Identity) {
        self.id = identity.to_string();
    }
}

/// Assigns `1, 2, 3, …` per type to documents stored with an unset identity.
///
/// The updated allocation record is staged in the same session as the
/// documents it numbered, so both land in one commit or neither does. The
/// last committed record is cached against its anchor; a session opened on
/// any other anchor reloads it.
#[derive(Debug, Default)]
pub struct LinearIdentityGenerator {
    committed: Mutex<Option<(AnchorId, IdentityAllocations)>>,
}

impl LinearIdentityGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, anchor: AnchorId) -> Option<IdentityAllocations> {
        match &*self.committed.lock() {
            Some((id, record)) if *id == anchor => Some(record.clone()),
            _ => None,
        }
    }

    /// The record as this session currently sees it.
    fn current(&self, context: &mut ExtensionContext<'_>) -> SessionResult<IdentityAllocations> {
        if let Some(staged) = context.session().staged::<IdentityAllocations>(IdentityAllocations::ID)? {
            return Ok((*staged).clone());
        }
        if let Some(record) = self.cached(context.anchor().id) {
            return Ok(record);
        }
        let loaded = context
            .session()
            .load::<IdentityAllocations>(IdentityAllocations::ID)?
            .map(|record| (*record).clone())
            .unwrap_or_else(IdentityAllocations::new);
        Ok(loaded)
    }
}

impl WriteSessionExtension for LinearIdentityGenerator {
    fn after_open(&self, context: &mut ExtensionContext<'_>) -> SessionResult<()> {
        let anchor = context.anchor().id;
        if self.cached(anchor).is_some() {
            return Ok(());
        }
        let record = self.current(context)?;
        debug!(%anchor, "loaded identity allocations");
        *self.committed.lock() = Some((anchor, record));
        Ok(())
    }

    fn before_store(&self, context: &mut ExtensionContext<'_>, document: &mut StagedDocument) -> SessionResult<()> {
        if document.is::<IdentityAllocations>() {
            return Ok(());
        }
        if !document.identity().is_some_and(|identity| identity.is_unset()) {
            return Ok(());
        }

        let mut record = self.current(context)?;
        let next = record.next(document.type_name());
        document.assign_identity(Identity::from(next));
        context.session().store_replacing(record)?;
        debug!(type_name = document.type_name(), identity = next, "allocated identity");
        Ok(())
    }

    fn after_commit(&self, context: &mut ExtensionContext<'_>, anchor: Option<&Anchor>) -> SessionResult<()> {
        let Some(anchor) = anchor else {
            return Ok(());
        };
        // the session's batch is already re-pinned at `anchor`; an unchanged
        // record is still the one cached for the parent
        let record = match context.session().staged::<IdentityAllocations>(IdentityAllocations::ID)? {
            Some(staged) => Some((*staged).clone()),
            None => anchor.first_parent().and_then(|parent| self.cached(parent)),
        };
        *self.committed.lock() = record.map(|record| (anchor.id, record));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_starts_at_one_per_type() {
        let mut record = IdentityAllocations::new();
        assert_eq!(record.next("Machine"), 1);
        assert_eq!(record.next("Machine"), 2);
        assert_eq!(record.next("Tenant"), 1);
        assert_eq!(record.last("Machine"), Some(2));
        assert_eq!(record.last("Project"), None);
    }

    #[test]
    fn test_record_serialization() {
        let mut record = IdentityAllocations::new();
        record.next("Machine");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":"ids","next_identity":{"Machine":1}}"#);

        let missing_map: IdentityAllocations = serde_json::from_str(r#"{"id":"ids"}"#).unwrap();
        assert!(missing_map.next_identity.is_empty());
    }
}
