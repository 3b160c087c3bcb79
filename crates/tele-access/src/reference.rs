//! Canonical, collector-aware handles to target objects

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use tele_types::Address;
use tracing::trace;

/// A canonical handle to an object in the target.
///
/// There is at most one reference per object at a time. When the target's collector moves an
/// object and says so, the reference follows it; an address does not.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Reference(u64);

impl Reference {
    /// The null reference
    pub const ZERO: Reference = Reference(0);

    /// Whether this is the null reference
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Gets the raw handle
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref#{}", self.0)
    }
}

/// What the target has said about the object behind a reference
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReferenceStatus {
    /// The object is where the reference says it is
    Live,
    /// The object was copied to a new location; the reference still names the old copy
    Forwarded(Address),
    /// The object's memory was freed
    Dead,
}

#[derive(Debug, Copy, Clone)]
struct Entry {
    origin: Address,
    status: ReferenceStatus,
}

#[derive(Debug)]
struct Entries {
    next: u64,
    by_origin: HashMap<Address, Reference>,
    entries: HashMap<Reference, Entry>,
}

/// Hands out canonical [Reference]s and tracks what the target's collector does to them
#[derive(Debug)]
pub struct ReferenceManager {
    inner: RwLock<Entries>,
}

impl ReferenceManager {
    /// Creates an empty reference manager
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Entries {
                next: 1,
                by_origin: HashMap::new(),
                entries: HashMap::new(),
            }),
        }
    }

    /// The canonical reference for the object at `origin`
    pub fn make_reference(&self, origin: Address) -> Reference {
        if origin.is_zero() {
            return Reference::ZERO;
        }
        if let Some(reference) = self.existing(origin) {
            return reference;
        }
        let mut inner = self.inner.write();
        if let Some(reference) = inner.by_origin.get(&origin).copied() {
            if inner.entries.get(&reference).map(|entry| entry.status)
                != Some(ReferenceStatus::Dead)
            {
                return reference;
            }
        }
        let reference = Reference(inner.next);
        inner.next += 1;
        inner.by_origin.insert(origin, reference);
        inner.entries.insert(
            reference,
            Entry {
                origin,
                status: ReferenceStatus::Live,
            },
        );
        trace!("{reference} created for {origin}");
        reference
    }

    fn existing(&self, origin: Address) -> Option<Reference> {
        let inner = self.inner.read();
        let reference = *inner.by_origin.get(&origin)?;
        match inner.entries.get(&reference)?.status {
            ReferenceStatus::Dead => None,
            _ => Some(reference),
        }
    }

    /// The last known origin of a reference; the zero address for unknown references
    pub fn origin(&self, reference: Reference) -> Address {
        self.inner
            .read()
            .entries
            .get(&reference)
            .map(|entry| entry.origin)
            .unwrap_or(Address::ZERO)
    }

    /// The status of a reference; unknown references are dead
    pub fn status(&self, reference: Reference) -> ReferenceStatus {
        self.inner
            .read()
            .entries
            .get(&reference)
            .map(|entry| entry.status)
            .unwrap_or(ReferenceStatus::Dead)
    }

    /// The target moved the object at `from` to `to`; its reference follows it
    pub fn relocate(&self, from: Address, to: Address) -> bool {
        let mut inner = self.inner.write();
        if inner.by_origin.contains_key(&to) {
            return false;
        }
        let Some(reference) = inner.by_origin.remove(&from) else {
            return false;
        };
        if let Some(entry) = inner.entries.get_mut(&reference) {
            entry.origin = to;
        }
        inner.by_origin.insert(to, reference);
        trace!("{reference} relocated from {from} to {to}");
        true
    }

    /// The target copied the object at `from` to `to` and left a forwarding pointer behind
    pub fn forward(&self, from: Address, to: Address) -> bool {
        let mut inner = self.inner.write();
        let Some(reference) = inner.by_origin.get(&from).copied() else {
            return false;
        };
        match inner.entries.get_mut(&reference) {
            Some(entry) if entry.status == ReferenceStatus::Live => {
                entry.status = ReferenceStatus::Forwarded(to);
                trace!("{reference} forwarded from {from} to {to}");
                true
            }
            _ => false,
        }
    }

    /// The target freed the object at `origin`
    pub fn mark_dead(&self, origin: Address) -> bool {
        let mut inner = self.inner.write();
        let Some(reference) = inner.by_origin.get(&origin).copied() else {
            return false;
        };
        match inner.entries.get_mut(&reference) {
            Some(entry) => {
                entry.status = ReferenceStatus::Dead;
                trace!("{reference} at {origin} is dead");
                true
            }
            None => false,
        }
    }

    /// The number of references handed out
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether no reference has been handed out
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReferenceManager {
    fn default() -> Self {
        Self::new()
    }
}
