//! Creates and canonicalizes mirrors

use crate::object::{CacheUpdate, ObjectShape, TeleObject};
use crate::objects::{self, HubFlavor, TeleArrayObject, TeleHub, TeleStaticTuple};
use crate::mirror::Mirror;
use crate::surrogate::Surrogate;
use crate::{TeleError, TeleVm};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tele_access::classes::{ClassCategory, ClassDescriptor};
use tele_access::reference::ReferenceStatus;
use tele_access::{DataAccessError, Reference};
use tele_types::names::classes;
use tele_types::{Address, Epoch, Kind, ObjectId, ObjectStatus};
use tracing::{debug, error, instrument, trace, warn};

/// Creates the surrogate for an object of a class
pub type SurrogateConstructor =
    Arc<dyn Fn(&Arc<ClassDescriptor>) -> Box<dyn Surrogate> + Send + Sync>;

/// Maps target class names to surrogate constructors.
///
/// A tuple gets the surrogate registered for the nearest ancestor of its class, so registering
/// a constructor for a class also covers every subclass without one of its own.
#[derive(Clone)]
pub struct SurrogateRegistry {
    entries: Vec<(Arc<str>, SurrogateConstructor)>,
}

impl SurrogateRegistry {
    /// A registry with no entries
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `constructor` for instances of `class_name` and its subclasses, replacing any
    /// constructor registered for exactly that class
    pub fn register(&mut self, class_name: impl AsRef<str>, constructor: SurrogateConstructor) {
        let class_name = class_name.as_ref();
        match self
            .entries
            .iter_mut()
            .find(|(name, _)| name.as_ref() == class_name)
        {
            Some((_, existing)) => *existing = constructor,
            None => self.entries.push((Arc::from(class_name), constructor)),
        }
    }

    /// The constructor registered for the nearest ancestor of `class`, with the ancestor's name
    pub fn nearest(&self, class: &ClassDescriptor) -> Option<(Arc<str>, SurrogateConstructor)> {
        class.find_nearest(|ancestor| {
            self.entries
                .iter()
                .find(|(name, _)| name.as_ref() == ancestor.name())
                .cloned()
        })
    }

    /// The classes with a registered constructor
    pub fn registered_classes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_ref())
    }
}

impl Default for SurrogateRegistry {
    /// The registry with the surrogates for the classes this crate knows about
    fn default() -> Self {
        let mut registry = Self::empty();
        objects::register_defaults(&mut registry);
        registry
    }
}

impl Debug for SurrogateRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.registered_classes())
            .finish()
    }
}

/// What a refresh of every live mirror did
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub epoch: Epoch,
    /// mirrors still held by someone when the refresh began
    pub live_objects: usize,
    pub updated: usize,
    /// mirrors whose update will be retried next epoch
    pub postponed: Vec<ObjectId>,
    pub failed: Vec<(ObjectId, String)>,
    /// mirror types whose refresh took longer than the configured threshold
    pub slow_types: Vec<(&'static str, Duration)>,
    /// index entries dropped because their mirror is gone, dead or obsolete
    pub evicted: usize,
}

/// Result of working out what lives at an origin
enum Classification {
    StaticTuple(Arc<ClassDescriptor>),
    Array(Arc<ClassDescriptor>, Kind, u32),
    Hybrid(Arc<ClassDescriptor>, HubFlavor, u32),
    Tuple(Arc<ClassDescriptor>),
}

/// Hands out the one [TeleObject] for each reference.
///
/// Both indexes hold their mirrors weakly: a mirror nobody holds is dropped, and its entries are
/// swept on the next refresh. Asking again for the same reference afterwards creates a fresh
/// mirror with a new id.
pub struct TeleObjectFactory {
    registry: RwLock<SurrogateRegistry>,
    by_reference: RwLock<HashMap<Reference, Weak<TeleObject>>>,
    by_oid: RwLock<HashMap<ObjectId, Weak<TeleObject>>>,
    next_oid: AtomicU64,
    created: AtomicUsize,
    created_per_type: Mutex<BTreeMap<&'static str, usize>>,
    last_update_epoch: Mutex<Option<Epoch>>,
}

impl TeleObjectFactory {
    pub(crate) fn new(registry: SurrogateRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
            by_reference: RwLock::default(),
            by_oid: RwLock::default(),
            next_oid: AtomicU64::new(1),
            created: AtomicUsize::new(0),
            created_per_type: Mutex::default(),
            last_update_epoch: Mutex::new(None),
        }
    }

    /// Registers a surrogate constructor for a class and its subclasses
    pub fn register(&self, class_name: impl AsRef<str>, constructor: SurrogateConstructor) {
        self.registry.write().register(class_name, constructor);
    }

    /// The mirror already created for `reference`, if it is still held by someone
    pub fn get(&self, reference: Reference) -> Option<Arc<TeleObject>> {
        self.by_reference
            .read()
            .get(&reference)
            .and_then(Weak::upgrade)
    }

    /// The mirror with the given id, if it is still held by someone
    pub fn lookup_object(&self, oid: ObjectId) -> Option<Arc<TeleObject>> {
        self.by_oid.read().get(&oid).and_then(Weak::upgrade)
    }

    /// Gets the canonical mirror for `reference`, creating it if needed.
    ///
    /// Returns `None` for the zero reference, for dead references, and for anything that
    /// isn't an object the target's heap can vouch for.
    #[instrument(level = "trace", skip(self, vm))]
    pub fn make(
        &self,
        vm: &TeleVm,
        reference: Reference,
    ) -> Result<Option<Arc<TeleObject>>, TeleError> {
        if reference.is_zero() {
            return Ok(None);
        }
        if let Some(object) = self.get(reference) {
            return Ok(Some(object));
        }
        let _guard = vm.lock().lock();
        if let ReferenceStatus::Dead = vm.references().status(reference) {
            return Ok(None);
        }
        let origin = vm.references().origin(reference);
        if !vm.data_access().is_valid_origin(origin) {
            debug!("no object at {origin}");
            return Ok(None);
        }
        let classification = match self.classify(vm, origin) {
            Ok(classification) => classification,
            Err(TeleError::Access(error)) => {
                debug!("could not classify the object at {origin}: {error}");
                return Ok(None);
            }
            Err(error) => return Err(error),
        };
        if let Some(object) = self.get(reference) {
            return Ok(Some(object));
        }

        let oid = ObjectId::new(self.next_oid.fetch_add(1, Ordering::SeqCst));
        let (class, shape, surrogate) = self.construct(classification)?;
        let object = Arc::new(TeleObject::new(
            vm.virtual_machine(),
            oid,
            reference,
            class,
            shape,
            surrogate,
        ));
        // indexed before the first refresh so that objects reached from it find this mirror
        self.by_reference
            .write()
            .insert(reference, Arc::downgrade(&object));
        self.by_oid.write().insert(oid, Arc::downgrade(&object));
        if let Err(error) = object.update_cache(vm.epoch()) {
            debug!("discarding {object}: {error}");
            self.forget(&object);
            return Err(error);
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        *self
            .created_per_type
            .lock()
            .entry(object.type_name())
            .or_default() += 1;
        trace!("created {object} as {} at {origin}", object.type_name());
        Ok(Some(object))
    }

    /// Removes a mirror no caller has seen from both indexes
    fn forget(&self, object: &Arc<TeleObject>) {
        let reference = object.reference();
        let mut by_reference = self.by_reference.write();
        if by_reference
            .get(&reference)
            .is_some_and(|entry| entry.as_ptr() == Arc::as_ptr(object))
        {
            by_reference.remove(&reference);
        }
        drop(by_reference);
        self.by_oid.write().remove(&object.oid());
    }

    fn classify(&self, vm: &TeleVm, origin: Address) -> Result<Classification, TeleError> {
        let reader = vm.raw_reader();
        let hub = reader.read_hub(origin)?;
        let class = vm
            .classes()
            .resolve_class_descriptor(&reader, reader.read_hub_class_actor(hub)?)?;
        let hub_class = vm
            .classes()
            .resolve_class_descriptor(&reader, reader.read_hub_class_actor(reader.read_hub(hub)?)?)?;

        if hub_class.is_subclass_of(classes::STATIC_HUB) {
            return Ok(Classification::StaticTuple(class));
        }
        if !hub_class.is_subclass_of(classes::HUB) {
            return Err(DataAccessError::Inconsistent {
                address: hub,
                detail: "the hub of the object is not a hub",
            }
            .into());
        }
        Ok(match class.category() {
            ClassCategory::Array { component, .. } => {
                let component = *component;
                Classification::Array(class, component, reader.read_length(origin)?)
            }
            ClassCategory::Hybrid => {
                let flavor = if class.is_subclass_of(classes::DYNAMIC_HUB) {
                    HubFlavor::Dynamic
                } else if class.is_subclass_of(classes::STATIC_HUB) {
                    HubFlavor::Static
                } else {
                    return Err(TeleError::FatalInconsistency(format!(
                        "hybrid object at {origin} is a {}, which is neither a dynamic nor a static hub",
                        class.name()
                    )));
                };
                Classification::Hybrid(class, flavor, reader.read_length(origin)?)
            }
            ClassCategory::Tuple => Classification::Tuple(class),
        })
    }

    fn construct(
        &self,
        classification: Classification,
    ) -> Result<(Arc<ClassDescriptor>, ObjectShape, Box<dyn Surrogate>), TeleError> {
        Ok(match classification {
            Classification::StaticTuple(class) => {
                (class, ObjectShape::StaticTuple, Box::new(TeleStaticTuple))
            }
            Classification::Array(class, component, length) => (
                class,
                ObjectShape::Array { component, length },
                Box::new(TeleArrayObject),
            ),
            Classification::Hybrid(class, flavor, length) => {
                let first_element_offset = class.instance_size();
                (
                    class,
                    ObjectShape::Hybrid {
                        length,
                        first_element_offset,
                    },
                    Box::new(TeleHub::new(flavor)),
                )
            }
            Classification::Tuple(class) => {
                let Some((_, constructor)) = self.registry.read().nearest(&class) else {
                    return Err(TeleError::FatalInconsistency(format!(
                        "no surrogate is registered for {} or any of its superclasses",
                        class.name()
                    )));
                };
                let surrogate = constructor(&class);
                (class, ObjectShape::Tuple, surrogate)
            }
        })
    }

    /// Moves the index entry of a mirror that followed a forwarding to its new reference
    pub(crate) fn reindex(&self, old: Reference, new: Reference) {
        let mut by_reference = self.by_reference.write();
        if let Some(object) = by_reference.remove(&old) {
            by_reference.insert(new, object);
        }
    }

    /// Refreshes every mirror still held by someone, then sweeps the indexes.
    ///
    /// Gives up without touching any mirror if the VM lock can't be acquired in time.
    #[instrument(level = "debug", skip(self, vm))]
    pub fn update_cache(&self, vm: &TeleVm, epoch: Epoch) -> Result<RefreshReport, TeleError> {
        let _guard = match vm.lock().try_lock() {
            Ok(guard) => guard,
            Err(error) => {
                warn!("refresh for {epoch} abandoned: {error}");
                return Err(error.into());
            }
        };
        let snapshot: Vec<Weak<TeleObject>> =
            self.by_reference.read().values().cloned().collect();
        let mut report = RefreshReport {
            epoch,
            ..Default::default()
        };
        let mut timings: BTreeMap<&'static str, Duration> = BTreeMap::new();

        for object in snapshot.iter().filter_map(Weak::upgrade) {
            report.live_objects += 1;
            let started = Instant::now();
            match object.update_cache(epoch) {
                Ok(CacheUpdate::Updated) => report.updated += 1,
                Ok(CacheUpdate::Postponed) => report.postponed.push(object.oid()),
                Ok(CacheUpdate::Redundant | CacheUpdate::Skipped) => {}
                Err(e) => {
                    error!("refreshing {object} failed: {e}");
                    report.failed.push((object.oid(), e.to_string()));
                }
            }
            *timings.entry(object.type_name()).or_default() += started.elapsed();
        }

        let threshold = vm.config().refresh_warning_threshold();
        for (type_name, elapsed) in timings {
            if elapsed >= threshold {
                warn!("refreshing {type_name} mirrors took {elapsed:?}");
                report.slow_types.push((type_name, elapsed));
            }
        }
        report.evicted = self.sweep();
        *self.last_update_epoch.lock() = Some(epoch);
        debug!(
            live = report.live_objects,
            updated = report.updated,
            postponed = report.postponed.len(),
            evicted = report.evicted,
            "refreshed for {epoch}"
        );
        Ok(report)
    }

    /// Drops index entries whose mirror is gone, dead or obsolete
    fn sweep(&self) -> usize {
        let keep = |object: &Weak<TeleObject>| {
            object
                .upgrade()
                .is_some_and(|object| object.status() == ObjectStatus::Live)
        };
        let mut by_reference = self.by_reference.write();
        let before = by_reference.len();
        by_reference.retain(|_, object| keep(object));
        let evicted = before - by_reference.len();
        self.by_oid.write().retain(|_, object| keep(object));
        evicted
    }

    /// The epoch of the last refresh
    pub fn last_update_epoch(&self) -> Option<Epoch> {
        *self.last_update_epoch.lock()
    }

    /// The number of references in the index, including ones whose mirror was dropped since
    /// the last refresh
    pub fn reference_count(&self) -> usize {
        self.by_reference.read().len()
    }

    /// The number of mirrors currently held by someone
    pub fn live_object_count(&self) -> usize {
        self.by_reference
            .read()
            .values()
            .filter(|object| object.strong_count() > 0)
            .count()
    }

    /// The number of mirrors created over the whole session
    pub fn objects_created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// The number of mirrors created over the whole session, per surrogate type
    pub fn objects_created_per_type(&self) -> BTreeMap<&'static str, usize> {
        self.created_per_type.lock().clone()
    }
}

impl Debug for TeleObjectFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeleObjectFactory")
            .field("registry", &*self.registry.read())
            .field("references", &self.reference_count())
            .field("created", &self.objects_created_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::TeleTupleObject;
    use tele_access::Layout;
    use test_log::test;

    fn constructor(name: &'static str) -> SurrogateConstructor {
        Arc::new(move |_| match name {
            "tuple" => Box::new(TeleTupleObject) as Box<dyn Surrogate>,
            _ => Box::new(TeleStaticTuple),
        })
    }

    #[test]
    fn test_nearest_registered_ancestor_wins() {
        let layout = Layout::default();
        let object = Arc::new(ClassDescriptor::builder(classes::OBJECT).build(
            tele_types::ClassId::new(1),
            &layout,
        ));
        let bar = Arc::new(
            ClassDescriptor::builder("Bar")
                .extends(&object)
                .build(tele_types::ClassId::new(2), &layout),
        );
        let foo = ClassDescriptor::builder("Foo")
            .extends(&bar)
            .build(tele_types::ClassId::new(3), &layout);

        let mut registry = SurrogateRegistry::empty();
        registry.register(classes::OBJECT, constructor("tuple"));
        assert_eq!(
            registry.nearest(&foo).map(|(name, _)| name.to_string()),
            Some(classes::OBJECT.to_string())
        );
        registry.register("Bar", constructor("static"));
        assert_eq!(
            registry.nearest(&foo).map(|(name, _)| name.to_string()),
            Some("Bar".to_string())
        );
        assert!(registry.nearest(&object).is_some());
    }

    #[test]
    fn test_registering_twice_replaces() {
        let mut registry = SurrogateRegistry::empty();
        registry.register("Bar", constructor("tuple"));
        registry.register("Bar", constructor("static"));
        assert_eq!(registry.registered_classes().count(), 1);
    }
}
