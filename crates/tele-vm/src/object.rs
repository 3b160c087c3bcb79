//! The canonical mirror of one object in the target heap

use crate::deep_copy::{DeepCopier, DeepCopy};
use crate::local::{LocalArray, LocalObject, LocalValue};
use crate::mirror::Mirror;
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::{TeleError, TeleVm};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Weak};
use tele_access::classes::{ClassDescriptor, FieldDescriptor};
use tele_access::layout::HeaderField;
use tele_access::reference::ReferenceStatus;
use tele_access::Reference;
use tele_types::names::{fields, tables};
use tele_types::{Address, Epoch, Kind, ObjectId, ObjectKind, ObjectStatus, Value, WordType};
use tracing::{debug, instrument, trace, warn};

/// How the memory of an object is laid out
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ObjectShape {
    /// Named fields at fixed offsets
    Tuple,
    /// The static fields of a class, held in a tuple of their own
    StaticTuple,
    /// A length and that many elements of one kind
    Array { component: Kind, length: u32 },
    /// A tuple part followed by an array of words holding the tables of a hub
    Hybrid { length: u32, first_element_offset: u32 },
}

impl ObjectShape {
    /// The kind of object this shape describes
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectShape::Tuple | ObjectShape::StaticTuple => ObjectKind::Tuple,
            ObjectShape::Array { .. } => ObjectKind::Array,
            ObjectShape::Hybrid { .. } => ObjectKind::Hybrid,
        }
    }
}

/// The tables held in the array part of a hub
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HybridTable {
    VTable,
    ITable,
    MTable,
    ReferenceMap,
}

impl HybridTable {
    /// Every table, in the order they are laid out
    pub const ALL: [HybridTable; 4] = [
        HybridTable::VTable,
        HybridTable::ITable,
        HybridTable::MTable,
        HybridTable::ReferenceMap,
    ];

    /// The name the hub's class declares the table under
    pub fn name(&self) -> &'static str {
        match self {
            HybridTable::VTable => tables::V_TABLE,
            HybridTable::ITable => tables::I_TABLE,
            HybridTable::MTable => tables::M_TABLE,
            HybridTable::ReferenceMap => tables::REFERENCE_MAP,
        }
    }

    /// The hub fields holding the start index and the length of the table
    fn fields(&self) -> (&'static str, &'static str) {
        match self {
            HybridTable::VTable => (fields::V_TABLE_START, fields::V_TABLE_LENGTH),
            HybridTable::ITable => (fields::I_TABLE_START, fields::I_TABLE_LENGTH),
            HybridTable::MTable => (fields::M_TABLE_START, fields::M_TABLE_LENGTH),
            HybridTable::ReferenceMap => {
                (fields::REFERENCE_MAP_START, fields::REFERENCE_MAP_LENGTH)
            }
        }
    }
}

/// Where one table of a hub lives
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TableRegion {
    pub table: HybridTable,
    /// the kind of the elements, as declared by the hub's class
    pub element_kind: Kind,
    /// the index of the first element, in units of the table's element width
    pub start_index: u32,
    pub length: u32,
    /// the address of the first element of the hub's array part
    pub first_element: Address,
}

impl TableRegion {
    /// The width of one element
    pub fn width(&self) -> u32 {
        self.element_kind.width()
    }

    /// The address of the first element of the table
    pub fn start(&self) -> Address {
        self.element_address(0)
    }

    /// The address of element `index` of the table
    pub fn element_address(&self, index: u32) -> Address {
        self.first_element
            .plus((self.start_index as u64 + index as u64) * self.width() as u64)
    }
}

/// The outcome of asking a mirror to refresh for an epoch
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CacheUpdate {
    /// The surrogate refreshed its cache
    Updated,
    /// The mirror was already current
    Redundant,
    /// The target could not be read; the update will be retried next epoch
    Postponed,
    /// The object is dead or obsolete, so there is nothing to refresh
    Skipped,
}

/// The one mirror of an object in the target.
///
/// For as long as some caller holds on to it, every request for the same reference yields this
/// same instance. The class and shape are fixed when the mirror is created; everything else is
/// read through the reference, so moves made by the target's collector are followed.
pub struct TeleObject {
    vm: Weak<TeleVm>,
    oid: ObjectId,
    reference: RwLock<Reference>,
    class: Arc<ClassDescriptor>,
    shape: ObjectShape,
    surrogate: Box<dyn Surrogate>,
    last_update_epoch: Mutex<Option<Epoch>>,
    forwarded: RwLock<Option<Weak<TeleObject>>>,
}

impl TeleObject {
    pub(crate) fn new(
        vm: Weak<TeleVm>,
        oid: ObjectId,
        reference: Reference,
        class: Arc<ClassDescriptor>,
        shape: ObjectShape,
        surrogate: Box<dyn Surrogate>,
    ) -> Self {
        Self {
            vm,
            oid,
            reference: RwLock::new(reference),
            class,
            shape,
            surrogate,
            last_update_epoch: Mutex::new(None),
            forwarded: RwLock::new(None),
        }
    }

    /// The session-unique id of this mirror
    pub fn oid(&self) -> ObjectId {
        self.oid
    }

    /// The reference this mirror reads through
    pub fn reference(&self) -> Reference {
        *self.reference.read()
    }

    pub fn kind(&self) -> ObjectKind {
        self.shape.kind()
    }

    pub fn shape(&self) -> &ObjectShape {
        &self.shape
    }

    /// The class of the object in the target
    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// The name of the surrogate type attached to this mirror
    pub fn type_name(&self) -> &'static str {
        self.surrogate.type_name()
    }

    pub fn role(&self) -> Option<&'static str> {
        self.surrogate.role()
    }

    pub fn surrogate(&self) -> &dyn Surrogate {
        &*self.surrogate
    }

    /// Views this mirror through its concrete surrogate type
    pub fn downcast<S: Surrogate>(&self) -> Option<SurrogateRef<'_, S>> {
        let surrogate: &dyn Surrogate = &*self.surrogate;
        surrogate
            .as_any()
            .downcast_ref::<S>()
            .map(|surrogate| SurrogateRef::new(self, surrogate))
    }

    /// Whether the surrogate is of type `S`
    pub fn is<S: Surrogate>(&self) -> bool {
        self.downcast::<S>().is_some()
    }

    /// The epoch this mirror last successfully refreshed for
    pub fn last_update_epoch(&self) -> Option<Epoch> {
        *self.last_update_epoch.lock()
    }

    pub fn status(&self) -> ObjectStatus {
        if self.forwarded.read().is_some() {
            return ObjectStatus::Obsolete;
        }
        let Ok(vm) = self.vm() else {
            return ObjectStatus::Dead;
        };
        match vm.references().status(self.reference()) {
            ReferenceStatus::Dead => ObjectStatus::Dead,
            ReferenceStatus::Live | ReferenceStatus::Forwarded(_) => ObjectStatus::Live,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status().is_live()
    }

    /// The mirror of the copy an obsolete object was forwarded to
    pub fn forwarded_object(&self) -> Option<Arc<TeleObject>> {
        self.forwarded.read().as_ref().and_then(Weak::upgrade)
    }

    /// The current origin of the object, or its last known origin once it is no longer live
    pub fn origin(&self) -> Result<Address, TeleError> {
        Ok(self.vm()?.references().origin(self.reference()))
    }

    /// The size of the object in the target, in bytes
    pub fn object_size(&self) -> Result<u64, TeleError> {
        let vm = self.vm()?;
        let layout = vm.layout();
        Ok(match self.shape {
            ObjectShape::Tuple => self.class.instance_size() as u64,
            ObjectShape::StaticTuple => self.class.static_tuple_size() as u64,
            ObjectShape::Array { component, length } => {
                layout.array_size(component, length as u64)
            }
            ObjectShape::Hybrid {
                length,
                first_element_offset,
            } => layout.align(
                first_element_offset as u64 + length as u64 * layout.word_size() as u64,
            ),
        })
    }

    /// The address of one of the object's header slots
    pub fn header_address(&self, field: HeaderField) -> Result<Address, TeleError> {
        let vm = self.vm()?;
        let layout = vm.layout();
        if !layout.header_fields(self.kind()).contains(&field) {
            return Err(TeleError::unsupported("header field", self.kind()));
        }
        Ok(self.origin()?.plus(layout.header_field_offset(field) as u64))
    }

    /// The mirror of this object's hub
    pub fn hub(&self) -> Result<Option<Arc<TeleObject>>, TeleError> {
        let vm = self.vm()?;
        let hub = vm.raw_reader().read_hub(self.origin()?)?;
        vm.make_object_at(hub)
    }

    // ---- tuples

    /// The fields of the object: instance fields root class first, or the class's static
    /// fields for a static tuple. Arrays have none.
    pub fn fields(&self) -> Vec<&FieldDescriptor> {
        match self.shape {
            ObjectShape::StaticTuple => self.class.static_fields().iter().collect(),
            ObjectShape::Array { .. } => Vec::new(),
            ObjectShape::Tuple | ObjectShape::Hybrid { .. } => self.class.instance_fields(),
        }
    }

    /// Looks up a field by name
    pub fn field(&self, name: &str) -> Result<&FieldDescriptor, TeleError> {
        let field = match self.shape {
            ObjectShape::Array { .. } => {
                return Err(TeleError::unsupported("field lookup", self.kind()))
            }
            ObjectShape::StaticTuple => self.class.find_static_field(name),
            ObjectShape::Tuple | ObjectShape::Hybrid { .. } => self.class.find_field(name),
        };
        field.ok_or_else(|| TeleError::NoSuchField {
            class: self.class.name().to_string(),
            field: name.to_string(),
        })
    }

    /// The address of a field of this object
    pub fn field_address(&self, field: &FieldDescriptor) -> Result<Address, TeleError> {
        if let ObjectShape::Array { .. } = self.shape {
            return Err(TeleError::unsupported("field address", self.kind()));
        }
        Ok(self.origin()?.plus(field.offset() as u64))
    }

    /// The size of a field of this object
    pub fn field_size(&self, field: &FieldDescriptor) -> Result<u32, TeleError> {
        if let ObjectShape::Array { .. } = self.shape {
            return Err(TeleError::unsupported("field size", self.kind()));
        }
        Ok(field.width())
    }

    /// Reads the current value of a field
    pub fn read_field_value(&self, field: &FieldDescriptor) -> Result<Value, TeleError> {
        let address = self.field_address(field)?;
        Ok(self.vm()?.data_access().read_value(field.kind(), address)?)
    }

    /// Reads the current value of a field by name
    pub fn read_field(&self, name: &str) -> Result<Value, TeleError> {
        self.read_field_value(self.field(name)?)
    }

    /// Reads an `int` field by name
    pub fn read_int_field(&self, name: &str) -> Result<i32, TeleError> {
        match self.read_field(name)? {
            Value::Int(value) => Ok(value),
            other => Err(self.field_kind_mismatch(name, Kind::Int, other)),
        }
    }

    /// Reads a word field by name
    pub fn read_word_field(&self, name: &str) -> Result<Address, TeleError> {
        match self.read_field(name)? {
            Value::Word(value) => Ok(value),
            other => Err(self.field_kind_mismatch(name, Kind::Word, other)),
        }
    }

    /// Reads a reference field by name and mirrors the object it points at
    pub fn read_reference_field(&self, name: &str) -> Result<Option<Arc<TeleObject>>, TeleError> {
        match self.read_field(name)? {
            Value::Reference(origin) => self.vm()?.make_object_at(origin),
            other => Err(self.field_kind_mismatch(name, Kind::Reference, other)),
        }
    }

    fn field_kind_mismatch(&self, name: &str, expected: Kind, found: Value) -> TeleError {
        TeleError::FatalInconsistency(format!(
            "field {}.{name} holds a {}, not a {}",
            self.class.name(),
            found.kind().name(),
            expected.name()
        ))
    }

    // ---- arrays

    /// The number of elements of an array, or of words in the array part of a hub
    pub fn length(&self) -> Result<u32, TeleError> {
        match self.shape {
            ObjectShape::Array { length, .. } | ObjectShape::Hybrid { length, .. } => Ok(length),
            _ => Err(TeleError::unsupported("length", self.kind())),
        }
    }

    /// The kind of an array's elements
    pub fn component_kind(&self) -> Result<Kind, TeleError> {
        match self.shape {
            ObjectShape::Array { component, .. } => Ok(component),
            _ => Err(TeleError::unsupported("component kind", self.kind())),
        }
    }

    /// The address the elements of an array start at, whether or not there are any
    pub fn first_element_address(&self) -> Result<Address, TeleError> {
        let vm = self.vm()?;
        let offset = match self.shape {
            ObjectShape::Array { component, .. } => {
                vm.layout().array_element_offset(component, 0)
            }
            ObjectShape::Hybrid {
                first_element_offset,
                ..
            } => first_element_offset as u64,
            _ => return Err(TeleError::unsupported("element address", self.kind())),
        };
        Ok(self.origin()?.plus(offset))
    }

    /// The address of element `index` of an array
    pub fn element_address(&self, index: u64) -> Result<Address, TeleError> {
        let (component, length) = self.array_parts("element address")?;
        if index >= length as u64 {
            return Err(TeleError::IndexOutOfBounds {
                index,
                length: length as u64,
            });
        }
        Ok(self
            .first_element_address()?
            .plus(index * component.width() as u64))
    }

    /// Reads element `index` of an array
    pub fn read_element_value(&self, index: u64) -> Result<Value, TeleError> {
        let (component, _) = self.array_parts("element read")?;
        let address = self.element_address(index)?;
        Ok(self.vm()?.data_access().read_value(component, address)?)
    }

    /// Reads every element of an array in one transfer
    pub fn read_element_values(&self) -> Result<Vec<Value>, TeleError> {
        let (component, length) = self.array_parts("element read")?;
        let vm = self.vm()?;
        Ok(vm.data_access().read_values(
            component,
            self.first_element_address()?,
            length as usize,
        )?)
    }

    /// Reads the raw bytes of every element of an array
    pub fn read_element_bytes(&self) -> Result<Bytes, TeleError> {
        let (component, length) = self.array_parts("element read")?;
        let vm = self.vm()?;
        Ok(vm.data_access().read_bytes(
            self.first_element_address()?,
            length as usize * component.width() as usize,
        )?)
    }

    /// Reads every element of an `int[]`
    pub fn read_int_elements(&self) -> Result<Vec<i32>, TeleError> {
        match self.array_parts("int elements")? {
            (Kind::Int, _) => Ok(self
                .read_element_values()?
                .iter()
                .filter_map(Value::as_int)
                .collect()),
            (component, _) => Err(TeleError::FatalInconsistency(format!(
                "expected an int array, found {}[]",
                component.name()
            ))),
        }
    }

    /// Mirrors the object referenced by element `index` of a reference array
    pub fn read_element_reference(&self, index: u64) -> Result<Option<Arc<TeleObject>>, TeleError> {
        match self.read_element_value(index)? {
            Value::Reference(origin) => self.vm()?.make_object_at(origin),
            _ => Err(TeleError::unsupported("element reference", self.kind())),
        }
    }

    fn array_parts(&self, operation: &'static str) -> Result<(Kind, u32), TeleError> {
        match self.shape {
            ObjectShape::Array { component, length } => Ok((component, length)),
            _ => Err(TeleError::unsupported(operation, self.kind())),
        }
    }

    // ---- hybrids

    /// Locates one of the tables in the array part of a hub
    pub fn table(&self, table: HybridTable) -> Result<TableRegion, TeleError> {
        if !matches!(self.shape, ObjectShape::Hybrid { .. }) {
            return Err(TeleError::unsupported("table", self.kind()));
        }
        let Some(element_kind) = self.class.table_kind(table.name()) else {
            return Err(TeleError::FatalInconsistency(format!(
                "{} declares no {table:?}",
                self.class.name()
            )));
        };
        let (start, length) = table.fields();
        let start_index = self.read_int_field(start)?;
        let length = self.read_int_field(length)?;
        let (Ok(start_index), Ok(length)) = (u32::try_from(start_index), u32::try_from(length))
        else {
            return Err(TeleError::FatalInconsistency(format!(
                "{table:?} of {self} has start {start_index} and length {length}"
            )));
        };
        Ok(TableRegion {
            table,
            element_kind,
            start_index,
            length,
            first_element: self.first_element_address()?,
        })
    }

    /// Reads element `index` of one of the tables of a hub
    pub fn read_table_element(&self, table: HybridTable, index: u32) -> Result<Value, TeleError> {
        let region = self.table(table)?;
        if index >= region.length {
            return Err(TeleError::IndexOutOfBounds {
                index: index as u64,
                length: region.length as u64,
            });
        }
        Ok(self
            .vm()?
            .data_access()
            .read_value(region.element_kind, region.element_address(index))?)
    }

    /// Reads the raw words of the array part of a hub
    pub fn read_hybrid_words(&self) -> Result<Vec<u64>, TeleError> {
        let ObjectShape::Hybrid { length, .. } = self.shape else {
            return Err(TeleError::unsupported("hybrid words", self.kind()));
        };
        let vm = self.vm()?;
        Ok(vm
            .data_access()
            .read_values(Kind::Word, self.first_element_address()?, length as usize)?
            .iter()
            .filter_map(Value::as_address)
            .map(|word| word.get())
            .collect())
    }

    // ---- copies

    /// Copies this object alone. References to other objects are left null.
    pub fn shallow_copy(&self) -> Result<LocalObject, TeleError> {
        let class = self.class.clone();
        Ok(match self.shape {
            ObjectShape::Array { component, .. } => LocalObject::Array {
                class,
                elements: LocalArray::from_values(component, self.read_element_values()?),
            },
            ObjectShape::Hybrid { .. } => LocalObject::Hybrid {
                class,
                fields: self.shallow_fields()?,
                words: self.read_hybrid_words()?,
            },
            ObjectShape::Tuple | ObjectShape::StaticTuple => LocalObject::Tuple {
                class,
                fields: self.shallow_fields()?,
            },
        })
    }

    fn shallow_fields(&self) -> Result<Vec<(String, LocalValue)>, TeleError> {
        self.fields()
            .into_iter()
            .map(|field| {
                let value = match self.read_field_value(field)? {
                    Value::Word(address) => {
                        LocalValue::Word(field.word_type().unwrap_or(WordType::Word), address)
                    }
                    other => LocalValue::from(other),
                };
                Ok((field.name().to_string(), value))
            })
            .collect()
    }

    /// Copies this object and everything reachable from it
    pub fn deep_copy(&self) -> Result<DeepCopy, TeleError> {
        self.deep_copy_with(DeepCopier::new())
    }

    /// Copies this object and everything reachable from it with a configured copier.
    ///
    /// Gives up without copying anything if the VM lock can't be acquired in time.
    #[instrument(level = "debug", skip_all, fields(oid = %self.oid, class = %self.class.name()))]
    pub fn deep_copy_with(&self, copier: DeepCopier) -> Result<DeepCopy, TeleError> {
        let vm = self.vm()?;
        let _guard = match vm.lock().try_lock() {
            Ok(guard) => guard,
            Err(error) => {
                warn!("deep copy of {self} abandoned: {error}");
                return Err(error.into());
            }
        };
        let mut copier = copier.with_trace_interval(vm.config().copy_trace_interval());
        trace!("deep copy begins");
        let root = copier.copy(self)?;
        let copy = copier.finish(root);
        debug!(copied = copy.copied_count(), "deep copy ends");
        Ok(copy)
    }

    /// The local value a deep copy substitutes for this object, if any
    pub fn local_equivalent(&self) -> Result<Option<LocalValue>, TeleError> {
        self.surrogate.local_equivalent(self)
    }

    pub fn textual_visualization(&self) -> Option<String> {
        self.surrogate.textual_visualization(self)
    }

    // ---- epochs

    /// Refreshes the mirror's cache for the VM's current epoch
    pub fn update_cache_if_needed(&self) -> Result<CacheUpdate, TeleError> {
        let epoch = self.vm()?.epoch();
        self.update_cache(epoch)
    }

    /// Refreshes the mirror's cache for `epoch`.
    ///
    /// Does nothing when the mirror already refreshed for this epoch or a later one. Follows a
    /// forwarding left by the target's collector before refreshing. The check and the refresh
    /// happen under the VM lock, so concurrent callers refresh once.
    #[instrument(level = "trace", skip(self), fields(oid = %self.oid, class = %self.class.name()))]
    pub fn update_cache(&self, epoch: Epoch) -> Result<CacheUpdate, TeleError> {
        if self.is_updated_for(epoch) {
            return Ok(CacheUpdate::Redundant);
        }
        let vm = self.vm()?;
        let _guard = vm.lock().lock();
        // another thread may have refreshed while this one waited for the lock
        if self.is_updated_for(epoch) {
            return Ok(CacheUpdate::Redundant);
        }
        if !self.follow_target(&vm)? {
            return Ok(CacheUpdate::Skipped);
        }
        let mut stats = StatsPrinter::new();
        match self.surrogate.update_object_cache(self, epoch, &mut stats) {
            Ok(()) => {
                *self.last_update_epoch.lock() = Some(epoch);
                if !stats.is_empty() {
                    trace!("updated: {stats}");
                }
                Ok(CacheUpdate::Updated)
            }
            Err(error) if error.is_transient() => {
                debug!("update postponed: {error}");
                Ok(CacheUpdate::Postponed)
            }
            Err(error) => Err(error),
        }
    }

    fn is_updated_for(&self, epoch: Epoch) -> bool {
        self.last_update_epoch()
            .is_some_and(|last_update| epoch <= last_update)
    }

    /// Brings the reference up to date with the collector. Returns whether there is still a
    /// live object to refresh.
    fn follow_target(&self, vm: &TeleVm) -> Result<bool, TeleError> {
        if self.forwarded.read().is_some() {
            return Ok(false);
        }
        let reference = self.reference();
        match vm.references().status(reference) {
            ReferenceStatus::Live => Ok(true),
            ReferenceStatus::Dead => Ok(false),
            ReferenceStatus::Forwarded(new_origin) => {
                let new_reference = vm.references().make_reference(new_origin);
                match vm.factory().get(new_reference) {
                    Some(newer) if newer.oid != self.oid => {
                        debug!("obsolete, forwarded to {newer}");
                        *self.forwarded.write() = Some(Arc::downgrade(&newer));
                        Ok(false)
                    }
                    _ => {
                        debug!("following forwarding to {new_origin}");
                        *self.reference.write() = new_reference;
                        vm.factory().reindex(reference, new_reference);
                        Ok(true)
                    }
                }
            }
        }
    }
}

impl Mirror for TeleObject {
    fn virtual_machine(&self) -> Weak<TeleVm> {
        self.vm.clone()
    }
}

impl Debug for TeleObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeleObject")
            .field("oid", &self.oid)
            .field("reference", &self.reference())
            .field("class", &self.class.name())
            .field("shape", &self.shape)
            .field("surrogate", &self.surrogate)
            .finish_non_exhaustive()
    }
}

impl Display for TeleObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.class.name(), self.oid)
    }
}
