use crate::machine_code::{MachineCodeInfo, MachineCodeInfoCache, MachineCodeSource};
use crate::mirror::Mirror;
use crate::object::TeleObject;
use crate::objects::{
    MethodSymbol, RegionBounds, TeleCodeAttribute, TeleConstantPool, TeleMemoryRegion,
    TeleMethodActor, TeleMethodRefConstant,
};
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use parking_lot::Mutex;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tele_access::DataAccessError;
use tele_types::names::fields;
use tele_types::{Address, Epoch, Safepoint};
use tracing::{debug, trace};

/// Where the code array of a compiled method was last seen
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct CodeLocation {
    start: Address,
    length: u32,
}

impl CodeLocation {
    fn contains(&self, address: Address) -> bool {
        self.start <= address && address < self.start.plus(self.length as u64)
    }
}

/// A method compiled to machine code.
///
/// The decoded code is built lazily, the first time it is asked for, and rebuilt lazily after
/// each refresh that notices the code was patched or moved.
#[derive(Debug, Default)]
pub struct TeleTargetMethod {
    region: TeleMemoryRegion,
    method_actor: Mutex<Option<Arc<TeleObject>>>,
    code: Mutex<Option<CodeLocation>>,
    evicted: AtomicBool,
    relocations: AtomicUsize,
    cache: MachineCodeInfoCache,
}

impl TeleTargetMethod {
    fn method_actor(&self, object: &TeleObject) -> Result<Option<Arc<TeleObject>>, TeleError> {
        if let Some(method_actor) = self.method_actor.lock().clone() {
            return Ok(Some(method_actor));
        }
        let method_actor = object.read_reference_field(fields::TARGET_METHOD_ACTOR)?;
        *self.method_actor.lock() = method_actor.clone();
        Ok(method_actor)
    }

    fn evict(&self) {
        self.evicted.store(true, Ordering::SeqCst);
        *self.code.lock() = None;
        self.cache
            .install(MachineCodeInfo::evicted(self.cache.code_generation()));
    }

    /// Notices moves and patches of the code, marking the decoded code stale
    fn check_code(
        &self,
        object: &TeleObject,
        stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        let Some(code) = object.read_reference_field(fields::TARGET_METHOD_CODE)? else {
            debug!("{object} was evicted");
            self.evict();
            stats.add_stat("evicted");
            return Ok(());
        };
        let location = CodeLocation {
            start: code.first_element_address()?,
            length: code.length()?,
        };
        let previous = self.code.lock().replace(location);
        if previous.is_some_and(|previous| previous != location) && self.cache.mark_changed() {
            debug!("code of {object} moved to {}", location.start);
            stats.add_stat("code moved");
        } else if self.cache.is_loaded() && self.cache.is_current() {
            let live = code.read_element_bytes()?;
            if live.as_ref() != self.cache.current().code() && self.cache.mark_changed() {
                debug!("code of {object} was patched");
                stats.add_stat("code patched");
            }
        }
        Ok(())
    }

    /// Reads everything the decoded code is built from
    fn load_source(&self, object: &TeleObject) -> Result<MachineCodeSource, TeleError> {
        let Some(code) = object.read_reference_field(fields::TARGET_METHOD_CODE)? else {
            return Err(DataAccessError::Inconsistent {
                address: object.origin()?,
                detail: "compiled method has no code",
            }
            .into());
        };
        let mut source = MachineCodeSource {
            code_start: code.first_element_address()?,
            code: code.read_element_bytes()?.to_vec(),
            safepoints: read_ints(object, fields::TARGET_METHOD_SAFEPOINTS)?
                .unwrap_or_default()
                .into_iter()
                .map(|raw| Safepoint::from_raw(raw as u32))
                .collect(),
            safepoint_bcis: read_ints(object, fields::TARGET_METHOD_SAFEPOINT_BCIS)?
                .unwrap_or_default(),
            bci_to_pos: read_ints(object, fields::TARGET_METHOD_BCI_TO_POS)?,
            ..MachineCodeSource::default()
        };
        if let Some(method_actor) = self.method_actor(object)? {
            if let Some(method) = method_actor.downcast::<TeleMethodActor>() {
                source.method_name = Some(Arc::from(method.qualified_name()?));
                if let Some(attribute) = method.code_attribute()? {
                    if let Some(attribute) = attribute.downcast::<TeleCodeAttribute>() {
                        source.bytecodes = Some(attribute.bytecodes()?);
                    }
                }
            }
        }
        Ok(source)
    }

    /// Resolves the method named by entry `pool_index` of the constant pool of the method
    fn resolve_callee(
        &self,
        object: &TeleObject,
        pool_index: u16,
    ) -> Result<Option<MethodSymbol>, TeleError> {
        let Some(method_actor) = self.method_actor(object)? else {
            return Ok(None);
        };
        let Some(attribute) = method_actor
            .downcast::<TeleMethodActor>()
            .map(|method| method.code_attribute())
            .transpose()?
            .flatten()
        else {
            return Ok(None);
        };
        let Some(pool) = attribute
            .downcast::<TeleCodeAttribute>()
            .map(|attribute| attribute.constant_pool())
            .transpose()?
            .flatten()
        else {
            return Ok(None);
        };
        let Some(constant) = pool
            .downcast::<TeleConstantPool>()
            .map(|pool| pool.constant(pool_index))
            .transpose()?
            .flatten()
        else {
            return Ok(None);
        };
        constant
            .downcast::<TeleMethodRefConstant>()
            .map(|constant| constant.symbol())
            .transpose()
    }
}

fn read_ints(object: &TeleObject, field: &str) -> Result<Option<Vec<i32>>, TeleError> {
    object
        .read_reference_field(field)?
        .map(|array| array.read_int_elements())
        .transpose()
}

impl Surrogate for TeleTargetMethod {
    fn type_name(&self) -> &'static str {
        "TeleTargetMethod"
    }

    fn role(&self) -> Option<&'static str> {
        Some("compiled method")
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        let (bounds, previous) = self.region.refresh(object)?;
        if previous.is_some_and(|previous| previous.start != bounds.start) {
            self.relocations.fetch_add(1, Ordering::Relaxed);
            stats.add_stat(format!("relocated to {}", bounds.start));
        }
        if self.evicted.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.method_actor(object)?;
        self.check_code(object, stats)
    }

    fn deep_copy_warning(&self) -> Option<&'static str> {
        Some("copying a compiled method copies its code and all of its metadata")
    }

    fn textual_visualization(&self, _object: &TeleObject) -> Option<String> {
        let method_actor = self.method_actor.lock().clone()?;
        let method = method_actor.downcast::<TeleMethodActor>()?;
        method.qualified_name().ok()
    }
}

impl SurrogateRef<'_, TeleTargetMethod> {
    /// The decoded machine code, rebuilt first if the code changed since it was last built.
    ///
    /// Fails, leaving the previous snapshot in place, if the VM lock can't be acquired or the
    /// target can't be read.
    pub fn try_machine_code_info(&self) -> Result<Arc<MachineCodeInfo>, TeleError> {
        let cache = &self.surrogate().cache;
        if cache.is_current() {
            return Ok(cache.current());
        }
        let vm = self.vm()?;
        let _guard = vm.lock().try_lock()?;
        if cache.is_current() {
            return Ok(cache.current());
        }
        let generation = cache.code_generation();
        let source = self.surrogate().load_source(self.object())?;
        let info = MachineCodeInfo::build(
            generation,
            source,
            vm.disassembler().as_ref(),
            |pool_index| self.surrogate().resolve_callee(self.object(), pool_index),
        )?;
        trace!(
            "decoded {} instructions of {} for generation {generation}",
            info.len(),
            self.object()
        );
        Ok(cache.install(info))
    }

    /// The decoded machine code, rebuilt first if the code changed. When rebuilding fails the
    /// previous snapshot is returned.
    pub fn machine_code_info(&self) -> Arc<MachineCodeInfo> {
        match self.try_machine_code_info() {
            Ok(info) => info,
            Err(error) => {
                debug!("keeping the previous machine code of {}: {error}", self.object());
                self.surrogate().cache.current()
            }
        }
    }

    /// Whether the decoded code was ever built
    pub fn is_loaded(&self) -> bool {
        self.surrogate().cache.is_loaded()
    }

    /// Whether the decoded code reflects the code in the target
    pub fn is_current(&self) -> bool {
        self.surrogate().cache.is_current()
    }

    /// The generation of the code in the target: one more than the number of changes observed
    /// while the decoded code was current
    pub fn code_generation(&self) -> u64 {
        self.surrogate().cache.code_generation()
    }

    /// How many times the decoded code was built
    pub fn reload_count(&self) -> usize {
        self.surrogate().cache.reload_count()
    }

    /// Whether the target threw the code away
    pub fn is_evicted(&self) -> bool {
        self.surrogate().evicted.load(Ordering::SeqCst)
    }

    /// How many times the region of the method was seen to move
    pub fn relocation_count(&self) -> usize {
        self.surrogate().relocations.load(Ordering::Relaxed)
    }

    /// The memory the method occupies
    pub fn region(&self) -> Result<RegionBounds, TeleError> {
        match self.surrogate().region.bounds() {
            Some(bounds) => Ok(bounds),
            None => Ok(self.surrogate().region.refresh(self.object())?.0),
        }
    }

    /// The start of the code, read without building the decoded code
    pub fn code_start(&self) -> Result<Option<Address>, TeleError> {
        if let Some(code) = *self.surrogate().code.lock() {
            return Ok(Some(code.start));
        }
        self.read_reference_field(fields::TARGET_METHOD_CODE)?
            .map(|code| code.first_element_address())
            .transpose()
    }

    /// The mirror of the method this is the compilation of
    pub fn method_actor(&self) -> Result<Option<Arc<TeleObject>>, TeleError> {
        self.surrogate().method_actor(self.object())
    }

    /// Whether `address` lies in the code of the method. Fails for addresses outside of the
    /// method's region altogether.
    pub fn is_valid_code_location(&self, address: Address) -> Result<bool, TeleError> {
        if self.is_evicted() {
            return Ok(false);
        }
        let region = self.region()?;
        if !region.contains(address) {
            return Err(TeleError::AddressOutOfRegion {
                address,
                start: region.start,
                end: region.end(),
            });
        }
        Ok(self
            .surrogate()
            .code
            .lock()
            .is_some_and(|code| code.contains(address)))
    }

    /// Describes the method and its decoded code
    pub fn write_summary(&self, out: &mut impl Write) -> std::fmt::Result {
        let name = self
            .method_actor()
            .ok()
            .flatten()
            .and_then(|actor| {
                actor
                    .downcast::<TeleMethodActor>()
                    .and_then(|method| method.qualified_name().ok())
            })
            .unwrap_or_else(|| "<unknown method>".to_string());
        writeln!(out, "{name} {}", self.object())?;
        if let Ok(region) = self.region() {
            writeln!(out, "region {region}, relocated {} times", self.relocation_count())?;
        }
        self.machine_code_info().write_summary(out)
    }
}
