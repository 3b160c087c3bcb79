use crate::factory::{RefreshReport, SurrogateConstructor, SurrogateRegistry, TeleObjectFactory};
use crate::mirror::Mirror;
use crate::object::TeleObject;
use crate::{TeleConfig, TeleError};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};
use tele_access::classes::ClassMetadata;
use tele_access::disassembler::{ByteDisassembler, Disassembler};
use tele_access::raw::RawReader;
use tele_access::{DataAccess, Layout, Reference, ReferenceManager, TargetMemory, VmLock};
use tele_types::{Address, Epoch, ObjectId};
use tracing::{debug, info};

/// The debugger's view of one target virtual machine.
///
/// Owns the collaborators every mirror reads through and the factory that hands the mirrors
/// out. Mirrors keep only a weak handle back to their VM.
pub struct TeleVm {
    this: Weak<TeleVm>,
    access: DataAccess,
    classes: Arc<dyn ClassMetadata>,
    references: Arc<ReferenceManager>,
    layout: Layout,
    lock: VmLock,
    disassembler: Arc<dyn Disassembler>,
    config: TeleConfig,
    factory: TeleObjectFactory,
}

impl TeleVm {
    /// Starts building a VM that reads `memory` and resolves classes through `classes`
    pub fn builder(
        memory: Arc<dyn TargetMemory>,
        classes: Arc<dyn ClassMetadata>,
    ) -> TeleVmBuilder {
        TeleVmBuilder {
            memory,
            classes,
            references: None,
            layout: Layout::default(),
            disassembler: Arc::new(ByteDisassembler),
            config: TeleConfig::default(),
            registry: SurrogateRegistry::default(),
        }
    }

    pub fn data_access(&self) -> &DataAccess {
        &self.access
    }

    /// Reads object headers without creating mirrors
    pub fn raw_reader(&self) -> RawReader<'_> {
        RawReader::new(&self.access, &self.layout)
    }

    pub fn classes(&self) -> &Arc<dyn ClassMetadata> {
        &self.classes
    }

    pub fn references(&self) -> &ReferenceManager {
        &self.references
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The lock serializing heap-walking work against refreshes
    pub fn lock(&self) -> &VmLock {
        &self.lock
    }

    pub fn disassembler(&self) -> &Arc<dyn Disassembler> {
        &self.disassembler
    }

    pub fn config(&self) -> &TeleConfig {
        &self.config
    }

    pub fn factory(&self) -> &TeleObjectFactory {
        &self.factory
    }

    /// The target's current epoch
    pub fn epoch(&self) -> Epoch {
        self.access.epoch()
    }

    /// Gets the canonical mirror for a reference
    pub fn make_object(&self, reference: Reference) -> Result<Option<Arc<TeleObject>>, TeleError> {
        self.factory.make(self, reference)
    }

    /// Gets the canonical mirror for the object at `origin`
    pub fn make_object_at(&self, origin: Address) -> Result<Option<Arc<TeleObject>>, TeleError> {
        self.make_object(self.references.make_reference(origin))
    }

    /// Finds a mirror by id
    pub fn lookup_object(&self, oid: ObjectId) -> Option<Arc<TeleObject>> {
        self.factory.lookup_object(oid)
    }

    /// Refreshes every live mirror for `epoch`. Fails with [TeleError::LockUnavailable] when
    /// another thread holds the VM lock for longer than the configured timeout.
    pub fn refresh(&self, epoch: Epoch) -> Result<RefreshReport, TeleError> {
        self.factory.update_cache(self, epoch)
    }

    /// Registers a surrogate constructor for a class and its subclasses
    pub fn register_surrogate(&self, class_name: impl AsRef<str>, constructor: SurrogateConstructor) {
        self.factory.register(class_name, constructor);
    }
}

impl Mirror for TeleVm {
    fn virtual_machine(&self) -> Weak<TeleVm> {
        self.this.clone()
    }
}

impl Debug for TeleVm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeleVm")
            .field("epoch", &self.epoch())
            .field("layout", &self.layout)
            .field("config", &self.config)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

/// Builds a [TeleVm]
pub struct TeleVmBuilder {
    memory: Arc<dyn TargetMemory>,
    classes: Arc<dyn ClassMetadata>,
    references: Option<Arc<ReferenceManager>>,
    layout: Layout,
    disassembler: Arc<dyn Disassembler>,
    config: TeleConfig,
    registry: SurrogateRegistry,
}

impl TeleVmBuilder {
    /// Shares the reference manager that is told about the target collector's moves
    pub fn references(mut self, references: Arc<ReferenceManager>) -> Self {
        self.references = Some(references);
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn disassembler(mut self, disassembler: Arc<dyn Disassembler>) -> Self {
        self.disassembler = disassembler;
        self
    }

    pub fn config(mut self, config: TeleConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default surrogate registry
    pub fn registry(mut self, registry: SurrogateRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers a surrogate constructor on top of the registry
    pub fn surrogate(mut self, class_name: impl AsRef<str>, constructor: SurrogateConstructor) -> Self {
        self.registry.register(class_name, constructor);
        self
    }

    pub fn build(self) -> Arc<TeleVm> {
        let vm = Arc::new_cyclic(|this| TeleVm {
            this: this.clone(),
            access: DataAccess::new(self.memory),
            classes: self.classes,
            references: self.references.unwrap_or_default(),
            layout: self.layout,
            lock: VmLock::new(self.config.lock_timeout()),
            disassembler: self.disassembler,
            config: self.config,
            factory: TeleObjectFactory::new(self.registry),
        });
        debug!("{:?}", vm.factory);
        info!("attached to target at {}", vm.epoch());
        vm
    }
}
