use crate::object::TeleObject;
use crate::objects::string::read_string_field;
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;
use tele_types::names::fields;
use tele_types::{Address, Epoch};

/// Where a region of target memory lies
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct RegionBounds {
    pub start: Address,
    pub size: u64,
}

impl RegionBounds {
    /// The first address past the region
    pub fn end(&self) -> Address {
        self.start.plus(self.size)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.start <= address && address < self.end()
    }
}

impl Display for RegionBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end())
    }
}

/// The runtime's description of a region of memory. The bounds are re-read every epoch; the
/// name is read once.
#[derive(Debug, Default)]
pub struct TeleMemoryRegion {
    bounds: Mutex<Option<RegionBounds>>,
    name: OnceLock<String>,
}

impl TeleMemoryRegion {
    /// The bounds read by the last refresh
    pub fn bounds(&self) -> Option<RegionBounds> {
        *self.bounds.lock()
    }

    /// Re-reads the bounds, returning them along with the bounds they replace
    pub(crate) fn refresh(
        &self,
        object: &TeleObject,
    ) -> Result<(RegionBounds, Option<RegionBounds>), TeleError> {
        let bounds = RegionBounds {
            start: object.read_word_field(fields::REGION_START)?,
            size: object.read_word_field(fields::REGION_SIZE)?.get(),
        };
        let previous = self.bounds.lock().replace(bounds);
        if self.name.get().is_none() {
            let name = read_string_field(object, fields::REGION_NAME)?.unwrap_or_default();
            let _ = self.name.set(name);
        }
        Ok((bounds, previous))
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }
}

impl Surrogate for TeleMemoryRegion {
    fn type_name(&self) -> &'static str {
        "TeleMemoryRegion"
    }

    fn role(&self) -> Option<&'static str> {
        Some("memory region")
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        _stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        self.refresh(object).map(|_| ())
    }

    fn textual_visualization(&self, _object: &TeleObject) -> Option<String> {
        let bounds = self.bounds()?;
        Some(format!("{} {bounds}", self.name()?))
    }
}

impl SurrogateRef<'_, TeleMemoryRegion> {
    /// The bounds as of the last refresh, reading them if the region never refreshed
    pub fn bounds(&self) -> Result<RegionBounds, TeleError> {
        match self.surrogate().bounds() {
            Some(bounds) => Ok(bounds),
            None => Ok(self.surrogate().refresh(self.object())?.0),
        }
    }

    pub fn start(&self) -> Result<Address, TeleError> {
        Ok(self.bounds()?.start)
    }

    pub fn size(&self) -> Result<u64, TeleError> {
        Ok(self.bounds()?.size)
    }

    pub fn end(&self) -> Result<Address, TeleError> {
        Ok(self.bounds()?.end())
    }

    pub fn contains(&self, address: Address) -> Result<bool, TeleError> {
        Ok(self.bounds()?.contains(address))
    }

    /// The name the runtime gave the region
    pub fn name(&self) -> Result<String, TeleError> {
        if let Some(name) = self.surrogate().name() {
            return Ok(name.to_string());
        }
        self.surrogate().refresh(self.object())?;
        Ok(self.surrogate().name().unwrap_or_default().to_string())
    }
}
