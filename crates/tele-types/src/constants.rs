//! constants

use crate::macros::tagged_type;
use bitfield::bitfield;

tagged_type! {
    /// The kind of a value stored in target memory, tagged with its descriptor character
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub enum Kind {
        /// a `boolean`, stored as a single byte
        Boolean = b'Z',
        /// a signed byte
        Byte = b'B',
        /// an unsigned 16-bit character
        Char = b'C',
        /// a signed 16-bit integer
        Short = b'S',
        /// a signed 32-bit integer
        Int = b'I',
        /// a 32-bit float
        Float = b'F',
        /// a signed 64-bit integer
        Long = b'J',
        /// a 64-bit float
        Double = b'D',
        /// an untraced machine word (address, pointer, offset or size)
        Word = b'W',
        /// a traced reference to another object
        Reference = b'L',
        /// no value
        Void = b'V',
    }
}

impl Kind {
    /// The number of bytes a value of this kind occupies on a 64-bit target
    pub const fn width(&self) -> u32 {
        match self {
            Kind::Boolean | Kind::Byte => 1,
            Kind::Char | Kind::Short => 2,
            Kind::Int | Kind::Float => 4,
            Kind::Long | Kind::Double | Kind::Word | Kind::Reference => 8,
            Kind::Void => 0,
        }
    }

    /// Whether values of this kind point at other objects
    pub const fn is_reference(&self) -> bool {
        matches!(self, Kind::Reference)
    }

    /// Whether values of this kind are untraced machine words
    pub const fn is_word(&self) -> bool {
        matches!(self, Kind::Word)
    }

    /// Whether values of this kind are plain primitives
    pub const fn is_primitive(&self) -> bool {
        !matches!(self, Kind::Reference | Kind::Word | Kind::Void)
    }

    /// The source-level name of this kind
    pub const fn name(&self) -> &'static str {
        match self {
            Kind::Boolean => "boolean",
            Kind::Byte => "byte",
            Kind::Char => "char",
            Kind::Short => "short",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Long => "long",
            Kind::Double => "double",
            Kind::Word => "word",
            Kind::Reference => "reference",
            Kind::Void => "void",
        }
    }
}

tagged_type! {
    /// The low-level representation of an object in the target heap
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub enum ObjectKind {
        /// fixed-layout named fields
        Tuple = 1,
        /// a homogeneous sequence of elements
        Array = 2,
        /// named fields followed by word-addressed sub-tables
        Hybrid = 3,
    }
}

tagged_type! {
    /// The declared flavor of a machine word
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub enum WordType {
        /// an unqualified word
        Word = 1,
        /// an absolute address
        Address = 2,
        /// an address that may be dereferenced
        Pointer = 3,
        /// a signed displacement
        Offset = 4,
        /// an unsigned quantity of bytes
        Size = 5,
    }
}

/// The life cycle state of a mirrored object
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ObjectStatus {
    /// The object is reachable in the target and its origin is current
    Live,
    /// The target has copied the object elsewhere; a newer mirror represents it
    Obsolete,
    /// The target has freed the memory
    Dead,
}

impl ObjectStatus {
    /// Whether the object is live
    pub const fn is_live(&self) -> bool {
        matches!(self, ObjectStatus::Live)
    }

    /// Whether the object has not been freed, though it may be obsolete
    pub const fn is_not_dead(&self) -> bool {
        !matches!(self, ObjectStatus::Dead)
    }

    /// A short label for display
    pub const fn label(&self) -> &'static str {
        match self {
            ObjectStatus::Live => "LIVE",
            ObjectStatus::Obsolete => "OBSOLETE",
            ObjectStatus::Dead => "DEAD",
        }
    }
}

/// The kind of call made at a call site in compiled code
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CallKind {
    /// a call whose target is fixed in the instruction
    Direct,
    /// a call through a register or memory operand
    Indirect,
    /// a call out to native code
    Native,
}

bitfield! {
    /// A stop position in compiled code, as packed by the target's compilers.
    ///
    /// The low 25 bits hold the position (relative to the start of the code), the remaining
    /// bits flag whether the stop is the return address of a call, and of which kind.
    #[derive(Copy, Clone, Eq, PartialEq, Hash)]
    pub struct Safepoint(u32);
    impl Debug;

    pub u32, pos, set_pos: 24, 0;
    pub direct_call, set_direct_call: 25;
    pub indirect_call, set_indirect_call: 26;
    pub native_call, set_native_call: 27;
}

impl Safepoint {
    /// Wraps a raw packed safepoint
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Creates a safepoint at `pos`, optionally marking it as following a call
    pub fn new(pos: u32, call: Option<CallKind>) -> Self {
        let mut safepoint = Self(0);
        safepoint.set_pos(pos);
        match call {
            Some(CallKind::Direct) => safepoint.set_direct_call(true),
            Some(CallKind::Indirect) => safepoint.set_indirect_call(true),
            Some(CallKind::Native) => {
                safepoint.set_indirect_call(true);
                safepoint.set_native_call(true);
            }
            None => {}
        }
        safepoint
    }

    /// Gets the raw packed value
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// The kind of call that returns to this stop, if any
    pub fn call_kind(&self) -> Option<CallKind> {
        if self.native_call() {
            Some(CallKind::Native)
        } else if self.direct_call() {
            Some(CallKind::Direct)
        } else if self.indirect_call() {
            Some(CallKind::Indirect)
        } else {
            None
        }
    }

    /// Whether this stop is the return address of a call
    pub fn is_call(&self) -> bool {
        self.call_kind().is_some()
    }
}
