//! # `tele-types`
//! The vocabulary shared by every layer of the tele object mirror: addresses, epochs, typed
//! ids, value kinds, and the bit-packed stop descriptors the target's compilers emit.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use address::*;
pub use constants::*;
pub use ids::*;
use crate::private::Repr;
use thiserror::Error;

mod address;
mod constants;
mod ids;
mod macros;
pub mod names;

/// A value read out of target memory.
///
/// References are kept as the raw origin they point at; turning one into a canonical handle
/// is the job of the layer that tracks the target's collector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Word(Address),
    Reference(Address),
    Void,
}

impl Value {
    /// The kind of this value
    pub fn kind(&self) -> Kind {
        match self {
            Value::Boolean(_) => Kind::Boolean,
            Value::Byte(_) => Kind::Byte,
            Value::Char(_) => Kind::Char,
            Value::Short(_) => Kind::Short,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Long(_) => Kind::Long,
            Value::Double(_) => Kind::Double,
            Value::Word(_) => Kind::Word,
            Value::Reference(_) => Kind::Reference,
            Value::Void => Kind::Void,
        }
    }

    /// Widens any integral value to an `i64`
    pub fn as_long(&self) -> Option<i64> {
        match *self {
            Value::Byte(b) => Some(b as i64),
            Value::Char(c) => Some(c as i64),
            Value::Short(s) => Some(s as i64),
            Value::Int(i) => Some(i as i64),
            Value::Long(l) => Some(l),
            _ => None,
        }
    }

    /// Gets an `int` value
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Gets the address held by a word or a reference
    pub fn as_address(&self) -> Option<Address> {
        match *self {
            Value::Word(address) | Value::Reference(address) => Some(address),
            _ => None,
        }
    }

    /// The zero value of a kind
    pub fn zero(kind: Kind) -> Value {
        match kind {
            Kind::Boolean => Value::Boolean(false),
            Kind::Byte => Value::Byte(0),
            Kind::Char => Value::Char(0),
            Kind::Short => Value::Short(0),
            Kind::Int => Value::Int(0),
            Kind::Float => Value::Float(0.0),
            Kind::Long => Value::Long(0),
            Kind::Double => Value::Double(0.0),
            Kind::Word => Value::Word(Address::ZERO),
            Kind::Reference => Value::Reference(Address::ZERO),
            Kind::Void => Value::Void,
        }
    }
}

/// Unknown tag constant
#[derive(Debug, Error)]
#[error("Unknown tag constant: {0}")]
pub struct UnknownTagError<T: Repr>(T);

mod private {
    use std::fmt::{Debug, Display};

    pub trait Identifiable {}
    pub trait Repr: Display + Debug {}

    impl Repr for u8 {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip_through_descriptor_chars() {
        assert_eq!(u8::from(Kind::Reference), b'L');
        assert_eq!(Kind::try_from(b'J').expect("long tag"), Kind::Long);
        Kind::try_from(b'?').expect_err("? is not a kind");
        assert_eq!(Kind::VALUES.len(), 11);
    }

    #[test]
    fn test_kind_widths() {
        assert_eq!(Kind::Boolean.width(), 1);
        assert_eq!(Kind::Char.width(), 2);
        assert_eq!(Kind::Int.width(), 4);
        assert_eq!(Kind::Word.width(), 8);
        assert!(Kind::Int.is_primitive());
        assert!(!Kind::Word.is_primitive());
    }

    #[test]
    fn test_safepoint_packing() {
        let safepoint = Safepoint::new(0x1234, Some(CallKind::Direct));
        assert_eq!(safepoint.pos(), 0x1234);
        assert_eq!(safepoint.call_kind(), Some(CallKind::Direct));

        let native = Safepoint::from_raw(Safepoint::new(8, Some(CallKind::Native)).raw());
        assert_eq!(native.pos(), 8);
        assert_eq!(native.call_kind(), Some(CallKind::Native));

        assert!(!Safepoint::new(3, None).is_call());
    }

    #[test]
    fn test_address_arithmetic() {
        let base = Address::new(0x1000);
        assert_eq!(base.plus(24), Address::new(0x1018));
        assert_eq!(base.plus(24).offset_from(base), Some(24));
        assert_eq!(base.offset_from(base.plus(1)), None);
        assert_eq!(Address::new(0x1001).align_up(8), Address::new(0x1008));
        assert_eq!(format!("{base}"), "0x1000");
    }
}
