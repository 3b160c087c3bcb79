//! Just enough of the bytecode format to find the method an invoke instruction calls

/// Opcodes the scanner understands
pub mod opcodes {
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const WIDE: u8 = 0xc4;
}

use opcodes::*;

/// The opcode of the instruction at `bci`, looking through a `wide` prefix
pub fn opcode_at(code: &[u8], bci: usize) -> Option<u8> {
    match *code.get(bci)? {
        WIDE => code.get(bci + 1).copied(),
        opcode => Some(opcode),
    }
}

/// Whether `opcode` invokes a method
pub fn is_invoke(opcode: u8) -> bool {
    (INVOKEVIRTUAL..=INVOKEDYNAMIC).contains(&opcode)
}

/// The constant pool index named by the invoke instruction at `bci`
pub fn invoke_pool_index(code: &[u8], bci: usize) -> Option<u16> {
    let opcode = *code.get(bci)?;
    if !is_invoke(opcode) {
        return None;
    }
    Some(u16::from_be_bytes([*code.get(bci + 1)?, *code.get(bci + 2)?]))
}

/// A readable name for the opcodes the scanner understands
pub fn opcode_name(opcode: u8) -> Option<&'static str> {
    Some(match opcode {
        INVOKEVIRTUAL => "invokevirtual",
        INVOKESPECIAL => "invokespecial",
        INVOKESTATIC => "invokestatic",
        INVOKEINTERFACE => "invokeinterface",
        INVOKEDYNAMIC => "invokedynamic",
        WIDE => "wide",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_invoke_operand_is_big_endian() {
        let code = [0x2a, INVOKEVIRTUAL, 0x01, 0x02, 0xb1];
        assert_eq!(invoke_pool_index(&code, 1), Some(0x0102));
        assert_eq!(invoke_pool_index(&code, 0), None);
    }

    #[test]
    fn test_truncated_invoke_has_no_operand() {
        assert_eq!(invoke_pool_index(&[INVOKESTATIC, 0x00], 0), None);
    }

    #[test]
    fn test_wide_prefix_is_skipped() {
        assert_eq!(opcode_at(&[WIDE, 0x15, 0x00, 0x01], 0), Some(0x15));
        assert_eq!(opcode_at(&[0x15], 3), None);
    }
}
