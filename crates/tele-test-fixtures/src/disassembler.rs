use std::collections::{BTreeMap, BTreeSet};
use tele_access::disassembler::{Disassembler, DisassemblyError, TargetCodeInstruction};
use tele_types::Address;

pub const NOP: u8 = 0x90;
/// `call rel32`, relative to the end of the instruction
pub const CALL: u8 = 0xE8;
/// `call *reg`, the register in the second byte
pub const CALL_INDIRECT: u8 = 0xFF;
pub const RET: u8 = 0xC3;
/// `mov eax, imm32`
pub const MOV: u8 = 0xB8;
/// `jmp rel8`, relative to the end of the instruction
pub const JMP: u8 = 0xEB;

/// Decodes a tiny subset of x86
#[derive(Debug, Default, Copy, Clone)]
pub struct ToyDisassembler;

impl Disassembler for ToyDisassembler {
    fn decode(
        &self,
        code_start: Address,
        code: &[u8],
    ) -> Result<Vec<TargetCodeInstruction>, DisassemblyError> {
        let mut instructions = Vec::new();
        let mut position = 0usize;
        while position < code.len() {
            let at = position as u32;
            let length = match code[position] {
                NOP | RET => 1,
                CALL_INDIRECT | JMP => 2,
                CALL | MOV => 5,
                _ => return Err(DisassemblyError::Undecodable(at)),
            };
            let bytes = code
                .get(position..position + length)
                .ok_or(DisassemblyError::Truncated(at))?;
            let end = (position + length) as i64;
            let (mnemonic, operands, target) = match bytes[0] {
                NOP => ("nop", String::new(), None),
                RET => ("ret", String::new(), None),
                CALL_INDIRECT => ("call", format!("*r{}", bytes[1]), None),
                JMP => ("jmp", String::new(), Some(end + bytes[1] as i8 as i64)),
                CALL => {
                    let offset = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
                    ("call", String::new(), Some(end + offset as i64))
                }
                _ => {
                    let value = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
                    ("mov", format!("eax, {value}"), None)
                }
            };
            instructions.push(TargetCodeInstruction {
                position: at,
                address: code_start.plus(position as u64),
                bytes: bytes.to_vec(),
                mnemonic: mnemonic.to_string(),
                operands,
                label: None,
                target_address: target
                    .map(|target| Address::new((code_start.get() as i64 + target) as u64)),
            });
            position += length;
        }

        // branch targets within the code get labels, numbered in code order
        let targets: BTreeSet<Address> = instructions
            .iter()
            .filter_map(|instruction| instruction.target_address)
            .filter(|target| instructions.iter().any(|i| i.address == *target))
            .collect();
        let labels: BTreeMap<Address, String> = targets
            .into_iter()
            .enumerate()
            .map(|(index, target)| (target, format!("L{index}")))
            .collect();
        for instruction in &mut instructions {
            instruction.label = labels.get(&instruction.address).cloned();
            if let Some(label) = instruction
                .target_address
                .and_then(|target| labels.get(&target))
            {
                instruction.operands = label.clone();
            } else if let Some(target) = instruction.target_address {
                instruction.operands = target.to_string();
            }
        }
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_branch_targets() {
        // call +1 (over the nop to the ret), nop, ret
        let code = [CALL, 1, 0, 0, 0, NOP, RET];
        let instructions = ToyDisassembler.decode(Address::new(0x100), &code).unwrap();
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].target_address, Some(Address::new(0x106)));
        assert_eq!(instructions[0].operands, "L0");
        assert_eq!(instructions[2].label.as_deref(), Some("L0"));
        assert_eq!(instructions[2].position, 6);
    }

    #[test]
    fn reports_bad_code() {
        assert_eq!(
            ToyDisassembler.decode(Address::ZERO, &[NOP, 0x00]),
            Err(DisassemblyError::Undecodable(1))
        );
        assert_eq!(
            ToyDisassembler.decode(Address::ZERO, &[MOV, 1, 2]),
            Err(DisassemblyError::Truncated(0))
        );
    }
}
