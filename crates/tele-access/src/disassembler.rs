//! The disassembler collaborator

use std::fmt::{Debug, Display, Formatter};
use tele_types::Address;
use thiserror::Error;

/// One decoded machine instruction
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TargetCodeInstruction {
    /// offset from the start of the code
    pub position: u32,
    /// absolute address in the target
    pub address: Address,
    /// the encoded bytes
    pub bytes: Vec<u8>,
    pub mnemonic: String,
    pub operands: String,
    /// the label of this instruction, if something in the method branches to it
    pub label: Option<String>,
    /// the absolute target of a branch or call, when encoded in the instruction
    pub target_address: Option<Address>,
}

impl Display for TargetCodeInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands)?;
        }
        Ok(())
    }
}

/// Machine code could not be decoded
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum DisassemblyError {
    #[error("undecodable instruction at position {0}")]
    Undecodable(u32),
    #[error("instruction at position {0} runs past the end of the code")]
    Truncated(u32),
}

/// Decodes machine code for the target's instruction set
pub trait Disassembler: Debug + Send + Sync {
    /// Decodes all of `code`, which lives at `code_start` in the target
    fn decode(
        &self,
        code_start: Address,
        code: &[u8],
    ) -> Result<Vec<TargetCodeInstruction>, DisassemblyError>;
}

/// Renders every byte as a data directive. Used when no real disassembler is configured.
#[derive(Debug, Default, Copy, Clone)]
pub struct ByteDisassembler;

impl Disassembler for ByteDisassembler {
    fn decode(
        &self,
        code_start: Address,
        code: &[u8],
    ) -> Result<Vec<TargetCodeInstruction>, DisassemblyError> {
        Ok(code
            .iter()
            .enumerate()
            .map(|(position, byte)| TargetCodeInstruction {
                position: position as u32,
                address: code_start.plus(position as u64),
                bytes: vec![*byte],
                mnemonic: ".byte".to_string(),
                operands: format!("{byte:#04x}"),
                label: None,
                target_address: None,
            })
            .collect())
    }
}
