//! Decoded machine code of a compiled method, cross-referenced with its stops and bytecode

use crate::bytecode::{invoke_pool_index, opcode_at, opcode_name};
use crate::objects::MethodSymbol;
use crate::TeleError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tele_access::disassembler::{Disassembler, TargetCodeInstruction};
use tele_types::{Address, CallKind, Safepoint};

/// A bytecode position a machine instruction was compiled from
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SourceLocation {
    /// the qualified name of the method, when known
    pub method: Option<Arc<str>>,
    pub bci: i32,
}

/// What starts at a machine instruction that begins the code for a bytecode
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BytecodeBoundary {
    Opcode(u8),
    /// the code following the last bytecode
    Epilogue,
}

/// Everything read from the target that a [MachineCodeInfo] is built from
#[derive(Debug, Clone, Default)]
pub struct MachineCodeSource {
    pub code_start: Address,
    pub code: Vec<u8>,
    pub safepoints: Vec<Safepoint>,
    /// the bytecode position of each stop, parallel to `safepoints`
    pub safepoint_bcis: Vec<i32>,
    /// the machine code position of each bytecode position; zero where no bytecode starts
    pub bci_to_pos: Option<Vec<i32>>,
    pub bytecodes: Option<Arc<[u8]>>,
    pub method_name: Option<Arc<str>>,
}

/// An immutable snapshot of a compiled method's decoded machine code.
///
/// Per-instruction facts are looked up by instruction index. A snapshot with generation zero
/// was never loaded.
#[derive(Debug, Default)]
pub struct MachineCodeInfo {
    generation: u64,
    evicted: bool,
    code_start: Address,
    code: Vec<u8>,
    instructions: Vec<TargetCodeInstruction>,
    bci_to_pos: Option<Vec<i32>>,
    stops: Vec<Option<Safepoint>>,
    locations: Vec<Option<SourceLocation>>,
    opcodes: Vec<Option<BytecodeBoundary>>,
    callees: Vec<Option<MethodSymbol>>,
    labels: Vec<usize>,
}

impl MachineCodeInfo {
    /// The snapshot of a method whose code was never read
    pub fn unloaded() -> Self {
        Self::default()
    }

    /// The snapshot of a method whose code the target threw away
    pub fn evicted(generation: u64) -> Self {
        Self {
            generation,
            evicted: true,
            ..Self::default()
        }
    }

    /// Decodes `source` and cross-references every instruction with the stops, the bytecode
    /// positions and the callees recorded by the compiler.
    ///
    /// `resolve_callee` maps the constant pool index of an invoke bytecode to the method it
    /// names.
    pub fn build(
        generation: u64,
        source: MachineCodeSource,
        disassembler: &dyn Disassembler,
        mut resolve_callee: impl FnMut(u16) -> Result<Option<MethodSymbol>, TeleError>,
    ) -> Result<Self, TeleError> {
        let instructions = disassembler.decode(source.code_start, &source.code)?;
        let location = |bci: i32| SourceLocation {
            method: source.method_name.clone(),
            bci,
        };

        let mut pos_to_stop = HashMap::new();
        let mut pos_to_location = HashMap::new();
        for (index, safepoint) in source.safepoints.iter().enumerate() {
            let pos = safepoint.pos();
            pos_to_stop.insert(pos, *safepoint);
            if let Some(&bci) = source.safepoint_bcis.get(index) {
                if bci >= 0 {
                    pos_to_location.insert(pos, location(bci));
                }
            }
        }

        let count = instructions.len();
        let mut stops = vec![None; count];
        let mut locations = vec![None; count];
        let mut opcodes = vec![None; count];
        let mut callees = vec![None; count];
        let mut labels = Vec::new();
        let mut bci = 0usize;

        for (index, instruction) in instructions.iter().enumerate() {
            let pos = instruction.position;
            if instruction.label.is_some() {
                labels.push(index);
            }
            if let Some(bci_to_pos) = &source.bci_to_pos {
                if bci < bci_to_pos.len() && pos as i32 == bci_to_pos[bci] {
                    pos_to_location
                        .entry(pos)
                        .or_insert_with(|| location(bci as i32));
                    opcodes[index] = match &source.bytecodes {
                        Some(bytecodes) if bci < bytecodes.len() => {
                            opcode_at(bytecodes, bci).map(BytecodeBoundary::Opcode)
                        }
                        _ => Some(BytecodeBoundary::Epilogue),
                    };
                    bci += 1;
                    while bci < bci_to_pos.len()
                        && (bci_to_pos[bci] == 0 || bci_to_pos[bci] == pos as i32)
                    {
                        bci += 1;
                    }
                }
            }

            stops[index] = pos_to_stop.get(&pos).copied();
            locations[index] = pos_to_location.get(&pos).cloned();

            // the stop after a call carries the bytecode position of the invoke
            if index > 0 && stops[index].is_some_and(|stop| stop.is_call()) {
                if let (Some(location), Some(bytecodes)) = (&locations[index], &source.bytecodes) {
                    if let Some(pool_index) = usize::try_from(location.bci)
                        .ok()
                        .and_then(|bci| invoke_pool_index(bytecodes, bci))
                    {
                        callees[index - 1] = resolve_callee(pool_index)?;
                    }
                }
            }
        }

        Ok(Self {
            generation,
            evicted: false,
            code_start: source.code_start,
            code: source.code,
            instructions,
            bci_to_pos: source.bci_to_pos,
            stops,
            locations,
            opcodes,
            callees,
            labels,
        })
    }

    /// The code generation this snapshot was built for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loaded(&self) -> bool {
        self.generation > 0 && !self.evicted
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    pub fn code_start(&self) -> Address {
        self.code_start
    }

    /// The machine code the snapshot was decoded from
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[TargetCodeInstruction] {
        &self.instructions
    }

    /// Gets an instruction by index
    pub fn instruction(&self, index: usize) -> Result<&TargetCodeInstruction, TeleError> {
        self.instructions
            .get(index)
            .ok_or(TeleError::IndexOutOfBounds {
                index: index as u64,
                length: self.instructions.len() as u64,
            })
    }

    /// The address of an instruction
    pub fn address(&self, index: usize) -> Result<Address, TeleError> {
        Ok(self.instruction(index)?.address)
    }

    /// The label of an instruction, if something branches to it
    pub fn label(&self, index: usize) -> Result<Option<&str>, TeleError> {
        Ok(self.instruction(index)?.label.as_deref())
    }

    /// The indexes of every labelled instruction
    pub fn label_indexes(&self) -> &[usize] {
        &self.labels
    }

    /// The stop at an instruction, if it is one
    pub fn stop(&self, index: usize) -> Result<Option<Safepoint>, TeleError> {
        self.instruction(index)?;
        Ok(self.stops[index])
    }

    pub fn is_stop(&self, index: usize) -> Result<bool, TeleError> {
        Ok(self.stop(index)?.is_some())
    }

    /// The kind of call made by an instruction. A call is recognized by the stop at its return
    /// address, which is the next instruction.
    pub fn call_kind(&self, index: usize) -> Result<Option<CallKind>, TeleError> {
        self.instruction(index)?;
        Ok(self
            .stops
            .get(index + 1)
            .copied()
            .flatten()
            .and_then(|stop| stop.call_kind()))
    }

    pub fn is_call(&self, index: usize) -> Result<bool, TeleError> {
        Ok(self.call_kind(index)?.is_some())
    }

    pub fn is_native_call(&self, index: usize) -> Result<bool, TeleError> {
        Ok(self.call_kind(index)? == Some(CallKind::Native))
    }

    /// Whether an instruction starts the code compiled for a bytecode
    pub fn is_bytecode_boundary(&self, index: usize) -> Result<bool, TeleError> {
        Ok(self.opcode(index)?.is_some())
    }

    pub fn opcode(&self, index: usize) -> Result<Option<BytecodeBoundary>, TeleError> {
        self.instruction(index)?;
        Ok(self.opcodes[index])
    }

    pub fn source_location(&self, index: usize) -> Result<Option<&SourceLocation>, TeleError> {
        self.instruction(index)?;
        Ok(self.locations[index].as_ref())
    }

    /// The method called by an instruction, when the call site could be resolved
    pub fn callee(&self, index: usize) -> Result<Option<&MethodSymbol>, TeleError> {
        self.instruction(index)?;
        Ok(self.callees[index].as_ref())
    }

    pub fn bci_to_pos(&self) -> Option<&[i32]> {
        self.bci_to_pos.as_deref()
    }

    /// The index of the instruction covering `address`
    pub fn find_instruction_index(&self, address: Address) -> Option<usize> {
        let index = self
            .instructions
            .partition_point(|instruction| instruction.address <= address)
            .checked_sub(1)?;
        let instruction = &self.instructions[index];
        (address < instruction.address.plus(instruction.bytes.len() as u64)).then_some(index)
    }

    /// Writes one line per instruction with everything known about it
    pub fn write_summary(&self, out: &mut impl Write) -> std::fmt::Result {
        if !self.is_loaded() {
            let state = if self.evicted { "evicted" } else { "not loaded" };
            return writeln!(out, "machine code {state}");
        }
        writeln!(
            out,
            "generation {}, {} instructions at {}",
            self.generation,
            self.instructions.len(),
            self.code_start
        )?;
        for (index, instruction) in self.instructions.iter().enumerate() {
            write!(out, "{index:4} {} {instruction}", instruction.address)?;
            if let Some(stop) = self.stops[index] {
                write!(out, " ; stop")?;
                if let Some(kind) = stop.call_kind() {
                    write!(out, " after {kind:?} call")?;
                }
            }
            if let Some(location) = &self.locations[index] {
                write!(out, " ; bci {}", location.bci)?;
            }
            match self.opcodes[index] {
                Some(BytecodeBoundary::Opcode(opcode)) => match opcode_name(opcode) {
                    Some(name) => write!(out, " ; {name}")?,
                    None => write!(out, " ; opcode {opcode:#04x}")?,
                },
                Some(BytecodeBoundary::Epilogue) => write!(out, " ; epilogue")?,
                None => {}
            }
            if let Some(callee) = &self.callees[index] {
                write!(out, " ; calls {callee}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Holds the current [MachineCodeInfo] of a compiled method and tracks whether the target's
/// code has changed since it was built.
///
/// The target generation starts at one and grows every time a change is observed. The snapshot
/// is current when it was built for the target generation.
#[derive(Debug)]
pub struct MachineCodeInfoCache {
    current: RwLock<Arc<MachineCodeInfo>>,
    target_generation: AtomicU64,
    reloads: AtomicUsize,
}

impl MachineCodeInfoCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(MachineCodeInfo::unloaded())),
            target_generation: AtomicU64::new(1),
            reloads: AtomicUsize::new(0),
        }
    }

    /// The snapshot as it is, current or not
    pub fn current(&self) -> Arc<MachineCodeInfo> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_loaded()
    }

    /// Whether the snapshot reflects the target's code. An evicted method stays current.
    pub fn is_current(&self) -> bool {
        let current = self.current.read();
        current.is_evicted()
            || (current.is_loaded() && current.generation() == self.code_generation())
    }

    /// The generation of the code in the target, as far as has been observed
    pub fn code_generation(&self) -> u64 {
        self.target_generation.load(Ordering::SeqCst)
    }

    /// Records that the target's code changed. Only a loaded, current snapshot can go stale;
    /// returns whether it did.
    pub fn mark_changed(&self) -> bool {
        if self.is_loaded() && self.is_current() {
            self.target_generation.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// How many times a snapshot was built
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::Relaxed)
    }

    pub(crate) fn install(&self, info: MachineCodeInfo) -> Arc<MachineCodeInfo> {
        let info = Arc::new(info);
        if info.is_loaded() {
            self.reloads.fetch_add(1, Ordering::Relaxed);
        }
        *self.current.write() = info.clone();
        info
    }
}

impl Default for MachineCodeInfoCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes::INVOKESTATIC;
    use tele_access::disassembler::DisassemblyError;
    use test_log::test;

    /// Decodes `0xE8` as a 3 byte call and everything else as a 1 byte instruction
    #[derive(Debug)]
    struct TinyDisassembler;

    impl Disassembler for TinyDisassembler {
        fn decode(
            &self,
            code_start: Address,
            code: &[u8],
        ) -> Result<Vec<TargetCodeInstruction>, DisassemblyError> {
            let mut instructions = vec![];
            let mut position = 0usize;
            while position < code.len() {
                let width = if code[position] == 0xE8 { 3 } else { 1 };
                let Some(bytes) = code.get(position..position + width) else {
                    return Err(DisassemblyError::Truncated(position as u32));
                };
                instructions.push(TargetCodeInstruction {
                    position: position as u32,
                    address: code_start.plus(position as u64),
                    bytes: bytes.to_vec(),
                    mnemonic: if width == 3 { "call" } else { "op" }.to_string(),
                    operands: String::new(),
                    label: (position == 0).then(|| "L0".to_string()),
                    target_address: None,
                });
                position += width;
            }
            Ok(instructions)
        }
    }

    fn source() -> MachineCodeSource {
        // positions: 0 op, 1 call, 4 op, 5 op
        MachineCodeSource {
            code_start: Address::new(0x4000),
            code: vec![0x90, 0xE8, 0, 0, 0x90, 0xC3],
            safepoints: vec![Safepoint::new(4, Some(CallKind::Direct))],
            safepoint_bcis: vec![1],
            bci_to_pos: Some(vec![0, 1, 0, 0, 5]),
            bytecodes: Some(Arc::from(vec![0x2a, INVOKESTATIC, 0x00, 0x07])),
            method_name: Some(Arc::from("Foo.bar")),
        }
    }

    #[test]
    fn test_calls_are_recognized_by_the_following_stop() {
        let info = MachineCodeInfo::build(1, source(), &TinyDisassembler, |index| {
            assert_eq!(index, 7);
            Ok(Some(MethodSymbol {
                holder: "Baz".to_string(),
                name: "qux".to_string(),
            }))
        })
        .expect("could not build");
        assert_eq!(info.len(), 4);
        assert!(info.is_call(1).unwrap());
        assert_eq!(info.call_kind(1).unwrap(), Some(CallKind::Direct));
        assert!(!info.is_call(2).unwrap());
        assert!(info.is_stop(2).unwrap());
        assert_eq!(info.callee(1).unwrap().map(ToString::to_string), Some("Baz.qux".to_string()));
        assert!(info.call_kind(4).is_err());
    }

    #[test]
    fn test_bytecode_boundaries_follow_the_bci_map() {
        let info = MachineCodeInfo::build(1, source(), &TinyDisassembler, |_| Ok(None))
            .expect("could not build");
        assert_eq!(info.opcode(0).unwrap(), Some(BytecodeBoundary::Opcode(0x2a)));
        assert_eq!(
            info.opcode(1).unwrap(),
            Some(BytecodeBoundary::Opcode(INVOKESTATIC))
        );
        assert_eq!(info.opcode(2).unwrap(), None);
        assert_eq!(info.opcode(3).unwrap(), Some(BytecodeBoundary::Epilogue));
        assert_eq!(info.source_location(2).unwrap().map(|l| l.bci), Some(1));
        assert_eq!(info.label_indexes(), &[0]);
    }

    #[test]
    fn test_find_instruction_index_covers_every_byte() {
        let info = MachineCodeInfo::build(1, source(), &TinyDisassembler, |_| Ok(None))
            .expect("could not build");
        assert_eq!(info.find_instruction_index(Address::new(0x4002)), Some(1));
        assert_eq!(info.find_instruction_index(Address::new(0x4005)), Some(3));
        assert_eq!(info.find_instruction_index(Address::new(0x4006)), None);
        assert_eq!(info.find_instruction_index(Address::new(0x3fff)), None);
    }

    #[test]
    fn test_changes_only_count_against_a_current_snapshot() {
        let cache = MachineCodeInfoCache::new();
        assert!(!cache.mark_changed());
        assert_eq!(cache.code_generation(), 1);

        let info = MachineCodeInfo::build(1, source(), &TinyDisassembler, |_| Ok(None))
            .expect("could not build");
        cache.install(info);
        assert!(cache.is_current());
        assert!(cache.mark_changed());
        assert!(!cache.mark_changed());
        assert_eq!(cache.code_generation(), 2);
        assert!(!cache.is_current());
        assert_eq!(cache.current().generation(), 1);
        assert_eq!(cache.reload_count(), 1);
    }
}
