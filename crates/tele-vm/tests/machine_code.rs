use std::sync::{mpsc, Arc};
use std::time::Duration;
use tele_test_fixtures::disassembler::{CALL, CALL_INDIRECT, MOV, NOP, RET};
use tele_test_fixtures::{CompiledMethod, CompiledMethodSpec, SimulatedTarget};
use tele_vm::bytecode::opcodes::INVOKEVIRTUAL;
use tele_vm::objects::{MethodSymbol, TeleMethodActor, TeleTargetMethod};
use tele_vm::tele_access::disassembler::DisassemblyError;
use tele_vm::tele_types::{CallKind, Safepoint};
use tele_vm::{BytecodeBoundary, TeleConfig, TeleError, TeleObject, TeleVm};
use test_log::test;

mod common;

const ICONST_0: u8 = 0x03;
const RETURN: u8 = 0xb1;

/// `test.Point.move`: a direct call to `test.Point.distance` followed by a native call
fn compile(target: &SimulatedTarget) -> CompiledMethod {
    common::define_point(target);
    target.compiled_method(&CompiledMethodSpec {
        holder: common::POINT.to_string(),
        name: "move".to_string(),
        code: vec![
            MOV, 7, 0, 0, 0, // 0
            CALL, 3, 0, 0, 0, // 5, to the ret
            NOP, // 10
            CALL_INDIRECT, 1, // 11
            RET, // 13
        ],
        safepoints: vec![
            Safepoint::new(10, Some(CallKind::Direct)),
            Safepoint::new(13, Some(CallKind::Native)),
        ],
        safepoint_bcis: vec![1, 4],
        bci_to_pos: Some(vec![0, 5, 0, 0, 13]),
        bytecodes: vec![ICONST_0, INVOKEVIRTUAL, 0, 1, RETURN],
        pool: vec![
            None,
            Some((common::POINT.to_string(), "distance".to_string())),
        ],
    })
}

fn target_method(vm: &TeleVm, method: &CompiledMethod) -> eyre::Result<Arc<TeleObject>> {
    let object = common::mirror(vm, method.target_method)?;
    assert!(object.is::<TeleTargetMethod>());
    Ok(object)
}

#[test]
fn test_machine_code_is_decoded_lazily() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::attach(&target);
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");

    assert!(!code.is_loaded());
    assert_eq!(code.reload_count(), 0);
    assert_eq!(code.code_generation(), 1);
    assert_eq!(code.code_start()?, Some(method.code_start));

    let info = code.machine_code_info();
    assert!(code.is_loaded());
    assert!(code.is_current());
    assert_eq!(info.generation(), 1);
    assert_eq!(info.len(), 5);
    assert_eq!(code.reload_count(), 1);

    let again = code.machine_code_info();
    assert!(Arc::ptr_eq(&info, &again));
    assert_eq!(code.reload_count(), 1);
    Ok(())
}

#[test]
fn test_instructions_are_cross_referenced() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::attach(&target);
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");
    let info = code.try_machine_code_info()?;

    assert_eq!(info.address(1)?, method.code_start.plus(5));
    assert_eq!(info.label_indexes(), &[4]);
    assert_eq!(info.label(4)?, Some("L0"));
    assert_eq!(info.instruction(1)?.operands, "L0");

    assert!(!info.is_call(0)?);
    assert_eq!(info.call_kind(1)?, Some(CallKind::Direct));
    assert!(info.is_native_call(3)?);
    assert!(info.is_stop(2)?);
    assert_eq!(info.stop(2)?.map(|stop| stop.pos()), Some(10));
    assert!(!info.is_stop(1)?);

    assert_eq!(info.opcode(0)?, Some(BytecodeBoundary::Opcode(ICONST_0)));
    assert_eq!(info.opcode(1)?, Some(BytecodeBoundary::Opcode(INVOKEVIRTUAL)));
    assert_eq!(info.opcode(4)?, Some(BytecodeBoundary::Opcode(RETURN)));
    assert!(!info.is_bytecode_boundary(2)?);

    let location = info.source_location(2)?.expect("the stop after the call");
    assert_eq!(location.bci, 1);
    assert_eq!(location.method.as_deref(), Some("test.Point.move"));

    assert_eq!(
        info.callee(1)?,
        Some(&MethodSymbol {
            holder: common::POINT.to_string(),
            name: "distance".to_string(),
        })
    );
    assert_eq!(info.callee(3)?, None);

    assert_eq!(info.find_instruction_index(method.code_start.plus(12)), Some(3));
    assert_eq!(info.find_instruction_index(method.code_start.plus(14)), None);
    assert!(matches!(
        info.instruction(5),
        Err(TeleError::IndexOutOfBounds {
            index: 5,
            length: 5
        })
    ));

    let mut summary = String::new();
    code.write_summary(&mut summary)?;
    assert!(summary.starts_with("test.Point.move"));
    assert!(summary.contains("calls test.Point.distance"));
    assert!(summary.contains("invokevirtual"));
    Ok(())
}

#[test]
fn test_method_actor_is_linked() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::attach(&target);
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");

    let actor = code.method_actor()?.expect("compiled methods have actors");
    assert_eq!(actor.origin()?, method.method_actor);
    let actor = actor.downcast::<TeleMethodActor>().expect("a method actor");
    assert_eq!(actor.qualified_name()?, "test.Point.move");
    assert_eq!(object.textual_visualization().as_deref(), Some("test.Point.move"));
    Ok(())
}

#[test]
fn test_patched_code_is_reloaded_once() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::attach(&target);
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");
    code.machine_code_info();

    // a refresh with no change keeps the snapshot
    vm.refresh(target.advance_epoch())?;
    assert!(code.is_current());
    assert_eq!(code.code_generation(), 1);

    target.patch_code(&method, 10, &[RET]);
    vm.refresh(target.advance_epoch())?;
    assert!(!code.is_current());
    assert_eq!(code.code_generation(), 2);

    let info = code.machine_code_info();
    assert_eq!(info.generation(), 2);
    assert_eq!(info.instruction(2)?.mnemonic, "ret");
    assert_eq!(code.reload_count(), 2);

    // changes seen while the snapshot is stale count once
    target.patch_code(&method, 10, &[NOP]);
    vm.refresh(target.advance_epoch())?;
    target.patch_code(&method, 10, &[RET]);
    vm.refresh(target.advance_epoch())?;
    assert_eq!(code.code_generation(), 3);
    assert_eq!(code.machine_code_info().generation(), 3);
    assert_eq!(code.reload_count(), 3);
    Ok(())
}

#[test]
fn test_failed_reload_keeps_the_previous_snapshot() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::attach(&target);
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");
    let before = code.machine_code_info();

    target.patch_code(&method, 10, &[0x00]);
    vm.refresh(target.advance_epoch())?;
    assert!(matches!(
        code.try_machine_code_info(),
        Err(TeleError::Disassembly(DisassemblyError::Undecodable(10)))
    ));
    let after = code.machine_code_info();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(!code.is_current());
    assert_eq!(code.reload_count(), 1);

    target.patch_code(&method, 10, &[NOP]);
    let info = code.try_machine_code_info()?;
    assert_eq!(info.generation(), 2);
    assert_eq!(info.instruction(2)?.mnemonic, "nop");
    Ok(())
}

#[test]
fn test_reload_gives_up_when_the_lock_is_held() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::builder(&target)
        .config(TeleConfig::default().with_lock_timeout(Duration::from_millis(10)))
        .build();
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");

    let (locked, wait_for_lock) = mpsc::channel();
    let (release, wait_for_release) = mpsc::channel::<()>();
    let holder = {
        let vm = vm.clone();
        std::thread::spawn(move || {
            let _guard = vm.lock().lock();
            locked.send(()).expect("test is waiting");
            let _ = wait_for_release.recv();
        })
    };
    wait_for_lock.recv()?;

    assert!(matches!(
        code.try_machine_code_info(),
        Err(TeleError::LockUnavailable(_))
    ));
    assert!(!code.machine_code_info().is_loaded());

    release.send(())?;
    holder.join().expect("lock holder panicked");
    assert!(code.machine_code_info().is_loaded());
    Ok(())
}

#[test]
fn test_evicted_code() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::attach(&target);
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");
    code.machine_code_info();

    target.evict_code(&method);
    vm.refresh(target.advance_epoch())?;
    assert!(code.is_evicted());
    assert!(code.is_current());
    let info = code.machine_code_info();
    assert!(info.is_evicted());
    assert!(info.is_empty());
    assert!(!code.is_valid_code_location(method.code_start)?);

    let mut summary = String::new();
    code.write_summary(&mut summary)?;
    assert!(summary.contains("machine code evicted"));
    Ok(())
}

#[test]
fn test_moved_code_is_followed() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let method = compile(&target);
    let vm = common::attach(&target);
    let object = target_method(&vm, &method)?;
    let code = object.downcast::<TeleTargetMethod>().expect("a compiled method");
    code.machine_code_info();

    let region = code.region()?;
    assert_eq!(region.start, method.code_array);
    assert!(code.is_valid_code_location(method.code_start.plus(1))?);
    assert!(!code.is_valid_code_location(method.code_array)?);
    assert!(matches!(
        code.is_valid_code_location(region.end()),
        Err(TeleError::AddressOutOfRegion { .. })
    ));

    let moved = target.move_code(&method);
    vm.refresh(target.advance_epoch())?;
    assert_eq!(code.relocation_count(), 1);
    assert_eq!(code.region()?.start, moved.code_array);
    assert_eq!(code.code_start()?, Some(moved.code_start));
    assert!(!code.is_current());

    let info = code.machine_code_info();
    assert_eq!(info.generation(), 2);
    assert_eq!(info.code_start(), moved.code_start);
    assert_eq!(info.address(4)?, moved.code_start.plus(13));
    assert!(code.is_valid_code_location(moved.code_start)?);
    assert!(matches!(
        code.is_valid_code_location(method.code_start),
        Err(TeleError::AddressOutOfRegion { .. })
    ));
    Ok(())
}
