use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::time::Duration;
use tele_test_fixtures::SimulatedTarget;
use tele_vm::objects::TeleMemoryRegion;
use tele_vm::tele_types::names::{classes, fields};
use tele_vm::tele_types::{Address, Epoch, ObjectStatus, Value};
use tele_vm::{
    CacheUpdate, StatsPrinter, Surrogate, SurrogateConstructor, TeleConfig, TeleError, TeleObject,
};
use test_log::test;

mod common;

/// Counts its refreshes and takes its time over each
#[derive(Debug)]
struct SlowPoint {
    updates: Arc<AtomicUsize>,
}

impl Surrogate for SlowPoint {
    fn type_name(&self) -> &'static str {
        "SlowPoint"
    }

    fn update_object_cache(
        &self,
        _object: &TeleObject,
        _epoch: Epoch,
        _stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    }
}

fn slow_points(updates: &Arc<AtomicUsize>) -> SurrogateConstructor {
    let updates = updates.clone();
    Arc::new(move |_| {
        Box::new(SlowPoint {
            updates: updates.clone(),
        }) as Box<dyn Surrogate>
    })
}

fn new_region(target: &SimulatedTarget, start: u64, size: u64, name: &str) -> Address {
    let class = target.class(classes::MEMORY_REGION);
    let region = target.new_tuple(&class);
    let name = target.new_string(name);
    target.set_field(region, &class, fields::REGION_START, Value::Word(Address::new(start)));
    target.set_field(region, &class, fields::REGION_SIZE, Value::Word(Address::new(size)));
    target.set_field(region, &class, fields::REGION_NAME, Value::Reference(name));
    region
}

#[test]
fn test_refresh_happens_once_per_epoch() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let origin = new_region(&target, 0x8000, 0x100, "code");
    let vm = common::attach(&target);

    let region = common::mirror(&vm, origin)?;
    assert_eq!(region.last_update_epoch(), Some(Epoch::new(1)));

    let reads = target.read_count();
    assert_eq!(region.update_cache(Epoch::new(1))?, CacheUpdate::Redundant);
    assert_eq!(region.update_cache_if_needed()?, CacheUpdate::Redundant);
    assert_eq!(target.read_count(), reads);

    let epoch = target.advance_epoch();
    assert_eq!(region.update_cache(epoch)?, CacheUpdate::Updated);
    let reads = target.read_count();
    assert_eq!(region.update_cache(epoch)?, CacheUpdate::Redundant);
    assert_eq!(region.update_cache(Epoch::new(1))?, CacheUpdate::Redundant);
    assert_eq!(target.read_count(), reads);
    assert_eq!(region.last_update_epoch(), Some(epoch));
    Ok(())
}

#[test]
fn test_region_bounds_follow_the_target() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let origin = new_region(&target, 0x8000, 0x100, "code");
    let vm = common::attach(&target);

    let region = common::mirror(&vm, origin)?;
    let view = region.downcast::<TeleMemoryRegion>().expect("a region");
    assert_eq!(view.start()?, Address::new(0x8000));
    assert_eq!(view.end()?, Address::new(0x8100));
    assert_eq!(view.name()?, "code");
    assert!(view.contains(Address::new(0x80ff))?);
    assert!(!view.contains(Address::new(0x8100))?);

    let class = target.class(classes::MEMORY_REGION);
    target.set_field(origin, &class, fields::REGION_SIZE, Value::Word(Address::new(0x200)));
    // still the bounds cached for the current epoch
    assert_eq!(view.size()?, 0x100);
    vm.refresh(target.advance_epoch())?;
    assert_eq!(view.size()?, 0x200);
    assert_eq!(
        region.textual_visualization().as_deref(),
        Some("code 0x8000..0x8200")
    );
    Ok(())
}

#[test]
fn test_unavailable_target_postpones_the_update() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let origin = new_region(&target, 0x8000, 0x100, "code");
    let vm = common::attach(&target);
    let region = common::mirror(&vm, origin)?;

    target.memory().set_available(false);
    let epoch = target.advance_epoch();
    let report = vm.refresh(epoch)?;
    assert_eq!(report.epoch, epoch);
    assert!(report.postponed.contains(&region.oid()));
    assert!(report.failed.is_empty());
    assert_eq!(region.last_update_epoch(), Some(Epoch::new(1)));

    target.memory().set_available(true);
    let report = vm.refresh(epoch)?;
    assert!(report.postponed.is_empty());
    assert!(report.updated >= 1);
    assert_eq!(region.last_update_epoch(), Some(epoch));
    Ok(())
}

#[test]
fn test_dead_objects_are_skipped_and_swept() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let point = common::define_point(&target);
    let origin = common::new_point(&target, &point, 1, 2);
    let vm = common::attach(&target);
    let object = common::mirror(&vm, origin)?;
    let reference = object.reference();

    target.free(origin);
    assert_eq!(object.status(), ObjectStatus::Dead);
    let epoch = target.advance_epoch();
    assert_eq!(object.update_cache(epoch)?, CacheUpdate::Skipped);

    let report = vm.refresh(target.advance_epoch())?;
    assert_eq!(report.updated, 0);
    assert_eq!(report.evicted, 1);
    assert!(vm.factory().get(reference).is_none());
    assert!(vm.lookup_object(object.oid()).is_none());
    Ok(())
}

#[test]
fn test_slow_mirror_types_are_reported() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let thing = target.define_class(common::class(&target, "test.Thing"));
    let origin = target.new_tuple(&thing);
    let vm = common::builder(&target)
        .config(TeleConfig::default().with_refresh_warning_threshold(Duration::ZERO))
        .build();
    let _object = common::mirror(&vm, origin)?;

    let report = vm.refresh(target.advance_epoch())?;
    assert_eq!(report.live_objects, 1);
    assert_eq!(report.updated, 1);
    assert!(report
        .slow_types
        .iter()
        .any(|(type_name, _)| *type_name == "TeleTupleObject"));
    assert_eq!(vm.factory().last_update_epoch(), Some(report.epoch));
    Ok(())
}

#[test]
fn test_concurrent_updates_refresh_once() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let point = common::define_point(&target);
    let origin = common::new_point(&target, &point, 1, 2);
    let updates = Arc::new(AtomicUsize::new(0));
    let vm = common::builder(&target)
        .surrogate(common::POINT, slow_points(&updates))
        .build();
    let object = common::mirror(&vm, origin)?;
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    let epoch = target.advance_epoch();
    let barrier = Barrier::new(2);
    let outcomes = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    object.update_cache(epoch)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    assert_eq!(updates.load(Ordering::SeqCst), 2);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| **outcome == CacheUpdate::Updated)
            .count(),
        1
    );
    assert!(outcomes.contains(&CacheUpdate::Redundant));
    assert_eq!(object.last_update_epoch(), Some(epoch));
    Ok(())
}

#[test]
fn test_refresh_gives_up_when_the_lock_is_held() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let point = common::define_point(&target);
    let origin = common::new_point(&target, &point, 1, 2);
    let vm = common::builder(&target)
        .config(TeleConfig::default().with_lock_timeout(Duration::from_millis(10)))
        .build();
    let object = common::mirror(&vm, origin)?;

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

    let epoch = target.advance_epoch();
    assert!(matches!(
        vm.refresh(epoch),
        Err(TeleError::LockUnavailable(_))
    ));
    // nothing was refreshed or swept
    assert_eq!(object.last_update_epoch(), Some(Epoch::new(1)));
    assert_eq!(vm.factory().last_update_epoch(), None);
    assert_eq!(vm.factory().reference_count(), 1);

    release.send(())?;
    holder.join().expect("lock holder panicked");
    let report = vm.refresh(epoch)?;
    assert_eq!(report.updated, 1);
    assert_eq!(object.last_update_epoch(), Some(epoch));
    Ok(())
}
