use std::sync::mpsc;
use std::time::Duration;
use tele_test_fixtures::SimulatedTarget;
use tele_vm::tele_types::Epoch;
use tele_vm::{ProcessEvent, RefreshLoop, TeleConfig};
use test_log::test;

mod common;

#[test(tokio::test)]
async fn test_refresh_on_stop() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let point = common::define_point(&target);
    let origin = common::new_point(&target, &point, 1, 2);
    let vm = common::attach(&target);
    let object = common::mirror(&vm, origin)?;

    let refresh_loop = RefreshLoop::spawn(vm.clone());
    let mut reports = refresh_loop.reports();
    assert!(refresh_loop.latest().is_none());

    refresh_loop.notify(ProcessEvent::Running)?;
    let epoch = target.advance_epoch();
    refresh_loop.notify(ProcessEvent::Stopped(epoch))?;
    let report = reports
        .wait_for(|report| report.is_some())
        .await?
        .clone()
        .expect("a report was published");
    assert_eq!(report.epoch, epoch);
    assert_eq!(report.live_objects, 1);
    assert_eq!(object.last_update_epoch(), Some(epoch));
    assert_eq!(
        refresh_loop.latest().map(|latest| latest.epoch),
        Some(epoch)
    );

    refresh_loop.shutdown().await?;
    Ok(())
}

#[test(tokio::test)]
async fn test_events_after_termination_are_refused() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let vm = common::attach(&target);
    let refresh_loop = RefreshLoop::spawn(vm);

    refresh_loop.notify(ProcessEvent::Terminated)?;
    let mut reports = refresh_loop.reports();
    // the sender side goes away with the task
    assert!(reports.changed().await.is_err());
    assert!(refresh_loop.notify(ProcessEvent::Running).is_err());
    assert!(refresh_loop.latest().is_none());
    Ok(())
}

#[test(tokio::test)]
async fn test_refresh_without_the_lock_publishes_nothing() -> eyre::Result<()> {
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

    let refresh_loop = RefreshLoop::spawn(vm.clone());
    let reports = refresh_loop.reports();
    refresh_loop.notify(ProcessEvent::Stopped(target.advance_epoch()))?;
    refresh_loop.shutdown().await?;
    assert!(reports.borrow().is_none());
    assert_eq!(object.last_update_epoch(), Some(Epoch::new(1)));

    release.send(())?;
    holder.join().expect("lock holder panicked");
    Ok(())
}
