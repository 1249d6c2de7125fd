use backflow::error::{reset_dropped_error_hook, set_dropped_error_hook};
use backflow::source::Emission;
use backflow::{ErrorKind, FlowError, Flux, UNBOUNDED};
use integration_test_utils::{init_tracing, CountingResource, RecordingSubscriber};
use std::sync::{Arc, Mutex};

/// Reads `len` records from a counted handle, then does what `end` says.
fn handle_source(
    resource: Arc<CountingResource>,
    len: u32,
    end: fn(u32) -> Emission<u32>,
) -> Flux<u32> {
    let opener = resource.clone();
    Flux::generate(
        move || {
            opener.open();
            Ok(0u32)
        },
        move |cursor| {
            if cursor < len {
                (cursor + 1, Emission::Item(cursor))
            } else {
                (cursor, end(cursor))
            }
        },
        move |_| {
            resource.close();
            Ok(())
        },
    )
}

#[test]
fn close_runs_once_on_completion() {
    init_tracing();
    let resource = CountingResource::new();
    let recorder = RecordingSubscriber::new(UNBOUNDED);

    handle_source(resource.clone(), 3, |_| Emission::Complete).subscribe(recorder.clone());

    assert_eq!(recorder.items(), vec![0, 1, 2]);
    assert_eq!(recorder.completions(), 1);
    assert_eq!(resource.opened(), 1);
    assert_eq!(resource.closed(), 1);
}

#[test]
fn close_runs_once_on_error() {
    init_tracing();
    let resource = CountingResource::new();
    let recorder = RecordingSubscriber::new(UNBOUNDED);

    handle_source(resource.clone(), 2, |_| {
        Emission::Error(FlowError::producer("checksum mismatch"))
    })
    .subscribe(recorder.clone());

    assert_eq!(recorder.items(), vec![0, 1]);
    assert_eq!(recorder.error().map(|e| e.kind()), Some(ErrorKind::Producer));
    assert_eq!(resource.closed(), 1);
}

#[test]
fn close_runs_once_on_cancel() {
    init_tracing();
    let resource = CountingResource::new();
    let recorder = RecordingSubscriber::new(2);

    handle_source(resource.clone(), 100, |_| Emission::Complete).subscribe(recorder.clone());
    recorder.cancel();
    recorder.cancel();
    recorder.request(5);

    assert_eq!(recorder.items(), vec![0, 1]);
    assert_eq!(recorder.terminal_count(), 0);
    assert_eq!(resource.closed(), 1);
}

#[test]
fn close_failure_is_attached_to_the_primary_error() {
    init_tracing();
    let recorder = RecordingSubscriber::<u32>::new(UNBOUNDED);

    Flux::generate(
        || Ok(()),
        |()| ((), Emission::Error(FlowError::producer("read failed"))),
        |()| Err(FlowError::producer("handle already closed")),
    )
    .subscribe(recorder.clone());

    let error = recorder.error().expect("primary error");
    assert_eq!(error.kind(), ErrorKind::Producer);
    assert_eq!(error.message(), "read failed");
    assert_eq!(error.suppressed().len(), 1);
    assert_eq!(error.suppressed()[0].kind(), ErrorKind::ResourceCleanup);
}

#[test]
fn close_failure_after_completion_reaches_the_dropped_error_hook() {
    init_tracing();
    let dropped = Arc::new(Mutex::new(Vec::new()));
    let collected = dropped.clone();
    set_dropped_error_hook(move |err| collected.lock().unwrap().push(err.clone()));
    let recorder = RecordingSubscriber::new(UNBOUNDED);

    Flux::generate(
        || Ok(()),
        |()| ((), Emission::Last(7u8)),
        |()| Err(FlowError::producer("flush failed")),
    )
    .subscribe(recorder.clone());
    reset_dropped_error_hook();

    assert_eq!(recorder.items(), vec![7]);
    assert_eq!(recorder.completions(), 1);
    let dropped = dropped.lock().unwrap();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].kind(), ErrorKind::ResourceCleanup);
}
