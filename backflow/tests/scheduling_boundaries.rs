use backflow::scheduling::{Scheduler, TokioPool, WorkerThread};
use backflow::source::Emission;
use backflow::{Flux, UNBOUNDED};
use integration_test_utils::{init_tracing, RecordingSubscriber};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn worker(name: &str) -> Arc<dyn Scheduler> {
    Arc::new(WorkerThread::spawn(name).expect("worker thread"))
}

/// Counts upward and records the thread each step ran on.
fn traced_source(producers: Arc<Mutex<Vec<Option<String>>>>, len: u32) -> Flux<u32> {
    Flux::generate(
        || Ok(0u32),
        move |n| {
            producers
                .lock()
                .unwrap()
                .push(thread::current().name().map(str::to_string));
            if n + 1 == len {
                (n + 1, Emission::Last(n))
            } else {
                (n + 1, Emission::Item(n))
            }
        },
        |_| Ok(()),
    )
}

#[test]
fn nearest_subscribe_on_decides_where_production_runs() {
    init_tracing();
    let producers = Arc::new(Mutex::new(Vec::new()));
    let recorder = RecordingSubscriber::new(0);

    traced_source(producers.clone(), 6)
        .subscribe_on(worker("inner-boundary"))
        .subscribe_on(worker("outer-boundary"))
        .subscribe(recorder.clone());

    assert!(integration_test_utils::wait_until(WAIT, || recorder.is_subscribed()));
    recorder.request(3);
    assert!(recorder.wait_for_items(3, WAIT));
    recorder.request(UNBOUNDED);
    assert!(recorder.wait_for_terminal(WAIT));

    assert_eq!(recorder.items(), (0..6).collect::<Vec<_>>());
    let producers = producers.lock().unwrap();
    assert_eq!(producers.len(), 6);
    assert!(producers
        .iter()
        .all(|name| name.as_deref() == Some("inner-boundary")));
}

#[test]
fn publish_on_delivers_in_order_on_the_worker() {
    init_tracing();
    let recorder = RecordingSubscriber::new(UNBOUNDED);

    Flux::range(0, 500)
        .publish_on(worker("delivery"))
        .subscribe(recorder.clone());

    assert!(recorder.wait_for_terminal(WAIT));
    assert_eq!(recorder.items(), (0..500).collect::<Vec<_>>());
    assert!(recorder
        .delivery_threads()
        .iter()
        .all(|name| name.as_deref() == Some("delivery")));
}

#[test]
fn pool_from_config_runs_production() {
    init_tracing();
    let config = backflow::EngineConfig::from_json_str(
        r#"{ "scheduler": { "worker_threads": 2, "thread_name": "configured-pool" } }"#,
    )
    .expect("valid config");
    let pool: Arc<dyn Scheduler> =
        Arc::new(TokioPool::from_config(&config.scheduler).expect("pool"));
    let producers = Arc::new(Mutex::new(Vec::new()));
    let recorder = RecordingSubscriber::new(UNBOUNDED);

    traced_source(producers.clone(), 4)
        .subscribe_on(pool)
        .subscribe(recorder.clone());

    assert!(recorder.wait_for_terminal(WAIT));
    assert_eq!(recorder.items(), vec![0, 1, 2, 3]);
    assert!(producers
        .lock()
        .unwrap()
        .iter()
        .all(|name| name.as_deref() == Some("configured-pool")));
}
