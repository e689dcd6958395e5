use super::*;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

#[derive(Default)]
struct Recorder {
    successes: Vec<String>,
    errors: Vec<(String, String)>,
}

struct Harness {
    scheduler: Scheduler<Recorder>,
    sender: ContextSender<Recorder>,
    shutdown: CancellationToken,
}

fn harness(worker_threads: usize, stage_timeout: Option<Duration>) -> Harness {
    let (sender, context) = control_channel::<Recorder>();
    let shutdown = CancellationToken::new();
    tokio::spawn(context.run(Recorder::default(), shutdown.clone()));
    Harness {
        scheduler: Scheduler::new(sender.clone(), worker_threads, stage_timeout),
        sender,
        shutdown,
    }
}

/// Task whose continuations record into the [`Recorder`]
fn recording_task<F, Fut>(name: &str, payload: F) -> Task<Recorder, String>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String>> + Send + 'static,
{
    Task::new(
        name.to_string(),
        payload,
        |rec: &mut Recorder, value, _task| {
            rec.successes.push(value);
            Ok(())
        },
        |rec: &mut Recorder, error, task| {
            rec.errors
                .push((task.name().to_string(), error.error_code().to_string()));
        },
    )
}

/// Poll the controlling context until `done` holds or two seconds pass
async fn wait_until(sender: &ContextSender<Recorder>, done: impl Fn(&Recorder) -> bool + Send + Sync + Clone + 'static) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let check = done.clone();
        if sender.query(move |rec| check(rec)).await.unwrap() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn success_continuation_runs_on_controlling_context() {
    let h = harness(2, None);

    h.scheduler
        .submit(recording_task("Hash", || async { Ok("deadbeef".to_string()) }));

    wait_until(&h.sender, |rec| rec.successes.len() == 1).await;
    let (successes, errors) = h
        .sender
        .query(|rec| (rec.successes.clone(), rec.errors.len()))
        .await
        .unwrap();
    assert_eq!(successes, vec!["deadbeef".to_string()]);
    assert_eq!(errors, 0);
    h.shutdown.cancel();
}

#[tokio::test]
async fn payload_error_reaches_error_continuation_with_task() {
    let h = harness(2, None);

    h.scheduler.submit(recording_task("Find Subtitles", || async {
        Err(Error::Provider(crate::error::ProviderError::Unavailable(
            "connection refused".into(),
        )))
    }));

    wait_until(&h.sender, |rec| !rec.errors.is_empty()).await;
    let errors = h.sender.query(|rec| rec.errors.clone()).await.unwrap();
    assert_eq!(
        errors,
        vec![(
            "Find Subtitles".to_string(),
            "provider_unavailable".to_string()
        )]
    );
    h.shutdown.cancel();
}

#[tokio::test]
async fn panicking_payload_is_reported_and_pool_keeps_working() {
    let h = harness(1, None);

    h.scheduler
        .submit(recording_task("Hash", || async { panic!("corrupt state") }));
    h.scheduler
        .submit(recording_task("Hash", || async { Ok("next".to_string()) }));

    wait_until(&h.sender, |rec| rec.errors.len() == 1 && rec.successes.len() == 1).await;
    let errors = h.sender.query(|rec| rec.errors.clone()).await.unwrap();
    assert_eq!(errors[0].1, "task_panicked");
    h.shutdown.cancel();
}

#[tokio::test]
async fn payload_closure_panicking_before_returning_a_future_is_reported() {
    let h = harness(2, None);

    h.scheduler.submit(recording_task(
        "Hash",
        || -> std::future::Ready<Result<String>> { panic!("no future for you") },
    ));
    h.scheduler
        .submit(recording_task("Hash", || async { Ok("next".to_string()) }));

    wait_until(&h.sender, |rec| rec.errors.len() == 1 && rec.successes.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (successes, errors) = h
        .sender
        .query(|rec| (rec.successes.len(), rec.errors.clone()))
        .await
        .unwrap();
    assert_eq!(successes, 1);
    assert_eq!(errors, vec![("Hash".to_string(), "task_panicked".to_string())]);
    h.shutdown.cancel();
}

#[tokio::test]
async fn stopped_task_never_runs_payload_or_continuations() {
    let h = harness(1, None);
    let gate = Arc::new(Semaphore::new(0));
    let ran = Arc::new(AtomicU32::new(0));

    // Occupy the only worker slot until the gate opens
    let blocker_gate = Arc::clone(&gate);
    h.scheduler.submit(recording_task("Blocker", move || {
        let gate = Arc::clone(&blocker_gate);
        async move {
            drop(gate.acquire().await);
            Ok("blocker".to_string())
        }
    }));

    let ran_clone = Arc::clone(&ran);
    let handle = h.scheduler.submit(recording_task("Queued", move || {
        ran_clone.fetch_add(1, Ordering::SeqCst);
        async { Ok("queued".to_string()) }
    }));
    handle.stop();
    gate.add_permits(1);

    wait_until(&h.sender, |rec| rec.successes.len() == 1).await;
    // Give the stopped task a chance to (wrongly) run
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (successes, errors) = h
        .sender
        .query(|rec| (rec.successes.clone(), rec.errors.len()))
        .await
        .unwrap();
    assert_eq!(successes, vec!["blocker".to_string()]);
    assert_eq!(errors, 0);
    assert_eq!(ran.load(Ordering::SeqCst), 0, "stopped payload must not run");
    h.shutdown.cancel();
}

#[tokio::test]
async fn pool_never_exceeds_worker_threads() {
    let h = harness(2, None);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for i in 0..6 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        h.scheduler.submit(recording_task(&format!("Job {i}"), move || {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(String::new())
            }
        }));
    }

    wait_until(&h.sender, |rec| rec.successes.len() == 6).await;
    assert!(peak.load(Ordering::SeqCst) <= 2, "peak concurrency above pool size");
    assert_eq!(h.scheduler.worker_threads(), 2);
    h.shutdown.cancel();
}

#[tokio::test]
async fn hanging_payload_times_out() {
    let h = harness(1, Some(Duration::from_millis(30)));

    h.scheduler.submit(recording_task("Download Subtitles", || async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("never".to_string())
    }));

    wait_until(&h.sender, |rec| !rec.errors.is_empty()).await;
    let errors = h.sender.query(|rec| rec.errors.clone()).await.unwrap();
    assert_eq!(
        errors,
        vec![("Download Subtitles".to_string(), "timeout".to_string())]
    );
    h.shutdown.cancel();
}

#[tokio::test]
async fn continuation_can_submit_follow_up_task() {
    let h = harness(2, None);
    let scheduler = h.scheduler.clone();

    let first: Task<Recorder, String> = Task::new(
        "First",
        || async { Ok("first".to_string()) },
        move |rec: &mut Recorder, value, _task| {
            rec.successes.push(value);
            scheduler.submit(recording_task("Second", || async { Ok("second".to_string()) }));
            Ok(())
        },
        |_rec: &mut Recorder, _error, _task| {},
    );
    h.scheduler.submit(first);

    wait_until(&h.sender, |rec| rec.successes.len() == 2).await;
    let successes = h.sender.query(|rec| rec.successes.clone()).await.unwrap();
    assert_eq!(successes, vec!["first".to_string(), "second".to_string()]);
    h.shutdown.cancel();
}

#[tokio::test]
async fn closed_scheduler_drops_queued_tasks() {
    let h = harness(1, None);
    h.scheduler.close();
    assert!(h.scheduler.is_closed());

    h.scheduler
        .submit(recording_task("Hash", || async { Ok("late".to_string()) }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let count = h
        .sender
        .query(|rec| rec.successes.len() + rec.errors.len())
        .await
        .unwrap();
    assert_eq!(count, 0);
    h.shutdown.cancel();
}

#[tokio::test]
async fn context_survives_panicking_closure_and_returns_state() {
    let (sender, context) = control_channel::<Vec<u32>>();
    let shutdown = CancellationToken::new();
    let join = tokio::spawn(context.run(vec![1], shutdown.clone()));

    sender.post(|_state| panic!("bad closure")).unwrap();
    sender.post(|state| state.push(2)).unwrap();
    let len = sender.query(|state| state.len()).await.unwrap();
    assert_eq!(len, 2);

    shutdown.cancel();
    let state = join.await.unwrap();
    assert_eq!(state, vec![1, 2]);

    assert!(matches!(
        sender.query(|state| state.len()).await,
        Err(Error::ShuttingDown)
    ));
}
