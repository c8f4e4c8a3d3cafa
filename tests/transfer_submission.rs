mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use common::init_tracing;
use execgate::exec::{TransferSettings, TransferSubmissionExecutor};
use execgate::fs::mock::MockFileSystem;
use execgate::signal::{ActionFailure, Outcome};
use execgate::transfer::{
    ConfigRuleStore, JsonlTransferStore, TransferMode, TransferRule, TransferStore,
};
use execgate_test_utils::FailingTransferStore;
use tokio_util::sync::CancellationToken;

fn rules() -> Arc<ConfigRuleStore> {
    Arc::new(ConfigRuleStore::new([
        TransferRule {
            name: "SENDRULE".into(),
            mode: TransferMode::Send,
        },
        TransferRule {
            name: "GETRULE".into(),
            mode: TransferMode::Recv,
        },
    ]))
}

fn executor(queue: Arc<dyn TransferStore>) -> TransferSubmissionExecutor {
    TransferSubmissionExecutor::new(
        rules(),
        queue,
        Arc::new(MockFileSystem::new()),
        TransferSettings::default(),
    )
}

fn open_queue(dir: &std::path::Path) -> JsonlTransferStore {
    JsonlTransferStore::open(dir.join("queue.jsonl"), dir.join("spool")).unwrap()
}

#[test]
fn failed_insert_falls_back_to_special_submit() {
    init_tracing();
    let store = Arc::new(FailingTransferStore::insert_only());
    let exec = executor(store.clone());

    let outcome = exec.run("-to h -file /f -rule SENDRULE", &CancellationToken::new());
    assert_eq!(outcome, Outcome::Success);

    let spooled = store.special_submissions();
    assert_eq!(spooled.len(), 1);
    assert_eq!(spooled[0].rule, "SENDRULE");
}

#[test]
fn both_submission_paths_failing_is_a_submission_failure() {
    init_tracing();
    let exec = executor(Arc::new(FailingTransferStore::new()));

    let outcome = exec.run("-to h -file /f -rule SENDRULE", &CancellationToken::new());
    assert!(matches!(
        outcome,
        Outcome::Failure(ActionFailure::SubmissionFailed(_))
    ));
}

#[test]
fn jsonl_queue_records_every_submission() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_queue(dir.path()));
    let exec = executor(store.clone());
    let cancel = CancellationToken::new();

    assert_eq!(
        exec.run("-to h -file /a -rule SENDRULE -block 50", &cancel),
        Outcome::Success
    );
    assert_eq!(
        exec.run(
            "-to h -file /b -rule GETRULE -md5 -block 1024 -delay +60000 -info nightly batch",
            &cancel
        ),
        Outcome::Success
    );

    let records = store.load_all().unwrap();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].block_size, 65536);
    assert_eq!(records[0].info, "noinfo");
    assert!(records[0].start_at.is_none());

    assert_eq!(records[1].mode, TransferMode::RecvMd5);
    assert_eq!(records[1].block_size, 1024);
    assert_eq!(records[1].original_size, -1);
    assert_eq!(records[1].info, "nightly batch");
    assert!(records[1].start_at.unwrap() > records[1].created_at);
}

#[test]
fn malformed_arguments_are_validation_failures() {
    init_tracing();
    let exec = executor(Arc::new(FailingTransferStore::new()));
    let cancel = CancellationToken::new();

    for line in [
        "-to h -file /f -rule SENDRULE -block lots",
        "-to h -file /f -rule SENDRULE -delay whenever",
        "-to h -file /f -rule",
        "-file /f -rule SENDRULE",
    ] {
        let outcome = exec.run(line, &cancel);
        assert!(
            matches!(outcome, Outcome::Failure(ActionFailure::Validation(_))),
            "{line}: {outcome:?}"
        );
    }
}

#[test]
fn concurrent_submissions_keep_every_line_whole() {
    init_tracing();
    const THREADS: usize = 16;
    const PER_THREAD: usize = 25;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_queue(dir.path()));
    let exec = Arc::new(executor(store.clone()));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let exec = Arc::clone(&exec);
            thread::spawn(move || {
                let cancel = CancellationToken::new();
                for n in 0..PER_THREAD {
                    let line = format!("-to h -file /w{t}/f{n} -rule SENDRULE -info {t} {n}");
                    assert_eq!(exec.run(&line, &cancel), Outcome::Success);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let records = store.load_all().unwrap();
    assert_eq!(records.len(), THREADS * PER_THREAD);

    let ids: HashSet<_> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), records.len());
    let files: HashSet<_> = records.iter().map(|r| r.file_path.clone()).collect();
    assert_eq!(files.len(), records.len());
    for record in &records {
        let (t, n) = record.info.split_once(' ').unwrap();
        assert_eq!(record.file_path, format!("/w{t}/f{n}"));
    }

    // A fresh handle reads the same queue.
    assert_eq!(open_queue(dir.path()).load_all().unwrap(), records);
}
