use super::*;
use tempfile::tempdir;

#[test]
fn append_assigns_increasing_lsns() {
    let dir = tempdir().unwrap();
    let handler = LogHandler::init(dir.path(), 10_000).unwrap();

    let lsn1 = handler.append(LogModule::RecordManager, b"one").unwrap();
    let lsn2 = handler.append(LogModule::RecordManager, b"two").unwrap();
    assert!(lsn2 > lsn1);
}

#[test]
fn wait_lsn_flushes_and_unblocks() {
    let dir = tempdir().unwrap();
    let handler = LogHandler::init(dir.path(), 10_000).unwrap();

    let lsn = handler.append(LogModule::BplusTree, b"payload").unwrap();
    assert!(handler.current_flushed_lsn() < lsn);

    handler.wait_lsn(lsn).unwrap();
    assert!(handler.current_flushed_lsn() >= lsn);
}

struct RecordingReplayer {
    seen: Vec<(u64, LogModule, Vec<u8>)>,
    done_called: bool,
}

impl LogReplayer for RecordingReplayer {
    fn replay(&mut self, entry: &LogEntry) -> common::DbResult<()> {
        self.seen
            .push((entry.lsn, entry.module, entry.payload.clone()));
        Ok(())
    }

    fn on_done(&mut self) -> common::DbResult<()> {
        self.done_called = true;
        Ok(())
    }
}

#[test]
fn replay_dispatches_every_flushed_entry_in_order() {
    let dir = tempdir().unwrap();
    let handler = LogHandler::init(dir.path(), 10_000).unwrap();

    handler.append(LogModule::BufferPool, b"alloc").unwrap();
    handler.append(LogModule::Transaction, b"commit").unwrap();
    handler.flush().unwrap();

    let mut replayer = RecordingReplayer {
        seen: Vec::new(),
        done_called: false,
    };
    handler.replay(&mut replayer, 0).unwrap();

    assert_eq!(replayer.seen.len(), 2);
    assert_eq!(replayer.seen[0].1, LogModule::BufferPool);
    assert_eq!(replayer.seen[1].1, LogModule::Transaction);
    assert!(replayer.done_called);
}

#[test]
fn replay_honors_start_lsn_filter() {
    let dir = tempdir().unwrap();
    let handler = LogHandler::init(dir.path(), 10_000).unwrap();

    handler.append(LogModule::RecordManager, b"a").unwrap();
    let lsn2 = handler.append(LogModule::RecordManager, b"b").unwrap();
    handler.flush().unwrap();

    let mut replayer = RecordingReplayer {
        seen: Vec::new(),
        done_called: false,
    };
    handler.replay(&mut replayer, lsn2).unwrap();
    assert_eq!(replayer.seen.len(), 1);
    assert_eq!(replayer.seen[0].0, lsn2);
}

#[test]
fn log_survives_reopen_across_handler_instances() {
    let dir = tempdir().unwrap();
    let lsn = {
        let handler = LogHandler::init(dir.path(), 10_000).unwrap();
        let lsn = handler.append(LogModule::Transaction, b"xid").unwrap();
        handler.flush().unwrap();
        lsn
    };

    let reopened = LogHandler::init(dir.path(), 10_000).unwrap();
    assert!(reopened.current_lsn() > lsn);

    let mut replayer = RecordingReplayer {
        seen: Vec::new(),
        done_called: false,
    };
    reopened.replay(&mut replayer, 0).unwrap();
    assert_eq!(replayer.seen.len(), 1);
}

#[test]
fn rolls_to_a_new_file_once_the_entry_cap_is_hit() {
    let dir = tempdir().unwrap();
    let handler = LogHandler::init(dir.path(), 2).unwrap();

    for _ in 0..5 {
        handler.append(LogModule::BufferPool, b"x").unwrap();
    }
    handler.flush().unwrap();

    let mgr = LogFileManager::new(dir.path()).unwrap();
    assert!(mgr.files().unwrap().len() >= 2);
}

#[test]
fn background_flusher_eventually_durable_after_stop() {
    let dir = tempdir().unwrap();
    let handler = LogHandler::init(dir.path(), 10_000).unwrap();
    handler.start();

    let lsn = handler.append(LogModule::RecordManager, b"bg").unwrap();
    handler.stop();

    assert!(handler.current_flushed_lsn() >= lsn);
}

#[test]
fn vacuous_handler_discards_everything() {
    let handler = VacuousLogHandler::new();
    let lsn = handler.append(LogModule::RecordManager, b"noop").unwrap();
    handler.wait_lsn(lsn).unwrap();
    assert_eq!(handler.current_flushed_lsn(), handler.current_lsn() - 1);
}

#[test]
fn sink_trait_object_works_across_both_implementations() {
    fn exercise(sink: &dyn LogSink) -> u64 {
        sink.append(LogModule::BplusTree, b"via-trait-object").unwrap()
    }

    let dir = tempdir().unwrap();
    let real = LogHandler::init(dir.path(), 10_000).unwrap();
    assert_eq!(exercise(&real), 1);

    let vacuous = VacuousLogHandler::new();
    assert_eq!(exercise(&vacuous), 1);
}
