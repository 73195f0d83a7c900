use crate::dlt::{Error, ErrorKind, Record};
use crate::source::{ByteSource, OVERRUN_EOF};
use slog::{debug, info};
use std::sync::{Arc, OnceLock};

/// One-shot slot for the first fatal error observed by any worker.
///
/// Workers poll it at the top of their loop and exit promptly once set;
/// the supervisor reads it after joining all threads.
#[derive(Debug, Default)]
pub struct FatalCell(OnceLock<Error>);

impl FatalCell {
    pub fn set(&self, err: Error) {
        // only the first publication wins
        let _ = self.0.set(err);
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn first(&self) -> Option<Error> {
        self.0.get().cloned()
    }
}

/// Parses all records of one chunk.
///
/// Loop invariant: each iteration either emits one record (valid or a
/// corrupted placeholder) or terminates the task.
pub struct Task {
    source: ByteSource,
    records: Vec<Record>,
    pub log: Option<slog::Logger>,
}

impl Task {
    pub fn new(source: ByteSource) -> Task {
        Task {
            source,
            records: Vec::new(),
            log: None,
        }
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn execute(&mut self, fatal: &FatalCell) {
        loop {
            // a sibling worker hit a fatal error, stop cooperatively
            if fatal.is_set() {
                break;
            }
            // cursor exhausted, the chunk ended on a record boundary
            if self.source.get_pos() >= self.source.len() {
                break;
            }
            let pos = self.source.get_pos();
            match Record::parse(&mut self.source) {
                Ok(record) => {
                    // A record beginning past the fence belongs to the next
                    // chunk and its worker will emit it; reads may cross the
                    // fence only to complete a straddling record. The find
                    // is still latched so the merge can tell the skipped
                    // region was a split artifact.
                    if !self.source.within_fence(pos) {
                        self.source.notify_success(pos);
                        break;
                    }
                    self.records.push(record);
                    self.source.notify_success(pos);
                    // a record crossing the fence is the last of this chunk
                    if self.source.overrun() > 0 {
                        break;
                    }
                }
                Err(e) => match e.kind() {
                    ErrorKind::InvalidData(_) => {
                        self.report_corruption(&e);
                        if let Some(log) = &self.log {
                            debug!(log, "skipped 1 byte at {}", pos; "cause" => %e);
                        }
                        // one byte at a time is slow but lands on any
                        // valid signature eventually
                        if let Err(seek_err) = self.source.set_pos(pos + 1) {
                            fatal.set(seek_err);
                            break;
                        }
                    }
                    ErrorKind::Truncated(_) => {
                        self.report_corruption(&e);
                        break;
                    }
                    ErrorKind::Eof => break,
                    ErrorKind::Fatal(_) => {
                        fatal.set(e.clone());
                        break;
                    }
                },
            }
        }
    }

    /// keep at most one contiguous corrupted placeholder per resync region
    fn report_corruption(&mut self, err: &Error) {
        if self.records.last().map_or(true, |r| !r.is_corrupted()) {
            self.records.push(Record::corrupted(err.to_string()));
        }
    }
}

/// Fans the input out to one thread per chunk and merges the results in
/// chunk order, reconciling records that straddle chunk boundaries.
pub struct Supervisor {
    tasks: Vec<Task>,
    log: Option<slog::Logger>,
}

impl Supervisor {
    /// one worker per available core
    pub fn new(source: ByteSource) -> Result<Supervisor, Error> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(source, workers)
    }

    pub fn with_workers(source: ByteSource, workers: usize) -> Result<Supervisor, Error> {
        let sources = match source.split(workers.max(1)) {
            Ok(sources) => sources,
            // empty input parses to no records
            Err(e) if matches!(e.kind(), ErrorKind::Eof) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Supervisor {
            tasks: sources.into_iter().map(Task::new).collect(),
            log: None,
        })
    }

    pub fn with_logger(mut self, log: slog::Logger) -> Supervisor {
        for task in &mut self.tasks {
            task.log = Some(log.clone());
        }
        self.log = Some(log);
        self
    }

    /// Launch one thread per chunk, join them and merge the per-chunk
    /// record lists in chunk order.
    pub fn execute(mut self) -> Result<Vec<Record>, Error> {
        if self.tasks.is_empty() {
            return Ok(Vec::new());
        }
        let fatal = Arc::new(FatalCell::default());

        let handles: Vec<_> = self
            .tasks
            .drain(..)
            .map(|mut task| {
                let fatal = Arc::clone(&fatal);
                std::thread::spawn(move || {
                    task.execute(&fatal);
                    task
                })
            })
            .collect();

        let mut tasks = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.join() {
                Ok(task) => tasks.push(task),
                Err(_) => fatal.set(Error::new(ErrorKind::Fatal(String::from(
                    "worker thread panicked",
                )))),
            }
        }
        if let Some(err) = fatal.first() {
            return Err(err);
        }

        let mut records = Vec::with_capacity(tasks.iter().map(|t| t.records.len()).sum());
        for i in 0..tasks.len() {
            let skip_first = i > 0 && Self::is_split_artifact(&tasks[i - 1], &tasks[i]);
            let chunk_records = std::mem::take(&mut tasks[i].records);
            records.extend(
                chunk_records
                    .into_iter()
                    .skip(if skip_first { 1 } else { 0 }),
            );
        }
        if let Some(log) = &self.log {
            info!(log, "merged {} records from {} chunks", records.len(), tasks.len());
        }
        Ok(records)
    }

    /// Decide whether the leading corrupted record of `cur` is merely the
    /// split point bisecting a record that the previous worker has already
    /// captured in full.
    fn is_split_artifact(prev: &Task, cur: &Task) -> bool {
        match cur.records.first() {
            Some(first) if first.is_corrupted() => {
                let prev_overrun = prev.source.overrun();
                // the first record this chunk found begins at or before the
                // point the previous worker stopped, so the skipped bytes
                // were the tail of a record already captured upstream
                if prev_overrun > 0
                    && cur
                        .source
                        .first_valid_offset()
                        .map_or(false, |offset| offset <= prev_overrun)
                {
                    return true;
                }
                // both ran off the true end; this chunk contributes nothing
                prev_overrun == OVERRUN_EOF && cur.source.overrun() == OVERRUN_EOF
            }
            _ => false,
        }
    }
}
