use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::writer::MakeWriter;

/// Lines kept for the failure report.
pub(crate) const TAIL_LINES: usize = 40;

/// Run log: every formatted event goes to stdout and the optional `--log` file, and the
/// last few are kept so a failing seed can be reported with what led up to it.
#[derive(Clone)]
pub(crate) struct RunLog {
    shared: Arc<Shared>,
}

struct Shared {
    file: Option<Mutex<BufWriter<File>>>,
    tail: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl RunLog {
    pub(crate) fn new(path: Option<&Path>, capacity: usize) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(Mutex::new(BufWriter::new(File::create(path)?))),
            None => None,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                file,
                tail: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
            }),
        })
    }

    /// The most recent lines, oldest first.
    pub(crate) fn tail(&self) -> Vec<String> {
        lock(&self.shared.tail).iter().cloned().collect()
    }

    /// Print the retained lines to stderr and flush the log file.
    pub(crate) fn report_failure(&self, seed: u64) {
        let tail = self.tail();
        eprintln!("--- last {} log lines (rerun with --seed {seed}) ---", tail.len());
        for line in tail {
            eprintln!("{line}");
        }
        self.finish();
    }

    /// Flush the log file. The subscriber keeps its writer alive until exit, so buffered
    /// lines are not written on drop.
    pub(crate) fn finish(&self) {
        if let Some(file) = &self.shared.file {
            if let Err(err) = lock(file).flush() {
                eprintln!("failed to flush log file: {err}");
            }
        }
    }
}

impl Shared {
    fn remember(&self, buf: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        let mut tail = lock(&self.tail);
        for line in String::from_utf8_lossy(buf).lines() {
            if tail.len() == self.capacity {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }
}

pub(crate) struct RunLogWriter {
    shared: Arc<Shared>,
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &self.shared.file {
            lock(file).write_all(buf)?;
        }
        self.shared.remember(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &self.shared.file {
            lock(file).flush()?;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_only_the_latest_lines() {
        let log = RunLog::new(None, 2).unwrap();
        let mut writer = log.make_writer();
        writer.write_all(b"first\nsecond\n").unwrap();
        writer.write_all(b"third\n").unwrap();
        assert_eq!(log.tail(), vec!["second".to_string(), "third".to_string()]);
    }

    #[test]
    fn log_file_receives_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.log");
        let log = RunLog::new(Some(&path), TAIL_LINES).unwrap();
        let mut writer = log.make_writer();
        writer.write_all(b"plan generated\n").unwrap();
        writer.write_all(b"window finished\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "plan generated\nwindow finished\n"
        );
    }
}
