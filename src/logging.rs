//! Console logging plus a per-run file, `logs/tube_batch_<timestamp>.log`.

use chrono::{DateTime, Local};
use env_logger::{Builder, Env, Target};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes every log record to both sinks
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("tube_batch_{}.log", started.format("%Y%m%d_%H%M%S"))
}

pub fn open_log_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(Local::now()));
    let file = File::create(&path)?;
    Ok((path, file))
}

/// Installs the global logger (`info` unless `RUST_LOG` says otherwise).
/// Returns the log file, or `None` when only the console could be used.
pub fn init(dir: &Path) -> Option<PathBuf> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    let log_file = open_log_file(dir).map(|(path, file)| {
        builder.target(Target::Pipe(Box::new(Tee::new(io::stderr(), file))));
        path
    });
    builder.init();

    match log_file {
        Ok(path) => {
            log::info!("logging to {}", path.display());
            Some(path)
        }
        Err(e) => {
            log::warn!("no log file in {}: {e}", dir.display());
            None
        }
    }
}
