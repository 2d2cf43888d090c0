//! Logger bootstrap
//!
//! Console output goes through `env_logger`. An optional file sink rotates
//! by size: when the active file exceeds the limit it is renamed with a
//! ring suffix and a fresh file is started, opened with a UTF-8 BOM and a
//! four-line header so external tools can detect encoding and provenance.

use log::{LevelFilter, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Configuration for the file sink
#[derive(Clone, Debug)]
pub struct FileLogConfig {
    /// Path of the active log file
    pub path: PathBuf,
    /// Rotate when the active file exceeds this many bytes
    pub max_size_bytes: u64,
    /// Number of rotated files kept in the ring
    pub max_files: usize,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ember.log"),
            max_size_bytes: 4 * 1024 * 1024,
            max_files: 3,
        }
    }
}

/// Initialize console logging. Safe to call once per process; tests that
/// race on this should use `try_init`.
pub fn init_console(level: LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

/// Size-rotated log file sink
pub struct FileSink {
    config: FileLogConfig,
    state: Mutex<SinkState>,
}

struct SinkState {
    file: Option<File>,
    written: u64,
}

impl FileSink {
    pub fn new(config: FileLogConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SinkState {
                file: None,
                written: 0,
            }),
        }
    }

    /// Append one formatted line, rotating first if the size cap is hit
    pub fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut state = self.state.lock();

        if state.file.is_none() || state.written >= self.config.max_size_bytes {
            self.rotate(&mut state)?;
        }

        if let Some(file) = state.file.as_mut() {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            state.written += line.len() as u64 + 1;
        }
        Ok(())
    }

    fn rotate(&self, state: &mut SinkState) -> std::io::Result<()> {
        state.file = None;

        // Shift the ring: ember.log.2 -> ember.log.3, ...
        if self.config.path.exists() {
            for i in (1..self.config.max_files).rev() {
                let from = ring_path(&self.config.path, i);
                let to = ring_path(&self.config.path, i + 1);
                if from.exists() {
                    let _ = std::fs::rename(&from, &to);
                }
            }
            let _ = std::fs::rename(&self.config.path, ring_path(&self.config.path, 1));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.config.path)?;

        // BOM + 4-line header on every fresh file
        file.write_all(b"\xEF\xBB\xBF")?;
        let header = format!(
            "# Ember Engine log\n# version: {}\n# started: {:?}\n# encoding: utf-8\n",
            env!("CARGO_PKG_VERSION"),
            std::time::SystemTime::now(),
        );
        file.write_all(header.as_bytes())?;
        state.written = 3 + header.len() as u64;
        state.file = Some(file);
        Ok(())
    }
}

fn ring_path(base: &std::path::Path, index: usize) -> PathBuf {
    let mut os = base.as_os_str().to_owned();
    os.push(format!(".{index}"));
    PathBuf::from(os)
}

/// `log::Log` adapter that mirrors records into a `FileSink`
pub struct FileLogger {
    sink: FileSink,
    level: LevelFilter,
}

impl FileLogger {
    pub fn new(config: FileLogConfig, level: LevelFilter) -> Self {
        Self {
            sink: FileSink::new(config),
            level,
        }
    }
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
        let _ = self.sink.write_line(&line);
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_writes_bom_and_header() {
        let dir = std::env::temp_dir().join("ember_log_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("test.log");
        let _ = std::fs::remove_file(&path);

        let sink = FileSink::new(FileLogConfig {
            path: path.clone(),
            max_size_bytes: 1024,
            max_files: 2,
        });
        sink.write_line("hello").unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], b"\xEF\xBB\xBF");

        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let header_lines: Vec<_> = text.lines().take_while(|l| l.starts_with('#')).collect();
        assert_eq!(header_lines.len(), 4);
        assert!(text.lines().any(|l| l == "hello"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_size_rotation_ring() {
        let dir = std::env::temp_dir().join("ember_log_ring");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("ring.log");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(ring_path(&path, 1));

        let sink = FileSink::new(FileLogConfig {
            path: path.clone(),
            max_size_bytes: 16,
            max_files: 2,
        });
        sink.write_line("first entry that is long enough").unwrap();
        sink.write_line("second entry forces rotation").unwrap();

        assert!(ring_path(&path, 1).exists());

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(ring_path(&path, 1));
    }
}
