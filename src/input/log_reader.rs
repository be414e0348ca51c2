use crate::input::event_parser;
use crate::models::ParsedEvent;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Log file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads an authentication log file as one batch
///
/// The whole file is re-read on every call; no offsets are kept.
pub struct LogFileReader {
    file_path: PathBuf,
}

impl LogFileReader {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        LogFileReader {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Read every line of the file. Invalid UTF-8 is replaced rather than rejected.
    pub fn read_lines(&self) -> Result<Vec<String>, InputError> {
        if !self.is_valid() {
            return Err(InputError::NotFound(self.file_path.display().to_string()));
        }

        let mut reader = BufReader::new(File::open(&self.file_path)?);
        let mut lines = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf)?;
            if bytes_read == 0 {
                break;
            }
            lines.push(String::from_utf8_lossy(&buf).into_owned());
        }

        log::debug!("Read {} line(s) from {:?}", lines.len(), self.file_path);
        Ok(lines)
    }

    /// Read the file and keep only lines matching the log grammar
    pub fn read_events(&self) -> Result<Vec<ParsedEvent>, InputError> {
        Ok(event_parser::parse_lines(self.read_lines()?))
    }

    pub fn is_valid(&self) -> bool {
        self.file_path.is_file()
    }
}
