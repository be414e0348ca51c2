pub mod auth_classifier;
pub mod event_parser;
pub mod log_reader;

pub use auth_classifier::{classify, classify_message};
pub use event_parser::{parse_line, parse_lines};
pub use log_reader::{InputError, LogFileReader};
