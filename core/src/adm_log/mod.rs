mod error;
mod event;
mod parser;
mod patterns;
mod reader;
mod timestamp;

pub use error::ReaderError;
pub use event::*;
pub use parser::{LogParser, ParseOutcome};
pub use patterns::{PatternRegistry, Rule};
pub use reader::{FileParse, ParseSummary, read_log_file};
pub use timestamp::{TimestampResolver, parse_session_header};
