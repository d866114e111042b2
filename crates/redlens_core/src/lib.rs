mod config;
mod error;
mod error_formatter;
mod key_value;
mod stats;
mod table;
mod target;

pub use config::BoardConfig;
pub use error::{DecodeError, EngineError};
pub use error_formatter::{
    CommandErrorFormatter, ConnectionErrorFormatter, DefaultErrorFormatter, FormattedError,
    sanitize_uri,
};
pub use key_value::{DatabaseInfo, KeyInfo, KeyTtl, KeyType, KeyUsage, ScanResult};
pub use stats::{CpuStats, DatabaseStats, ServerStats, ServerStatus, SlowlogEntry};
pub use table::Table;
pub use target::ServerTarget;

/// Safely truncate a string at a character boundary, appending "..." if truncated.
pub fn truncate_string_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let truncate_at = max_len.saturating_sub(3);
    let safe_end = s
        .char_indices()
        .take_while(|(idx, _)| *idx <= truncate_at)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    format!("{}...", &s[..safe_end])
}
