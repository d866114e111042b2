pub mod classify;
pub mod connection;
mod convert;
pub mod decode;
pub mod display;
pub mod inspect;
pub mod scan;
pub mod stats;

pub use classify::KeyClassifier;
pub use connection::{RedisHandle, with_server};
pub use decode::{JsonDecoder, Utf8BackslashDecoder, ValueDecoder, decode_backslash, decode_page};
pub use display::{TabularFormatter, bytes_to_human};
pub use inspect::{InspectOutcome, InspectRequest, Inspector};
pub use scan::{ScanEngine, ValuePage};
pub use stats::StatsCollector;
