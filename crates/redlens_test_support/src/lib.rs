pub mod containers;
pub mod fake;
pub mod resp;

pub use fake::{FailMode, FakeRedis, FakeSlowlogEntry, FakeValue};
