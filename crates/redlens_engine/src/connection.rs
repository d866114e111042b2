use redis::ConnectionLike;
use redlens_core::{
    BoardConfig, CommandErrorFormatter, ConnectionErrorFormatter, EngineError, FormattedError,
    ServerTarget, sanitize_uri,
};

/// Exclusive session bound to one Redis server.
///
/// Owns the underlying connection and tracks which logical database is
/// selected on it, so `select` can skip redundant SELECT round trips.
/// `close` releases the connection; the handle refuses further commands
/// afterwards instead of silently reconnecting.
pub struct RedisHandle<C = redis::Connection> {
    conn: Option<C>,
    active_db: Option<u32>,
}

impl RedisHandle<redis::Connection> {
    /// Open a connection to `target`, honoring the configured timeouts,
    /// authenticating when an out-of-band password is set, and verifying
    /// liveness with a PING.
    pub fn open(target: &ServerTarget, config: &BoardConfig) -> Result<Self, EngineError> {
        let client =
            redis::Client::open(target.url()).map_err(|e| open_error(&e, target.url()))?;

        let mut conn = match config.connect_timeout() {
            Some(timeout) => client.get_connection_with_timeout(timeout),
            None => client.get_connection(),
        }
        .map_err(|e| open_error(&e, target.url()))?;

        if let Some(timeout) = config.response_timeout() {
            conn.set_read_timeout(Some(timeout))
                .map_err(|e| open_error(&e, target.url()))?;
            conn.set_write_timeout(Some(timeout))
                .map_err(|e| open_error(&e, target.url()))?;
        }

        if target.password().is_some() && !uri_authority_has_credentials(target.url()) {
            authenticate(&mut conn, target.password()).map_err(|e| open_error(&e, target.url()))?;
        }

        redis::cmd("PING")
            .query::<String>(&mut conn)
            .map_err(|e| open_error(&e, target.url()))?;

        let initial_db = u32::try_from(client.get_connection_info().redis.db).ok();

        Ok(Self {
            conn: Some(conn),
            active_db: initial_db,
        })
    }
}

impl<C: ConnectionLike> RedisHandle<C> {
    /// Wrap an already-established connection. The active database is
    /// unknown, so the first `select` always issues a SELECT.
    pub fn new(conn: C) -> Self {
        Self {
            conn: Some(conn),
            active_db: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn active_db(&self) -> Option<u32> {
        self.active_db
    }

    pub(crate) fn conn(&mut self) -> Result<&mut C, EngineError> {
        self.conn
            .as_mut()
            .ok_or_else(|| EngineError::connection_failed("connection is closed"))
    }

    /// Switch the logical database. No-op when `db` is already selected.
    pub fn select(&mut self, db: u32) -> Result<(), EngineError> {
        if self.active_db == Some(db) {
            return Ok(());
        }

        let conn = self.conn()?;
        redis::cmd("SELECT")
            .arg(db)
            .query::<String>(conn)
            .map_err(|e| command_error(&e))?;
        self.active_db = Some(db);
        Ok(())
    }

    pub fn ping(&mut self) -> Result<(), EngineError> {
        let conn = self.conn()?;
        redis::cmd("PING")
            .query::<String>(conn)
            .map_err(|e| command_error(&e))?;
        Ok(())
    }

    /// Release the underlying connection. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), EngineError> {
        // Dropping the connection tears down the socket.
        self.conn = None;
        Ok(())
    }

    /// Recover the wrapped connection, leaving the handle closed.
    pub fn into_inner(mut self) -> Option<C> {
        self.conn.take()
    }
}

/// Run `f` with a freshly opened handle, releasing it on every exit path.
pub fn with_server<T>(
    target: &ServerTarget,
    config: &BoardConfig,
    f: impl FnOnce(&mut RedisHandle) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut handle = RedisHandle::open(target, config)?;
    let result = f(&mut handle);
    let closed = handle.close();
    let value = result?;
    closed?;
    Ok(value)
}

/// Connection-category errors map to status DOWN; everything else the
/// server said is a protocol error (status ERROR).
pub(crate) fn is_connection_error(error: &redis::RedisError) -> bool {
    error.is_io_error()
        || error.is_timeout()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
}

pub(crate) fn command_error(error: &redis::RedisError) -> EngineError {
    let formatted = REDIS_ERROR_FORMATTER.format_command_error(error);
    if is_connection_error(error) {
        formatted.into_connection_error()
    } else {
        formatted.into_command_error()
    }
}

fn open_error(error: &redis::RedisError, uri: &str) -> EngineError {
    if error.kind() == redis::ErrorKind::InvalidClientConfig {
        return EngineError::InvalidTarget(format!("{}: {}", sanitize_uri(uri), error));
    }

    let formatted = REDIS_ERROR_FORMATTER.format_uri_error(error, &sanitize_uri(uri));
    if is_connection_error(error) {
        formatted.into_connection_error()
    } else {
        formatted.into_command_error()
    }
}

fn authenticate(
    conn: &mut redis::Connection,
    password: Option<&str>,
) -> redis::RedisResult<()> {
    if let Some(password) = password {
        redis::cmd("AUTH").arg(password).query::<String>(conn)?;
    }

    Ok(())
}

fn uri_authority_has_credentials(uri: &str) -> bool {
    if let Some((_, rest)) = uri.split_once("://") {
        let authority = rest.split('/').next().unwrap_or_default();
        return authority.contains('@');
    }

    false
}

struct RedisErrorFormatter;

impl CommandErrorFormatter for RedisErrorFormatter {
    fn format_command_error(&self, error: &(dyn std::error::Error + 'static)) -> FormattedError {
        FormattedError::new(error.to_string())
    }
}

impl ConnectionErrorFormatter for RedisErrorFormatter {
    fn format_connection_error(
        &self,
        error: &(dyn std::error::Error + 'static),
        host: &str,
        port: u16,
    ) -> FormattedError {
        let source = error.to_string();
        let lower = source.to_ascii_lowercase();

        if lower.contains("connection refused") {
            FormattedError::new(format!(
                "Connection refused. Is Redis running at {}:{}?",
                host, port
            ))
        } else if lower.contains("timed out") {
            FormattedError::new("Connection timed out")
        } else if lower.contains("noauth") || lower.contains("wrongpass") {
            FormattedError::new("Authentication failed. Check credentials.")
        } else {
            FormattedError::new(source)
        }
    }

    fn format_uri_error(
        &self,
        error: &(dyn std::error::Error + 'static),
        sanitized_uri: &str,
    ) -> FormattedError {
        let source = error.to_string();
        let lower = source.to_ascii_lowercase();

        if lower.contains("connection refused") {
            return FormattedError::new(format!(
                "Connection refused. Check URI: {}",
                sanitized_uri
            ));
        }

        if lower.contains("noauth") || lower.contains("wrongpass") {
            return FormattedError::new("Authentication failed. Check credentials.");
        }

        if lower.contains("timed out") {
            return FormattedError::new("Connection timed out");
        }

        FormattedError::new(source)
    }
}

static REDIS_ERROR_FORMATTER: RedisErrorFormatter = RedisErrorFormatter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_credentials_detection() {
        assert!(uri_authority_has_credentials("redis://:pw@localhost:6379"));
        assert!(uri_authority_has_credentials(
            "redis://user:pw@localhost:6379/0"
        ));
        assert!(!uri_authority_has_credentials("redis://localhost:6379/0"));
        assert!(!uri_authority_has_credentials(
            "redis://localhost:6379/0?a@b"
        ));
    }

    #[test]
    fn uri_error_hints_connection_refused() {
        let error = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused (os error 111)",
        ));
        let formatted =
            REDIS_ERROR_FORMATTER.format_uri_error(&error, "redis://localhost:6379/0");
        assert!(formatted.message.contains("Connection refused"));
        assert!(formatted.message.contains("redis://localhost:6379/0"));
    }
}
