use std::time::Duration;

use redlens_core::{BoardConfig, KeyType, ServerTarget};
use redlens_engine::{InspectOutcome, InspectRequest, Inspector, StatsCollector};
use redlens_test_support::containers;

fn seed(url: &str) -> redis::RedisResult<()> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_connection()?;

    redis::cmd("SET").arg("str").arg("bar").query::<()>(&mut conn)?;
    redis::cmd("SADD").arg("set").arg("bar").query::<()>(&mut conn)?;
    redis::cmd("SADD").arg("set").arg("foo").query::<()>(&mut conn)?;
    redis::cmd("HSET")
        .arg("hash")
        .arg("key")
        .arg("val")
        .query::<()>(&mut conn)?;
    redis::cmd("RPUSH")
        .arg("list")
        .arg("foo")
        .arg("bar")
        .arg("foobar")
        .query::<()>(&mut conn)?;
    redis::cmd("ZADD")
        .arg("zset")
        .arg(1)
        .arg("foo")
        .query::<()>(&mut conn)?;
    redis::cmd("ZADD")
        .arg("zset")
        .arg(2)
        .arg("b")
        .query::<()>(&mut conn)?;

    Ok(())
}

#[test]
#[ignore = "requires Docker daemon"]
fn redis_live_overview_and_value_pages() -> Result<(), redlens_core::EngineError> {
    containers::with_redis_url(|url| {
        let config = BoardConfig {
            connect_timeout_ms: Some(5000),
            response_timeout_ms: Some(5000),
            ..Default::default()
        };
        let target = ServerTarget::new(url.clone());
        let collector = StatsCollector::new(&config);

        containers::retry_engine_operation(Duration::from_secs(30), || {
            let stats = collector.collect_target(&target);
            if stats.is_up() {
                Ok(())
            } else {
                Err(redlens_core::EngineError::connection_failed(
                    stats.status.to_string(),
                ))
            }
        })?;

        seed(&url).map_err(|e| redlens_core::EngineError::command_failed(e.to_string()))?;

        let inspector = Inspector::new(config);

        let outcome = inspector.inspect(&target, &InspectRequest::overview())?;
        let InspectOutcome::Overview { stats, databases } = outcome else {
            panic!("expected overview outcome");
        };
        assert!(stats.is_up());
        assert_eq!(stats.databases[&0].keys, 5);
        assert!(!databases.is_empty());

        let outcome = inspector.inspect(&target, &InspectRequest::keys(0))?;
        let InspectOutcome::Keys { database, .. } = outcome else {
            panic!("expected keys outcome");
        };
        let scan = database.scan.expect("scan page");
        assert_eq!(scan.count, 5);
        assert!(scan.is_complete());

        let outcome = inspector.inspect(&target, &InspectRequest::value(0, "zset"))?;
        let InspectOutcome::Value { key, page, .. } = outcome else {
            panic!("expected value outcome");
        };
        assert_eq!(key.key_type, KeyType::ZSet);
        assert_eq!(
            page.data,
            vec![
                ("1".to_string(), "foo".to_string()),
                ("2".to_string(), "b".to_string()),
            ]
        );

        Ok(())
    })
}
