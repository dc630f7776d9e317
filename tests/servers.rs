//! Server identity, connectivity and cross-session behavior.

use fakeredis::{CommandError, Reply, Server, ServerConfig, ServerKey, ServerRegistry, Session};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// IDENTITY
// ============================================================================

#[test]
fn test_same_address_shares_data() {
    let registry = ServerRegistry::new();
    let key = ServerKey::from_target(Some("localhost"), Some(6379), None);
    let mut a = Session::connect(registry.server(key.clone())).unwrap();
    let mut b = Session::connect(registry.server(key)).unwrap();

    a.execute_str("SET shared yes").unwrap();
    assert_eq!(b.execute_str("GET shared"), Ok(Reply::bulk("yes")));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_different_addresses_are_isolated() {
    let registry = ServerRegistry::new();
    let mut a = Session::connect(
        registry.server(ServerKey::from_target(Some("localhost"), Some(6379), None)),
    )
    .unwrap();
    let mut b = Session::connect(
        registry.server(ServerKey::from_target(Some("localhost"), Some(6380), None)),
    )
    .unwrap();

    a.execute_str("SET k a").unwrap();
    assert_eq!(b.execute_str("GET k"), Ok(Reply::Nil));
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_unused_server_is_dropped() {
    let registry = ServerRegistry::new();
    {
        let mut s = Session::connect(registry.server(ServerKey::Shared)).unwrap();
        s.execute_str("SET k v").unwrap();
    }
    assert!(registry.is_empty());
    let mut s = Session::connect(registry.server(ServerKey::Shared)).unwrap();
    assert_eq!(s.execute_str("GET k"), Ok(Reply::Nil));
}

#[test]
fn test_configured_database_count() {
    let registry = ServerRegistry::new();
    let server = registry.get_or_create(ServerKey::Path("/tmp/a.sock".into()), ServerConfig::with_databases(2));
    let mut s = Session::connect(server).unwrap();
    assert_eq!(s.execute_str("SELECT 1"), Ok(Reply::ok()));
    assert_eq!(s.execute_str("SELECT 2"), Err(CommandError::DbIndexOutOfRange));
}

// ============================================================================
// CONNECTIVITY
// ============================================================================

#[test]
fn test_disconnect_affects_every_session() {
    let server = Arc::new(Server::default());
    let mut a = Session::connect(Arc::clone(&server)).unwrap();
    let mut b = Session::connect(Arc::clone(&server)).unwrap();
    a.execute_str("SET k v").unwrap();

    server.set_connected(false);
    assert_eq!(a.execute_str("PING"), Err(CommandError::ConnectionUnavailable));
    assert_eq!(b.execute_str("GET k"), Err(CommandError::ConnectionUnavailable));
    assert_eq!(
        CommandError::ConnectionUnavailable.to_string(),
        "FakeRedis is emulating a connection error."
    );

    server.set_connected(true);
    assert_eq!(b.execute_str("GET k"), Ok(Reply::bulk("v")));
}

#[test]
fn test_messages_readable_after_disconnect() {
    let server = Arc::new(Server::default());
    let mut sub = Session::connect(Arc::clone(&server)).unwrap();
    let mut publisher = Session::connect(Arc::clone(&server)).unwrap();
    sub.execute_str("SUBSCRIBE c").unwrap();
    publisher.execute_str("PUBLISH c hi").unwrap();

    server.set_connected(false);
    let message = sub.try_recv_message().unwrap();
    assert_eq!(&message.data[..], b"hi");
}

// ============================================================================
// PUB/SUB
// ============================================================================

#[tokio::test]
async fn test_recv_message_async() {
    let server = Arc::new(Server::default());
    let mut sub = Session::connect(Arc::clone(&server)).unwrap();
    let mut publisher = Session::connect(server).unwrap();
    sub.execute_async("PSUBSCRIBE", ["events.*"]).await.unwrap();

    publisher
        .execute_async("PUBLISH", ["events.login", "alice"])
        .await
        .unwrap();
    let message = tokio::time::timeout(Duration::from_secs(1), sub.recv_message())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        message.to_reply(),
        Reply::bulk_array(["pmessage", "events.*", "events.login", "alice"])
    );
}

// ============================================================================
// EXPIRY
// ============================================================================

#[test]
fn test_expired_key_is_absent_everywhere() {
    let mut s = Session::connect(Arc::new(Server::default())).unwrap();
    s.execute_str("SET k v PX 30").unwrap();
    s.execute_str("SET keep v").unwrap();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(s.execute_str("GET k"), Ok(Reply::Nil));
    assert_eq!(s.execute_str("EXISTS k"), Ok(Reply::integer(0)));
    assert_eq!(s.execute_str("KEYS *"), Ok(Reply::bulk_array(["keep"])));
    assert_eq!(s.execute_str("DBSIZE"), Ok(Reply::integer(1)));
}

#[tokio::test]
async fn test_sweeper_removes_expired_keys() {
    let server = Arc::new(Server::default());
    let sweeper = fakeredis::ExpirySweeper::start(
        Arc::clone(&server),
        fakeredis::ExpiryConfig {
            base_interval: Duration::from_millis(10),
            min_interval: Duration::from_millis(5),
            ..Default::default()
        },
    );
    let mut s = Session::connect(Arc::clone(&server)).unwrap();
    s.execute_async("SET", ["k", "v", "PX", "20"]).await.unwrap();
    assert_eq!(server.lock().stored_len(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(server.lock().stored_len(), 0);
    sweeper.stop();
}
