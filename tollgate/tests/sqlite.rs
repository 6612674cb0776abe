//! End-to-end tests against the SQLite backend
#![cfg(feature = "sqlite")]

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tollgate::{
    AccountId, ClientIdentity, Error, LoginAttempt, ManualClock, PasswordVerdict,
    SqliteRepositoryProvider, ThrottleError, Tollgate, TollgateBuilder, TollgateBuilderError,
    TotpError,
};
use tollgate_core::repositories::AccountDirectoryProvider;

async fn setup(clock: &ManualClock) -> Tollgate<SqliteRepositoryProvider> {
    let _ = tracing_subscriber::fmt().try_init();

    // one connection, so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to connect to SQLite");

    let tollgate = TollgateBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_sqlite_pool(pool)
        .apply_migrations(true)
        .build()
        .await
        .expect("Failed to build Tollgate");

    tollgate
        .repositories()
        .accounts()
        .create_account(&AccountId::new("acct_1"), "admin", Some("admin@example.com"))
        .await
        .unwrap();

    tollgate
}

fn attempt() -> LoginAttempt {
    LoginAttempt::new("admin").with_remote_addr("203.0.113.7")
}

#[tokio::test]
async fn test_builder_with_sqlite() {
    let tollgate = TollgateBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .expect("Failed to connect to SQLite")
        .build()
        .await
        .expect("Failed to build Tollgate");

    tollgate.health_check().await.expect("Health check failed");
}

#[tokio::test]
async fn test_builder_rejects_unreachable_database() {
    let result = TollgateBuilder::new()
        .with_sqlite("sqlite:///nonexistent-dir/tollgate.db")
        .await;

    assert!(matches!(
        result,
        Err(TollgateBuilderError::StorageConnection(_))
    ));
}

#[tokio::test]
async fn test_manual_migration_is_idempotent() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock).await;
    tollgate.migrate().await.expect("Migration failed");
    tollgate.health_check().await.expect("Health check failed");
}

#[tokio::test]
async fn test_block_and_expiry() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock).await;

    for _ in 0..4 {
        let err = tollgate
            .login(&attempt(), PasswordVerdict::Rejected, None)
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
        clock.advance(10);
    }

    let err = tollgate
        .login(&attempt(), PasswordVerdict::Accepted, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Throttle(ThrottleError::Blocked { .. })));

    let identity = ClientIdentity::new("203.0.113.7");
    let status = tollgate.status(&identity).await.unwrap();
    assert_eq!(status.attempts, 5);
    assert!(status.blocked);

    clock.advance(86_400);
    let status = tollgate.status(&identity).await.unwrap();
    assert_eq!(status.attempts, 0);

    tollgate
        .login(&attempt(), PasswordVerdict::Accepted, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_purge_lifts_block() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock).await;

    for _ in 0..5 {
        let _ = tollgate
            .login(&attempt(), PasswordVerdict::Rejected, None)
            .await;
        clock.advance(10);
    }

    let identity = ClientIdentity::new("203.0.113.7");
    assert!(tollgate.purge(&identity).await.unwrap());

    tollgate
        .login(&attempt(), PasswordVerdict::Accepted, None)
        .await
        .unwrap();
    assert!(tollgate.recent_attempts(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_factor_with_stored_secret() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock).await;
    let account = AccountId::new("acct_1");

    tollgate.regenerate_secret(&account, "admin").await.unwrap();
    let current = tollgate.current_code(&account).await.unwrap().unwrap();

    let err = tollgate
        .login(&attempt(), PasswordVerdict::Accepted, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Totp(TotpError::InvalidCode)));

    clock.advance(5);
    let granted = tollgate
        .login(
            &LoginAttempt::new("admin@example.com").with_remote_addr("203.0.113.7"),
            PasswordVerdict::Accepted,
            Some(current.code.as_str()),
        )
        .await
        .unwrap();
    assert_eq!(granted.account, Some(account));
}
