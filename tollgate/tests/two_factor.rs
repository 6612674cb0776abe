//! Login pipeline tests for the TOTP second factor

use std::sync::Arc;

use tollgate::{
    AccountId, Error, LoginAttempt, ManualClock, MemoryRepositoryProvider, PasswordVerdict,
    StepEncoding, Tollgate, TollgateBuilder, TotpConfig, TotpError,
};
use tollgate_core::repositories::AccountDirectoryProvider;

const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

async fn setup(clock: &ManualClock, totp_config: TotpConfig) -> Tollgate<MemoryRepositoryProvider> {
    let _ = tracing_subscriber::fmt().try_init();

    let provider = Arc::new(MemoryRepositoryProvider::new(Arc::new(clock.clone())));
    provider
        .accounts()
        .add_account(&AccountId::new("acct_1"), "admin", Some("admin@example.com"));

    TollgateBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_provider(provider)
        .with_totp_config(totp_config)
        .build()
        .await
        .expect("Failed to build Tollgate")
}

fn attempt(login: &str) -> LoginAttempt {
    LoginAttempt::new(login).with_remote_addr("203.0.113.7")
}

#[tokio::test]
async fn test_unenrolled_account_needs_no_code() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;

    let granted = tollgate
        .login(&attempt("admin"), PasswordVerdict::Accepted, None)
        .await
        .unwrap();
    assert_eq!(granted.account, Some(AccountId::new("acct_1")));
}

#[tokio::test]
async fn test_unknown_login_passes_second_factor() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;

    let granted = tollgate
        .login(&attempt("nobody"), PasswordVerdict::Accepted, None)
        .await
        .unwrap();
    assert_eq!(granted.account, None);
}

#[tokio::test]
async fn test_enrolled_account_requires_current_code() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;
    let account = AccountId::new("acct_1");

    let enrollment = tollgate.regenerate_secret(&account, "admin").await.unwrap();
    assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/admin?secret="));
    assert!(tollgate.is_enrolled(&account).await.unwrap());

    let err = tollgate
        .login(&attempt("admin"), PasswordVerdict::Accepted, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Totp(TotpError::InvalidCode)));
    assert_eq!(err.to_string(), "Two-factor error: Invalid 2FA code.");

    clock.advance(10);
    let current = tollgate.current_code(&account).await.unwrap().unwrap();
    assert_eq!(current.expires_at, 1_020);
    assert_eq!(current.remaining, 10);

    let granted = tollgate
        .login(
            &attempt("admin"),
            PasswordVerdict::Accepted,
            Some(current.code.as_str()),
        )
        .await
        .unwrap();
    assert_eq!(granted.account, Some(account));
}

#[tokio::test]
async fn test_email_login_resolves_enrolled_account() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;
    let account = AccountId::new("acct_1");
    tollgate.import_secret(&account, RFC_SECRET).await.unwrap();

    let err = tollgate
        .login(
            &attempt("admin@example.com"),
            PasswordVerdict::Accepted,
            Some("not a code"),
        )
        .await
        .unwrap_err();
    assert!(err.is_totp_error());
}

#[tokio::test]
async fn test_code_from_previous_step_is_rejected() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;
    let account = AccountId::new("acct_1");
    tollgate.import_secret(&account, RFC_SECRET).await.unwrap();

    let stale = tollgate.current_code(&account).await.unwrap().unwrap();
    clock.set(stale.expires_at);

    let err = tollgate
        .login(
            &attempt("admin"),
            PasswordVerdict::Accepted,
            Some(stale.code.as_str()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Totp(TotpError::InvalidCode)));
}

#[tokio::test]
async fn test_failed_code_keeps_attempt_on_ledger() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;
    let account = AccountId::new("acct_1");
    tollgate.regenerate_secret(&account, "admin").await.unwrap();

    let _ = tollgate
        .login(&attempt("admin"), PasswordVerdict::Accepted, Some("000000"))
        .await;

    let identity = tollgate.resolve_identity(&attempt("admin"));
    assert_eq!(tollgate.status(&identity).await.unwrap().attempts, 1);
}

#[tokio::test]
async fn test_rfc6238_step_encoding() {
    // RFC 6238 appendix B, SHA-1 at T=59: 94287082
    let clock = ManualClock::new(59);
    let tollgate = setup(
        &clock,
        TotpConfig {
            encoding: StepEncoding::Rfc6238,
            ..TotpConfig::default()
        },
    )
    .await;
    let account = AccountId::new("acct_1");
    tollgate.import_secret(&account, RFC_SECRET).await.unwrap();

    let current = tollgate.current_code(&account).await.unwrap().unwrap();
    assert_eq!(current.code.as_str(), "287082");

    tollgate
        .login(&attempt("admin"), PasswordVerdict::Accepted, Some("287082"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_padded_code_is_rejected() {
    let clock = ManualClock::new(59);
    let tollgate = setup(
        &clock,
        TotpConfig {
            encoding: StepEncoding::Rfc6238,
            ..TotpConfig::default()
        },
    )
    .await;
    let account = AccountId::new("acct_1");
    tollgate.import_secret(&account, RFC_SECRET).await.unwrap();

    let result = tollgate
        .login(&attempt("admin"), PasswordVerdict::Accepted, Some(" 287082 "))
        .await;
    assert!(matches!(result, Err(Error::Totp(TotpError::InvalidCode))));
}

#[tokio::test]
async fn test_delete_secret_turns_second_factor_off() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;
    let account = AccountId::new("acct_1");
    tollgate.regenerate_secret(&account, "admin").await.unwrap();

    assert!(tollgate.delete_secret(&account).await.unwrap());
    assert!(!tollgate.delete_secret(&account).await.unwrap());
    assert!(tollgate.enrollment(&account, "admin").await.unwrap().is_none());
    assert!(tollgate.current_code(&account).await.unwrap().is_none());

    tollgate
        .login(&attempt("admin"), PasswordVerdict::Accepted, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_enrollment_shows_existing_secret() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(
        &clock,
        TotpConfig {
            issuer: "Example Site".to_string(),
            ..TotpConfig::default()
        },
    )
    .await;
    let account = AccountId::new("acct_1");
    tollgate.import_secret(&account, RFC_SECRET).await.unwrap();

    let enrollment = tollgate
        .enrollment(&account, "admin@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment.secret_base32, RFC_SECRET);
    assert_eq!(
        enrollment.provisioning_uri,
        format!("otpauth://totp/admin%40example.com?secret={RFC_SECRET}&issuer=Example+Site")
    );
}

#[tokio::test]
async fn test_import_rejects_empty_secret() {
    let clock = ManualClock::new(1_000);
    let tollgate = setup(&clock, TotpConfig::default()).await;

    let err = tollgate
        .import_secret(&AccountId::new("acct_1"), "!!!")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Totp(TotpError::InvalidSecret(_))));
}
