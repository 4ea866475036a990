use chrono::{Duration, TimeZone, Utc};

use session::SessionManager;
use store::Role;

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 18, 0, 0).unwrap()
}

#[tokio::test]
async fn create_and_resolve_round_trip() {
    let mgr = SessionManager::new(3600);
    let s = mgr.create("ada", Role::User, t0()).await;
    assert_eq!(s.token.len(), 64);

    let resolved = mgr.resolve(&s.token, t0()).await.unwrap();
    assert_eq!(resolved.username, "ada");
    assert!(!resolved.is_admin());

    assert!(mgr.resolve("not-a-token", t0()).await.is_none());
}

#[tokio::test]
async fn sessions_expire_after_ttl() {
    let mgr = SessionManager::new(3600);
    let s = mgr.create("ada", Role::User, t0()).await;

    let just_before = t0() + Duration::seconds(3599);
    assert!(mgr.resolve(&s.token, just_before).await.is_some());

    let at_expiry = t0() + Duration::seconds(3600);
    assert!(mgr.resolve(&s.token, at_expiry).await.is_none());
}

#[tokio::test]
async fn gc_sweeps_only_expired() {
    let mgr = SessionManager::new(3600);
    let old = mgr.create("ada", Role::User, t0()).await;
    let fresh = mgr
        .create("bob", Role::Admin, t0() + Duration::seconds(3000))
        .await;

    let removed = mgr.gc(t0() + Duration::seconds(3700)).await;
    assert_eq!(removed, 1);
    assert!(mgr.resolve(&old.token, t0() + Duration::seconds(3700)).await.is_none());
    assert!(
        mgr.resolve(&fresh.token, t0() + Duration::seconds(3700))
            .await
            .is_some()
    );
}

#[tokio::test]
async fn revoke_user_logs_out_everywhere() {
    let mgr = SessionManager::new(3600);
    let a = mgr.create("ada", Role::User, t0()).await;
    let b = mgr.create("ada", Role::User, t0()).await;
    let c = mgr.create("bob", Role::User, t0()).await;

    mgr.revoke_user("ada").await;
    assert!(mgr.resolve(&a.token, t0()).await.is_none());
    assert!(mgr.resolve(&b.token, t0()).await.is_none());
    assert!(mgr.resolve(&c.token, t0()).await.is_some());
}

#[tokio::test]
async fn tokens_are_unique() {
    let mgr = SessionManager::new(3600);
    let mut seen = std::collections::HashSet::new();
    for _ in 0..64 {
        let s = mgr.create("ada", Role::User, t0()).await;
        assert!(seen.insert(s.token));
    }
}
