//! PostgreSQL-backed store checks. Run with
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use auth_service::{
    config::DatabaseConfig,
    db,
    models::{Session, SessionMetadata},
    services::{AuthError, CredentialStore, PgCredentialStore, SessionReplacement},
};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = db::create_pool(&DatabaseConfig {
        url,
        max_connections: 5,
        min_connections: 1,
        run_migrations: true,
    })
    .await
    .expect("connect");
    db::run_migrations(&pool).await.expect("migrate");
    pool
}

async fn seed_user(pool: &PgPool, email: &str) -> (Uuid, Uuid) {
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO tenants (tenant_id, tenant_slug, tenant_label) VALUES ($1, $2, $3)")
        .bind(tenant_id)
        .bind(format!("t-{}", tenant_id))
        .bind("Test tenant")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO users (user_id, tenant_id, email) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(tenant_id)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    (tenant_id, user_id)
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn rotation_is_conditional_on_unrevoked_parent() {
    let pool = test_pool().await;
    let store = PgCredentialStore::new(pool.clone());
    let (_, user_id) = seed_user(&pool, &format!("{}@x.com", Uuid::new_v4())).await;
    let now = Utc::now();

    let parent = Session::new(
        user_id,
        Uuid::new_v4().to_string(),
        false,
        SessionMetadata::default(),
        now,
        7,
    );
    store.insert_session(&parent).await.unwrap();

    let first = parent.successor(Uuid::new_v4().to_string(), now, 7);
    let second = parent.successor(Uuid::new_v4().to_string(), now, 7);

    let (a, b) = tokio::join!(
        store.rotate_session(parent.session_id, &first, now),
        store.rotate_session(parent.session_id, &second, now),
    );
    let wins = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);

    let stored = store
        .find_session_by_id(parent.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.revoked_utc.is_some());
    assert!(stored.replaced_by_token.is_some());
}

fn new_session(user_id: Uuid, now: chrono::DateTime<Utc>) -> Session {
    Session::new(
        user_id,
        Uuid::new_v4().to_string(),
        true,
        SessionMetadata::default(),
        now,
        7,
    )
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn backup_code_is_burned_with_the_session_replacement() {
    let pool = test_pool().await;
    let store = PgCredentialStore::new(pool.clone());
    let (_, user_id) = seed_user(&pool, &format!("{}@x.com", Uuid::new_v4())).await;
    let now = Utc::now();

    store
        .store_mfa_enrollment(user_id, "JBSWY3DPEHPK3PXP", &["abc123".to_string()], now)
        .await
        .unwrap();
    let old = new_session(user_id, now);
    store.insert_session(&old).await.unwrap();

    let first = new_session(user_id, now);
    let replacement = SessionReplacement {
        session: &first,
        complete_enrollment: false,
        backup_code_hash: Some("abc123"),
    };
    assert_eq!(
        store.replace_user_sessions(user_id, replacement, now).await.unwrap(),
        Some(1)
    );

    let second = new_session(user_id, now);
    let replayed = SessionReplacement {
        session: &second,
        complete_enrollment: false,
        backup_code_hash: Some("abc123"),
    };
    assert_eq!(
        store.replace_user_sessions(user_id, replayed, now).await.unwrap(),
        None
    );
    assert!(store.find_session_by_id(second.session_id).await.unwrap().is_none());
    let survivor = store.find_session_by_id(first.session_id).await.unwrap().unwrap();
    assert!(survivor.revoked_utc.is_none());
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn system_roles_survive_delete() {
    let pool = test_pool().await;
    let store = PgCredentialStore::new(pool.clone());
    let (tenant_id, _) = seed_user(&pool, &format!("{}@x.com", Uuid::new_v4())).await;

    let mut role_ids = Vec::new();
    for (name, is_system) in [("owner", true), ("editor", false)] {
        let role_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO roles (role_id, tenant_id, role_name, is_system) VALUES ($1, $2, $3, $4)",
        )
        .bind(role_id)
        .bind(tenant_id)
        .bind(name)
        .bind(is_system)
        .execute(&pool)
        .await
        .unwrap();
        role_ids.push(role_id);
    }

    assert!(matches!(
        store.delete_role(role_ids[0]).await,
        Err(AuthError::Conflict(_))
    ));
    assert!(store.delete_role(role_ids[1]).await.is_ok());
    assert!(matches!(
        store.delete_role(role_ids[1]).await,
        Err(AuthError::NotFound(_))
    ));

    let direct = sqlx::query("DELETE FROM roles WHERE role_id = $1")
        .bind(role_ids[0])
        .execute(&pool)
        .await;
    assert!(direct.is_err());
}
