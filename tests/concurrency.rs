//! Races that must resolve to exactly one winner, and snapshots that must
//! never catch a composite operation halfway.

use anyhow::Result;
use credlink::{AuthStore, Error, Method};
use secrecy::SecretString;

fn secret(material: &str) -> SecretString {
    SecretString::from(material.to_string())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_registers_for_one_identifier_yield_one_winner() -> Result<()> {
    init_tracing();
    let store = AuthStore::new();
    let alice = store.create_user(None).await;
    let bob = store.create_user(None).await;

    let a = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .register(alice, Method::EmailPassword, "a@x.com", secret("s1"))
                .await
        })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .register(bob, Method::EmailPassword, "a@x.com", secret("s2"))
                .await
        })
    };

    let outcomes = [a.await?, b.await?];
    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = outcomes
        .into_iter()
        .find(|outcome| outcome.is_err())
        .expect("one loser");
    assert!(matches!(loser.unwrap_err(), Error::DuplicateIdentity(_)));
    assert!(store.invariants_hold().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_registers_for_one_owner_yield_one_winner() -> Result<()> {
    let store = AuthStore::new();
    let alice = store.create_user(None).await;

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .register(
                    alice,
                    Method::UsernamePassword,
                    &format!("alice{n}"),
                    secret("s"),
                )
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => winners += 1,
            Err(Error::AlreadyRegistered(Method::UsernamePassword)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert!(store.invariants_hold().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshots_never_observe_a_half_finished_revoke() -> Result<()> {
    let store = AuthStore::new();
    let mut users = Vec::new();
    for n in 0..64 {
        let uid = store.create_user(None).await;
        store
            .register_and_link(uid, Method::EmailPassword, &format!("u{n}@x.com"), secret("s"))
            .await?;
        users.push(uid);
    }

    let checker = {
        let store = store.clone();
        tokio::spawn(async move {
            // Each check takes one read guard, so it sees only committed
            // states; a pointer without its instance would trip it.
            for _ in 0..2_000 {
                assert!(store.invariants_hold().await);
                tokio::task::yield_now().await;
            }
        })
    };

    let revoker = {
        let store = store.clone();
        tokio::spawn(async move {
            for uid in users {
                store.revoke(uid, Method::EmailPassword).await?;
                store.delete_user(uid).await?;
                tokio::task::yield_now().await;
            }
            Ok::<_, Error>(())
        })
    };

    revoker.await??;
    checker.await?;
    assert!(store.invariants_hold().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn links_for_different_methods_do_not_interfere() -> Result<()> {
    let store = AuthStore::new();
    let alice = store.create_user(None).await;
    let email = store
        .register(alice, Method::EmailPassword, "a@x.com", secret("s1"))
        .await?;
    let username = store
        .register(alice, Method::UsernamePassword, "alice", secret("s2"))
        .await?;

    let a = {
        let store = store.clone();
        tokio::spawn(async move { store.link(alice, Method::EmailPassword, email).await })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { store.link(alice, Method::UsernamePassword, username).await })
    };
    a.await??;
    b.await??;

    assert_eq!(
        store.active_credential(alice, Method::EmailPassword).await?,
        Some(email)
    );
    assert_eq!(
        store
            .active_credential(alice, Method::UsernamePassword)
            .await?,
        Some(username)
    );
    Ok(())
}
