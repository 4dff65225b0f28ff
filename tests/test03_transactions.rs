mod common;

use std::time::Duration;

use sql_fragments::prelude::*;

use common::{fake_db, lock, statements};

fn insert(id: i64) -> Result<Fragment, SqlFragmentsError> {
    sql!("INSERT INTO items (id) VALUES (", id, ")")
}

#[derive(Debug)]
enum AppError {
    Db(SqlFragmentsError),
    Rejected(&'static str),
}

impl From<SqlFragmentsError> for AppError {
    fn from(err: SqlFragmentsError) -> Self {
        AppError::Db(err)
    }
}

#[tokio::test]
async fn commit_on_success() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    let first = insert(1)?;
    let second = insert(2)?;
    let affected = db
        .transaction(move |tx| {
            Box::pin(async move {
                assert!(tx.in_transaction());
                let a = tx.none(&first).await?;
                let b = tx.none(&second).await?;
                Ok::<_, SqlFragmentsError>(a + b)
            })
        })
        .await?;

    assert_eq!(affected, 2);
    assert_eq!(
        statements(&state),
        vec![
            "BEGIN",
            "INSERT INTO items (id) VALUES ($1)",
            "INSERT INTO items (id) VALUES ($1)",
            "COMMIT",
        ]
    );
    assert_eq!(lock(&state).items, vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn callback_error_rolls_back_and_is_returned_unchanged() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    let first = insert(1)?;
    let result: Result<(), AppError> = db
        .transaction(move |tx| {
            Box::pin(async move {
                tx.none(&first).await?;
                Err(AppError::Rejected("quota exceeded"))
            })
        })
        .await;

    assert!(matches!(result, Err(AppError::Rejected("quota exceeded"))));
    assert_eq!(statements(&state).last().map(String::as_str), Some("ROLLBACK"));

    let count = db
        .value(&sql!("SELECT count(*) FROM items")?, &decode::<i64>())
        .await?;
    assert_eq!(count, 0);
    Ok(())
}

#[tokio::test]
async fn nested_transaction_reuses_the_outer_one() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    let outer = insert(1)?;
    let inner = insert(2)?;
    db.transaction(move |tx| {
        Box::pin(async move {
            tx.none(&outer).await?;
            tx.transaction(move |nested| {
                Box::pin(async move {
                    assert_eq!(nested.state(), HandleState::Transactional);
                    nested.none(&inner).await?;
                    Ok::<_, SqlFragmentsError>(())
                })
            })
            .await?;
            assert!(tx.in_transaction());
            Ok::<_, SqlFragmentsError>(())
        })
    })
    .await?;

    let log = statements(&state);
    assert_eq!(log.iter().filter(|s| *s == "BEGIN").count(), 1);
    assert_eq!(log.iter().filter(|s| *s == "COMMIT").count(), 1);
    assert_eq!(lock(&state).items, vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn nested_failure_rolls_back_everything() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    let outer = insert(1)?;
    let bad = sql!("SELEC broken")?;
    let result = db
        .transaction(move |tx| {
            Box::pin(async move {
                tx.none(&outer).await?;
                tx.transaction(move |nested| Box::pin(async move { nested.none(&bad).await }))
                    .await?;
                Ok::<_, SqlFragmentsError>(())
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(SqlFragmentsError::DatabaseError { .. })
    ));
    let log = statements(&state);
    assert_eq!(log.iter().filter(|s| *s == "ROLLBACK").count(), 1);
    assert!(!log.iter().any(|s| s == "COMMIT"));
    assert!(lock(&state).items.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_commit_rolls_back_and_reports_commit_error() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    db.init().await?;
    lock(&state).fail_commit = true;
    let first = insert(1)?;
    let err = db
        .transaction(move |tx| {
            Box::pin(async move {
                tx.none(&first).await?;
                Ok::<_, SqlFragmentsError>(())
            })
        })
        .await
        .unwrap_err();

    match err {
        SqlFragmentsError::DatabaseError { ref query, .. } => assert_eq!(query, "COMMIT"),
        other => panic!("expected the commit error, got {other}"),
    }
    let log = statements(&state);
    assert_eq!(&log[log.len() - 2..], ["COMMIT", "ROLLBACK"]);
    assert!(lock(&state).items.is_empty());
    Ok(())
}

#[tokio::test]
async fn sequential_transactions_each_get_their_own_connection() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    db.init().await?;
    for id in 1..=3 {
        let stmt = insert(id)?;
        db.transaction(move |tx| {
            Box::pin(async move {
                tx.none(&stmt).await?;
                Ok::<_, SqlFragmentsError>(())
            })
        })
        .await?;
    }
    let guard = lock(&state);
    assert_eq!(guard.items, vec![1, 2, 3]);
    assert_eq!(guard.acquired, 4);
    assert_eq!(guard.released, 4);
    assert!(!guard.in_tx);
    Ok(())
}

#[tokio::test]
async fn cancelled_transaction_is_rolled_back_on_drop() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    db.init().await?;
    let first = insert(1)?;
    let pending = db.transaction(move |tx| {
        Box::pin(async move {
            tx.none(&first).await?;
            futures_util::future::pending::<()>().await;
            Ok::<_, SqlFragmentsError>(())
        })
    });
    let timed_out = tokio::time::timeout(Duration::from_millis(20), pending).await;
    assert!(timed_out.is_err());

    // the rollback runs on a spawned task
    for _ in 0..50 {
        if statements(&state).last().map(String::as_str) == Some("ROLLBACK") {
            break;
        }
        tokio::task::yield_now().await;
    }
    let guard = lock(&state);
    assert_eq!(guard.log.last().map(String::as_str), Some("ROLLBACK"));
    assert!(guard.items.is_empty());
    assert!(guard.pending.is_empty());
    assert!(!guard.in_tx);
    Ok(())
}

#[tokio::test]
async fn failed_rollback_is_retried_when_the_handle_drops() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    db.init().await?;
    lock(&state).fail_rollback = true;
    let bad = sql!("SELEC broken")?;
    let mut handle = db.acquire().await?;
    let result = handle
        .transaction(move |tx| Box::pin(async move { tx.none(&bad).await }))
        .await;
    assert!(result.is_err());
    assert!(handle.in_transaction());

    lock(&state).fail_rollback = false;
    drop(handle);
    for _ in 0..50 {
        if !lock(&state).in_tx {
            break;
        }
        tokio::task::yield_now().await;
    }
    let rollbacks = statements(&state)
        .iter()
        .filter(|s| *s == "ROLLBACK")
        .count();
    assert_eq!(rollbacks, 2);
    assert!(!lock(&state).in_tx);
    Ok(())
}

#[test]
fn handle_dropped_outside_a_runtime_discards_its_connection() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let (db, state) = fake_db();
    let handle = rt.block_on(async {
        db.init().await?;
        lock(&state).fail_rollback = true;
        let bad = sql!("SELEC broken")?;
        let mut handle = db.acquire().await?;
        let result = handle
            .transaction(move |tx| Box::pin(async move { tx.none(&bad).await }))
            .await;
        assert!(result.is_err());
        Ok::<_, SqlFragmentsError>(handle)
    })?;
    assert!(handle.in_transaction());

    // no runtime on this thread: nothing can run ROLLBACK
    drop(handle);
    let guard = lock(&state);
    assert_eq!(guard.discarded, 1);
    assert_eq!(guard.released, 2);
    assert!(!guard.in_tx);
    assert_eq!(guard.log.iter().filter(|s| *s == "ROLLBACK").count(), 1);
    Ok(())
}

#[tokio::test]
async fn connection_is_discarded_when_drop_rollback_fails() -> Result<(), SqlFragmentsError> {
    let (db, state) = fake_db();
    db.init().await?;
    lock(&state).fail_rollback = true;
    let bad = sql!("SELEC broken")?;
    let mut handle = db.acquire().await?;
    let result = handle
        .transaction(move |tx| Box::pin(async move { tx.none(&bad).await }))
        .await;
    assert!(result.is_err());

    drop(handle);
    for _ in 0..50 {
        if lock(&state).discarded == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(lock(&state).discarded, 1);
    Ok(())
}
