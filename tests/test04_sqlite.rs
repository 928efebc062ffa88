#![cfg(feature = "sqlite")]

use std::time::Duration;

use serde::Deserialize;
use sql_essentials::prelude::*;
use tempfile::TempDir;

const DDL: &[&str] = &[
    "CREATE TABLE accounts (id INTEGER PRIMARY KEY AUTOINCREMENT, owner TEXT NOT NULL, balance INTEGER NOT NULL, note TEXT)",
    "CREATE INDEX accounts_owner ON accounts (owner)",
];

async fn setup() -> Result<(TempDir, Essentials<SqlitePool>), SqlEssentialsError> {
    let dir = tempfile::tempdir()
        .map_err(|e| SqlEssentialsError::Other(format!("tempdir: {e}")))?;
    let path = dir.path().join("essentials.db");
    let pool = SqliteOptionsBuilder::new(path.to_string_lossy().into_owned())
        .pool_size(4)
        .busy_timeout(Duration::from_secs(5))
        .build()
        .await?;
    let db = Essentials::new(pool);
    db.unsafe_exec_batch(&Context::background(), DDL).await?;
    Ok((dir, db))
}

async fn open_account(
    db: &Essentials<SqlitePool>,
    ctx: &Context,
    owner: &str,
    balance: i64,
) -> Result<i64, SqlEssentialsError> {
    db.exec_id(
        ctx,
        "INSERT INTO accounts (owner, balance) VALUES (?1, ?2)",
        &[RowValues::Text(owner.into()), RowValues::Int(balance)],
    )
    .await
}

#[tokio::test]
async fn exec_and_select_round_trip() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();

    let ada = open_account(&db, &ctx, "ada", 100).await?;
    let grace = open_account(&db, &ctx, "grace", 250).await?;
    assert_eq!((ada, grace), (1, 2));

    let affected = db
        .exec_affected(&ctx, "UPDATE accounts SET balance = balance + 1", &[])
        .await?;
    assert_eq!(affected, 2);

    let mut row = (String::new(), 0_i64, None::<String>);
    let found = db
        .select_exists(
            &ctx,
            "SELECT owner, balance, note FROM accounts WHERE id = ?1",
            &[RowValues::Int(grace)],
            &mut row,
        )
        .await?;
    assert!(found);
    assert_eq!(row, ("grace".to_string(), 251, None));

    let missing = db
        .select_exists(
            &ctx,
            "SELECT owner, balance, note FROM accounts WHERE id = ?1",
            &[RowValues::Int(99)],
            &mut row,
        )
        .await?;
    assert!(!missing);
    assert_eq!(row.0, "grace");

    let mut total = 0_i64;
    let mut balance = (0_i64,);
    db.select_range(
        &ctx,
        "SELECT balance FROM accounts ORDER BY id",
        &[],
        &mut balance,
        |(b,)| total += b,
    )
    .await?;
    assert_eq!(total, 101 + 251);

    assert_eq!(db.unsafe_count(&ctx, "accounts", "id").await?, 2);
    assert!(
        db.unsafe_exists(&ctx, "SELECT 1 FROM accounts WHERE owner = ?1", &[RowValues::Text("ada".into())])
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn pool_statements_are_cached_and_evictable() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();

    open_account(&db, &ctx, "ada", 1).await?;
    open_account(&db, &ctx, "grace", 2).await?;
    assert!(
        db.cache()
            .contains("INSERT INTO accounts (owner, balance) VALUES (?1, ?2)")
            .await
    );
    // The batch DDL bypassed the cache.
    assert_eq!(db.cache().len().await, 1);

    assert!(db.cache().evict_all().await.collect().await.is_empty());
    assert!(db.cache().is_empty().await);

    open_account(&db, &ctx, "linus", 3).await?;
    assert_eq!(db.unsafe_count(&ctx, "accounts", "id").await?, 3);
    Ok(())
}

#[tokio::test]
async fn invalid_sql_fails_at_prepare_and_is_not_cached() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();

    let mut dest = (0_i64,);
    let err = db
        .select(&ctx, "SELEC id FROM accounts", &[], &mut dest)
        .await
        .expect_err("syntax error");
    assert!(matches!(err, SqlEssentialsError::SqliteError(_)));
    assert!(db.cache().is_empty().await);
    Ok(())
}

#[derive(Debug, Deserialize, PartialEq)]
struct Account {
    id: i64,
    owner: String,
    balance: i64,
    note: Option<String>,
}

#[tokio::test]
async fn struct_scan_reads_rows_by_column_name() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();
    open_account(&db, &ctx, "ada", 10).await?;
    open_account(&db, &ctx, "grace", 20).await?;

    let mut account = Account {
        id: 0,
        owner: String::new(),
        balance: 0,
        note: Some("placeholder".into()),
    };
    db.select_scan(
        &ctx,
        "SELECT balance, owner, id, note FROM accounts WHERE owner = ?1",
        &[RowValues::Text("grace".into())],
        &mut account,
    )
    .await?;
    assert_eq!(
        account,
        Account {
            id: 2,
            owner: "grace".into(),
            balance: 20,
            note: None
        }
    );

    let mut owners = Vec::new();
    db.select_range_scan(
        &ctx,
        "SELECT id, owner, balance, note FROM accounts ORDER BY id",
        &[],
        &mut account,
        |a: &Account| owners.push(a.owner.clone()),
    )
    .await?;
    assert_eq!(owners, ["ada", "grace"]);
    Ok(())
}

#[tokio::test]
async fn committed_transaction_is_visible() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();
    let from = open_account(&db, &ctx, "ada", 100).await?;
    let to = open_account(&db, &ctx, "grace", 0).await?;

    db.tx(&ctx, |tx| {
        let (db, ctx) = (&db, &ctx);
        async move {
            let mut balance = (0_i64,);
            db.select_tx(
                ctx,
                &tx,
                "SELECT balance FROM accounts WHERE id = ?1",
                &[RowValues::Int(from)],
                &mut balance,
            )
            .await?;
            db.exec_tx(
                ctx,
                &tx,
                "UPDATE accounts SET balance = balance - ?1 WHERE id = ?2",
                &[RowValues::Int(balance.0), RowValues::Int(from)],
            )
            .await?;
            db.exec_tx(
                ctx,
                &tx,
                "UPDATE accounts SET balance = balance + ?1 WHERE id = ?2",
                &[RowValues::Int(balance.0), RowValues::Int(to)],
            )
            .await
        }
    })
    .await?;

    let mut balances = Vec::new();
    let mut row = (0_i64,);
    db.select_range(&ctx, "SELECT balance FROM accounts ORDER BY id", &[], &mut row, |(b,)| {
        balances.push(*b);
    })
    .await?;
    assert_eq!(balances, [0, 100]);
    // Transaction statements never reach the pool cache.
    assert!(
        !db.cache()
            .contains("UPDATE accounts SET balance = balance - ?1 WHERE id = ?2")
            .await
    );
    Ok(())
}

#[tokio::test]
async fn failed_handler_rolls_back_its_writes() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();
    open_account(&db, &ctx, "ada", 100).await?;

    let result: Result<(), _> = db
        .tx(&ctx, |tx| {
            let (db, ctx) = (&db, &ctx);
            async move {
                db.exec_tx(ctx, &tx, "UPDATE accounts SET balance = 0", &[])
                    .await?;
                db.exec_tx(ctx, &tx, "INSERT INTO accounts (owner) VALUES ('no balance')", &[])
                    .await
            }
        })
        .await;
    assert!(matches!(result, Err(SqlEssentialsError::SqliteError(_))));

    let mut balance = (0_i64,);
    db.select(&ctx, "SELECT balance FROM accounts WHERE owner = 'ada'", &[], &mut balance)
        .await?;
    assert_eq!(balance.0, 100);
    assert_eq!(db.unsafe_count(&ctx, "accounts", "id").await?, 1);
    Ok(())
}

#[tokio::test]
async fn read_only_transactions_reject_writes() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();
    open_account(&db, &ctx, "ada", 100).await?;

    let opts = TxOptions::new().read_only(true);
    let result = db
        .tx_opts(&ctx, &opts, |tx| {
            let (db, ctx) = (&db, &ctx);
            async move {
                db.exec_tx(ctx, &tx, "UPDATE accounts SET balance = 0", &[])
                    .await
            }
        })
        .await;
    assert!(result.is_err());

    // The connection is writable again once the read-only transaction ends.
    for _ in 0..4 {
        db.exec(&ctx, "UPDATE accounts SET balance = balance + 1", &[])
            .await?;
    }
    let mut balance = (0_i64,);
    db.select(&ctx, "SELECT balance FROM accounts", &[], &mut balance)
        .await?;
    assert_eq!(balance.0, 104);
    Ok(())
}

#[tokio::test]
async fn unsupported_isolation_level_is_rejected() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let opts = TxOptions::new().isolation(IsolationLevel::ReadCommitted);

    let mut ran = false;
    let result = db
        .tx_opts(&Context::background(), &opts, |_tx| {
            ran = true;
            async { Ok(()) }
        })
        .await;
    assert!(matches!(result, Err(SqlEssentialsError::Unimplemented(_))));
    assert!(!ran);

    let serializable = TxOptions::new().isolation(IsolationLevel::Serializable);
    db.tx_opts(&Context::background(), &serializable, |_tx| async { Ok(()) })
        .await?;
    Ok(())
}

#[tokio::test]
async fn finished_transaction_handles_are_done() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();

    let tx = db.driver().begin(&ctx, &TxOptions::default()).await?;
    db.exec_tx(&ctx, &tx, "INSERT INTO accounts (owner, balance) VALUES ('ada', 1)", &[])
        .await?;
    tx.commit().await?;

    assert!(matches!(tx.commit().await, Err(SqlEssentialsError::TransactionDone)));
    assert!(matches!(
        db.exec_tx(&ctx, &tx, "DELETE FROM accounts", &[]).await,
        Err(SqlEssentialsError::TransactionDone)
    ));
    assert_eq!(db.unsafe_count(&ctx, "accounts", "id").await?, 1);
    Ok(())
}

#[tokio::test]
async fn cancelled_context_stops_the_call() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let (ctx, token) = Context::background().with_cancel();
    token.cancel();

    let err = open_account(&db, &ctx, "ada", 1)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, SqlEssentialsError::Cancelled));

    let ctx = Context::background();
    assert_eq!(db.unsafe_count(&ctx, "accounts", "id").await?, 0);
    Ok(())
}

#[tokio::test]
async fn values_convert_through_sqlite_storage_classes() -> Result<(), SqlEssentialsError> {
    let (_dir, db) = setup().await?;
    let ctx = Context::background();
    db.exec(
        &ctx,
        "CREATE TABLE samples (flag INTEGER, ratio REAL, payload BLOB, doc TEXT)",
        &[],
    )
    .await?;
    db.exec(
        &ctx,
        "INSERT INTO samples VALUES (?1, ?2, ?3, ?4)",
        &[
            RowValues::Bool(true),
            RowValues::Float(0.25),
            RowValues::Blob(vec![0xde, 0xad]),
            RowValues::JSON(serde_json::json!({"k": [1, 2]})),
        ],
    )
    .await?;

    let mut row = (false, 0.0_f64, Vec::<u8>::new(), serde_json::Value::Null);
    db.select(&ctx, "SELECT flag, ratio, payload, doc FROM samples", &[], &mut row)
        .await?;
    assert!(row.0);
    assert!((row.1 - 0.25).abs() < f64::EPSILON);
    assert_eq!(row.2, [0xde, 0xad]);
    assert_eq!(row.3, serde_json::json!({"k": [1, 2]}));
    Ok(())
}
