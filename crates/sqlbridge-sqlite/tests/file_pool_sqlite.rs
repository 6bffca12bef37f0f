use sqlbridge_core::{
    Connection, Error, PoolError, PoolErrorKind, QueryError, QueryErrorKind, Request, Value,
};
use sqlbridge_pool::PoolConfig;
use sqlbridge_sqlite::{
    OpenFlags, SqliteConfig, SqliteConnection, TransactionState, WorkerPool, create_pool,
};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn db_path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn count(conn: &SqliteConnection, table: &str) -> Value {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    conn.execute_scalar_blocking(Request::raw(&sql))
        .into_value()
        .expect("count")
}

fn pool_kind(err: Error) -> PoolErrorKind {
    match err {
        Error::Pool(PoolError { kind, .. }) => kind,
        other => panic!("expected a pool error, got {other}"),
    }
}

#[test]
fn sqlite_file_database_persists() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir, "app.db");
    let workers = WorkerPool::with_defaults().unwrap();

    {
        let conn = SqliteConnection::open(SqliteConfig::file(&path), workers.clone()).unwrap();
        conn.execute_blocking(Request::raw("CREATE TABLE notes (body TEXT)"))
            .into_result()
            .unwrap();
        conn.execute_blocking(Request::raw("INSERT INTO notes VALUES ('kept')"))
            .into_result()
            .unwrap();
        conn.close_connection();
    }

    let conn = SqliteConnection::open(SqliteConfig::file(&path), workers).unwrap();
    assert_eq!(count(&conn, "notes"), Value::BigInt(1));
}

fn is_busy(err: &Error) -> bool {
    matches!(err, Error::Query(QueryError { kind: QueryErrorKind::Busy, .. }))
}

#[test]
fn sqlite_locked_database_reports_busy_after_timeout() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir, "locked.db");
    let workers = WorkerPool::with_defaults().unwrap();
    let config = SqliteConfig::file(&path).busy_timeout(300);

    let holder = SqliteConnection::open(config.clone(), workers.clone()).unwrap();
    let writer = SqliteConnection::open(config, workers).unwrap();
    holder
        .execute_blocking(Request::raw("CREATE TABLE t (a INTEGER)"))
        .into_result()
        .unwrap();

    holder
        .execute_blocking(Request::raw("BEGIN IMMEDIATE"))
        .into_result()
        .unwrap();
    let started = Instant::now();
    let err = writer
        .execute_blocking(Request::raw("INSERT INTO t VALUES (1)"))
        .into_error()
        .expect("write lock is held");
    assert!(started.elapsed() >= Duration::from_millis(250), "{:?}", started.elapsed());
    assert!(is_busy(&err), "{err}");
    assert!(err.is_retryable());
    holder
        .execute_blocking(Request::raw("ROLLBACK"))
        .into_result()
        .unwrap();

    // a retry succeeds once the lock is gone
    writer
        .execute_blocking(Request::raw("INSERT INTO t VALUES (1)"))
        .into_result()
        .unwrap();
    assert_eq!(count(&holder, "t"), Value::BigInt(1));
}

#[test]
fn sqlite_busy_commit_keeps_transaction_active() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir, "commit.db");
    let workers = WorkerPool::with_defaults().unwrap();
    let config = SqliteConfig::file(&path).busy_timeout(200);

    let reader = SqliteConnection::open(config.clone(), workers.clone()).unwrap();
    let writer = SqliteConnection::open(config, workers).unwrap();
    writer
        .execute_blocking(Request::raw("CREATE TABLE t (a INTEGER)"))
        .into_result()
        .unwrap();

    // the reader's transaction keeps its shared lock until it ends
    reader.start_transaction_blocking().into_result().unwrap();
    assert_eq!(count(&reader, "t"), Value::BigInt(0));

    writer.start_transaction_blocking().into_result().unwrap();
    writer
        .execute_blocking(Request::raw("INSERT INTO t VALUES (1)"))
        .into_result()
        .unwrap();
    let err = writer
        .commit_blocking()
        .into_error()
        .expect("reader blocks the commit");
    assert!(is_busy(&err), "{err}");
    assert!(err.is_retryable());
    assert_eq!(writer.transaction_state(), TransactionState::Active);

    reader.commit_blocking().into_result().unwrap();
    writer.commit_blocking().into_result().unwrap();
    assert_eq!(writer.transaction_state(), TransactionState::Idle);
    assert_eq!(count(&reader, "t"), Value::BigInt(1));
}

#[test]
fn sqlite_uri_and_read_only_flags() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir, "uri.db");
    let workers = WorkerPool::with_defaults().unwrap();

    let uri = format!("file:{path}?mode=rwc");
    let config = SqliteConfig::file(uri).flags(OpenFlags::create_read_write().with_uri());
    let conn = SqliteConnection::open(config, workers.clone()).unwrap();
    conn.execute_blocking(Request::raw("CREATE TABLE t (a INTEGER)"))
        .into_result()
        .unwrap();
    drop(conn);

    let reader =
        SqliteConnection::open(SqliteConfig::file(&path).flags(OpenFlags::read_only()), workers)
            .unwrap();
    assert_eq!(count(&reader, "t"), Value::BigInt(0));
    let err = reader
        .execute_blocking(Request::raw("INSERT INTO t VALUES (1)"))
        .into_error()
        .expect("read-only");
    assert!(err.is_database(), "{err}");
}

#[test]
fn sqlite_open_failure_is_connection_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("x.db");
    let workers = WorkerPool::with_defaults().unwrap();

    let conn = SqliteConnection::new(
        SqliteConfig::file(path.to_string_lossy().into_owned()),
        workers,
    );
    let err = conn.connect_blocking().expect_err("parent directory is missing");
    assert!(err.is_connection_error(), "{err}");
    assert!(!conn.is_connected());
}

#[test]
fn sqlite_temporary_database() {
    let workers = WorkerPool::with_defaults().unwrap();
    let conn = SqliteConnection::open(SqliteConfig::temporary(), workers).unwrap();
    conn.execute_blocking(Request::raw("CREATE TABLE t (a INTEGER)"))
        .into_result()
        .unwrap();
    conn.execute_blocking(Request::raw("INSERT INTO t VALUES (1), (2)"))
        .into_result()
        .unwrap();
    assert_eq!(count(&conn, "t"), Value::BigInt(2));
}

#[test]
fn sqlite_pool_shares_a_file_database() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir, "pool.db");
    let workers = WorkerPool::with_defaults().unwrap();

    let pool = create_pool(
        SqliteConfig::file(&path),
        workers,
        PoolConfig::new(2).min_connections(1),
    )
    .unwrap();
    assert_eq!(pool.stats().total_connections, 1);

    let first = pool.acquire().unwrap();
    first
        .execute_blocking(Request::raw("CREATE TABLE t (a INTEGER)"))
        .into_result()
        .unwrap();
    first
        .execute_blocking(Request::raw("INSERT INTO t VALUES (1)"))
        .into_result()
        .unwrap();

    let second = pool.acquire().unwrap();
    assert_eq!(count(&second, "t"), Value::BigInt(1));
    assert!(pool.at_capacity());
    assert_eq!(pool.stats().active_connections, 2);
    assert_eq!(pool_kind(pool.try_acquire().unwrap_err()), PoolErrorKind::Timeout);

    drop(first);
    assert_eq!(pool.stats().idle_connections, 1);
    let again = pool.try_acquire().unwrap();
    assert!(again.is_connected());

    drop(again);
    drop(second);
    pool.close();
    assert!(pool.is_closed());
    assert_eq!(pool_kind(pool.try_acquire().unwrap_err()), PoolErrorKind::Closed);
}

#[test]
fn sqlite_pool_reports_failed_opens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("x.db");
    let workers = WorkerPool::with_defaults().unwrap();

    let pool = create_pool(
        SqliteConfig::file(path.to_string_lossy().into_owned()),
        workers,
        PoolConfig::new(1),
    )
    .unwrap();
    assert_eq!(pool_kind(pool.try_acquire().unwrap_err()), PoolErrorKind::Exhausted);
    assert_eq!(pool.stats().total_connections, 0);
}
