use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};

use sqlbridge_core::{
    ColumnSpec, Connection, Error, Params, QueryResult, Request, ResultFetcher, Source, SqlType,
    Value,
};
use sqlbridge_query::{Expr, Insert, Select, Table};
use sqlbridge_sqlite::{ResultStream, SqliteConfig, SqliteConnection, WorkerPool};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn rows(result: QueryResult<ResultStream>) -> ResultStream {
    match result {
        QueryResult::Rows(stream) => stream,
        other => panic!("expected rows, got {other:?}"),
    }
}

fn open_memory(workers: &WorkerPool) -> SqliteConnection {
    SqliteConnection::open(SqliteConfig::memory(), workers.clone()).expect("open sqlite")
}

fn users() -> Table {
    Table::new("users")
        .column(
            ColumnSpec::new("id", SqlType::Integer)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnSpec::new("name", SqlType::Text).not_null())
}

#[test]
fn sqlite_prepared_statement_is_reused() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let workers = WorkerPool::with_defaults().unwrap();
        let conn = open_memory(&workers);
        let table = users();
        let create = table.create();
        assert!(conn.execute(&cx, Request::query(&create)).await.is_success());

        let insert = Insert::into_table(&table).params(&["name"]);
        let statement = unwrap_outcome(conn.prepare(&cx, Source::Query(&insert)).await);
        assert_eq!(statement.sql(), "INSERT INTO \"users\" (\"name\") VALUES (?)");

        for name in ["ada", "grace", "edsger"] {
            let result = conn
                .execute_prepared(&cx, &statement, Params::positional([name]))
                .await;
            assert!(result.is_success(), "{result:?}");
        }
        assert_eq!(conn.last_insert_rowid().unwrap(), 3);

        unwrap_outcome(conn.release(&cx, statement).await);

        let count = conn
            .execute_scalar(&cx, Request::raw("SELECT COUNT(*) FROM users"))
            .await;
        assert_eq!(count.into_value(), Some(Value::BigInt(3)));
    });
}

#[test]
fn sqlite_prepared_select_rebinds_each_execution() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let workers = WorkerPool::with_defaults().unwrap();
        let conn = open_memory(&workers);
        conn.execute_blocking(Request::raw("CREATE TABLE nums (n INTEGER)"))
            .into_result()
            .unwrap();
        conn.execute_blocking(Request::raw("INSERT INTO nums VALUES (1), (2), (3), (4)"))
            .into_result()
            .unwrap();

        let select = Select::from_table("nums")
            .column("n")
            .filter(Expr::col("n").ge(Expr::named("min")))
            .order_by(Expr::col("n").asc());
        let statement = unwrap_outcome(conn.prepare(&cx, Source::Query(&select)).await);

        for (min, expected) in [(3_i64, vec![3_i64, 4]), (2, vec![2, 3, 4])] {
            let mut stream = rows(
                conn.execute_prepared(&cx, &statement, Params::named([("min", min)]))
                    .await,
            );
            let got: Vec<i64> = unwrap_outcome(stream.collect_rows(&cx).await)
                .iter()
                .map(|row| row.get_as::<i64>(0).unwrap())
                .collect();
            assert_eq!(got, expected);
        }

        // nothing matches: the durable statement is rewound, not finalized
        let result = conn
            .execute_prepared(&cx, &statement, Params::named([("min", 10_i64)]))
            .await;
        assert!(result.is_success());
        assert!(!statement.is_released());
        unwrap_outcome(conn.release(&cx, statement).await);
    });
}

#[test]
fn sqlite_stale_stream_stops_after_reexecution() {
    let workers = WorkerPool::with_defaults().unwrap();
    let conn = open_memory(&workers);
    conn.execute_blocking(Request::raw("CREATE TABLE nums (n INTEGER)"))
        .into_result()
        .unwrap();
    conn.execute_blocking(Request::raw("INSERT INTO nums VALUES (1), (2), (3)"))
        .into_result()
        .unwrap();

    let statement = conn
        .prepare_blocking(Source::Raw("SELECT n FROM nums ORDER BY n"))
        .unwrap();
    let mut first = rows(conn.execute_prepared_blocking(&statement, Params::None));
    assert!(first.fetch_next_blocking().unwrap().is_some());

    let mut second = rows(conn.execute_prepared_blocking(&statement, Params::None));
    // the first stream no longer owns the statement
    assert!(first.fetch_next_blocking().unwrap().is_none());
    drop(first);

    let values: Vec<Value> = second
        .collect_rows_blocking()
        .unwrap()
        .into_iter()
        .filter_map(|row| row.into_values().into_iter().next())
        .collect();
    assert_eq!(
        values,
        vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]
    );

    conn.release_blocking(statement).unwrap();
}

#[test]
fn sqlite_released_or_foreign_statements_are_rejected() {
    let workers = WorkerPool::with_defaults().unwrap();
    let conn = open_memory(&workers);
    let other = open_memory(&workers);

    let statement = conn.prepare_blocking(Source::Raw("SELECT 1")).unwrap();
    let err = other
        .execute_prepared_blocking(&statement, Params::None)
        .into_error()
        .expect("foreign statement");
    assert!(matches!(err, Error::Unsupported(_)), "{err}");

    let mut stream = rows(conn.execute_prepared_blocking(&statement, Params::None));
    assert_eq!(stream.fetch_next_blocking().unwrap().unwrap().get(0), Some(&Value::BigInt(1)));
    conn.release_blocking(statement).unwrap();
    // the stream's statement is gone
    assert!(stream.fetch_next_blocking().unwrap().is_none());
}

#[test]
fn sqlite_prepare_errors() {
    let workers = WorkerPool::with_defaults().unwrap();
    let conn = open_memory(&workers);

    let err = conn
        .prepare_blocking(Source::Raw("SELEC 1"))
        .expect_err("bad sql");
    assert!(err.is_database(), "{err}");

    let unopened = SqliteConnection::new(SqliteConfig::memory(), workers.clone());
    let err = unopened
        .prepare_blocking(Source::Raw("SELECT 1"))
        .expect_err("not connected");
    assert!(err.is_connection_error());
}

#[test]
fn sqlite_insert_returns_generated_id() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let workers = WorkerPool::with_defaults().unwrap();
        let conn = open_memory(&workers);
        let table = users();
        let create = table.create();
        assert!(conn.execute(&cx, Request::query(&create)).await.is_success());

        let insert = Insert::into_table(&table)
            .value("name", Expr::named("name"))
            .returning_id();
        for expected in [1_i64, 2] {
            let mut stream = rows(
                conn.execute(&cx, Request::query(&insert).bind_named([("name", "x")]))
                    .await,
            );
            assert_eq!(stream.titles(), ["id"]);
            let row = unwrap_outcome(stream.fetch_next(&cx).await).expect("id row");
            assert_eq!(row.get_named::<i64>("id").unwrap(), expected);
            assert!(unwrap_outcome(stream.fetch_next(&cx).await).is_none());
        }
    });
}

#[test]
fn sqlite_insert_without_auto_key_cannot_return_id() {
    let workers = WorkerPool::with_defaults().unwrap();
    let conn = open_memory(&workers);
    conn.execute_blocking(Request::raw("CREATE TABLE tags (label TEXT)"))
        .into_result()
        .unwrap();

    let insert = Insert::into_named("tags")
        .value("label", Expr::lit("x"))
        .returning_id();
    let err = conn
        .execute_blocking(Request::query(&insert))
        .into_error()
        .expect("no auto-increment key");
    assert!(err.is_syntax(), "{err}");

    let count = conn.execute_scalar_blocking(Request::raw("SELECT COUNT(*) FROM tags"));
    assert_eq!(count.into_value(), Some(Value::BigInt(0)));
}
