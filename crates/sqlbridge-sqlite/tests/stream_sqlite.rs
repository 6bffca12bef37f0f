use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};

use sqlbridge_core::{Error, QueryResult, Request, ResultFetcher, Value};
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

fn open_numbers(n: i64) -> SqliteConnection {
    let workers = WorkerPool::with_defaults().expect("start workers");
    let conn = SqliteConnection::open(SqliteConfig::memory(), workers).expect("open sqlite");
    conn.execute_blocking(Request::raw("CREATE TABLE nums (n INTEGER)"))
        .into_result()
        .expect("create table");
    for i in 1..=n {
        conn.execute_blocking(Request::raw("INSERT INTO nums VALUES (?)").bind([i]))
            .into_result()
            .expect("insert");
    }
    conn
}

#[test]
fn sqlite_stream_exhaustion_is_sticky() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = open_numbers(2);
        let mut stream = rows(
            conn.execute_blocking(Request::raw("SELECT n FROM nums ORDER BY n")),
        );
        assert_eq!(stream.titles(), ["n"]);

        let first = unwrap_outcome(stream.fetch_next(&cx).await).expect("first row");
        assert_eq!(first.get(0), Some(&Value::BigInt(1)));
        let second = unwrap_outcome(stream.fetch_next(&cx).await).expect("second row");
        assert_eq!(second.get_by_name("n"), Some(&Value::BigInt(2)));

        assert!(unwrap_outcome(stream.fetch_next(&cx).await).is_none());
        assert!(stream.is_exhausted());
        assert!(unwrap_outcome(stream.fetch_next(&cx).await).is_none());
        stream.done();
        stream.done();
        // titles outlive the statement
        assert_eq!(stream.titles(), ["n"]);
    });
}

#[test]
fn sqlite_stream_done_releases_statement_early() {
    let conn = open_numbers(5);
    let mut stream = rows(conn.execute_blocking(Request::raw("SELECT n FROM nums")));
    assert!(stream.fetch_next_blocking().unwrap().is_some());
    assert!(stream.fetch_next_blocking().unwrap().is_some());

    stream.done();
    assert!(stream.is_exhausted());
    assert!(stream.fetch_next_blocking().unwrap().is_none());

    // a pending read would keep the table locked
    assert!(conn.execute_blocking(Request::raw("DROP TABLE nums")).is_success());
}

#[test]
fn sqlite_dropped_stream_releases_statement() {
    let conn = open_numbers(3);
    {
        let mut stream = rows(conn.execute_blocking(Request::raw("SELECT n FROM nums")));
        assert!(stream.fetch_next_blocking().unwrap().is_some());
    }
    assert!(conn.execute_blocking(Request::raw("DROP TABLE nums")).is_success());
}

#[test]
fn sqlite_collect_rows() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = open_numbers(4);
        let mut stream = rows(
            conn.execute_blocking(Request::raw("SELECT n, n * n AS sq FROM nums ORDER BY n")),
        );
        let all = unwrap_outcome(stream.collect_rows(&cx).await);
        let squares: Vec<i64> = all
            .iter()
            .map(|row| row.get_named::<i64>("sq").unwrap())
            .collect();
        assert_eq!(squares, vec![1, 4, 9, 16]);
        assert!(stream.is_exhausted());

        let mut stream = rows(conn.execute_blocking(Request::raw("SELECT n FROM nums")));
        assert!(stream.fetch_next_blocking().unwrap().is_some());
        assert_eq!(stream.collect_rows_blocking().unwrap().len(), 3);
    });
}

#[test]
fn sqlite_empty_select_is_success() {
    let conn = open_numbers(0);
    let result = conn.execute_blocking(Request::raw("SELECT n FROM nums"));
    assert!(result.is_success(), "{result:?}");
}
