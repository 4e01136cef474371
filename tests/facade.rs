//! Facade-level behavior exercised against a scripted in-memory
//! backend: transaction nesting, value fetches, and streaming.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

use matdb::{
    Connection, ConnectionBackend, MatdbError, Query, Record, SqlValue, TransactionBackend,
};

type Log = Arc<Mutex<Vec<String>>>;

struct MockConnection {
    log: Log,
    rows: Vec<Record>,
}

impl MockConnection {
    fn push(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }
}

#[async_trait]
impl TransactionBackend for MockConnection {
    async fn begin(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        if is_root {
            self.push("BEGIN");
        } else {
            self.push(format!("SAVEPOINT {savepoint}"));
        }
        Ok(())
    }

    async fn commit(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        if is_root {
            self.push("COMMIT");
        } else {
            self.push(format!("RELEASE {savepoint}"));
        }
        Ok(())
    }

    async fn rollback(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        if is_root {
            self.push("ROLLBACK");
        } else {
            self.push(format!("ROLLBACK TO {savepoint}"));
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionBackend for MockConnection {
    async fn fetch_all(&mut self, query: &Query) -> Result<Vec<Record>, MatdbError> {
        self.push(query.sql().to_string());
        Ok(self.rows.clone())
    }

    async fn fetch_one(&mut self, query: &Query) -> Result<Option<Record>, MatdbError> {
        self.push(query.sql().to_string());
        Ok(self.rows.first().cloned())
    }

    async fn execute(&mut self, query: &Query) -> Result<u64, MatdbError> {
        self.push(query.sql().to_string());
        Ok(1)
    }

    async fn execute_many(&mut self, queries: &[Query]) -> Result<(), MatdbError> {
        for query in queries {
            self.push(query.sql().to_string());
        }
        Ok(())
    }

    async fn iterate<'a>(
        &'a mut self,
        query: &Query,
    ) -> Result<BoxStream<'a, Result<Record, MatdbError>>, MatdbError> {
        self.push(query.sql().to_string());
        let rows = self.rows.clone();
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

fn sample_rows() -> Vec<Record> {
    vec![
        Record::new(
            Arc::new(vec!["emp_id".to_string(), "emp_name".to_string()]),
            vec![SqlValue::Int(101), SqlValue::Text("Vijay".into())],
        ),
        Record::new(
            Arc::new(vec!["emp_id".to_string(), "emp_name".to_string()]),
            vec![SqlValue::Int(102), SqlValue::Text("Aryan".into())],
        ),
    ]
}

fn scripted(rows: Vec<Record>) -> (Connection, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let conn = Connection::from_backend(Box::new(MockConnection {
        log: log.clone(),
        rows,
    }));
    (conn, log)
}

#[tokio::test]
async fn root_then_savepoint_nesting() {
    let (mut conn, log) = scripted(Vec::new());
    assert_eq!(conn.transaction_depth(), 0);

    let mut outer = conn.transaction().await.unwrap();
    assert!(outer.is_root());
    assert_eq!(outer.transaction_depth(), 1);

    {
        let inner = outer.transaction().await.unwrap();
        assert!(!inner.is_root());
        assert_eq!(inner.transaction_depth(), 2);
        inner.commit().await.unwrap();
    }
    assert_eq!(outer.transaction_depth(), 1);
    outer.commit().await.unwrap();
    assert_eq!(conn.transaction_depth(), 0);

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0], "BEGIN");
    assert!(entries[1].starts_with("SAVEPOINT MATDB_SAVEPOINT_"));
    assert!(entries[2].starts_with("RELEASE MATDB_SAVEPOINT_"));
    assert_eq!(entries[3], "COMMIT");
}

#[tokio::test]
async fn rollback_uses_savepoint_name() {
    let (mut conn, log) = scripted(Vec::new());

    let mut outer = conn.transaction().await.unwrap();
    let inner = outer.transaction().await.unwrap();
    inner.rollback().await.unwrap();
    outer.rollback().await.unwrap();

    let entries = log.lock().unwrap().clone();
    assert!(entries[2].starts_with("ROLLBACK TO MATDB_SAVEPOINT_"));
    assert_eq!(entries[3], "ROLLBACK");
}

#[tokio::test]
async fn dropped_guard_unwinds_depth() {
    let (mut conn, _log) = scripted(Vec::new());
    {
        let _tx = conn.transaction().await.unwrap();
    }
    // The guard could not roll back, but bookkeeping must not wedge the
    // connection at a phantom depth.
    assert_eq!(conn.transaction_depth(), 0);
    let tx = conn.transaction().await.unwrap();
    assert!(tx.is_root());
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn statements_run_through_the_guard() {
    let (mut conn, log) = scripted(Vec::new());

    let mut tx = conn.transaction().await.unwrap();
    tx.execute(&Query::new("update dept set dep_name = :name where deptid = :id")
        .bind("name", "New Marketing")
        .bind("id", 10))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries[0], "BEGIN");
    assert!(entries[1].starts_with("update dept"));
    assert_eq!(entries[2], "COMMIT");
}

#[tokio::test]
async fn fetch_val_returns_first_column() {
    let (mut conn, _log) = scripted(sample_rows());
    let value = conn
        .fetch_val(&Query::new("select emp_id from emp"))
        .await
        .unwrap();
    assert_eq!(value, Some(SqlValue::Int(101)));

    let (mut empty, _log) = scripted(Vec::new());
    let value = empty
        .fetch_val(&Query::new("select emp_id from emp"))
        .await
        .unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn fetch_all_as_json_renders_rows() {
    let (mut conn, _log) = scripted(sample_rows());
    let json = conn
        .fetch_all_as_json(&Query::new("select * from emp"))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!([
            {"emp_id": 101, "emp_name": "Vijay"},
            {"emp_id": 102, "emp_name": "Aryan"}
        ])
    );
}

#[tokio::test]
async fn iterate_streams_each_row() {
    let (mut conn, _log) = scripted(sample_rows());
    let mut stream = conn
        .iterate(&Query::new("select * from emp"))
        .await
        .unwrap();

    let mut ids = Vec::new();
    while let Some(record) = stream.next().await {
        let record = record.unwrap();
        ids.push(record["emp_id"].as_int().unwrap());
    }
    assert_eq!(ids, vec![101, 102]);
}

#[tokio::test]
async fn execute_many_runs_in_order() {
    let (mut conn, log) = scripted(Vec::new());
    let queries = vec![
        Query::new("insert into emp values (:id)").bind("id", 1),
        Query::new("insert into dept values (:id)").bind("id", 2),
    ];
    conn.execute_many(&queries).await.unwrap();

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].starts_with("insert into emp"));
    assert!(entries[1].starts_with("insert into dept"));
}
