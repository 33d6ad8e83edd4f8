//! Transactions and savepoints against a real SQLite database

mod common;

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use common::{Customer, TestDb};
use entitydb::{
    Connection, ConnectionManager, ConnectionPool, EntityMapper, Error, PoolConfig, RowCursor,
    TransactionCoordinator, TransactionState, Value,
};
use entitydb_sqlite::SqliteConnectionManager;

/// Opens SQLite sessions whose `rollback` always fails.
#[derive(Debug)]
struct BrokenRollbackManager(SqliteConnectionManager);

impl ConnectionManager for BrokenRollbackManager {
    fn create(&self) -> entitydb::Result<Box<dyn Connection>> {
        Ok(Box::new(BrokenRollback(self.0.create()?)))
    }
}

struct BrokenRollback(Box<dyn Connection>);

impl Connection for BrokenRollback {
    fn execute(&mut self, sql: &str, params: &[Value]) -> entitydb::Result<u64> {
        self.0.execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> entitydb::Result<Box<dyn RowCursor>> {
        self.0.query(sql, params)
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.0.last_insert_id()
    }

    fn auto_commit(&self) -> bool {
        self.0.auto_commit()
    }

    fn set_auto_commit(&mut self, enabled: bool) -> entitydb::Result<()> {
        self.0.set_auto_commit(enabled)
    }

    fn commit(&mut self) -> entitydb::Result<()> {
        self.0.commit()
    }

    fn rollback(&mut self) -> entitydb::Result<()> {
        Err(Error::database("rollback unavailable"))
    }

    fn set_savepoint(&mut self, name: &str) -> entitydb::Result<()> {
        self.0.set_savepoint(name)
    }

    fn release_savepoint(&mut self, name: &str) -> entitydb::Result<()> {
        self.0.release_savepoint(name)
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> entitydb::Result<()> {
        self.0.rollback_to_savepoint(name)
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn is_valid(&mut self, timeout: Duration) -> entitydb::Result<bool> {
        self.0.is_valid(timeout)
    }

    fn close(&mut self) -> entitydb::Result<()> {
        self.0.close()
    }
}

#[test]
fn test_failed_unit_of_work_leaves_no_rows() {
    let db = TestDb::new(2);
    let mapper = db.customers();

    let err = mapper
        .execute_in_transaction(|m| {
            m.insert(&Customer::new("parsa", "sh"))?;
            m.insert(&Customer::new("ada", "lovelace"))?;
            Err::<(), _>(Error::mapping("first_name", "rejected by caller"))
        })
        .unwrap_err();

    assert!(err.is_transaction_failed());
    assert!(err.cause().is_mapping());
    assert!(err.cleanup_errors().is_empty());
    assert_eq!(db.count("customer"), 0);
}

#[test]
fn test_committed_unit_of_work_is_visible() {
    let db = TestDb::new(2);
    let mapper = db.customers();

    let keys = mapper
        .execute_in_transaction(|m| {
            let a = m.insert(&Customer::new("a", "x"))?;
            let b = m.insert(&Customer::new("b", "y"))?;
            Ok((a, b))
        })
        .unwrap();

    assert!(keys.0.is_some() && keys.1.is_some());
    assert_eq!(db.count("customer"), 2);
}

#[test]
fn test_savepoint_isolation() {
    let db = TestDb::new(1);
    let mapper = db.customers();

    mapper
        .execute_in_transaction(|m| {
            m.insert(&Customer::with_id(1, "A", "kept"))?;
            let sp = m.set_savepoint("after_a")?;
            m.insert(&Customer::with_id(2, "B", "undone"))?;
            m.rollback_to(&sp)?;
            Ok(())
        })
        .unwrap();

    assert!(mapper.find(1).unwrap().is_some());
    assert!(mapper.find(2).unwrap().is_none());
    assert_eq!(db.count("customer"), 1);
}

#[test]
fn test_nested_failure_rolls_back_only_inner_work() {
    let db = TestDb::new(1);
    let mapper = db.customers();

    mapper
        .execute_in_transaction(|m| {
            m.insert(&Customer::with_id(1, "outer", "x"))?;
            let inner = m.nested("inner", |m| {
                m.insert(&Customer::with_id(2, "inner", "y"))?;
                // Duplicate primary key.
                m.insert(&Customer::with_id(1, "dup", "z"))
            });
            assert!(inner.unwrap_err().is_database());
            m.insert(&Customer::with_id(3, "after", "w"))?;
            Ok(())
        })
        .unwrap();

    let mut ids: Vec<i64> = mapper
        .select_all()
        .unwrap()
        .map(|c| c.unwrap().id.unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 3]);
}

#[test]
fn test_database_error_rolls_back_earlier_statements() {
    let db = TestDb::new(1);
    let mapper = db.customers();
    mapper.insert(&Customer::with_id(1, "existing", "row")).unwrap();

    let err = mapper
        .execute_in_transaction(|m| {
            m.insert(&Customer::with_id(2, "new", "row"))?;
            m.insert(&Customer::with_id(1, "dup", "row"))
        })
        .unwrap_err();

    assert!(err.cause().is_database());
    assert_eq!(db.count("customer"), 1);
}

#[test]
fn test_coordinator_restores_auto_commit() {
    let db = TestDb::new(1);
    db.customers();
    let coordinator = TransactionCoordinator::new(db.pool.clone());

    coordinator
        .run(|tx| {
            assert_eq!(tx.state(), TransactionState::Active);
            assert!(!tx.connection().auto_commit());
            tx.connection().execute(
                "INSERT INTO customer (firstname, lastname) VALUES (?, ?)",
                &[Value::from("raw"), Value::from("sql")],
            )
        })
        .unwrap();

    let conn = db.pool.acquire().unwrap();
    assert!(conn.auto_commit());
    drop(conn);
    assert_eq!(db.pool.status().size, 1);
    assert_eq!(db.count("customer"), 1);
}

#[test]
fn test_released_savepoint_is_inert() {
    let db = TestDb::new(1);
    let mapper = db.customers();

    let err = mapper
        .execute_in_transaction(|m| {
            let outer = m.set_savepoint("outer")?;
            let inner = m.set_savepoint("inner")?;
            m.release_savepoint(&outer)?;
            m.rollback_to(&inner)
        })
        .unwrap_err();

    assert!(err.cause().is_invalid_savepoint());
}

#[test]
fn test_panic_in_unit_of_work_discards_connection() {
    let db = TestDb::new(1);
    let mapper = db.customers();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        mapper.execute_in_transaction(|m| -> entitydb::Result<()> {
            m.insert(&Customer::new("lost", "write"))?;
            panic!("unit of work panicked");
        })
    }));
    assert!(result.is_err());

    let status = db.pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.size, 0);
    assert_eq!(db.count("customer"), 0);
}

#[test]
fn test_concurrent_transactions_all_commit() {
    let db = TestDb::new(4);
    let mapper = db.customers();

    thread::scope(|s| {
        for t in 0..4 {
            let mapper = mapper.clone();
            s.spawn(move || {
                for i in 0..10 {
                    mapper
                        .execute_in_transaction(|m| {
                            m.insert(&Customer::new(&format!("t{t}"), &format!("n{i}")))
                        })
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(db.count("customer"), 40);
}

#[test]
fn test_failed_rollback_does_not_commit_the_work() {
    let dir = tempfile::tempdir().unwrap();
    let manager = BrokenRollbackManager(SqliteConnectionManager::file(
        dir.path().join("entitydb.db"),
    ));
    let config = PoolConfig::new().with_max_size(NonZeroUsize::new(2).unwrap());
    let pool = ConnectionPool::from_config(manager, &config).unwrap();
    let mapper = EntityMapper::<Customer>::new(pool.clone(), common::registry());
    mapper.create_table().unwrap();

    let err = mapper
        .execute_in_transaction(|m| {
            m.insert(&Customer::with_id(1, "half", "done"))?;
            Err::<(), _>(Error::mapping("first_name", "rejected by caller"))
        })
        .unwrap_err();

    assert!(err.cause().is_mapping());
    assert!(!err.cleanup_errors().is_empty());
    assert_eq!(pool.status().in_use, 0);
    assert_eq!(mapper.find(1).unwrap(), None);
}
