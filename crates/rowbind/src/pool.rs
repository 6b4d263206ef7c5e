//! PostgreSQL connection source.
//!
//! [`PgSource`] checks connections out of a `deadpool_postgres::Pool` and drives
//! `tokio-postgres` on a runtime it owns, so callers stay fully blocking. Rows are read into
//! memory when the query executes; the cursor then walks that buffer.

use crate::driver::{Connection, ConnectionSource, Cursor};
use crate::error::{DataAccessError, DataResult, DriverError, Operation};
use crate::value::Value;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, PoolBuilder, RecyclingMethod};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{NoTls, Row, Socket, Statement};

/// Pool for [`PgSource::connect`]: plain TCP, at most 16 connections.
///
/// URL and pool-build failures come back as [`Operation::Connect`].
pub fn create_pool(database_url: &str) -> DataResult<Pool> {
    create_pool_with_config(database_url, 16)
}

/// Plain TCP pool capped at `max_size` connections, as used by
/// [`PgSource::connect_with_config`].
pub fn create_pool_with_config(database_url: &str, max_size: usize) -> DataResult<Pool> {
    create_pool_with_manager_config(database_url, NoTls, default_manager_config(), |builder| {
        builder.max_size(max_size)
    })
}

/// Pool whose connections go through `tls`. Wrap the result with [`PgSource::from_pool`].
pub fn create_pool_with_tls<T>(database_url: &str, tls: T) -> DataResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    create_pool_with_manager_config(database_url, tls, default_manager_config(), |b| {
        b.max_size(16)
    })
}

/// Fully configurable pool. The other helpers all end up here.
///
/// Acquiring from a [`PgSource`] blocks until the pool hands out a
/// connection. Set a wait timeout (and a runtime) through `configure_pool` to bound it.
pub fn create_pool_with_manager_config<T>(
    database_url: &str,
    tls: T,
    manager_config: ManagerConfig,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> DataResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| DataAccessError::new(Operation::Connect, "", e))?;

    let mgr = Manager::from_config(pg_config, tls, manager_config);
    configure_pool(Pool::builder(mgr))
        .build()
        .map_err(|e| DataAccessError::new(Operation::Connect, "", e))
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}

/// A blocking [`ConnectionSource`] over a deadpool-postgres pool.
///
/// Cloning is cheap: clones share the pool and the runtime.
#[derive(Clone)]
pub struct PgSource {
    pool: Pool,
    runtime: Arc<Runtime>,
}

impl PgSource {
    /// Connect with [`create_pool`] defaults.
    pub fn connect(database_url: &str) -> DataResult<Self> {
        Self::from_pool(create_pool(database_url)?)
    }

    /// Connect with a custom maximum pool size.
    pub fn connect_with_config(database_url: &str, max_size: usize) -> DataResult<Self> {
        Self::from_pool(create_pool_with_config(database_url, max_size)?)
    }

    /// Wrap an existing pool.
    ///
    /// Must not be called from inside an async runtime; the source starts its own.
    pub fn from_pool(pool: Pool) -> DataResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("rowbind-pg")
            .enable_all()
            .build()
            .map_err(|e| DataAccessError::new(Operation::Connect, "", e))?;
        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl fmt::Debug for PgSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgSource")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

impl ConnectionSource for PgSource {
    type Connection = PgConnection;

    fn acquire(&self) -> Result<PgConnection, DriverError> {
        let client = self.runtime.block_on(self.pool.get())?;
        Ok(PgConnection {
            client,
            runtime: self.runtime.clone(),
        })
    }
}

/// A pooled connection. Closing it returns it to the pool.
pub struct PgConnection {
    client: Object,
    runtime: Arc<Runtime>,
}

/// A server-side prepared statement plus its bound parameters.
pub struct PgStatement {
    statement: Statement,
    params: Vec<Option<Param>>,
}

/// A bound value, narrowed or widened to its placeholder's integer type.
#[derive(Debug, Clone, PartialEq)]
enum Param {
    Value(Value),
    Short(Option<i16>),
}

impl Param {
    fn to_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Value(value) => to_sql(value),
            Self::Short(v) => v,
        }
    }

    fn accepts(&self, ty: &Type) -> bool {
        match self {
            Self::Value(value) => accepts(value, ty),
            Self::Short(_) => <Option<i16> as ToSql>::accepts(ty),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Value(value) => value.type_name(),
            Self::Short(_) => "short",
        }
    }
}

impl Connection for PgConnection {
    type Statement = PgStatement;
    type Cursor = PgCursor;

    fn prepare(&mut self, sql: &str) -> Result<PgStatement, DriverError> {
        let statement = self.runtime.block_on(self.client.prepare(sql))?;
        let params = vec![None; statement.params().len()];
        Ok(PgStatement { statement, params })
    }

    fn bind(
        &mut self,
        statement: &mut PgStatement,
        index: usize,
        value: Value,
    ) -> Result<(), DriverError> {
        bind_slot(statement.statement.params(), &mut statement.params, index, value)
    }

    fn execute_update(&mut self, statement: &mut PgStatement) -> Result<u64, DriverError> {
        let params = bound_params(&statement.params)?;
        let affected = self
            .runtime
            .block_on(self.client.execute(&statement.statement, &params))?;
        Ok(affected)
    }

    fn execute_query(&mut self, statement: &mut PgStatement) -> Result<PgCursor, DriverError> {
        let params = bound_params(&statement.params)?;
        let rows = self
            .runtime
            .block_on(self.client.query(&statement.statement, &params))?;
        Ok(PgCursor {
            rows: rows.into_iter(),
            current: None,
        })
    }

    fn close_statement(&mut self, statement: PgStatement) -> Result<(), DriverError> {
        // tokio-postgres closes the server-side statement when the last handle drops.
        drop(statement);
        Ok(())
    }

    fn close(self) -> Result<(), DriverError> {
        drop(self.client);
        Ok(())
    }
}

/// Buffered rows of an executed query.
pub struct PgCursor {
    rows: std::vec::IntoIter<Row>,
    current: Option<Row>,
}

impl Cursor for PgCursor {
    type Row = Row;

    fn next_row(&mut self) -> Result<Option<&Row>, DriverError> {
        self.current = self.rows.next();
        Ok(self.current.as_ref())
    }

    fn close(self) -> Result<(), DriverError> {
        Ok(())
    }
}

fn bind_slot(
    types: &[Type],
    slots: &mut [Option<Param>],
    index: usize,
    value: Value,
) -> Result<(), DriverError> {
    let count = slots.len();
    let position = index
        .checked_sub(1)
        .filter(|&i| i < count)
        .ok_or_else(|| format!("parameter index {index} out of range (statement has {count})"))?;

    let param = match types.get(position) {
        Some(ty) => {
            let param = coerce(value, ty, index)?;
            if !param.accepts(ty) {
                return Err(format!(
                    "cannot bind {} to parameter ${index} of type {ty}",
                    param.type_name()
                )
                .into());
            }
            param
        }
        None => Param::Value(value),
    };

    slots[position] = Some(param);
    Ok(())
}

/// Fit an integer to the width of an `int2`/`int4`/`int8` placeholder. Anything else passes
/// through untouched.
fn coerce(value: Value, ty: &Type, index: usize) -> Result<Param, DriverError> {
    let out_of_range = |n: i64| {
        DriverError::from(format!(
            "value {n} out of range for parameter ${index} of type {ty}"
        ))
    };
    let narrow = |v: Option<i64>| -> Result<Option<i16>, DriverError> {
        v.map(|n| i16::try_from(n).map_err(|_| out_of_range(n)))
            .transpose()
    };

    let param = match value {
        Value::Int(v) if *ty == Type::INT8 => Param::Value(Value::Long(v.map(i64::from))),
        Value::Int(v) if *ty == Type::INT2 => Param::Short(narrow(v.map(i64::from))?),
        Value::Long(v) if *ty == Type::INT4 => Param::Value(Value::Int(
            v.map(|n| i32::try_from(n).map_err(|_| out_of_range(n)))
                .transpose()?,
        )),
        Value::Long(v) if *ty == Type::INT2 => Param::Short(narrow(v)?),
        value => Param::Value(value),
    };
    Ok(param)
}

fn bound_params(slots: &[Option<Param>]) -> Result<Vec<&(dyn ToSql + Sync)>, DriverError> {
    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.as_ref().map(Param::to_sql).ok_or_else(|| {
                DriverError::from(format!("parameter ${} was never bound", i + 1))
            })
        })
        .collect()
}

fn to_sql(value: &Value) -> &(dyn ToSql + Sync) {
    match value {
        Value::Bool(v) => v,
        Value::Int(v) => v,
        Value::Long(v) => v,
        Value::Double(v) => v,
        Value::Text(v) => v,
        Value::Bytes(v) => v,
        Value::Uuid(v) => v,
        Value::Timestamp(v) => v,
        Value::Json(v) => v,
    }
}

fn accepts(value: &Value, ty: &Type) -> bool {
    match value {
        Value::Bool(_) => <Option<bool> as ToSql>::accepts(ty),
        Value::Int(_) => <Option<i32> as ToSql>::accepts(ty),
        Value::Long(_) => <Option<i64> as ToSql>::accepts(ty),
        Value::Double(_) => <Option<f64> as ToSql>::accepts(ty),
        Value::Text(_) => <Option<String> as ToSql>::accepts(ty),
        Value::Bytes(_) => <Option<Vec<u8>> as ToSql>::accepts(ty),
        Value::Uuid(_) => <Option<uuid::Uuid> as ToSql>::accepts(ty),
        Value::Timestamp(_) => <Option<chrono::DateTime<chrono::Utc>> as ToSql>::accepts(ty),
        Value::Json(_) => <Option<serde_json::Value> as ToSql>::accepts(ty),
    }
}
