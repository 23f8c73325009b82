//! Forward-only result cursors.
//!
//! [`DataRow`] is the positional row contract used by the materializer;
//! [`Cursor`] adds forward-only iteration with an `Unread → Reading → Closed`
//! state machine. Three sources implement it:
//! - [`CollectionCursor`]: an in-memory sequence of records plus a schema
//! - [`RowCursor`]: live rows streamed from a command
//! - [`QueryStream`]: live rows materialized lazily as a `Stream`

use crate::db::materialize::DynamicRecord;
use crate::db::schema::SchemaCache;
use crate::db::types::ResultColumn;
use crate::error::{DbError, DbResult};
use crate::models::{DbValue, HostType, TableSchema, Value};
use crate::record::Record;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::Stream;
use rust_decimal::Decimal;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cursor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Unread,
    Reading,
    Closed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unread => write!(f, "unread"),
            Self::Reading => write!(f, "reading"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Read a value and coerce it into `T`, naming the column on failure.
pub fn get_as<T: DbValue, R: DataRow + ?Sized>(row: &R, index: usize) -> DbResult<T> {
    let value = row.value(index)?;
    T::from_value(value).map_err(|e| {
        let column = row.name(index).unwrap_or_default().to_string();
        DbError::type_mismatch(column, e.source_type, e.target_type)
    })
}

/// Positional access to the current row.
pub trait DataRow {
    fn field_count(&self) -> usize;

    fn name(&self, index: usize) -> DbResult<&str>;

    fn field_type(&self, index: usize) -> DbResult<Option<HostType>>;

    fn value(&self, index: usize) -> DbResult<Value>;

    /// Index of a column by name, ignoring case.
    fn ordinal(&self, name: &str) -> DbResult<usize> {
        (0..self.field_count())
            .find(|&i| self.name(i).is_ok_and(|n| n.eq_ignore_ascii_case(name)))
            .ok_or_else(|| DbError::invalid_argument(format!("No column named '{}'", name)))
    }

    fn is_db_null(&self, index: usize) -> DbResult<bool> {
        Ok(self.value(index)?.is_null())
    }

    fn get<T: DbValue>(&self, index: usize) -> DbResult<T>
    where
        Self: Sized,
    {
        get_as(self, index)
    }

    fn get_bool(&self, index: usize) -> DbResult<bool> {
        get_as(self, index)
    }

    fn get_i16(&self, index: usize) -> DbResult<i16> {
        get_as(self, index)
    }

    fn get_i32(&self, index: usize) -> DbResult<i32> {
        get_as(self, index)
    }

    fn get_i64(&self, index: usize) -> DbResult<i64> {
        get_as(self, index)
    }

    fn get_f32(&self, index: usize) -> DbResult<f32> {
        get_as(self, index)
    }

    fn get_f64(&self, index: usize) -> DbResult<f64> {
        get_as(self, index)
    }

    fn get_decimal(&self, index: usize) -> DbResult<Decimal> {
        get_as(self, index)
    }

    fn get_string(&self, index: usize) -> DbResult<String> {
        get_as(self, index)
    }

    fn get_bytes(&self, index: usize) -> DbResult<Vec<u8>> {
        get_as(self, index)
    }

    fn get_uuid(&self, index: usize) -> DbResult<Uuid> {
        get_as(self, index)
    }

    fn get_date(&self, index: usize) -> DbResult<NaiveDate> {
        get_as(self, index)
    }

    fn get_time(&self, index: usize) -> DbResult<NaiveTime> {
        get_as(self, index)
    }

    fn get_datetime(&self, index: usize) -> DbResult<NaiveDateTime> {
        get_as(self, index)
    }
}

/// A forward-only cursor over rows.
pub trait Cursor: DataRow {
    fn state(&self) -> ReaderState;

    /// Advance to the next row. Returns `false` once exhausted, after which
    /// the cursor is closed; reading a closed cursor always returns `false`.
    fn read(&mut self) -> DbResult<bool>;

    /// Release the underlying source. Idempotent.
    fn close(&mut self);
}

fn out_of_range(index: usize, count: usize) -> DbError {
    DbError::invalid_argument(format!(
        "Column index {} out of range (field count: {})",
        index, count
    ))
}

// =============================================================================
// Result rows
// =============================================================================

/// One decoded row with shared column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    columns: Arc<[ResultColumn]>,
    values: Vec<Value>,
}

impl ResultRow {
    pub fn new(columns: Arc<[ResultColumn]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &Arc<[ResultColumn]> {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl DataRow for ResultRow {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn name(&self, index: usize) -> DbResult<&str> {
        self.columns
            .get(index)
            .map(|c| c.name.as_str())
            .ok_or_else(|| out_of_range(index, self.columns.len()))
    }

    fn field_type(&self, index: usize) -> DbResult<Option<HostType>> {
        self.columns
            .get(index)
            .map(|c| c.host_type)
            .ok_or_else(|| out_of_range(index, self.columns.len()))
    }

    fn value(&self, index: usize) -> DbResult<Value> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_range(index, self.values.len()))
    }
}

// =============================================================================
// Collection cursor
// =============================================================================

type RecordIter<T> = Box<dyn Iterator<Item = Option<T>> + Send>;

/// Presents an in-memory sequence of records as a cursor.
///
/// Columns come from the schema; each column reads the record property
/// mapped to it. `None` elements are skipped.
pub struct CollectionCursor<T: Record> {
    source: Option<RecordIter<T>>,
    schema: Arc<TableSchema>,
    /// Property name for each column, resolved once.
    properties: Vec<Option<&'static str>>,
    current: Option<T>,
    state: ReaderState,
}

impl<T: Record> CollectionCursor<T> {
    /// Wrap records with an explicit schema.
    pub fn new<I>(items: I, schema: Arc<TableSchema>) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_options(items.into_iter().map(Some), schema)
    }

    /// Wrap a sequence that may contain missing elements.
    pub fn from_options<I>(items: I, schema: Arc<TableSchema>) -> Self
    where
        I: IntoIterator<Item = Option<T>>,
        I::IntoIter: Send + 'static,
    {
        let properties = schema
            .columns()
            .iter()
            .map(|column| {
                T::properties()
                    .iter()
                    .find(|p| {
                        p.readable
                            && !p.ignored
                            && !p.is_nested()
                            && p.column_name().eq_ignore_ascii_case(column.name())
                    })
                    .map(|p| p.name)
            })
            .collect();

        Self {
            source: Some(Box::new(items.into_iter())),
            schema,
            properties,
            current: None,
            state: ReaderState::Unread,
        }
    }

    /// Wrap records, inferring the schema from `T`.
    pub fn from_records<I>(items: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let schema = SchemaCache::global().infer::<T>(None, None, None)?;
        Ok(Self::new(items, schema))
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// The record at the current position.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    fn check_open(&self) -> DbResult<()> {
        if self.state == ReaderState::Closed {
            return Err(DbError::reader_not_ready(self.state.to_string()));
        }
        Ok(())
    }
}

impl<T: Record> DataRow for CollectionCursor<T> {
    fn field_count(&self) -> usize {
        self.schema.columns().len()
    }

    fn name(&self, index: usize) -> DbResult<&str> {
        self.check_open()?;
        self.schema
            .columns()
            .get(index)
            .map(|c| c.name())
            .ok_or_else(|| out_of_range(index, self.field_count()))
    }

    fn field_type(&self, index: usize) -> DbResult<Option<HostType>> {
        self.check_open()?;
        self.schema
            .columns()
            .get(index)
            .map(|c| Some(c.data_type()))
            .ok_or_else(|| out_of_range(index, self.field_count()))
    }

    fn value(&self, index: usize) -> DbResult<Value> {
        let current = match (&self.state, &self.current) {
            (ReaderState::Reading, Some(current)) => current,
            _ => return Err(DbError::reader_not_ready(self.state.to_string())),
        };
        let property = self
            .properties
            .get(index)
            .ok_or_else(|| out_of_range(index, self.field_count()))?;
        Ok(property
            .and_then(|name| current.get(name))
            .unwrap_or(Value::Null))
    }
}

impl<T: Record> Cursor for CollectionCursor<T> {
    fn state(&self) -> ReaderState {
        self.state
    }

    fn read(&mut self) -> DbResult<bool> {
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };
        for item in source.by_ref() {
            if let Some(item) = item {
                self.current = Some(item);
                self.state = ReaderState::Reading;
                return Ok(true);
            }
        }
        self.close();
        Ok(false)
    }

    fn close(&mut self) {
        self.source = None;
        self.current = None;
        self.state = ReaderState::Closed;
    }
}

impl<T: Record> fmt::Debug for CollectionCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionCursor")
            .field("type", &T::type_name())
            .field("table", &self.schema.table_name())
            .field("state", &self.state)
            .finish()
    }
}

// =============================================================================
// Live cursors
// =============================================================================

/// Receiving end of a streaming command.
pub(crate) type RowReceiver = mpsc::Receiver<DbResult<ResultRow>>;

/// Cursor over rows streamed from a live command.
///
/// Column metadata is available once the first row has been read. Dropping
/// or closing the cursor cancels the producing query.
pub struct RowCursor {
    receiver: RowReceiver,
    cancel: CancellationToken,
    columns: Option<Arc<[ResultColumn]>>,
    current: Option<ResultRow>,
    state: ReaderState,
}

impl RowCursor {
    pub(crate) fn new(receiver: RowReceiver, cancel: CancellationToken) -> Self {
        Self {
            receiver,
            cancel,
            columns: None,
            current: None,
            state: ReaderState::Unread,
        }
    }

    /// Advance to the next row, waiting for the producer.
    pub async fn read_async(&mut self, cancel: &CancellationToken) -> DbResult<bool> {
        if self.state == ReaderState::Closed {
            return Ok(false);
        }
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                self.close();
                return Err(DbError::cancelled("cursor read"));
            }
            next = self.receiver.recv() => next,
        };
        self.accept(next)
    }

    /// The current row, as a dynamic record.
    pub fn current_dynamic(&self) -> DbResult<DynamicRecord> {
        match &self.current {
            Some(row) if self.state == ReaderState::Reading => {
                crate::db::materialize::parse_dynamic(row)
            }
            _ => Err(DbError::reader_not_ready(self.state.to_string())),
        }
    }

    fn accept(&mut self, next: Option<DbResult<ResultRow>>) -> DbResult<bool> {
        match next {
            Some(Ok(row)) => {
                self.columns = Some(row.columns().clone());
                self.current = Some(row);
                self.state = ReaderState::Reading;
                Ok(true)
            }
            Some(Err(e)) => {
                self.close();
                Err(e)
            }
            None => {
                self.close();
                Ok(false)
            }
        }
    }

    fn metadata(&self, index: usize) -> DbResult<&ResultColumn> {
        if self.state == ReaderState::Closed {
            return Err(DbError::reader_not_ready(self.state.to_string()));
        }
        let columns = self
            .columns
            .as_ref()
            .ok_or_else(|| DbError::reader_not_ready(self.state.to_string()))?;
        columns
            .get(index)
            .ok_or_else(|| out_of_range(index, columns.len()))
    }
}

impl DataRow for RowCursor {
    fn field_count(&self) -> usize {
        self.columns.as_ref().map_or(0, |c| c.len())
    }

    fn name(&self, index: usize) -> DbResult<&str> {
        self.metadata(index).map(|c| c.name.as_str())
    }

    fn field_type(&self, index: usize) -> DbResult<Option<HostType>> {
        self.metadata(index).map(|c| c.host_type)
    }

    fn value(&self, index: usize) -> DbResult<Value> {
        match &self.current {
            Some(row) if self.state == ReaderState::Reading => row.value(index),
            _ => Err(DbError::reader_not_ready(self.state.to_string())),
        }
    }
}

impl Cursor for RowCursor {
    fn state(&self) -> ReaderState {
        self.state
    }

    /// Blocking read. Must not be called from within an async runtime; use
    /// [`RowCursor::read_async`] there.
    fn read(&mut self) -> DbResult<bool> {
        if self.state == ReaderState::Closed {
            return Ok(false);
        }
        let next = self.receiver.blocking_recv();
        self.accept(next)
    }

    fn close(&mut self) {
        if self.state != ReaderState::Closed {
            self.cancel.cancel();
            self.receiver.close();
        }
        self.current = None;
        self.state = ReaderState::Closed;
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor")
            .field("state", &self.state)
            .field("field_count", &self.field_count())
            .finish()
    }
}

/// Lazy, forward-only, non-restartable sequence of materialized rows.
///
/// The first error ends the stream. Dropping the stream before it is
/// exhausted cancels the producing query.
pub struct QueryStream<T> {
    receiver: RowReceiver,
    cancel: CancellationToken,
    map: fn(&ResultRow) -> DbResult<T>,
    done: bool,
}

impl<T> QueryStream<T> {
    pub(crate) fn new(
        receiver: RowReceiver,
        cancel: CancellationToken,
        map: fn(&ResultRow) -> DbResult<T>,
    ) -> Self {
        Self {
            receiver,
            cancel,
            map,
            done: false,
        }
    }

    /// Stop the query and release the connection.
    pub fn close(&mut self) {
        self.done = true;
        self.cancel.cancel();
        self.receiver.close();
    }
}

impl<T> Stream for QueryStream<T> {
    type Item = DbResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(Ok(row))) => {
                let item = (this.map)(&row);
                if item.is_err() {
                    this.close();
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(Some(Err(e))) => {
                this.close();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for QueryStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> fmt::Debug for QueryStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStream")
            .field("done", &self.done)
            .finish()
    }
}
