//! Change-record schema carried inside a [`Messages`](crate::Messages) body.
//!
//! Each payload in a batch is an encoded [`Entry`]. An entry's
//! `store_value` is in turn an encoded [`RowChange`] (for row data) or a
//! [`TransactionBegin`]/[`TransactionEnd`] marker, depending on
//! [`Entry::entry_type`].

use prost::Message;

use crate::{decode_message, ProtocolError};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EntryType {
    CompatibleProto2 = 0,
    TransactionBegin = 1,
    RowData = 2,
    TransactionEnd = 3,
    Heartbeat = 4,
    GtidLog = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    CompatibleProto2 = 0,
    Insert = 1,
    Update = 2,
    Delete = 3,
    Create = 4,
    Alter = 5,
    Erase = 6,
    Query = 7,
    Truncate = 8,
    Rename = 9,
    /// CREATE INDEX
    CIndex = 10,
    /// DROP INDEX
    DIndex = 11,
    Gtid = 12,
    XaCommit = 13,
    XaRollback = 14,
    /// Master heartbeat
    MHeartbeat = 15,
}

/// The database the change originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SourceType {
    CompatibleProto2 = 0,
    Oracle = 1,
    Mysql = 2,
    Pgsql = 3,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct Pair {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// Binlog position and origin of an entry.
#[derive(Clone, PartialEq, Message)]
pub struct Header {
    /// Absent ⇒ 1.
    #[prost(int32, optional, tag = "1")]
    pub version: Option<i32>,
    #[prost(string, tag = "2")]
    pub logfile_name: String,
    #[prost(int64, tag = "3")]
    pub logfile_offset: i64,
    #[prost(int64, tag = "4")]
    pub server_id: i64,
    #[prost(string, tag = "5")]
    pub serverenc_code: String,
    /// Milliseconds since the epoch.
    #[prost(int64, tag = "6")]
    pub execute_time: i64,
    /// Absent ⇒ MySQL.
    #[prost(enumeration = "SourceType", optional, tag = "7")]
    pub source_type: Option<i32>,
    #[prost(string, tag = "8")]
    pub schema_name: String,
    #[prost(string, tag = "9")]
    pub table_name: String,
    #[prost(int64, tag = "10")]
    pub event_length: i64,
    /// Absent ⇒ UPDATE.
    #[prost(enumeration = "EventType", optional, tag = "11")]
    pub event_type: Option<i32>,
    #[prost(message, repeated, tag = "12")]
    pub props: Vec<Pair>,
    #[prost(string, tag = "13")]
    pub gtid: String,
}

/// One change record in a batch.
#[derive(Clone, PartialEq, Message)]
pub struct Entry {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    /// Absent ⇒ ROWDATA.
    #[prost(enumeration = "EntryType", optional, tag = "2")]
    pub entry_type: Option<i32>,
    #[prost(bytes = "vec", tag = "3")]
    pub store_value: Vec<u8>,
}

impl Entry {
    /// The entry type with the absent-means-ROWDATA default applied.
    /// Unknown values are reported as [`EntryType::CompatibleProto2`].
    pub fn kind(&self) -> EntryType {
        match self.entry_type {
            None => EntryType::RowData,
            Some(raw) => {
                EntryType::try_from(raw).unwrap_or(EntryType::CompatibleProto2)
            }
        }
    }

    /// Decodes `store_value` as a row change.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the payload isn't a
    /// [`RowChange`].
    pub fn row_change(&self) -> Result<RowChange, ProtocolError> {
        decode_message(&self.store_value)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Column {
    #[prost(int32, tag = "1")]
    pub index: i32,
    #[prost(int32, tag = "2")]
    pub sql_type: i32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(bool, tag = "4")]
    pub is_key: bool,
    #[prost(bool, tag = "5")]
    pub updated: bool,
    /// Absent ⇒ false.
    #[prost(bool, optional, tag = "6")]
    pub is_null: Option<bool>,
    #[prost(message, repeated, tag = "7")]
    pub props: Vec<Pair>,
    #[prost(string, tag = "8")]
    pub value: String,
    #[prost(int32, tag = "9")]
    pub length: i32,
    #[prost(string, tag = "10")]
    pub mysql_type: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RowData {
    #[prost(message, repeated, tag = "1")]
    pub before_columns: Vec<Column>,
    #[prost(message, repeated, tag = "2")]
    pub after_columns: Vec<Column>,
    #[prost(message, repeated, tag = "3")]
    pub props: Vec<Pair>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RowChange {
    #[prost(int64, tag = "1")]
    pub table_id: i64,
    /// Absent ⇒ UPDATE.
    #[prost(enumeration = "EventType", optional, tag = "2")]
    pub event_type: Option<i32>,
    /// Absent ⇒ false.
    #[prost(bool, optional, tag = "10")]
    pub is_ddl: Option<bool>,
    #[prost(string, tag = "11")]
    pub sql: String,
    #[prost(message, repeated, tag = "12")]
    pub row_datas: Vec<RowData>,
    #[prost(message, repeated, tag = "13")]
    pub props: Vec<Pair>,
    #[prost(string, tag = "14")]
    pub ddl_schema_name: String,
}

impl RowChange {
    /// The event type with the absent-means-UPDATE default applied.
    pub fn kind(&self) -> EventType {
        match self.event_type {
            None => EventType::Update,
            Some(raw) => {
                EventType::try_from(raw).unwrap_or(EventType::CompatibleProto2)
            }
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TransactionBegin {
    #[prost(int64, tag = "1")]
    pub execute_time: i64,
    #[prost(string, tag = "2")]
    pub transaction_id: String,
    #[prost(message, repeated, tag = "3")]
    pub props: Vec<Pair>,
    #[prost(int64, tag = "4")]
    pub thread_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransactionEnd {
    #[prost(int64, tag = "1")]
    pub execute_time: i64,
    #[prost(string, tag = "2")]
    pub transaction_id: String,
    #[prost(message, repeated, tag = "3")]
    pub props: Vec<Pair>,
}
