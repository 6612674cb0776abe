//! Per-identity attempt ledger.
//!
//! A ledger is the ordered list of `(timestamp, login)` records of recent
//! attempts from one [`ClientIdentity`]. It is persisted in the expiring
//! store under `auth_{identity}` as JSON of the shape
//!
//! ```json
//! { "203.0.113.7": { "1700000000": "admin", "1700000003": "root" } }
//! ```
//!
//! Records are keyed by their timestamp. Recording an attempt at a timestamp
//! that already exists replaces that record's login in place instead of
//! adding a new record, so a burst within one second counts once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};

use crate::{error::StorageError, identity::ClientIdentity};

/// Prefix of every ledger key in the expiring store.
pub const KEY_PREFIX: &str = "auth_";

/// Store key holding the ledger of `identity`.
pub fn ledger_key(identity: &ClientIdentity) -> String {
    format!("{KEY_PREFIX}{identity}")
}

/// One authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Unix time of the attempt in seconds
    pub timestamp: i64,
    /// The login identifier that was submitted
    pub login: String,
}

impl AttemptRecord {
    pub fn attempted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// The attempts of one identity, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptLedger {
    identity: ClientIdentity,
    records: Vec<AttemptRecord>,
}

impl AttemptLedger {
    pub fn new(identity: ClientIdentity) -> Self {
        Self {
            identity,
            records: Vec::new(),
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recently inserted record.
    pub fn last(&self) -> Option<&AttemptRecord> {
        self.records.last()
    }

    /// Append an attempt, or overwrite the login of an existing record with
    /// the same timestamp.
    pub fn record(&mut self, timestamp: i64, login: impl Into<String>) {
        insert_record(&mut self.records, timestamp, login.into());
    }

    /// Drop the oldest records so that at most `count` remain.
    pub fn retain_latest(&mut self, count: usize) {
        let excess = self.records.len().saturating_sub(count);
        self.records.drain(..excess);
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored document and extract the ledger of `identity`.
    ///
    /// A document that holds no entry for `identity` yields an empty ledger.
    pub fn from_bytes(identity: &ClientIdentity, bytes: &[u8]) -> Result<Self, StorageError> {
        let document: LedgerDocument = serde_json::from_slice(bytes)?;
        let records = document
            .0
            .into_iter()
            .find_map(|(id, records)| (&id == identity).then_some(records))
            .unwrap_or_default();

        Ok(Self {
            identity: identity.clone(),
            records,
        })
    }

    /// Decode a stored document without knowing its identity up front.
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>, StorageError> {
        let document: LedgerDocument = serde_json::from_slice(bytes)?;
        Ok(document
            .0
            .into_iter()
            .next()
            .map(|(identity, records)| Self { identity, records }))
    }
}

fn insert_record(records: &mut Vec<AttemptRecord>, timestamp: i64, login: String) {
    match records.iter_mut().find(|r| r.timestamp == timestamp) {
        Some(existing) => existing.login = login,
        None => records.push(AttemptRecord { timestamp, login }),
    }
}

impl Serialize for AttemptLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.identity, &RecordsRef(&self.records))?;
        map.end()
    }
}

struct RecordsRef<'a>(&'a [AttemptRecord]);

impl Serialize for RecordsRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in self.0 {
            map.serialize_entry(&record.timestamp, &record.login)?;
        }
        map.end()
    }
}

/// Ordered records, decoded from a `{timestamp: login}` map in document order.
struct Records(Vec<AttemptRecord>);

impl<'de> Deserialize<'de> for Records {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = Records;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of unix timestamps to login identifiers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Records, A::Error> {
                let mut records = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((timestamp, login)) = access.next_entry::<i64, String>()? {
                    insert_record(&mut records, timestamp, login);
                }
                Ok(Records(records))
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

/// Every `{identity: records}` entry of a stored document, in document order.
struct LedgerDocument(Vec<(ClientIdentity, Vec<AttemptRecord>)>);

impl<'de> Deserialize<'de> for LedgerDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = LedgerDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of client identities to attempt records")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<LedgerDocument, A::Error> {
                let mut entries = Vec::new();
                while let Some((identity, records)) =
                    access.next_entry::<ClientIdentity, Records>()?
                {
                    entries.push((identity, records.0));
                }
                Ok(LedgerDocument(entries))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}
