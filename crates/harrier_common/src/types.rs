//! Logical addressing for sharded keyspaces.
//!
//! A `Target` names a data partition (keyspace, shard, tablet type); a
//! `TabletAlias` names one physical tablet serving that partition. The
//! scatter core keys all per-shard state by `Target` and pins reserved
//! connections by `TabletAlias`.

use serde::{Deserialize, Serialize};

/// Kind of tablet a query may be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabletType {
    Primary,
    Replica,
    ReadOnly,
}

impl TabletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabletType::Primary => "primary",
            TabletType::Replica => "replica",
            TabletType::ReadOnly => "rdonly",
        }
    }
}

impl std::fmt::Display for TabletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The logical address of a data partition: (keyspace, shard, tablet type).
///
/// Immutable; used as a map key for per-shard session state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
}

impl Target {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>, tablet_type: TabletType) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
            tablet_type,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.keyspace, self.shard, self.tablet_type)
    }
}

/// Stable identity of one physical tablet within a cell.
///
/// Produced by the gateway when a connection is established; recorded in
/// the session so later requests can be required to hit the same tablet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabletAlias {
    pub cell: String,
    pub uid: u32,
}

impl TabletAlias {
    pub fn new(cell: impl Into<String>, uid: u32) -> Self {
        Self { cell: cell.into(), uid }
    }
}

impl std::fmt::Display for TabletAlias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:010}", self.cell, self.uid)
    }
}
