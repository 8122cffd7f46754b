use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 100ns ticks from 0001-01-01 to 9999-12-31T23:59:59.9999999.
const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

/// 100ns ticks from 0001-01-01 to the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Where and when a node's engine last came up.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct NodeStatusRecord {
    /// Full instance identifier.
    pub instance_name: String,

    /// Numeric index parsed from the instance identifier.
    pub instance_index: u32,

    /// Host the engine is reachable on.
    pub host: String,

    /// Engine port.
    pub port: u16,

    /// When the engine was launched.
    pub start_time: DateTime<Utc>,
}

/// Extracts the numeric suffix of an instance identifier.
///
/// `MongoWorkerRole_IN_2` and `deployment.MongoWorkerRole.2` both give 2.
/// Identifiers without a numeric suffix give 0.
#[must_use]
pub fn parse_instance_index(instance_id: &str) -> u32 {
    let suffix = instance_id
        .rfind(['.', '_'])
        .map_or(instance_id, |i| &instance_id[i + 1..]);

    suffix.parse().unwrap_or(0)
}

/// A store key that sorts newer records first.
///
/// Zero-padded `MAX_TICKS - ticks(at)` followed by a random suffix, so keys
/// written in the same tick stay distinct.
pub(crate) fn reverse_chronological_key(at: DateTime<Utc>) -> String {
    let ticks = at
        .timestamp_nanos_opt()
        .map_or(0, |nanos| nanos / 100 + UNIX_EPOCH_TICKS);

    format!("{:019}_{}", MAX_TICKS - ticks, Uuid::new_v4().simple())
}
