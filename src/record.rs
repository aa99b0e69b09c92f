// This file is part of dynamo-db. Copyright © 2025 dynamo contributors.
// dynamo-db is licensed under the GNU AGPL v3.0 or any later version. See LICENSE file for full text.

//! Row types returned by the record access layer. These are disposable
//! snapshots: mutating one has no effect until it is written back.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// A decoded JSON object, e.g. a guild's ad embed.
pub type JsonMap = serde_json::Map<String, Value>;

/// One of the per-guild maps stored on a user row, keyed by guild id string.
pub type GuildSubMap<T> = HashMap<String, T, ahash::RandomState>;

/// A full `servers` row. The ad embed stays raw JSON text here; use
/// [`crate::DynamoDb::get_ad_embed`] for the decoded form.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildRecord {
    pub guild_id: u64,
    pub ad_channel: Option<String>,
    pub ad_embed: Option<String>,
    pub guild_invite_url: Option<String>,
}

/// A full `users` row with the three per-guild maps decoded.
///
/// Doubles as the snapshot for the read-modify-write update path: load one
/// via [`crate::DynamoDb::load_for_update`], then commit a mutation with one
/// of the `apply_*` operations.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: u64,
    pub activity_ranks: GuildSubMap<f64>,
    pub servers_messages: GuildSubMap<i64>,
    pub servers_last_message: GuildSubMap<String>,
}

/// Decode one stored sub-field map, silently repairing bad data.
///
/// Malformed or absent JSON text yields an empty map rather than an error:
/// a corrupt column must never brick every command touching that user. We do
/// warn, because the overwrite that follows will discard whatever was there.
pub(crate) fn decode_sub_map<T: DeserializeOwned>(
    user_id: u64,
    column: &str,
    text: Option<&str>,
) -> GuildSubMap<T> {
    let Some(text) = text else {
        return GuildSubMap::default();
    };
    match serde_json::from_str(text) {
        Ok(map) => map,
        Err(e) => {
            warn!("malformed {column} JSON for user {user_id}, repairing to empty map: {e}");
            GuildSubMap::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn decode_valid_map() {
        let map: GuildSubMap<i64> = decode_sub_map(1, "servers_messages", Some(r#"{"7": 12}"#));
        assert_eq!(map.get("7"), Some(&12));
    }

    #[test]
    fn decode_null_column_repairs_to_empty() {
        let map: GuildSubMap<f64> = decode_sub_map(1, "activity_ranks", None);
        assert!(map.is_empty());
    }

    #[traced_test]
    #[test]
    fn decode_garbage_repairs_to_empty_and_warns() {
        let map: GuildSubMap<String> =
            decode_sub_map(1, "servers_last_message", Some("definitely not json"));
        assert!(map.is_empty());
        assert!(logs_contain("malformed servers_last_message JSON"));
    }

    /// fresh rows store `{}`; an empty object must decode cleanly
    #[test]
    fn decode_empty_object() {
        let map: GuildSubMap<f64> = decode_sub_map(1, "activity_ranks", Some("{}"));
        assert!(map.is_empty());
    }
}
