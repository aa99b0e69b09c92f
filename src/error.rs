// This file is part of dynamo-db. Copyright © 2025 dynamo contributors.
// dynamo-db is licensed under the GNU AGPL v3.0 or any later version. See LICENSE file for full text.

use sqlx::error::Error as SqlxError;
use std::fmt::{Display, Formatter};

/// Errors surfaced by the record access layer.
///
/// The two not-found variants are the only conditions callers are expected to
/// branch on (the read-modify-write path creates the user when it sees
/// [`DynamoError::UserNotFound`]). Everything else propagates unclassified.
#[derive(Debug)]
pub enum DynamoError {
    /// No `servers` row for the given guild id.
    GuildNotFound,
    /// No `users` row for the given user id.
    UserNotFound,
    /// Anything the driver reported that is not "zero rows".
    Database(SqlxError),
    /// Stored JSON text that failed to encode or decode where the
    /// silent-repair policy does not apply.
    Json(serde_json::Error),
}

impl Display for DynamoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DynamoError::GuildNotFound => f.write_str("guild not found"),
            DynamoError::UserNotFound => f.write_str("user not found"),
            DynamoError::Database(_) => f.write_str("DB error"),
            DynamoError::Json(_) => f.write_str("stored JSON error"),
        }
    }
}

impl std::error::Error for DynamoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DynamoError::Database(e) => Some(e),
            DynamoError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SqlxError> for DynamoError {
    fn from(e: SqlxError) -> Self {
        Self::Database(e)
    }
}

impl From<serde_json::Error> for DynamoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl DynamoError {
    /// `true` for either not-found variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, DynamoError::GuildNotFound | DynamoError::UserNotFound)
    }
}
