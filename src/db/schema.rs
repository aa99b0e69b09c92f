// This file is part of dynamo-db. Copyright © 2025 dynamo contributors.
// dynamo-db is licensed under the GNU AGPL v3.0 or any later version. See LICENSE file for full text.

use crate::error::DynamoError;
use sqlx::{Executor, SqliteConnection};
use tokio::time::Instant;
use tracing::debug;

/// Set up the database
pub(super) async fn init(connection: &mut SqliteConnection) -> Result<(), DynamoError> {
    let start = Instant::now();

    // guild information
    // we intentionally use rowid as we have an integer pk
    connection
        .execute(
            r#"CREATE TABLE IF NOT EXISTS servers (
                   id                INTEGER NOT NULL PRIMARY KEY,
                   ad_channel        TEXT,
                   ad_embed          TEXT,
                   guild_invite_url  TEXT
               ) STRICT"#,
        )
        .await?;

    // user information. The three map columns hold JSON objects keyed by
    // guild id string; a fresh row starts with empty maps.
    connection
        .execute(
            r#"CREATE TABLE IF NOT EXISTS users (
                   id                    INTEGER NOT NULL PRIMARY KEY,
                   activity_ranks        TEXT NOT NULL DEFAULT '{}',
                   servers_messages      TEXT NOT NULL DEFAULT '{}',
                   servers_last_message  TEXT NOT NULL DEFAULT '{}'
               ) STRICT"#,
        )
        .await?;

    let elapsed = start.elapsed();
    debug!("schema init took {}ms", elapsed.as_millis());

    Ok(())
}
