// This file is part of dynamo-db. Copyright © 2025 dynamo contributors.
// dynamo-db is licensed under the GNU AGPL v3.0 or any later version. See LICENSE file for full text.

mod schema;

use crate::defaults;
use crate::error::DynamoError;
use crate::record::{GuildRecord, GuildSubMap, JsonMap, UserRecord, decode_sub_map};
use sqlx::{
    Pool, Row, Sqlite,
    pool::PoolConnection,
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqlitePoolOptions,
        SqliteSynchronous,
    },
};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

type DynamoResult<T> = Result<T, DynamoError>;

/// Handle to the bot's database. Cloning is by-reference.
///
/// Each operation acquires a pooled connection for the duration of a single
/// statement and releases it on every exit path. There is no in-process cache
/// and no lock: the read-modify-write user updates are NOT serialized against
/// each other (see [`DynamoDb::load_for_update`]).
#[derive(Clone)]
pub struct DynamoDb {
    read_pool: Pool<Sqlite>,
    write_pool: Pool<Sqlite>,
}

impl DynamoDb {
    /// Open the database at the given path, creating file and schema if missing.
    pub async fn open(path: impl AsRef<Path>) -> DynamoResult<Self> {
        let pool_options_write = SqlitePoolOptions::new()
            .min_connections(1) // always keep at least one connection open
            .max_connections(1) // allow only 1 write connection
            .max_lifetime(None) // don't close connections for no reason, as we assume sqlite doesn't leak resources
            .test_before_acquire(false) // we assume sqlite is extremely reliable, as it's in-process
            .acquire_slow_threshold(Duration::from_millis(100)) // we expect sqlite to be fast
            .idle_timeout(Some(Duration::from_secs(90))); // idle extra connections may be closed after a while
        let pool_options_read = pool_options_write.clone().max_connections(4); // allow up to 4 read connections
        let connect_options_write = SqliteConnectOptions::new()
            .filename(path)
            .foreign_keys(true)
            .in_memory(false)
            .shared_cache(false) // superseded by WAL mode
            .journal_mode(SqliteJournalMode::Wal)
            .locking_mode(SqliteLockingMode::Normal) // must be Normal to have multiple connections
            .read_only(false)
            .create_if_missing(true)
            .statement_cache_capacity(100)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal) // small possibility a transaction may be rolled back on OS crash or power-off
            .auto_vacuum(SqliteAutoVacuum::None)
            .page_size(4096)
            .pragma("trusted_schema", "OFF"); // all applications are encouraged to switch this setting off on every database connection as soon as that connection is opened
        let connect_options_read = connect_options_write.clone().read_only(true).create_if_missing(false);

        let write_pool = pool_options_write.connect_with(connect_options_write).await?;
        let mut write_connection = write_pool.acquire().await?;
        schema::init(&mut write_connection).await?;
        drop(write_connection);

        let read_pool = pool_options_read.connect_with(connect_options_read).await?;

        Ok(DynamoDb { read_pool, write_pool })
    }

    /// Open a throwaway in-memory database.
    ///
    /// An in-memory sqlite database is private to its connection, so reads and
    /// writes share one single-connection pool here.
    pub async fn open_in_memory() -> DynamoResult<Self> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .max_lifetime(None)
            .idle_timeout(None) // the connection owns the data; never let it close
            .test_before_acquire(false)
            .connect_with(
                SqliteConnectOptions::new()
                    .in_memory(true)
                    .foreign_keys(true)
                    .pragma("trusted_schema", "OFF"),
            )
            .await?;
        let mut connection = pool.acquire().await?;
        schema::init(&mut connection).await?;
        drop(connection);

        Ok(DynamoDb {
            read_pool: pool.clone(),
            write_pool: pool,
        })
    }

    /// Gracefully close the database connections and wait for the close to complete
    pub async fn close(&self) {
        self.read_pool.close().await;
        self.write_pool.close().await;
    }

    /// Get something that we can DerefMut as SqliteConnection
    async fn write_connection(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        self.write_pool.acquire().await
    }

    // ---- guild operations ----

    /// Fetch the full row for a guild.
    ///
    /// Row absence is the only condition mapped to [`DynamoError::GuildNotFound`];
    /// driver failures propagate as [`DynamoError::Database`] so connectivity
    /// problems can't masquerade as a missing guild.
    pub async fn fetch_guild(&self, guild_id: u64) -> DynamoResult<GuildRecord> {
        let guild_id_db = guild_id as i64;
        let row = sqlx::query(r#"SELECT ad_channel, ad_embed, guild_invite_url FROM servers WHERE id = ?"#)
            .bind(guild_id_db)
            .fetch_optional(&self.read_pool)
            .await?
            .ok_or(DynamoError::GuildNotFound)?;
        Ok(GuildRecord {
            guild_id,
            ad_channel: row.try_get("ad_channel")?,
            ad_embed: row.try_get("ad_embed")?,
            guild_invite_url: row.try_get("guild_invite_url")?,
        })
    }

    /// Ensure a row exists for this guild. Idempotent; touches only the id column.
    pub async fn create_guild(&self, guild_id: u64) -> DynamoResult<()> {
        let guild_id = guild_id as i64;
        let mut connection = self.write_connection().await?;
        sqlx::query(
            r#"INSERT INTO servers (id)
               VALUES (?)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(guild_id)
        .execute(&mut *connection)
        .await?;
        Ok(())
    }

    /// Point the guild's advertisement at a channel. Stored as the id's string form.
    pub async fn set_ad_channel(&self, guild_id: u64, channel_id: u64) -> DynamoResult<()> {
        let guild_id = guild_id as i64;
        let channel_id = channel_id.to_string();
        let mut connection = self.write_connection().await?;
        sqlx::query(r#"UPDATE servers SET ad_channel = ? WHERE id = ?"#)
            .bind(channel_id)
            .bind(guild_id)
            .execute(&mut *connection)
            .await?;
        Ok(())
    }

    /// Get the guild's full ad embed, decoded.
    ///
    /// An unset column reads as an empty object; malformed stored text is a
    /// [`DynamoError::Json`] error. Unlike [`DynamoDb::fetch_guild`], a missing
    /// row surfaces as a raw `Database(RowNotFound)`.
    pub async fn get_ad_embed(&self, guild_id: u64) -> DynamoResult<JsonMap> {
        let guild_id = guild_id as i64;
        let text: Option<String> = sqlx::query_scalar(r#"SELECT ad_embed FROM servers WHERE id = ?"#)
            .bind(guild_id)
            .fetch_one(&self.read_pool)
            .await?;
        let embed = match text {
            Some(text) => serde_json::from_str(&text)?,
            None => JsonMap::new(),
        };
        Ok(embed)
    }

    /// Get a single ad embed field, extracted database-side.
    ///
    /// The field name is bound as a parameter to sqlite's `->>` operator, so
    /// untrusted input can never escape into SQL text. Note the `->>` contract:
    /// a name beginning with `$` is treated as a JSON path and can address
    /// nested values within this guild's embed; anything else is a literal
    /// top-level label. Returns `None` for a missing field or an unset embed.
    pub async fn get_ad_embed_field(&self, guild_id: u64, field: &str) -> DynamoResult<Option<String>> {
        let guild_id = guild_id as i64;
        let value: Option<String> =
            sqlx::query_scalar(r#"SELECT CAST(ad_embed ->> ? AS TEXT) FROM servers WHERE id = ?"#)
                .bind(field)
                .bind(guild_id)
                .fetch_one(&self.read_pool)
                .await?;
        Ok(value)
    }

    /// Overwrite the guild's ad embed with the JSON encoding of `embed`.
    pub async fn set_ad_embed(&self, guild_id: u64, embed: &JsonMap) -> DynamoResult<()> {
        let guild_id = guild_id as i64;
        let embed = serde_json::to_string(embed)?;
        let mut connection = self.write_connection().await?;
        sqlx::query(r#"UPDATE servers SET ad_embed = ? WHERE id = ?"#)
            .bind(embed)
            .bind(guild_id)
            .execute(&mut *connection)
            .await?;
        Ok(())
    }

    /// Set the guild's invite URL.
    pub async fn set_invite_url(&self, guild_id: u64, url: &str) -> DynamoResult<()> {
        let guild_id = guild_id as i64;
        let mut connection = self.write_connection().await?;
        sqlx::query(r#"UPDATE servers SET guild_invite_url = ? WHERE id = ?"#)
            .bind(url)
            .bind(guild_id)
            .execute(&mut *connection)
            .await?;
        Ok(())
    }

    // ---- user operations ----

    /// Fetch a user row with all three per-guild maps decoded.
    ///
    /// Map columns holding malformed JSON decode to empty maps (see
    /// [`crate::record`]); that never fails the fetch.
    pub async fn fetch_user(&self, user_id: u64) -> DynamoResult<UserRecord> {
        let user_id_db = user_id as i64;
        let row = sqlx::query(
            r#"SELECT activity_ranks, servers_messages, servers_last_message FROM users WHERE id = ?"#,
        )
        .bind(user_id_db)
        .fetch_optional(&self.read_pool)
        .await?
        .ok_or(DynamoError::UserNotFound)?;

        let activity_ranks: Option<String> = row.try_get("activity_ranks")?;
        let servers_messages: Option<String> = row.try_get("servers_messages")?;
        let servers_last_message: Option<String> = row.try_get("servers_last_message")?;
        Ok(UserRecord {
            user_id,
            activity_ranks: decode_sub_map(user_id, "activity_ranks", activity_ranks.as_deref()),
            servers_messages: decode_sub_map(user_id, "servers_messages", servers_messages.as_deref()),
            servers_last_message: decode_sub_map(user_id, "servers_last_message", servers_last_message.as_deref()),
        })
    }

    /// Insert a user row with database-side defaults, then return it decoded.
    pub async fn create_user(&self, user_id: u64) -> DynamoResult<UserRecord> {
        let user_id_db = user_id as i64;
        let mut connection = self.write_connection().await?;
        sqlx::query(r#"INSERT INTO users (id) VALUES (?)"#)
            .bind(user_id_db)
            .execute(&mut *connection)
            .await?;
        drop(connection);
        self.fetch_user(user_id).await
    }

    /// Load a snapshot of a user record for a read-modify-write update,
    /// creating the user if it doesn't exist yet.
    ///
    /// The snapshot is NOT a lock. Two callers that load snapshots of the same
    /// user and then `apply_*` to the same map will race, and the later write
    /// clobbers entries the earlier one added. Sub-field maps live in one JSON
    /// text column each, so there is nothing finer-grained to update.
    pub async fn load_for_update(&self, user_id: u64) -> DynamoResult<UserRecord> {
        match self.fetch_user(user_id).await {
            Err(DynamoError::UserNotFound) => self.create_user(user_id).await,
            result => result,
        }
    }

    /// Commit `activity_ranks[guild_id] = rank` on top of the given snapshot.
    pub async fn apply_activity_rank(&self, snapshot: &UserRecord, guild_id: u64, rank: f64) -> DynamoResult<()> {
        let mut map = snapshot.activity_ranks.clone();
        map.insert(guild_id.to_string(), rank);
        let mut connection = self.write_connection().await?;
        helper::write_sub_map(&mut connection, helper::UserMapColumn::ActivityRanks, snapshot.user_id, &map).await
    }

    /// Commit `servers_messages[guild_id] = count` on top of the given snapshot.
    pub async fn apply_server_messages(&self, snapshot: &UserRecord, guild_id: u64, count: i64) -> DynamoResult<()> {
        let mut map = snapshot.servers_messages.clone();
        map.insert(guild_id.to_string(), count);
        let mut connection = self.write_connection().await?;
        helper::write_sub_map(&mut connection, helper::UserMapColumn::ServersMessages, snapshot.user_id, &map).await
    }

    /// Commit `servers_last_message[guild_id] = at` on top of the given
    /// snapshot, formatted with [`defaults::TIMESTAMP_FORMAT`].
    pub async fn apply_server_last_message(
        &self,
        snapshot: &UserRecord,
        guild_id: u64,
        at: jiff::Timestamp,
    ) -> DynamoResult<()> {
        let last_message = at.strftime(defaults::TIMESTAMP_FORMAT).to_string();
        let mut map = snapshot.servers_last_message.clone();
        map.insert(guild_id.to_string(), last_message);
        let mut connection = self.write_connection().await?;
        helper::write_sub_map(
            &mut connection,
            helper::UserMapColumn::ServersLastMessage,
            snapshot.user_id,
            &map,
        )
        .await
    }

    /// One-shot [`DynamoDb::load_for_update`] + [`DynamoDb::apply_activity_rank`].
    pub async fn update_activity_rank(&self, user_id: u64, guild_id: u64, rank: f64) -> DynamoResult<()> {
        let snapshot = self.load_for_update(user_id).await?;
        self.apply_activity_rank(&snapshot, guild_id, rank).await
    }

    /// One-shot [`DynamoDb::load_for_update`] + [`DynamoDb::apply_server_messages`].
    pub async fn update_server_messages(&self, user_id: u64, guild_id: u64, count: i64) -> DynamoResult<()> {
        let snapshot = self.load_for_update(user_id).await?;
        self.apply_server_messages(&snapshot, guild_id, count).await
    }

    /// One-shot [`DynamoDb::load_for_update`] + [`DynamoDb::apply_server_last_message`].
    pub async fn update_server_last_message(
        &self,
        user_id: u64,
        guild_id: u64,
        at: jiff::Timestamp,
    ) -> DynamoResult<()> {
        let snapshot = self.load_for_update(user_id).await?;
        self.apply_server_last_message(&snapshot, guild_id, at).await
    }

    // ---- diagnostics ----

    /// Wall-clock round trip of a trivial query. Health reporting only.
    pub async fn db_latency(&self) -> DynamoResult<Duration> {
        let start = Instant::now();
        sqlx::query(r#"SELECT 1"#).execute(&self.read_pool).await?;
        Ok(start.elapsed())
    }

    /// Get DB size in bytes
    pub async fn size(&self) -> DynamoResult<u64> {
        let size: i64 =
            sqlx::query_scalar(r#"SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()"#)
                .fetch_one(&self.read_pool)
                .await?;
        Ok(size as u64)
    }

    /// Attempt to optimize the database.
    ///
    /// Applications that use long-lived database connections should run "PRAGMA optimize;" periodically, perhaps once per day or once per hour.
    pub async fn optimize(&self) -> DynamoResult<()> {
        let mut connection = self.write_connection().await?;
        sqlx::query(r#"PRAGMA optimize"#).execute(&mut *connection).await?;
        Ok(())
    }
}

/// Helper functions that don't access a whole pool
mod helper {
    use super::*;
    use serde::Serialize;
    use sqlx::SqliteConnection;

    /// The three JSON map columns on `users`. Column names reach SQL text only
    /// through this enum, never from caller input.
    #[derive(Copy, Clone)]
    pub(super) enum UserMapColumn {
        ActivityRanks,
        ServersMessages,
        ServersLastMessage,
    }

    impl UserMapColumn {
        fn update_sql(self) -> &'static str {
            match self {
                UserMapColumn::ActivityRanks => r#"UPDATE users SET activity_ranks = ? WHERE id = ?"#,
                UserMapColumn::ServersMessages => r#"UPDATE users SET servers_messages = ? WHERE id = ?"#,
                UserMapColumn::ServersLastMessage => r#"UPDATE users SET servers_last_message = ? WHERE id = ?"#,
            }
        }
    }

    /// Write one whole sub-field map back as JSON text. Single-column,
    /// single-statement; the read that produced the map is not part of any
    /// transaction.
    pub(super) async fn write_sub_map<T: Serialize>(
        connection: &mut SqliteConnection,
        column: UserMapColumn,
        user_id: u64,
        map: &GuildSubMap<T>,
    ) -> Result<(), DynamoError> {
        let user_id = user_id as i64;
        let json = serde_json::to_string(map)?;
        sqlx::query(column.update_sql())
            .bind(json)
            .bind(user_id)
            .execute(connection)
            .await?;
        Ok(())
    }
}
