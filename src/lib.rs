// This file is part of dynamo-db. Copyright © 2025 dynamo contributors.
// dynamo-db is licensed under the GNU AGPL v3.0 or any later version. See LICENSE file for full text.

//! Persistence layer for the Dynamo Discord bot.
//!
//! Everything lives behind [`DynamoDb`], a cheaply-cloneable handle over pooled
//! SQLite connections. The bot's command/event layer calls into this crate and
//! nothing else touches the database.

pub mod db;
pub mod defaults;
pub mod error;
pub mod record;

pub use db::DynamoDb;
pub use error::DynamoError;
pub use record::{GuildRecord, GuildSubMap, JsonMap, UserRecord};
