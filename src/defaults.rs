// This file is part of dynamo-db. Copyright © 2025 dynamo contributors.
// dynamo-db is licensed under the GNU AGPL v3.0 or any later version. See LICENSE file for full text.

//! Process-wide constants shared between the bot layer and the persistence
//! layer.

use crate::record::JsonMap;
use serde_json::{Value, json};

/// strftime pattern for every `servers_last_message` value. Stored values must
/// stay parseable with this exact pattern, so treat changes as a schema
/// migration.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Brand colors, as 24-bit RGB.
pub mod color {
    pub const BLURPLE: u32 = 0x5261f8;
    pub const GREEN: u32 = 0x77dd77;
    pub const NEON: u32 = 0x1aff79;
}

/// Activity rank thresholds used by the bot's scoring commands.
pub mod activity_rank {
    pub const SUPERACTIVE: f64 = 3.0;
    pub const ACTIVE: f64 = 1.5;
    pub const ONLINE: f64 = 1.0;
}

pub const EMBED_COLOR: u32 = color::NEON;
pub const EMBED_FOOTER: &str = "Dynamo © 2023";
pub const SCORE_MULTIPLIER: f64 = 10.0;
pub const AD_EMBED_TITLE: &str = "CLICK HERE TO JOIN!";

/// The embed structure a guild starts out with before anyone customizes it.
pub fn default_ad_embed() -> JsonMap {
    let embed = json!({
        "title": AD_EMBED_TITLE,
        "description": Value::Null,
        "color": EMBED_COLOR,
        "footer": EMBED_FOOTER,
    });
    match embed {
        Value::Object(map) => map,
        // json!({..}) with an object literal always yields Value::Object
        _ => JsonMap::new(),
    }
}
