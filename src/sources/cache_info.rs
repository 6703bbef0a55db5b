//! Parser for `INFO`-style introspection text
//!
//! The cache service answers introspection calls with sections of
//! `key:value` lines (`# Memory`, `used_memory:1048576`, ...). Only a few
//! numeric fields are of interest.

use std::sync::LazyLock;

use regex::Regex;

pub const USED_MEMORY: &str = "used_memory";
pub const CONNECTED_CLIENTS: &str = "connected_clients";
pub const OPS_PER_SEC: &str = "instantaneous_ops_per_sec";

/// Any `key:integer` line
static NUMERIC_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([A-Za-z0-9_]+):(\d+)\s*$").expect("Invalid INFO line regex"));

/// Reads the integer value of `key`, if present
pub fn info_field(text: &str, key: &str) -> Option<u64> {
    NUMERIC_LINE
        .captures_iter(text)
        .find(|caps| &caps[1] == key)?
        .get(2)?
        .as_str()
        .parse()
        .ok()
}
