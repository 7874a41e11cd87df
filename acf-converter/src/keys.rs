//! ACF key conventions
//!
//! Field groups are keyed `group_*` and fields `field_*`. Keys that do not
//! follow the convention are rewritten to `<prefix>_<13 hex chars of md5>`,
//! which is stable for a given input.

use lazy_static::lazy_static;
use md5::{Digest, Md5};
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    static ref GROUP_KEY: Regex = Regex::new(r"^group_[A-Za-z0-9_]+$").unwrap();
    static ref FIELD_KEY: Regex = Regex::new(r"^field_[A-Za-z0-9_]+$").unwrap();
}

/// Number of md5 hex characters used in a rewritten key
const REWRITE_HASH_LEN: usize = 13;

/// Kind of ACF key, used for format checks and rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Group,
    Field,
}

impl KeyKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyKind::Group => "group",
            KeyKind::Field => "field",
        }
    }
}

pub fn is_group_key(key: &str) -> bool {
    GROUP_KEY.is_match(key)
}

pub fn is_field_key(key: &str) -> bool {
    FIELD_KEY.is_match(key)
}

/// Clone targets may point at a single field or a whole group
pub fn is_clone_target(key: &str) -> bool {
    is_field_key(key) || is_group_key(key)
}

/// Deterministic replacement for a non-conforming key
///
/// `rewrite_key(KeyKind::Field, "hero title")` always yields the same
/// `field_<13 hex>` string.
pub fn rewrite_key(kind: KeyKind, original: &str) -> String {
    let digest = format!("{:x}", Md5::digest(original.as_bytes()));
    format!("{}_{}", kind.prefix(), &digest[..REWRITE_HASH_LEN])
}

/// Are the map's keys exactly "0", "1", ... "n-1", in that order?
///
/// This is the one test deciding list versus map, used when decoding PHP
/// arrays and again when rendering them, so both directions agree. An empty
/// map counts as a list, as an empty PHP array does.
pub fn is_sequential_keys(map: &Map<String, Value>) -> bool {
    map.keys()
        .enumerate()
        .all(|(index, key)| key.parse::<usize>().map_or(false, |k| k == index) && canonical_index(key))
}

/// "0" and "12" are integer keys in PHP, "012" and "+1" are strings
pub fn canonical_index(key: &str) -> bool {
    !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'))
}
