//! File name to object key sanitizing

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

static ILLEGAL_KEY_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._/-]").expect("valid key charset pattern"));

/// Map an arbitrary file name to a storage-safe object key.
///
/// Whitespace runs become a single `-`, then anything other than ASCII
/// letters, digits, `-`, `.`, `_` and `/` is dropped. Distinct names may
/// collide, and a name made only of illegal characters yields `""`.
pub fn sanitize(name: &str) -> String {
    let dashed = WHITESPACE_RUN.replace_all(name, "-");
    ILLEGAL_KEY_CHAR.replace_all(&dashed, "").into_owned()
}
