// src/key_path.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Path-join semantics over flat object keys.
// Keys never start with a separator; `..` is resolved lexically and is not
// confined to the base path.

use crate::constants::KEY_SEPARATOR;

/// Join `base` and `path` the way a POSIX path join would, then normalize.
pub fn join_key(base: &str, path: &str) -> String {
    let joined = match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}{KEY_SEPARATOR}{path}"),
    };
    normalize_key(&joined)
}

/// Collapse repeated separators, drop `.` segments, resolve `..`.
/// A trailing separator on the input is preserved.
pub fn normalize_key(key: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in key.split(KEY_SEPARATOR) {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let mut out = segments.join("/");
    if !out.is_empty() && key.ends_with(KEY_SEPARATOR) {
        out.push(KEY_SEPARATOR);
    }
    out
}

/// Key of the zero-byte placeholder marking a directory.
pub fn dir_key(key: &str) -> String {
    if key.ends_with(KEY_SEPARATOR) {
        key.to_string()
    } else {
        format!("{key}{KEY_SEPARATOR}")
    }
}

pub fn strip_leading_separators(entry: &str) -> &str {
    entry.trim_start_matches(KEY_SEPARATOR)
}
