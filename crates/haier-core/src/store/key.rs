// Filesystem-safe cache keys.
//
// Keys are percent-encoded on the way to disk: only ASCII alphanumerics and
// `-_.~` survive, so path separators, spaces and non-ASCII never reach a
// filename. `unescape_key(escape_key(k)) == k` for every string `k`.

use std::borrow::Cow;

pub fn escape_key(key: &str) -> Cow<'_, str> {
    urlencoding::encode(key)
}

/// Reverse [`escape_key`]; `None` when the name is not a valid escaped key.
pub fn unescape_key(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(Cow::into_owned)
}
