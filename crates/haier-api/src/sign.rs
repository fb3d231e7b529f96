// Request signing for the Haier cloud.
//
// Every REST call carries a millisecond `timestamp`, a `sequenceId` derived
// from it, and a `sign` header: the SHA-256 of the request path, query,
// serialized body, application identity and timestamp.

use chrono::{Local, TimeZone};
use rand::Rng;
use sha2::{Digest, Sha256};
use url::Url;

/// Application id issued to the mobile app.
pub const APP_ID: &str = "MB-UZHSH-0001";
/// Application secret paired with [`APP_ID`].
pub const APP_KEY: &str = "5dfca8714eb26e3a776e58a8273c8752";

/// Current epoch time in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Compute the `sign` header for a request.
///
/// `body` must be the exact bytes sent on the wire (empty when there is no
/// body). The query string, when present, is included with its leading `?`.
pub fn sign_request(url: &Url, body: &str, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.path().as_bytes());
    if let Some(query) = url.query() {
        hasher.update(b"?");
        hasher.update(query.as_bytes());
    }
    hasher.update(body.as_bytes());
    hasher.update(APP_ID.as_bytes());
    hasher.update(APP_KEY.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a `sequenceId`: local `YYYYMMDDHHmmss` of `timestamp` followed by
/// a random integer below one million.
pub fn sequence_id(timestamp: i64) -> String {
    let stamp = Local
        .timestamp_millis_opt(timestamp)
        .single()
        .unwrap_or_else(Local::now)
        .format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{stamp}{suffix}")
}
