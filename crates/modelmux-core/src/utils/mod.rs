//! Small shared helpers: HTTP client construction and wall-clock time.

pub mod http;

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// New request trace id (`req_<uuid>`).
pub fn new_trace_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}
