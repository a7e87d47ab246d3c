//! Small shared helpers

/// Build a channel identifier from the accept timestamp and the remote address.
///
/// The format is `<epoch-millis>_<remote-addr>`, unique enough to key a
/// connection for its lifetime and readable in logs.
pub fn channel_id(remote_addr: &str) -> String {
    format!("{}_{}", chrono::Utc::now().timestamp_millis(), remote_addr)
}
