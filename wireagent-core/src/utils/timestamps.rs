use chrono::Utc;

/// Timestamp in the fabric's wire format (YYYY-MM-DDTHH:MM:SS.fffZ)
pub fn wire_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S.%3fZ").to_string()
}

/// RFC3339 timestamp for the aggregate status document
pub fn rfc3339_timestamp() -> String {
    Utc::now().to_rfc3339()
}
