/// Backend entity identifiers are opaque strings (UUIDs on the wire).
pub type EntityId = String;

/// Phase identifiers, e.g. `"intent"` or `"design_inner"`.
pub type PhaseId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
