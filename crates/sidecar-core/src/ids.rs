//! Id minting for requests and input streams.

/// Mint a fresh id of the form `<prefix>_<16 hex chars>`.
pub fn new_id(prefix: &str) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &raw[..16])
}
