use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use tracing::error;

/// Number of random bytes behind every asset name.
pub const ASSET_ID_BYTES: usize = 32;

/// Storage key of an uploaded object: `<prefix>/<random id><ext>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(prefix: &str, media_type: &str) -> Self {
        Self(format!("{}/{}", prefix, asset_file_name(media_type)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        self.0.split_once('/').map(|(prefix, _)| prefix).unwrap_or("")
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Random asset name with an extension derived from `media_type`.
pub fn asset_file_name(media_type: &str) -> String {
    format!("{}{}", random_asset_id(), media_type_to_ext(media_type))
}

/// 32 bytes from the OS CSPRNG, unpadded URL-safe base64.
///
/// An entropy source that cannot deliver is not something the service can
/// work around; the process aborts instead of handing out guessable names.
pub fn random_asset_id() -> String {
    let mut base = [0u8; ASSET_ID_BYTES];
    if let Err(e) = OsRng.try_fill_bytes(&mut base) {
        error!("[assets] failed to generate random bytes: {}", e);
        std::process::abort();
    }
    URL_SAFE_NO_PAD.encode(base)
}

/// `video/mp4` -> `.mp4`; anything that is not `type/subtype` -> `.bin`.
pub fn media_type_to_ext(media_type: &str) -> String {
    let essence = media_type.split(';').next().unwrap_or("").trim();
    let parts: Vec<&str> = essence.split('/').collect();
    match parts.as_slice() {
        [kind, subtype] if !kind.is_empty() && !subtype.is_empty() => format!(".{}", subtype),
        _ => ".bin".to_string(),
    }
}
