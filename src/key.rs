//! Key information returned by the KMS.
//!
//! Binary values stay base64 encoded as they appear in the CPIX response; the
//! packager module converts them to hex.
use uuid::Uuid;

/// One content key and the DRM data bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiDrmInfo {
    /// Track type the key was issued for (e.g. `ALL_TRACKS`, `HD`).
    pub track_type: String,
    /// Key ID.
    pub key_id: Uuid,
    /// Content key, base64.
    pub key: String,
    /// Explicit IV, base64.
    pub iv: Option<String>,
    /// Widevine PSSH box, base64.
    pub widevine_pssh: Option<String>,
    /// PlayReady PSSH box, base64.
    pub playready_pssh: Option<String>,
    /// FairPlay PSSH box, base64. Rarely populated.
    pub fairplay_pssh: Option<String>,
    /// FairPlay `EXT-X-KEY` URI.
    pub fairplay_hls_key_uri: Option<String>,
}

impl MultiDrmInfo {
    /// Create a key record without any DRM data.
    pub fn new(track_type: impl Into<String>, key_id: Uuid, key: impl Into<String>) -> Self {
        Self {
            track_type: track_type.into(),
            key_id,
            key: key.into(),
            iv: None,
            widevine_pssh: None,
            playready_pssh: None,
            fairplay_pssh: None,
            fairplay_hls_key_uri: None,
        }
    }
}

/// Keys issued for one content id, in response order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentKeyInfo {
    pub content_id: String,
    pub multidrm_infos: Vec<MultiDrmInfo>,
}

impl ContentKeyInfo {
    pub fn is_empty(&self) -> bool {
        self.multidrm_infos.is_empty()
    }
}
