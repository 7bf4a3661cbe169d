//! CPIX client for the DoveRunner KMS.
//!
//! One request document is posted per run. It lists a content key per track
//! type, the DRM systems each key must be usable with, and usage rules tying
//! keys to track types. The response is the same document with key values,
//! IVs and PSSH data filled in.
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use base64::Engine;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::flags::{normalize_track_types, DrmType, EncryptionScheme, FlagEnum, TrackType};
use crate::key::{ContentKeyInfo, MultiDrmInfo};
use crate::pssh::{Pssh, SystemId};

const CPIX_NS: &str = "urn:dashif:org:cpix";
const PSKC_NS: &str = "urn:ietf:params:xml:ns:keyprov:pskc";

/// Build the endpoint URL for a token.
///
/// The token becomes a single path segment and is percent-encoded.
pub fn kms_url(base: &str, enc_token: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| Error::Other(format!("KMS URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .push(enc_token);
    Ok(url)
}

/// Source of content key information.
pub trait KeyInfoClient {
    /// Request keys for `content_id`.
    ///
    /// A track type set containing `ALL_TRACKS` requests one shared key.
    fn get_content_key_info(
        &self,
        content_id: &str,
        drm_types: &BTreeSet<DrmType>,
        encryption_scheme: EncryptionScheme,
        track_types: &BTreeSet<TrackType>,
    ) -> Result<ContentKeyInfo>;
}

impl DrmType {
    /// System id used for this DRM in CPIX documents.
    pub fn system_id(self) -> SystemId {
        match self {
            DrmType::Widevine => SystemId::Widevine,
            DrmType::PlayReady => SystemId::PlayReady,
            DrmType::FairPlay => SystemId::FairPlay,
        }
    }
}

impl TrackType {
    /// Pixel bounds of the video filter for this track type.
    fn pixel_range(self) -> (Option<u32>, Option<u32>) {
        match self {
            TrackType::Sd => (None, Some(442_368)),
            TrackType::Hd => (Some(442_369), Some(2_073_600)),
            TrackType::Uhd1 => (Some(2_073_601), Some(8_847_360)),
            TrackType::Uhd2 => (Some(8_847_361), None),
            TrackType::AllTracks | TrackType::Audio => (None, None),
        }
    }
}

/// A CPIX key request.
#[derive(Debug, Clone)]
pub struct CpixRequest {
    pub content_id: String,
    pub drm_types: BTreeSet<DrmType>,
    pub encryption_scheme: EncryptionScheme,
    /// Requested keys, one per track type.
    pub keys: Vec<(TrackType, Uuid)>,
}

impl CpixRequest {
    /// Create a request with a fresh random key id per track type.
    pub fn new(
        content_id: &str,
        drm_types: &BTreeSet<DrmType>,
        encryption_scheme: EncryptionScheme,
        track_types: &BTreeSet<TrackType>,
    ) -> Self {
        let keys = normalize_track_types(track_types)
            .into_iter()
            .map(|track_type| (track_type, Uuid::new_v4()))
            .collect();

        Self {
            content_id: content_id.to_string(),
            drm_types: drm_types.clone(),
            encryption_scheme,
            keys,
        }
    }

    /// Track type a key id was requested for.
    pub fn track_type_of(&self, kid: &Uuid) -> Option<TrackType> {
        self.keys
            .iter()
            .find(|(_, id)| id == kid)
            .map(|(track_type, _)| *track_type)
    }

    /// Serialize as a CPIX document.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = write!(
            xml,
            r#"<cpix:CPIX id="{}" xmlns:cpix="{}" xmlns:pskc="{}">"#,
            escape_xml(&self.content_id),
            CPIX_NS,
            PSKC_NS
        );

        xml.push_str("<cpix:ContentKeyList>");
        for (_, kid) in self.keys.iter() {
            let _ = write!(
                xml,
                r#"<cpix:ContentKey kid="{}" commonEncryptionScheme="{}"/>"#,
                kid.as_hyphenated(),
                self.encryption_scheme.as_str()
            );
        }
        xml.push_str("</cpix:ContentKeyList>");

        xml.push_str("<cpix:DRMSystemList>");
        for (_, kid) in self.keys.iter() {
            for drm_type in self.drm_types.iter() {
                let _ = write!(
                    xml,
                    r#"<cpix:DRMSystem kid="{}" systemId="{}">"#,
                    kid.as_hyphenated(),
                    drm_type.system_id().to_uuid().as_hyphenated()
                );
                match drm_type {
                    DrmType::FairPlay => {
                        xml.push_str(r#"<cpix:HLSSignalingData playlist="media"/>"#)
                    }
                    DrmType::Widevine | DrmType::PlayReady => xml.push_str("<cpix:PSSH/>"),
                }
                xml.push_str("</cpix:DRMSystem>");
            }
        }
        xml.push_str("</cpix:DRMSystemList>");

        xml.push_str("<cpix:ContentKeyUsageRuleList>");
        for (track_type, kid) in self.keys.iter() {
            let _ = write!(
                xml,
                r#"<cpix:ContentKeyUsageRule kid="{}" intendedTrackType="{}">"#,
                kid.as_hyphenated(),
                track_type.name()
            );
            match track_type {
                TrackType::AllTracks => {}
                TrackType::Audio => xml.push_str("<cpix:AudioFilter/>"),
                _ => {
                    xml.push_str("<cpix:VideoFilter");
                    let (min, max) = track_type.pixel_range();
                    if let Some(min) = min {
                        let _ = write!(xml, r#" minPixels="{}""#, min);
                    }
                    if let Some(max) = max {
                        let _ = write!(xml, r#" maxPixels="{}""#, max);
                    }
                    xml.push_str("/>");
                }
            }
            xml.push_str("</cpix:ContentKeyUsageRule>");
        }
        xml.push_str("</cpix:ContentKeyUsageRuleList>");

        xml.push_str("</cpix:CPIX>");
        xml
    }
}

/// Parse a CPIX response document.
///
/// Keys are returned in document order. A key without a usage rule gets an
/// empty track type.
pub fn parse_response(xml: &str) -> Result<ContentKeyInfo> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "CPIX" {
        return Err(Error::InvalidCpixResponse(format!(
            "Unexpected root element {}",
            root.tag_name().name()
        )));
    }

    let mut track_types = HashMap::new();
    for rule in root
        .descendants()
        .filter(|n| n.tag_name().name() == "ContentKeyUsageRule")
    {
        if let (Some(kid), Some(track_type)) =
            (rule.attribute("kid"), rule.attribute("intendedTrackType"))
        {
            track_types.insert(Uuid::parse_str(kid)?, track_type.to_string());
        }
    }

    let mut infos = Vec::new();
    for node in root
        .descendants()
        .filter(|n| n.tag_name().name() == "ContentKey")
    {
        let kid = node
            .attribute("kid")
            .ok_or_else(|| Error::InvalidCpixResponse("ContentKey without kid".to_string()))?;
        let kid = Uuid::parse_str(kid)?;

        let key = node
            .descendants()
            .find(|n| n.tag_name().name() == "PlainValue")
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::InvalidCpixResponse(format!("No key value for {}", kid.as_hyphenated()))
            })?;

        let mut info = MultiDrmInfo::new(
            track_types.get(&kid).cloned().unwrap_or_default(),
            kid,
            key,
        );
        info.iv = node
            .attribute("explicitIV")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        infos.push(info);
    }

    for system in root
        .descendants()
        .filter(|n| n.tag_name().name() == "DRMSystem")
    {
        let (Some(kid), Some(system_id)) = (system.attribute("kid"), system.attribute("systemId"))
        else {
            continue;
        };
        let kid = Uuid::parse_str(kid)?;
        let Some(system_id) = SystemId::from_uuid(&Uuid::parse_str(system_id)?) else {
            debug!("Ignoring DRMSystem {} for {}", system_id, kid);
            continue;
        };
        let Some(info) = infos.iter_mut().find(|info| info.key_id == kid) else {
            warn!("DRMSystem refers to unknown key {}", kid);
            continue;
        };

        let pssh = child_text(system, "PSSH");
        if let Some(pssh) = pssh.as_deref() {
            inspect_pssh(pssh, system_id);
        }

        match system_id {
            SystemId::Widevine => info.widevine_pssh = pssh,
            SystemId::PlayReady => info.playready_pssh = pssh,
            SystemId::FairPlay | SystemId::FairPlayPackager => {
                info.fairplay_pssh = pssh;
                info.fairplay_hls_key_uri = child_text(system, "HLSSignalingData")
                    .and_then(|data| hls_key_uri(&data));
            }
        }
    }

    Ok(ContentKeyInfo {
        content_id: root.attribute("id").unwrap_or_default().to_string(),
        multidrm_infos: infos,
    })
}

fn child_text(node: roxmltree::Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Extract the `URI` attribute of a base64 encoded `EXT-X-KEY` tag.
fn hls_key_uri(data_b64: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data_b64)
        .ok()?;
    let tag = String::from_utf8(bytes).ok()?;
    let start = tag.find("URI=\"")? + 5;
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].to_string())
}

fn inspect_pssh(data_b64: &str, expected: SystemId) {
    let parsed = base64::engine::general_purpose::STANDARD
        .decode(data_b64)
        .map_err(Error::from)
        .and_then(|bytes| Pssh::from_bytes(&bytes));
    match parsed {
        Ok(pssh) if pssh.system_id == expected.to_uuid() => {
            debug!("{:?} PSSH v{}, {} bytes of init data", expected, pssh.version, pssh.init_data.len());
        }
        Ok(pssh) => {
            warn!("{:?} PSSH carries system id {}", expected, pssh.system_id);
        }
        Err(e) => {
            warn!("Could not parse {:?} PSSH: {}", expected, e);
        }
    }
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Blocking HTTP client for the CPIX endpoint.
#[derive(Debug)]
pub struct CpixClient {
    url: Url,
    client: Client,
}

impl CpixClient {
    /// Create a client for a full endpoint URL (see [`kms_url`]).
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cpix-packager/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { url, client })
    }

    fn post(&self, body: String) -> Result<String> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/xml")
            .body(body)
            .send()?;

        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(Error::KeyService {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

impl KeyInfoClient for CpixClient {
    fn get_content_key_info(
        &self,
        content_id: &str,
        drm_types: &BTreeSet<DrmType>,
        encryption_scheme: EncryptionScheme,
        track_types: &BTreeSet<TrackType>,
    ) -> Result<ContentKeyInfo> {
        let request = CpixRequest::new(content_id, drm_types, encryption_scheme, track_types);
        debug!(
            "Requesting {} key(s) for {} from {}",
            request.keys.len(),
            content_id,
            self.url.host_str().unwrap_or_default()
        );

        let body = self.post(request.to_xml())?;
        let mut info = parse_response(&body)?;

        for key in info.multidrm_infos.iter_mut() {
            if key.track_type.is_empty() {
                if let Some(track_type) = request.track_type_of(&key.key_id) {
                    key.track_type = track_type.name().to_string();
                }
            }
        }

        debug!("Received {} key(s)", info.multidrm_infos.len());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const KID_AUDIO: &str = "6f2a1b0c-3d4e-4f50-8a61-7b8c9d0e1f20";
    const KID_HD: &str = "0b1c2d3e-4f50-4162-9374-8596a7b8c9da";

    const WIDEVINE_PSSH: &str = "AAAAW3Bzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAADsIARIQ62dqu8s0Xpa7z2FmMPGj2hoNd2lkZXZpbmVfdGVzdCIQZmtqM2xqYVNkZmFsa3IzaioCSEQyAA==";

    fn response() -> String {
        let hls = base64::engine::general_purpose::STANDARD.encode(
            r#"#EXT-X-KEY:METHOD=SAMPLE-AES,URI="skd://key-id",KEYFORMAT="com.apple.streamingkeydelivery",KEYFORMATVERSIONS="1""#,
        );
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<cpix:CPIX xmlns:cpix="urn:dashif:org:cpix" xmlns:pskc="urn:ietf:params:xml:ns:keyprov:pskc" id="movie-1">
  <cpix:ContentKeyList>
    <cpix:ContentKey kid="{KID_AUDIO}" explicitIV="AAECAwQFBgcICQoLDA0ODw==" commonEncryptionScheme="cbcs">
      <cpix:Data><pskc:Secret><pskc:PlainValue>EBESExQVFhcYGRobHB0eHw==</pskc:PlainValue></pskc:Secret></cpix:Data>
    </cpix:ContentKey>
    <cpix:ContentKey kid="{KID_HD}" commonEncryptionScheme="cbcs">
      <cpix:Data><pskc:Secret><pskc:PlainValue>ICEiIyQlJicoKSorLC0uLw==</pskc:PlainValue></pskc:Secret></cpix:Data>
    </cpix:ContentKey>
  </cpix:ContentKeyList>
  <cpix:DRMSystemList>
    <cpix:DRMSystem kid="{KID_AUDIO}" systemId="edef8ba9-79d6-4ace-a3c8-27dcd51d21ed">
      <cpix:PSSH>{WIDEVINE_PSSH}</cpix:PSSH>
    </cpix:DRMSystem>
    <cpix:DRMSystem kid="{KID_AUDIO}" systemId="94ce86fb-07ff-4f43-adb8-93d2fa968ca2">
      <cpix:HLSSignalingData playlist="media">{hls}</cpix:HLSSignalingData>
    </cpix:DRMSystem>
    <cpix:DRMSystem kid="{KID_AUDIO}" systemId="1077efec-c0b2-4d02-ace3-3c1e52e2fb4b">
      <cpix:PSSH>AAAA</cpix:PSSH>
    </cpix:DRMSystem>
  </cpix:DRMSystemList>
  <cpix:ContentKeyUsageRuleList>
    <cpix:ContentKeyUsageRule kid="{KID_AUDIO}" intendedTrackType="AUDIO"><cpix:AudioFilter/></cpix:ContentKeyUsageRule>
    <cpix:ContentKeyUsageRule kid="{KID_HD}" intendedTrackType="HD"><cpix:VideoFilter minPixels="442369" maxPixels="2073600"/></cpix:ContentKeyUsageRule>
  </cpix:ContentKeyUsageRuleList>
</cpix:CPIX>"#
        )
    }

    #[test]
    fn kms_url_appends_encoded_token() {
        let url = kms_url("https://kms.example.com/v2/cpix/getKey/", "abc123").expect("url");
        assert_eq!(url.as_str(), "https://kms.example.com/v2/cpix/getKey/abc123");

        let url = kms_url("https://kms.example.com/getKey", "a/b?c").expect("url");
        assert_eq!(url.as_str(), "https://kms.example.com/getKey/a%2Fb%3Fc");

        assert!(kms_url("not a url", "abc").is_err());
    }

    #[test]
    fn request_collapses_all_tracks() {
        let request = CpixRequest::new(
            "movie-1",
            &BTreeSet::from([DrmType::Widevine, DrmType::PlayReady]),
            EncryptionScheme::Cenc,
            &BTreeSet::from([TrackType::Hd, TrackType::AllTracks]),
        );
        assert_eq!(request.keys.len(), 1);
        assert_eq!(request.keys[0].0, TrackType::AllTracks);

        let xml = request.to_xml();
        let doc = roxmltree::Document::parse(&xml).expect("request is well-formed");
        let root = doc.root_element();
        assert_eq!(root.attribute("id"), Some("movie-1"));
        assert_eq!(
            root.descendants()
                .filter(|n| n.tag_name().name() == "DRMSystem")
                .count(),
            2
        );
        assert!(!xml.contains("VideoFilter"));
        assert!(xml.contains(r#"commonEncryptionScheme="cenc""#));
        assert!(xml.contains(r#"intendedTrackType="ALL_TRACKS""#));
    }

    #[test]
    fn request_has_one_key_per_track_type() {
        let request = CpixRequest::new(
            "a&b",
            &BTreeSet::from([DrmType::FairPlay]),
            EncryptionScheme::Cbcs,
            &BTreeSet::from([TrackType::Audio, TrackType::Sd, TrackType::Uhd2]),
        );
        assert_eq!(request.keys.len(), 3);
        let (_, sd_kid) = request.keys[1];
        assert_eq!(request.track_type_of(&sd_kid), Some(TrackType::Sd));

        let xml = request.to_xml();
        roxmltree::Document::parse(&xml).expect("request is well-formed");
        assert!(xml.contains(r#"id="a&amp;b""#));
        assert!(xml.contains("<cpix:AudioFilter/>"));
        assert!(xml.contains(r#"<cpix:VideoFilter maxPixels="442368"/>"#));
        assert!(xml.contains(r#"<cpix:VideoFilter minPixels="8847361"/>"#));
        assert!(xml.contains(r#"systemId="94ce86fb-07ff-4f43-adb8-93d2fa968ca2""#));
        assert!(xml.contains(r#"<cpix:HLSSignalingData playlist="media"/>"#));
    }

    #[test]
    fn parse_response_keeps_document_order() {
        let info = parse_response(&response()).expect("parse response");
        assert_eq!(info.content_id, "movie-1");
        assert_eq!(info.multidrm_infos.len(), 2);

        let audio = &info.multidrm_infos[0];
        assert_eq!(audio.track_type, "AUDIO");
        assert_eq!(audio.key_id, Uuid::parse_str(KID_AUDIO).expect("uuid"));
        assert_eq!(audio.key, "EBESExQVFhcYGRobHB0eHw==");
        assert_eq!(audio.iv.as_deref(), Some("AAECAwQFBgcICQoLDA0ODw=="));
        assert_eq!(audio.widevine_pssh.as_deref(), Some(WIDEVINE_PSSH));
        assert_eq!(audio.playready_pssh, None);
        assert_eq!(audio.fairplay_hls_key_uri.as_deref(), Some("skd://key-id"));

        let hd = &info.multidrm_infos[1];
        assert_eq!(hd.track_type, "HD");
        assert_eq!(hd.iv, None);
        assert_eq!(hd.widevine_pssh, None);
    }

    #[test]
    fn parse_response_rejects_missing_key() {
        let xml = format!(
            r#"<cpix:CPIX xmlns:cpix="{CPIX_NS}"><cpix:ContentKeyList><cpix:ContentKey kid="{KID_HD}"/></cpix:ContentKeyList></cpix:CPIX>"#
        );
        let err = parse_response(&xml).unwrap_err();
        assert!(matches!(err, Error::InvalidCpixResponse(_)));

        let err = parse_response("<Error>denied</Error>").unwrap_err();
        assert!(matches!(err, Error::InvalidCpixResponse(_)));

        assert!(matches!(parse_response("<cpix:CPIX").unwrap_err(), Error::XmlError(_)));
    }

    #[test]
    fn parse_empty_key_list() {
        let xml = format!(r#"<cpix:CPIX xmlns:cpix="{CPIX_NS}" id="x"><cpix:ContentKeyList/></cpix:CPIX>"#);
        let info = parse_response(&xml).expect("parse response");
        assert!(info.is_empty());
    }

    #[test]
    fn client_posts_request_and_parses_keys() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/getKey/token-1")
            .match_header("content-type", "application/xml")
            .match_body(mockito::Matcher::Regex(r#"id="movie-1""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(response())
            .create();

        let url = kms_url(&format!("{}/getKey/", server.url()), "token-1").expect("url");
        let client = CpixClient::new(url).expect("client");
        let info = client
            .get_content_key_info(
                "movie-1",
                &BTreeSet::from([DrmType::Widevine, DrmType::FairPlay]),
                EncryptionScheme::Cbcs,
                &BTreeSet::from([TrackType::Audio, TrackType::Hd]),
            )
            .expect("key info");

        mock.assert();
        assert_eq!(info.multidrm_infos.len(), 2);
        assert_eq!(info.multidrm_infos[1].track_type, "HD");
    }

    #[test]
    fn client_reports_error_status() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/getKey/bad")
            .with_status(401)
            .with_body("invalid token")
            .create();

        let url = kms_url(&format!("{}/getKey/", server.url()), "bad").expect("url");
        let client = CpixClient::new(url).expect("client");
        let err = client
            .get_content_key_info(
                "movie-1",
                &BTreeSet::from([DrmType::Widevine]),
                EncryptionScheme::Cenc,
                &BTreeSet::from([TrackType::AllTracks]),
            )
            .unwrap_err();

        mock.assert();
        match err {
            Error::KeyService { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            Error::KeyService { status: 401, body: String::new() }.category(),
            "KeyServiceError"
        );
    }
}
