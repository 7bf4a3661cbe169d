//! Enumerations selected on the command line and their string decoding.
//!
//! DRM types and track types are combinable, so they decode into a
//! [`BTreeSet`] of variants. The encryption scheme is a single value.
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// An enumeration whose members can be named on the command line.
///
/// `MEMBERS` maps the upper-case member name to its variant.
pub trait FlagEnum: Copy + Ord + 'static {
    /// Enumeration name used in error messages.
    const NAME: &'static str;
    /// Upper-case member names and their variants.
    const MEMBERS: &'static [(&'static str, Self)];

    /// Look up a member by its upper-case name.
    fn from_name(name: &str) -> Option<Self> {
        Self::MEMBERS
            .iter()
            .find(|(member, _)| *member == name)
            .map(|(_, value)| *value)
    }

    /// Upper-case member name.
    fn name(self) -> &'static str {
        Self::MEMBERS
            .iter()
            .find(|(_, value)| *value == self)
            .map(|(member, _)| *member)
            .unwrap_or_default()
    }
}

macro_rules! flag_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $member:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl FlagEnum for $name {
            const NAME: &'static str = $label;
            const MEMBERS: &'static [(&'static str, Self)] = &[$(($member, $name::$variant),)+];
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

flag_enum! {
    /// DRM system a key is requested for.
    DrmType("DrmType") {
        Widevine => "WIDEVINE",
        PlayReady => "PLAYREADY",
        FairPlay => "FAIRPLAY",
    }
}

flag_enum! {
    /// Media track class a key is assigned to.
    TrackType("TrackType") {
        /// One key shared by every track. Overrides the other members.
        AllTracks => "ALL_TRACKS",
        Audio => "AUDIO",
        Sd => "SD",
        Hd => "HD",
        Uhd1 => "UHD1",
        Uhd2 => "UHD2",
    }
}

flag_enum! {
    /// Common encryption protection scheme.
    EncryptionScheme("EncryptionScheme") {
        Cenc => "CENC",
        Cbc1 => "CBC1",
        Cens => "CENS",
        Cbcs => "CBCS",
    }
}

impl EncryptionScheme {
    /// Lower-case scheme name as the packager and CPIX expect it.
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionScheme::Cenc => "cenc",
            EncryptionScheme::Cbc1 => "cbc1",
            EncryptionScheme::Cens => "cens",
            EncryptionScheme::Cbcs => "cbcs",
        }
    }
}

impl Default for EncryptionScheme {
    fn default() -> Self {
        EncryptionScheme::Cenc
    }
}

/// Decode a comma-separated list into a set of enumeration members.
///
/// Tokens are trimmed and upper-cased before lookup; duplicates collapse.
/// The first unknown token fails the whole decode.
pub fn parse_flag_enum<E: FlagEnum>(value: &str) -> Result<BTreeSet<E>> {
    value.split(',').map(parse_enum_value::<E>).collect()
}

/// Decode a single enumeration member.
pub fn parse_enum_value<E: FlagEnum>(value: &str) -> Result<E> {
    let token = value.trim().to_uppercase();
    E::from_name(&token).ok_or(Error::InvalidEnumValue {
        name: E::NAME,
        value: token,
    })
}

/// Collapse a track type set to `{ALL_TRACKS}` when it is present.
pub fn normalize_track_types(track_types: &BTreeSet<TrackType>) -> BTreeSet<TrackType> {
    if track_types.contains(&TrackType::AllTracks) {
        BTreeSet::from([TrackType::AllTracks])
    } else {
        track_types.clone()
    }
}
