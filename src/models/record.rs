// src/models/record.rs

//! Canonical earthquake bulletin record.
//!
//! Both upstream agencies are parsed into the same [`EqkRecord`]. The
//! bulletin flavour is carried by [`BulletinKind`] instead of a type per
//! flavour; combined JMA bulletins are assembled with [`EqkRecord::merge`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Upstream agency a bulletin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Kma,
    Jma,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Kma => "kma",
            Source::Jma => "jma",
        }
    }

    /// Target pixel sizes of the bulletin images, in image order.
    pub fn image_sizes(self) -> &'static [(u32, u32)] {
        match self {
            Source::Kma => &[(450, 444), (550, 471)],
            Source::Jma => &[(550, 449)],
        }
    }

    /// Maximum number of images a bulletin of this source carries.
    pub fn max_images(self) -> usize {
        self.image_sizes().len()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bulletin flavour within a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletinKind {
    /// KMA earthquake information (tp = 3)
    KmaInfo,
    /// KMA breaking earthquake information (tp = 14)
    KmaBreaking,
    /// JMA 震度速報
    JmaIntensity,
    /// JMA 震源に関する情報
    JmaHypocenter,
    /// JMA 震源・震度に関する情報
    JmaCombined,
}

impl BulletinKind {
    pub fn source(self) -> Source {
        match self {
            BulletinKind::KmaInfo | BulletinKind::KmaBreaking => Source::Kma,
            _ => Source::Jma,
        }
    }
}

/// Notification relevance tier; `None` at call sites means "do not notify".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotifyTier {
    #[serde(rename = "case_0")]
    Case0,
    #[serde(rename = "case_1")]
    Case1,
    #[serde(rename = "case_2")]
    Case2,
    #[serde(rename = "case_3")]
    Case3,
}

impl NotifyTier {
    /// Key of this tier in the template file.
    pub fn key(self) -> &'static str {
        match self {
            NotifyTier::Case0 => "case_0",
            NotifyTier::Case1 => "case_1",
            NotifyTier::Case2 => "case_2",
            NotifyTier::Case3 => "case_3",
        }
    }
}

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where an earthquake happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Location {
    /// Structured region phrase (KMA), e.g. `경북 경주시 남남서쪽 9km`
    Region {
        wide: String,
        city: String,
        direction: String,
        distance: u32,
        depth: Option<f64>,
        code: Option<String>,
        coordinate: Option<Coordinate>,
    },
    /// Named hypocenter (JMA)
    Hypocenter {
        name: String,
        coordinate: Coordinate,
        depth: Option<f64>,
    },
}

/// An image attached to a bulletin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub name: String,
}

impl ImageRef {
    /// Build a reference whose file name is the last URL path segment.
    pub fn from_url(url: impl Into<String>, prefix: &str) -> Self {
        let url = url.into();
        let base = crate::utils::url::file_name(&url).unwrap_or_default();
        let name = format!("{prefix}{base}");
        Self { url, name }
    }
}

/// One parsed earthquake bulletin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqkRecord {
    pub source: Source,
    /// Dedup key, unique within `source`
    pub id: String,
    pub kind: BulletinKind,
    #[serde(with = "datetime_format::option")]
    pub occurred_at: Option<NaiveDateTime>,
    #[serde(with = "datetime_format")]
    pub announced_at: NaiveDateTime,
    pub magnitude: Option<f64>,
    pub max_intensity: Option<u8>,
    pub location: Option<Location>,
    #[serde(default)]
    pub region_intensity: BTreeMap<String, u8>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl EqkRecord {
    /// Create a record carrying only identity fields.
    pub fn new(id: impl Into<String>, kind: BulletinKind, announced_at: NaiveDateTime) -> Self {
        Self {
            source: kind.source(),
            id: id.into(),
            kind,
            occurred_at: None,
            announced_at,
            magnitude: None,
            max_intensity: None,
            location: None,
            region_intensity: BTreeMap::new(),
            note: String::new(),
            images: Vec::new(),
        }
    }

    /// Union of two records; fields already present on `self` win.
    pub fn merge(self, other: EqkRecord) -> EqkRecord {
        let mut region_intensity = other.region_intensity;
        region_intensity.extend(self.region_intensity);

        EqkRecord {
            source: self.source,
            id: self.id,
            kind: self.kind,
            occurred_at: self.occurred_at.or(other.occurred_at),
            announced_at: self.announced_at,
            magnitude: self.magnitude.or(other.magnitude),
            max_intensity: self.max_intensity.or(other.max_intensity),
            location: self.location.or(other.location),
            region_intensity,
            note: if self.note.is_empty() {
                other.note
            } else {
                self.note
            },
            images: if self.images.is_empty() {
                other.images
            } else {
                self.images
            },
        }
    }

    /// Hypocenter name, when the location is hypocenter-style.
    pub fn hypocenter_name(&self) -> Option<&str> {
        match &self.location {
            Some(Location::Hypocenter { name, .. }) => Some(name),
            _ => None,
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` wire format shared with the mobile client.
pub mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::FORMAT;
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_some(&dt.format(FORMAT).to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| NaiveDateTime::parse_from_str(&raw, FORMAT))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}
