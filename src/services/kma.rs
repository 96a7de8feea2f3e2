// src/services/kma.rs

//! Korea Meteorological Administration source.
//!
//! The list endpoint is JSON; each entry's `data` value names a detail page
//! rendered as HTML with two labeled tables (per-region intensity and the
//! bulletin itself).

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Deserializer};

use super::{BulletinSource, Listing, parse_selector};
use crate::error::{AppError, Result};
use crate::models::{BulletinKind, Coordinate, EqkRecord, ImageRef, KmaConfig, Location, Source};
use crate::utils::Fetcher;
use crate::utils::url::{resolve, strip_path_params};

/// Wide-area name → administrative code.
pub type RegionCodes = BTreeMap<String, String>;

const TP_INFO: &str = "3";
const TP_BREAKING: &str = "14";

const REGION_TABLE: &str = "table.table-col.eqk-city-ins-table > tbody";
const INFO_TABLE: &str = "div.over-scroll.cont-box-eqk > table > tbody";
const IMAGE_SELECTOR: &str = r#"img[src*="repositary"]"#;

const DATETIME_FORMAT: &str = "%Y년 %m월 %d일 %H시 %M분 %S초";
const ANNOUNCED_FORMAT: &str = "%Y%m%d%H%M";

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\d+").expect("decimal regex"));
static DEPTH_CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.?\d* km$").expect("depth regex"));
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.?\d*").expect("number regex"));
static LEADING_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+").expect("digits regex"));

/// Row labels of the information table, per bulletin type.
struct Labels {
    datetime: &'static str,
    magnitude: &'static str,
    max_intensity: &'static str,
    location: &'static str,
    note: &'static str,
}

impl Labels {
    fn for_kind(kind: BulletinKind) -> Self {
        match kind {
            BulletinKind::KmaBreaking => Self {
                datetime: "발생시각",
                magnitude: "추정규모",
                max_intensity: "예상진도",
                location: "추정위치",
                note: "참고사항",
            },
            _ => Self {
                datetime: "발생시각",
                magnitude: "규모(불확도)",
                max_intensity: "계기진도",
                location: "발생위치(위도,경도,불확도)",
                note: "참고사항",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    tp: String,
    #[serde(default, deserialize_with = "lenient_string")]
    tm_fc: String,
    #[serde(default, deserialize_with = "lenient_string")]
    tm_seq: String,
    #[serde(default, deserialize_with = "lenient_string")]
    data: String,
}

/// Accept strings, numbers and nulls for list fields.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
        Raw::Other(_) => String::new(),
    })
}

/// Newest earthquake entry of the list endpoint body.
pub fn parse_listing(body: &str, detail_url: &str) -> Result<Option<Listing>> {
    let entries: Vec<ListEntry> =
        serde_json::from_str(body).map_err(|e| AppError::parse("list", e))?;

    let Some(entry) = entries
        .into_iter()
        .find(|entry| entry.tp == TP_INFO || entry.tp == TP_BREAKING)
    else {
        return Ok(None);
    };

    let kind = if entry.tp == TP_INFO {
        BulletinKind::KmaInfo
    } else {
        BulletinKind::KmaBreaking
    };
    let url = url::Url::parse_with_params(detail_url, [("eqk", entry.data.as_str())])?;

    Ok(Some(Listing {
        key: entry.data,
        kind,
        url: url.to_string(),
        announced_raw: Some(entry.tm_fc),
        sequence: Some(entry.tm_seq),
    }))
}

/// Parse a detail page into a record.
pub fn parse_detail(
    html: &str,
    listing: &Listing,
    codes: &RegionCodes,
    base_url: &str,
) -> Result<EqkRecord> {
    let document = Html::parse_document(html);
    let labels = Labels::for_kind(listing.kind);

    let region_intensity = parse_region_table(&document)?;
    let (info, cells) = parse_info_table(&document)?;
    let field = |label: &str| {
        info.get(label)
            .map(String::as_str)
            .ok_or_else(|| AppError::parse(label, "row missing from information table"))
    };

    let occurred_at = NaiveDateTime::parse_from_str(field(labels.datetime)?, DATETIME_FORMAT)
        .map_err(|e| AppError::parse("occurred_at", e))?;

    let announced_raw = listing
        .announced_raw
        .as_deref()
        .ok_or_else(|| AppError::parse("announced_at", "listing has no tmFc"))?;
    let announced_at = NaiveDateTime::parse_from_str(announced_raw, ANNOUNCED_FORMAT)
        .map_err(|e| AppError::parse("announced_at", e))?;

    let sequence = listing
        .sequence
        .as_deref()
        .filter(|seq| !seq.is_empty())
        .ok_or_else(|| AppError::parse("id", "listing has no tmSeq"))?;
    let id = format!("{}{:0>4}", occurred_at.format("%Y%m%d"), sequence);

    let max_intensity_cell = field(labels.max_intensity)?;
    let max_intensity = roman_intensity(max_intensity_cell).ok_or_else(|| {
        AppError::parse(
            "max_intensity",
            format!("no intensity marker in '{max_intensity_cell}'"),
        )
    })?;

    let magnitude = DECIMAL
        .find(field(labels.magnitude)?)
        .and_then(|m| m.as_str().parse::<f64>().ok());

    let depth = if listing.kind == BulletinKind::KmaInfo {
        cells
            .iter()
            .find(|cell| DEPTH_CELL.is_match(cell))
            .and_then(|cell| LEADING_NUMBER.find(cell))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    } else {
        None
    };

    let location = parse_location(field(labels.location)?, depth, codes)?;
    let note = field(labels.note)?.to_string();
    let images = parse_images(&document, base_url, Source::Kma.max_images())?;

    let mut record = EqkRecord::new(id, listing.kind, announced_at);
    record.occurred_at = Some(occurred_at);
    record.magnitude = magnitude;
    record.max_intensity = Some(max_intensity);
    record.location = Some(location);
    record.region_intensity = region_intensity;
    record.note = note;
    record.images = images;
    Ok(record)
}

/// Map the first roman numeral Ⅰ–Ⅹ in `text` to 1–10.
pub fn roman_intensity(text: &str) -> Option<u8> {
    text.chars()
        .find(|c| ('\u{2160}'..='\u{2169}').contains(c))
        .map(|c| (c as u32 - 0x2160 + 1) as u8)
}

fn clean_cell(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .chars()
        .filter(|c| !matches!(c, '\r' | '\t' | '\u{a0}'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_region_table(document: &Html) -> Result<BTreeMap<String, u8>> {
    let table_sel = parse_selector(REGION_TABLE)?;
    let row_sel = parse_selector("tr")?;
    let th_sel = parse_selector("th")?;
    let img_sel = parse_selector("td img[alt]")?;

    let mut regions = BTreeMap::new();
    let Some(table) = document.select(&table_sel).next() else {
        log::debug!("Detail page has no region intensity table");
        return Ok(regions);
    };

    for row in table.select(&row_sel) {
        let Some(th) = row.select(&th_sel).next() else {
            continue;
        };
        let region = clean_cell(th);
        let alt = row
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .map(str::trim)
            .unwrap_or_default();

        let intensity = (alt.chars().count() == 1)
            .then(|| roman_intensity(alt))
            .flatten()
            .ok_or_else(|| {
                AppError::parse(
                    "region_intensity",
                    format!("unknown marker '{alt}' for region '{region}'"),
                )
            })?;
        regions.insert(region, intensity);
    }
    Ok(regions)
}

/// Labeled rows of the information table plus every cell text in order.
fn parse_info_table(document: &Html) -> Result<(BTreeMap<String, String>, Vec<String>)> {
    let table_sel = parse_selector(INFO_TABLE)?;
    let row_sel = parse_selector("tr")?;
    let th_sel = parse_selector("th")?;
    let td_sel = parse_selector("td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| AppError::parse("information", "information table missing"))?;

    let mut rows = BTreeMap::new();
    let mut cells = Vec::new();
    for row in table.select(&row_sel) {
        let texts: Vec<String> = row.select(&td_sel).map(clean_cell).collect();
        if let (Some(th), Some(first)) = (row.select(&th_sel).next(), texts.first()) {
            rows.insert(clean_cell(th), first.clone());
        }
        cells.extend(texts);
    }
    Ok((rows, cells))
}

/// Split `경북 경주시 남남서쪽 9km 지역(...)` into its parts.
fn parse_location(cell: &str, depth: Option<f64>, codes: &RegionCodes) -> Result<Location> {
    let phrase = cell.split('(').next().unwrap_or_default();
    let tokens: Vec<&str> = phrase.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err(AppError::parse(
            "location",
            format!("expected at least four words in '{phrase}'"),
        ));
    }

    let n = tokens.len();
    let wide = tokens[0].to_string();
    let distance = LEADING_DIGITS
        .find(tokens[n - 2])
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| AppError::parse("location", format!("bad distance '{}'", tokens[n - 2])))?;

    let mut numbers = DECIMAL
        .find_iter(cell)
        .filter_map(|m| m.as_str().parse::<f64>().ok());
    let coordinate = match (numbers.next(), numbers.next()) {
        (Some(latitude), Some(longitude)) => Some(Coordinate {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(Location::Region {
        code: codes.get(&wide).cloned(),
        wide,
        city: tokens[1..n - 3].join(" "),
        direction: tokens[n - 3].to_string(),
        distance,
        depth,
        coordinate,
    })
}

fn parse_images(document: &Html, base_url: &str, max: usize) -> Result<Vec<ImageRef>> {
    let img_sel = parse_selector(IMAGE_SELECTOR)?;
    Ok(document
        .select(&img_sel)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| ImageRef::from_url(resolve(base_url, strip_path_params(src)), ""))
        .take(max)
        .collect())
}

/// KMA bulletin source.
pub struct KmaSource {
    config: KmaConfig,
    codes: Arc<RegionCodes>,
}

impl KmaSource {
    pub fn new(config: KmaConfig, codes: Arc<RegionCodes>) -> Self {
        Self { config, codes }
    }
}

#[async_trait]
impl BulletinSource for KmaSource {
    fn source(&self) -> Source {
        Source::Kma
    }

    async fn latest(&self, fetcher: &Fetcher) -> Result<Option<Listing>> {
        let response = fetcher.fetch(&self.config.list_url, &[]).await?;
        parse_listing(&response.text(), &self.config.detail_url)
    }

    async fn fetch_record(&self, fetcher: &Fetcher, listing: &Listing) -> Result<EqkRecord> {
        let response = fetcher.fetch(&listing.url, &[]).await?;
        parse_detail(&response.text(), listing, &self.codes, &self.config.base_url)
    }
}
