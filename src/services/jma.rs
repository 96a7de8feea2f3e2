// src/services/jma.rs

//! Japan Meteorological Agency source.
//!
//! The Atom feed lists every bulletin; only the three seismic titles are
//! interesting. Each entry links to a JMA XML report. The map image is not
//! part of the report and is scraped from the public quake pages instead.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use scraper::Html;
use serde::Deserialize;

use super::xml::XmlElement;
use super::{BulletinSource, Listing, parse_selector};
use crate::error::{AppError, Result};
use crate::models::{BulletinKind, Coordinate, EqkRecord, ImageRef, JmaConfig, Location, Source};
use crate::utils::Fetcher;
use crate::utils::url::resolve;

const TITLE_INTENSITY: &str = "震度速報";
const TITLE_HYPOCENTER: &str = "震源に関する情報";
const TITLE_COMBINED: &str = "震源・震度に関する情報";

const IMAGE_PREFIX: &str = "jma_eq_";

static ISO6709_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-]\d+(?:\.\d+)?").expect("coordinate regex"));

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: String,
    id: String,
    link: Link,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: String,
}

fn kind_for_title(title: &str) -> Option<BulletinKind> {
    match title.trim() {
        TITLE_INTENSITY => Some(BulletinKind::JmaIntensity),
        TITLE_HYPOCENTER => Some(BulletinKind::JmaHypocenter),
        TITLE_COMBINED => Some(BulletinKind::JmaCombined),
        _ => None,
    }
}

/// Newest seismic entry of the Atom feed.
pub fn parse_feed(xml: &str) -> Result<Option<Listing>> {
    let feed: Feed = quick_xml::de::from_str(xml).map_err(|e| AppError::parse("feed", e))?;

    Ok(feed.entries.into_iter().find_map(|entry| {
        let kind = kind_for_title(&entry.title)?;
        Some(Listing {
            key: entry.id.trim().to_string(),
            kind,
            url: entry.link.href,
            announced_raw: None,
            sequence: None,
        })
    }))
}

/// Map a JMA seismic intensity class to the integer scale.
pub fn intensity_class(class: &str) -> Option<u8> {
    match class.trim() {
        "0" => Some(0),
        "1" => Some(1),
        "2" => Some(2),
        "3" => Some(3),
        "4" => Some(4),
        "5-" => Some(5),
        "5+" => Some(6),
        "6-" => Some(7),
        "6+" => Some(8),
        "7" => Some(9),
        _ => None,
    }
}

fn required<'a>(root: &'a XmlElement, path: &[&str], field: &str) -> Result<&'a XmlElement> {
    root.find_path(path)
        .ok_or_else(|| AppError::parse(field, format!("<{}> missing", path.join("/"))))
}

fn parse_timestamp(raw: &str, field: &str) -> Result<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.naive_local())
        .map_err(|e| AppError::parse(field, e))
}

fn parse_intensity(raw: &str, field: &str) -> Result<u8> {
    intensity_class(raw)
        .ok_or_else(|| AppError::parse(field, format!("unknown intensity class '{raw}'")))
}

/// Parse a JMA XML report into a record of the listing's kind.
///
/// Combined bulletins carry both parts; they are parsed separately and
/// merged onto the combined record.
pub fn parse_report(xml: &str, listing: &Listing) -> Result<EqkRecord> {
    let root = XmlElement::parse(xml)?;
    let announced_at = parse_timestamp(
        required(&root, &["ReportDateTime"], "announced_at")?.text(),
        "announced_at",
    )?;
    let base = EqkRecord::new(listing.key.clone(), listing.kind, announced_at);

    match listing.kind {
        BulletinKind::JmaIntensity => intensity_part(&root, base),
        BulletinKind::JmaHypocenter => hypocenter_part(&root, base),
        BulletinKind::JmaCombined => {
            let hypocenter = hypocenter_part(&root, base.clone())?;
            let intensity = intensity_part(&root, base.clone())?;
            Ok(base.merge(hypocenter).merge(intensity))
        }
        other => Err(AppError::parse(
            "kind",
            format!("{other:?} is not a JMA bulletin"),
        )),
    }
}

fn intensity_part(root: &XmlElement, mut record: EqkRecord) -> Result<EqkRecord> {
    let observation = required(root, &["Observation"], "max_intensity")?;
    let max = observation
        .child("MaxInt")
        .ok_or_else(|| AppError::parse("max_intensity", "<Observation/MaxInt> missing"))?;
    record.max_intensity = Some(parse_intensity(max.text(), "max_intensity")?);

    let mut regions = BTreeMap::new();
    for area in observation
        .children_named("Pref")
        .flat_map(|pref| pref.children_named("Area"))
    {
        let name = area
            .child("Name")
            .map(XmlElement::text)
            .ok_or_else(|| AppError::parse("region_intensity", "<Area/Name> missing"))?;
        let value = area
            .child("MaxInt")
            .map(XmlElement::text)
            .ok_or_else(|| AppError::parse("region_intensity", "<Area/MaxInt> missing"))?;
        regions.insert(name.to_string(), parse_intensity(value, "region_intensity")?);
    }
    record.region_intensity = regions;

    if let Some(comment) = root.find_path(&["ForecastComment", "Text"]) {
        record.note = comment.text().to_string();
    }
    Ok(record)
}

fn hypocenter_part(root: &XmlElement, mut record: EqkRecord) -> Result<EqkRecord> {
    record.occurred_at = Some(parse_timestamp(
        required(root, &["OriginTime"], "occurred_at")?.text(),
        "occurred_at",
    )?);

    let hypocenter = required(root, &["Hypocenter"], "hypocenter")?;
    let name = hypocenter
        .find("Name")
        .map(XmlElement::text)
        .ok_or_else(|| AppError::parse("hypocenter", "<Hypocenter//Name> missing"))?;

    let raw_magnitude = required(root, &["Magnitude"], "magnitude")?.text();
    record.magnitude = match raw_magnitude {
        "NaN" => None,
        raw => Some(
            raw.parse::<f64>()
                .map_err(|e| AppError::parse("magnitude", format!("'{raw}': {e}")))?,
        ),
    };

    let raw_coordinate = hypocenter
        .find("Coordinate")
        .map(XmlElement::text)
        .ok_or_else(|| AppError::parse("coordinate", "<Hypocenter//Coordinate> missing"))?;
    let (coordinate, depth) = parse_iso6709(raw_coordinate)?;

    record.location = Some(Location::Hypocenter {
        name: name.to_string(),
        coordinate,
        depth,
    });

    if let Some(comment) = root.find_path(&["ForecastComment", "Text"]) {
        record.note = comment.text().to_string();
    }
    Ok(record)
}

/// `+35.8+129.2-10000/` → coordinate and depth in km.
fn parse_iso6709(raw: &str) -> Result<(Coordinate, Option<f64>)> {
    let parts: Vec<f64> = ISO6709_PART
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();

    match parts.as_slice() {
        [latitude, longitude, rest @ ..] => Ok((
            Coordinate {
                latitude: *latitude,
                longitude: *longitude,
            },
            rest.first().map(|metres| metres.abs() / 1000.0),
        )),
        _ => Err(AppError::parse(
            "coordinate",
            format!("'{raw}' is not an ISO 6709 point"),
        )),
    }
}

/// Detail page linked from a quake index page.
pub fn parse_image_index(html: &str, index_url: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let link_sel = parse_selector("div.infotable a[href]")?;
    document
        .select(&link_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| resolve(index_url, href))
        .ok_or_else(|| AppError::parse("image", "index page has no bulletin link"))
}

/// Map image of a quake detail page.
pub fn parse_image_page(html: &str, page_url: &str) -> Result<ImageRef> {
    let document = Html::parse_document(html);
    let img_sel = parse_selector(r##"img[usemap="#quakemap"]"##)?;
    document
        .select(&img_sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| ImageRef::from_url(resolve(page_url, src), IMAGE_PREFIX))
        .ok_or_else(|| AppError::parse("image", "detail page has no quake map"))
}

/// JMA bulletin source.
pub struct JmaSource {
    config: JmaConfig,
}

impl JmaSource {
    pub fn new(config: JmaConfig) -> Self {
        Self { config }
    }

    fn index_url(&self, kind: BulletinKind) -> &str {
        match kind {
            BulletinKind::JmaIntensity => &self.config.intensity_index_url,
            BulletinKind::JmaHypocenter => &self.config.hypocenter_index_url,
            _ => &self.config.combined_index_url,
        }
    }

    /// HTTP failures on the map pages surface as a parse error on `image`.
    async fn fetch_image(&self, fetcher: &Fetcher, kind: BulletinKind) -> Result<ImageRef> {
        let index_url = self.index_url(kind);
        let index = fetcher.fetch(index_url, &[]).await.map_err(image_error)?;
        let page_url = parse_image_index(&index.text(), index_url)?;
        let page = fetcher.fetch(&page_url, &[]).await.map_err(image_error)?;
        parse_image_page(&page.text(), &page_url)
    }
}

fn image_error(err: AppError) -> AppError {
    match err {
        AppError::UpstreamProtocol { .. } | AppError::Http(_) => AppError::parse("image", err),
        other => other,
    }
}

#[async_trait]
impl BulletinSource for JmaSource {
    fn source(&self) -> Source {
        Source::Jma
    }

    async fn latest(&self, fetcher: &Fetcher) -> Result<Option<Listing>> {
        let response = fetcher.fetch(&self.config.feed_url, &[]).await?;
        parse_feed(&response.text())
    }

    async fn fetch_record(&self, fetcher: &Fetcher, listing: &Listing) -> Result<EqkRecord> {
        let response = fetcher.fetch(&listing.url, &[]).await?;
        let mut record = parse_report(&response.text(), listing)?;
        record.images = vec![self.fetch_image(fetcher, listing.kind).await?];
        Ok(record)
    }
}
