//! Service layer for the crawler application.
//!
//! This module contains the upstream-facing logic:
//! - KMA list/detail scraping (`KmaSource`)
//! - JMA feed/report parsing (`JmaSource`)
//! - Static dictionary and remote translation (`Localizer`)

pub mod jma;
pub mod kma;
pub mod translate;
pub mod xml;

use async_trait::async_trait;
use scraper::Selector;

use crate::error::{AppError, Result};
use crate::models::{BulletinKind, EqkRecord, Source};
use crate::utils::Fetcher;

pub use jma::JmaSource;
pub use kma::KmaSource;
pub use translate::{Dictionary, GoogleTranslator, Localizer, Translator};

/// Newest interesting entry of an upstream listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Upstream identity of the entry; equal keys mean "nothing new"
    pub key: String,
    pub kind: BulletinKind,
    /// Document the record is parsed from
    pub url: String,
    /// Announcement time as listed (`YYYYMMDDHHMM`), when the listing has one
    pub announced_raw: Option<String>,
    /// Per-day announcement sequence, when the listing has one
    pub sequence: Option<String>,
}

/// One upstream agency.
#[async_trait]
pub trait BulletinSource: Send + Sync {
    fn source(&self) -> Source;

    /// Newest interesting listing entry, or `None` if the listing is empty.
    async fn latest(&self, fetcher: &Fetcher) -> Result<Option<Listing>>;

    /// Fetch and parse the full record behind a listing entry.
    async fn fetch_record(&self, fetcher: &Fetcher, listing: &Listing) -> Result<EqkRecord>;
}

pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
