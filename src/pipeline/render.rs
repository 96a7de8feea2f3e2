// src/pipeline/render.rs

//! Placeholder substitution for notification templates.
//!
//! A token is a dotted path wrapped in `*`, e.g. `*magnitude*`,
//! `*region_intensity.서울*` or `*images.0.name*`. Three names are virtual
//! and formatted per language: `datetime`, `datetime_ann` and `location`.
//! Everything else is looked up in the record's JSON form; unresolved paths
//! render as `NULL`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{NaiveDateTime, Timelike};
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::models::{EqkRecord, Language, Location, TemplateEntry, TierTemplate};

/// Rendered in place of any path that does not resolve.
pub const NULL: &str = "NULL";

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([\w.]*)\*").expect("token regex"));

/// Render one template string against a record.
pub fn render(template: &str, record: &EqkRecord, lang: Language) -> String {
    let fields = serde_json::to_value(record).unwrap_or(Value::Null);
    render_with(template, record, &fields, lang)
}

fn render_with(template: &str, record: &EqkRecord, fields: &Value, lang: Language) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            let path = caps.get(1).map_or("", |m| m.as_str());
            resolve_token(path, record, fields, lang)
        })
        .into_owned()
}

fn resolve_token(path: &str, record: &EqkRecord, fields: &Value, lang: Language) -> String {
    match path {
        "datetime" => record
            .occurred_at
            .map(|dt| format_datetime(dt, lang))
            .unwrap_or_else(|| NULL.to_string()),
        "datetime_ann" => format_datetime(record.announced_at, lang),
        "location" => record
            .location
            .as_ref()
            .map(|location| format_location(location, lang))
            .unwrap_or_else(|| NULL.to_string()),
        _ => lookup(fields, path)
            .map(value_text)
            .unwrap_or_else(|| NULL.to_string()),
    }
}

/// Walk `path` through nested objects and arrays.
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => NULL.to_string(),
        other => other.to_string(),
    }
}

/// Calendar phrase of a timestamp in `lang`.
pub fn format_datetime(dt: NaiveDateTime, lang: Language) -> String {
    let morning = dt.hour() < 12;
    match lang {
        Language::Ko => {
            let half = if morning { "오전" } else { "오후" };
            dt.format(&format!("%Y년 %m월 %d일 {half} %I시 %M분")).to_string()
        }
        Language::Ja => {
            let half = if morning { "午前" } else { "午後" };
            dt.format(&format!("%Y年%m月%d日{half}%I時%M分")).to_string()
        }
        Language::ZhHans => {
            let half = if morning { "上午" } else { "下午" };
            dt.format(&format!("%Y年%m月%d日{half}%I点%M分")).to_string()
        }
        Language::ZhHant => {
            let half = if morning { "上午" } else { "下午" };
            dt.format(&format!("%Y年%m月%d日{half}%I點%M分")).to_string()
        }
        Language::En => dt.format("%Y-%m-%d %H:%M").to_string(),
    }
}

/// Location phrase in `lang`; hypocenters render their name.
pub fn format_location(location: &Location, lang: Language) -> String {
    match location {
        Location::Hypocenter { name, .. } => name.clone(),
        Location::Region {
            wide,
            city,
            direction,
            distance,
            ..
        } => match lang {
            Language::Ko => format!("{wide} {city} {direction} {distance}km"),
            Language::Ja => format!("{wide}{city}から{direction}{distance}km"),
            Language::ZhHans | Language::ZhHant => {
                format!("{wide}{city}以{direction}{distance}公里")
            }
            Language::En if city.is_empty() => format!("{distance}km {direction} of {wide}"),
            Language::En => format!("{distance}km {direction} of {city}, {wide}"),
        },
    }
}

/// Render every field of a tier template.
///
/// Plain entries are rendered once in Korean; per-language entries are
/// rendered against that language's record. A language without a record
/// falls back to the Korean one.
pub fn render_tier(template: &TierTemplate, records: &BTreeMap<Language, EqkRecord>) -> Value {
    let fields: BTreeMap<Language, Value> = records
        .iter()
        .map(|(lang, record)| (*lang, serde_json::to_value(record).unwrap_or(Value::Null)))
        .collect();

    let pick = |lang: Language| {
        records
            .get(&lang)
            .zip(fields.get(&lang))
            .or_else(|| records.get(&Language::Ko).zip(fields.get(&Language::Ko)))
    };

    let mut out = Map::new();
    for (name, entry) in template {
        let rendered = match entry {
            TemplateEntry::Text(text) => match pick(Language::Ko) {
                Some((record, values)) => {
                    Value::String(render_with(text, record, values, Language::Ko))
                }
                None => Value::String(text.clone()),
            },
            TemplateEntry::Localized(by_lang) => {
                let mut localized = Map::new();
                for (code, text) in by_lang {
                    let Some(lang) = Language::from_code(code) else {
                        log::warn!("Skipping unknown template language '{code}' in field '{name}'");
                        continue;
                    };
                    let rendered = match pick(lang) {
                        Some((record, values)) => render_with(text, record, values, lang),
                        None => text.clone(),
                    };
                    localized.insert(code.clone(), Value::String(rendered));
                }
                Value::Object(localized)
            }
        };
        out.insert(name.clone(), rendered);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::models::{BulletinKind, Coordinate, ImageRef};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record() -> EqkRecord {
        let mut record = EqkRecord::new("202401020003", BulletinKind::KmaInfo, at(14, 7));
        record.occurred_at = Some(at(14, 5));
        record.magnitude = Some(3.1);
        record.max_intensity = Some(4);
        record.location = Some(Location::Region {
            wide: "경북".into(),
            city: "경주시".into(),
            direction: "남남서쪽".into(),
            distance: 9,
            depth: Some(12.0),
            code: None,
            coordinate: Some(Coordinate {
                latitude: 35.76,
                longitude: 129.19,
            }),
        });
        record.region_intensity.insert("서울".into(), 2);
        record.images = vec![
            ImageRef::from_url("https://example.com/a.png", ""),
            ImageRef::from_url("https://example.com/b.png", ""),
        ];
        record
    }

    #[test]
    fn test_field_paths() {
        let record = record();
        assert_eq!(render("*region_intensity.서울*", &record, Language::Ko), "2");
        assert_eq!(render("*images.1.name*", &record, Language::Ko), "b.png");
        assert_eq!(render("*magnitude*", &record, Language::Ko), "3.1");
        assert_eq!(render("*location.wide*", &record, Language::Ko), "경북");
    }

    #[test]
    fn test_unresolved_paths_render_null() {
        let record = record();
        assert_eq!(render("*images.5*", &record, Language::Ko), "NULL");
        assert_eq!(render("*region_intensity.부산*", &record, Language::Ko), "NULL");
        assert_eq!(render("*magnitude.value*", &record, Language::Ko), "NULL");
        assert_eq!(render("**", &record, Language::Ko), "NULL");
        assert_eq!(
            render("규모 *missing* 지진 (*images.x*)", &record, Language::Ko),
            "규모 NULL 지진 (NULL)"
        );
    }

    #[test]
    fn test_literal_text_is_kept() {
        let record = record();
        assert_eq!(
            render("[속보] 규모 *magnitude*, 최대진도 *max_intensity*", &record, Language::Ko),
            "[속보] 규모 3.1, 최대진도 4"
        );
        assert_eq!(render("no tokens *here", &record, Language::Ko), "no tokens *here");
    }

    #[test]
    fn test_datetime_per_language() {
        let record = record();
        assert_eq!(
            render("*datetime*", &record, Language::Ko),
            "2024년 01월 02일 오후 02시 05분"
        );
        assert_eq!(render("*datetime*", &record, Language::Ja), "2024年01月02日午後02時05分");
        assert_eq!(render("*datetime*", &record, Language::ZhHans), "2024年01月02日下午02点05分");
        assert_eq!(render("*datetime*", &record, Language::ZhHant), "2024年01月02日下午02點05分");
        assert_eq!(render("*datetime_ann*", &record, Language::En), "2024-01-02 14:07");
        assert_eq!(
            format_datetime(at(9, 30), Language::Ko),
            "2024년 01월 02일 오전 09시 30분"
        );
    }

    #[test]
    fn test_location_per_language() {
        let record = record();
        assert_eq!(render("*location*", &record, Language::Ko), "경북 경주시 남남서쪽 9km");
        assert_eq!(render("*location*", &record, Language::Ja), "경북경주시から남남서쪽9km");
        assert_eq!(render("*location*", &record, Language::ZhHans), "경북경주시以남남서쪽9公里");
        assert_eq!(
            render("*location*", &record, Language::En),
            "9km 남남서쪽 of 경주시, 경북"
        );

        let hypocenter = Location::Hypocenter {
            name: "対馬海峡".into(),
            coordinate: Coordinate {
                latitude: 34.5,
                longitude: 129.4,
            },
            depth: None,
        };
        assert_eq!(format_location(&hypocenter, Language::En), "対馬海峡");
    }

    #[test]
    fn test_location_keeps_empty_parts() {
        let location = Location::Region {
            wide: "제주".into(),
            city: String::new(),
            direction: "서쪽".into(),
            distance: 32,
            depth: None,
            code: None,
            coordinate: None,
        };
        assert_eq!(format_location(&location, Language::Ko), "제주  서쪽 32km");
        assert_eq!(format_location(&location, Language::Ja), "제주から서쪽32km");
        assert_eq!(format_location(&location, Language::ZhHant), "제주以서쪽32公里");
    }

    #[test]
    fn test_render_tier() {
        let template: TierTemplate = serde_json::from_str(
            r#"{
                "sound": "default",
                "summary": "*location* 규모 *magnitude*",
                "title": { "ko": "*location*", "en": "M*magnitude* near *location.city*" }
            }"#,
        )
        .unwrap();

        let ko = record();
        let mut en = ko.clone();
        if let Some(Location::Region { city, .. }) = &mut en.location {
            *city = "Gyeongju".into();
        }
        let records = BTreeMap::from([(Language::Ko, ko), (Language::En, en)]);

        let payload = render_tier(&template, &records);
        assert_eq!(payload["sound"], "default");
        assert_eq!(payload["summary"], "경북 경주시 남남서쪽 9km 규모 3.1");
        assert_eq!(payload["title"]["ko"], "경북 경주시 남남서쪽 9km");
        assert_eq!(payload["title"]["en"], "M3.1 near Gyeongju");
    }
}
