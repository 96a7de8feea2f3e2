// src/services/translate.rs

//! Localization of KMA records.
//!
//! Region names are mostly known in advance and come from a static
//! dictionary. Whatever the dictionary does not cover goes to the remote
//! translator in one batched call per language.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{EqkRecord, Language, Location, Source, TranslationConfig};

/// Dictionary values ending with this marker are sent to the remote
/// translator with the marker stripped.
pub const REMOTE_MARKER: char = '_';

/// Static dictionary: source text → language code → value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary(BTreeMap<String, BTreeMap<String, String>>);

/// Outcome of a dictionary lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Use verbatim
    Literal(&'a str),
    /// Translate remotely
    Remote(&'a str),
}

impl Dictionary {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries may be keyed by artifact code (`zh_Hans`) or by remote code
    /// (`zh-CN`, `zh-cn`).
    pub fn lookup<'a>(&'a self, text: &'a str, lang: Language) -> Lookup<'a> {
        let entry = self.0.get(text).and_then(|by_lang| {
            by_lang
                .get(lang.code())
                .or_else(|| by_lang.get(lang.remote_code()))
                .or_else(|| by_lang.get(&lang.remote_code().to_lowercase()))
        });

        match entry {
            Some(value) => match value.strip_suffix(REMOTE_MARKER) {
                Some(stripped) => Lookup::Remote(stripped),
                None => Lookup::Literal(value),
            },
            None => Lookup::Remote(text),
        }
    }
}

/// Remote batch translation from Korean.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, texts: &[String], target: Language) -> Result<Vec<String>>;
}

/// Google Cloud Translation v2 REST client.
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a [String],
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Build a translator when the configured key variable is set.
    pub fn from_env(client: reqwest::Client, config: &TranslationConfig) -> Option<Self> {
        let api_key = std::env::var(&config.api_key_env).ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(Self::new(client, config.endpoint.clone(), api_key))
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, texts: &[String], target: Language) -> Result<Vec<String>> {
        let body = TranslateRequest {
            q: texts,
            source: Language::Ko.remote_code(),
            target: target.remote_code(),
            format: "text",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Translation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Translation(format!("HTTP {status}")));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Translation(e.to_string()))?;
        let translated: Vec<String> = parsed
            .data
            .translations
            .into_iter()
            .map(|t| t.translated_text)
            .collect();

        if translated.len() != texts.len() {
            return Err(AppError::Translation(format!(
                "asked for {} translations, got {}",
                texts.len(),
                translated.len()
            )));
        }
        Ok(translated)
    }
}

/// Produces per-language views of a record.
#[derive(Clone)]
pub struct Localizer {
    dictionary: Arc<Dictionary>,
    translator: Option<Arc<dyn Translator>>,
}

impl Localizer {
    pub fn new(dictionary: Arc<Dictionary>, translator: Option<Arc<dyn Translator>>) -> Self {
        Self {
            dictionary,
            translator,
        }
    }

    /// Record as published and rendered for `lang`.
    ///
    /// Only KMA records are translated; translation failures fall back to
    /// the Korean source text.
    pub async fn localize(&self, record: &EqkRecord, lang: Language) -> EqkRecord {
        let mut localized = record.clone();
        if record.source != Source::Kma || lang == Language::Ko {
            return localized;
        }

        // Batch order: location parts, region names, note.
        let mut texts: Vec<&str> = Vec::new();
        if let Some(Location::Region {
            wide,
            city,
            direction,
            ..
        }) = &record.location
        {
            texts.extend([wide.as_str(), city.as_str(), direction.as_str()]);
        }
        texts.extend(record.region_intensity.keys().map(String::as_str));
        texts.push(&record.note);

        let mut translated = self.translate_batch(&texts, lang).await.into_iter();

        if let Some(Location::Region {
            wide,
            city,
            direction,
            ..
        }) = &mut localized.location
        {
            for part in [&mut *wide, &mut *city, &mut *direction] {
                if let Some(value) = translated.next() {
                    *part = value;
                }
            }
            if lang.is_chinese() {
                *direction = direction.replace('方', "");
            }
        }

        localized.region_intensity = record
            .region_intensity
            .iter()
            .map(|(region, intensity)| {
                (translated.next().unwrap_or_else(|| region.clone()), *intensity)
            })
            .collect();
        if let Some(note) = translated.next() {
            localized.note = note;
        }
        localized
    }

    async fn translate_batch(&self, texts: &[&str], lang: Language) -> Vec<String> {
        let mut resolved: Vec<Option<String>> = Vec::with_capacity(texts.len());
        let mut pending: Vec<(usize, String)> = Vec::new();

        for (idx, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                resolved.push(Some((*text).to_string()));
                continue;
            }
            match self.dictionary.lookup(text, lang) {
                Lookup::Literal(value) => resolved.push(Some(value.to_string())),
                Lookup::Remote(query) => {
                    resolved.push(None);
                    pending.push((idx, query.to_string()));
                }
            }
        }

        if !pending.is_empty() {
            let queries: Vec<String> = pending.iter().map(|(_, q)| q.clone()).collect();
            match &self.translator {
                Some(translator) => match translator.translate(&queries, lang).await {
                    Ok(results) => {
                        for ((idx, _), value) in pending.iter().zip(results) {
                            resolved[*idx] = Some(value);
                        }
                    }
                    Err(e) => log::warn!(
                        "Translation to {lang} failed, keeping source text for {} strings: {e}",
                        queries.len()
                    ),
                },
                None => log::debug!(
                    "No remote translator; {} strings stay untranslated for {lang}",
                    queries.len()
                ),
            }
        }

        resolved
            .into_iter()
            .zip(texts)
            .map(|(value, text)| value.unwrap_or_else(|| (*text).to_string()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use wiremock::matchers::{body_partial_json, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::BulletinKind;

    /// Prefixes every text with the target code and records each call.
    #[derive(Default)]
    pub(crate) struct EchoTranslator {
        pub calls: Mutex<Vec<(Language, Vec<String>)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(&self, texts: &[String], target: Language) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push((target, texts.to_vec()));
            if self.fail {
                return Err(AppError::Translation("quota exceeded".into()));
            }
            Ok(texts.iter().map(|t| format!("{target}:{t}")).collect())
        }
    }

    const DICTIONARY: &str = r#"{
        "경북": { "en": "Gyeongbuk", "ja": "慶北", "zh-cn": "庆北", "zh_Hant": "慶北" },
        "남남서쪽": { "en": "SSW", "ja": "南南西方", "zh-cn": "南南西方", "zh_Hant": "南南西方" },
        "서울": { "en": "Seoul_", "ja": "ソウル" }
    }"#;

    pub(crate) fn kma_record() -> EqkRecord {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 28, 12)
            .unwrap();
        let mut record = EqkRecord::new("202401010008", BulletinKind::KmaInfo, at);
        record.occurred_at = Some(at);
        record.magnitude = Some(3.1);
        record.max_intensity = Some(4);
        record.location = Some(Location::Region {
            wide: "경북".into(),
            city: "경주시".into(),
            direction: "남남서쪽".into(),
            distance: 9,
            depth: Some(12.0),
            code: Some("47".into()),
            coordinate: None,
        });
        record.region_intensity.insert("경북".into(), 4);
        record.region_intensity.insert("서울".into(), 1);
        record.note = "흔들림을 느낄 수 있음".into();
        record
    }

    fn localizer(translator: Arc<EchoTranslator>) -> Localizer {
        let dictionary: Dictionary = serde_json::from_str(DICTIONARY).unwrap();
        Localizer::new(Arc::new(dictionary), Some(translator))
    }

    fn region_parts(record: &EqkRecord) -> (String, String, String) {
        match &record.location {
            Some(Location::Region {
                wide,
                city,
                direction,
                ..
            }) => (wide.clone(), city.clone(), direction.clone()),
            other => panic!("unexpected location {other:?}"),
        }
    }

    #[test]
    fn test_dictionary_lookup() {
        let dictionary: Dictionary = serde_json::from_str(DICTIONARY).unwrap();
        assert_eq!(dictionary.lookup("경북", Language::En), Lookup::Literal("Gyeongbuk"));
        assert_eq!(dictionary.lookup("경북", Language::ZhHans), Lookup::Literal("庆北"));
        assert_eq!(dictionary.lookup("서울", Language::En), Lookup::Remote("Seoul"));
        assert_eq!(dictionary.lookup("부산", Language::En), Lookup::Remote("부산"));
    }

    #[tokio::test]
    async fn test_single_batched_call_per_language() {
        let translator = Arc::new(EchoTranslator::default());
        let localized = localizer(translator.clone())
            .localize(&kma_record(), Language::En)
            .await;

        let (wide, city, direction) = region_parts(&localized);
        assert_eq!(wide, "Gyeongbuk");
        assert_eq!(city, "en:경주시");
        assert_eq!(direction, "SSW");
        assert_eq!(localized.region_intensity["Gyeongbuk"], 4);
        assert_eq!(localized.region_intensity["en:Seoul"], 1);
        assert_eq!(localized.note, "en:흔들림을 느낄 수 있음");

        let calls = translator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].1,
            vec!["경주시".to_string(), "Seoul".to_string(), "흔들림을 느낄 수 있음".to_string()]
        );
    }

    #[tokio::test]
    async fn test_chinese_direction_drops_suffix() {
        let translator = Arc::new(EchoTranslator::default());
        let localized = localizer(translator)
            .localize(&kma_record(), Language::ZhHant)
            .await;
        let (wide, _, direction) = region_parts(&localized);
        assert_eq!(wide, "慶北");
        assert_eq!(direction, "南南西");
    }

    #[tokio::test]
    async fn test_translation_failure_keeps_source_text() {
        let translator = Arc::new(EchoTranslator {
            fail: true,
            ..EchoTranslator::default()
        });
        let localized = localizer(translator)
            .localize(&kma_record(), Language::Ja)
            .await;
        let (wide, city, direction) = region_parts(&localized);
        assert_eq!(wide, "慶北");
        assert_eq!(city, "경주시");
        assert_eq!(direction, "南南西方");
        assert_eq!(localized.region_intensity["ソウル"], 1);
        assert_eq!(localized.note, "흔들림을 느낄 수 있음");
    }

    #[tokio::test]
    async fn test_korean_and_jma_records_are_untouched() {
        let translator = Arc::new(EchoTranslator::default());
        let localizer = localizer(translator.clone());
        let record = kma_record();
        assert_eq!(localizer.localize(&record, Language::Ko).await, record);

        let mut jma = record.clone();
        jma.source = Source::Jma;
        jma.kind = BulletinKind::JmaIntensity;
        assert_eq!(localizer.localize(&jma, Language::En).await, jma);
        assert!(translator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_google_translator_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "q": ["경주시"],
                "source": "ko",
                "target": "zh-CN",
                "format": "text"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "translations": [ { "translatedText": "庆州市" } ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let translator = GoogleTranslator::new(reqwest::Client::new(), server.uri(), "secret");
        let result = translator
            .translate(&["경주시".to_string()], Language::ZhHans)
            .await
            .unwrap();
        assert_eq!(result, vec!["庆州市".to_string()]);
    }

    #[tokio::test]
    async fn test_google_translator_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let translator = GoogleTranslator::new(reqwest::Client::new(), server.uri(), "bad");
        let err = translator
            .translate(&["경주시".to_string()], Language::En)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Translation(_)));
    }
}
