// src/models/language.rs

//! Supported output languages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Languages every bulletin is published and rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "ko")]
    Ko,
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh_Hans")]
    ZhHans,
    #[serde(rename = "zh_Hant")]
    ZhHant,
}

impl Language {
    /// All supported languages in publish order.
    pub const ALL: [Language; 5] = [
        Language::Ko,
        Language::Ja,
        Language::En,
        Language::ZhHans,
        Language::ZhHant,
    ];

    /// Code used in artifact names and template files.
    pub fn code(self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::Ja => "ja",
            Language::En => "en",
            Language::ZhHans => "zh_Hans",
            Language::ZhHant => "zh_Hant",
        }
    }

    /// Code understood by the remote translation service.
    pub fn remote_code(self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::Ja => "ja",
            Language::En => "en",
            Language::ZhHans => "zh-CN",
            Language::ZhHant => "zh-TW",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }

    pub fn is_chinese(self) -> bool {
        matches!(self, Language::ZhHans | Language::ZhHant)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for lang in Language::ALL {
            assert_eq!(Language::from_code(lang.code()), Some(lang));
        }
        assert_eq!(Language::from_code("zh-CN"), None);
    }

    #[test]
    fn test_remote_codes() {
        assert_eq!(Language::ZhHans.remote_code(), "zh-CN");
        assert_eq!(Language::ZhHant.remote_code(), "zh-TW");
        assert_eq!(Language::Ja.remote_code(), "ja");
    }
}
