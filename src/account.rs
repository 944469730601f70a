//! Account-level helpers: password reset requests and the saved UI language.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SocialError, SocialResult};
use crate::storage::Storage;

/// Settings key holding the saved language code.
pub const LANGUAGE_KEY: &str = "app_language";

/// Languages the app ships labels for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
    Pt,
}

impl Language {
    /// Language used when a code is not recognised.
    pub const FALLBACK: Language = Language::En;

    pub const ALL: [Language; 3] = [Language::Es, Language::En, Language::Pt];

    pub fn code(self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
            Language::Pt => "pt",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "es" => Some(Language::Es),
            "en" => Some(Language::En),
            "pt" => Some(Language::Pt),
            _ => None,
        }
    }

    /// Parse a code, falling back to [`Language::FALLBACK`].
    pub fn from_code_or_fallback(code: &str) -> Self {
        Self::from_code(code).unwrap_or(Self::FALLBACK)
    }

    /// Month names, January first, lowercase.
    pub fn months(self) -> [&'static str; 12] {
        match self {
            Language::Es => [
                "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto",
                "septiembre", "octubre", "noviembre", "diciembre",
            ],
            Language::En => [
                "january", "february", "march", "april", "may", "june", "july", "august",
                "september", "october", "november", "december",
            ],
            Language::Pt => [
                "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto",
                "setembro", "outubro", "novembro", "dezembro",
            ],
        }
    }
}

/// Load the saved language, or the default when none is stored.
pub fn load_language(storage: &Storage) -> SocialResult<Language> {
    let saved = storage.get_setting(LANGUAGE_KEY)?;
    Ok(saved
        .as_deref()
        .map(Language::from_code_or_fallback)
        .unwrap_or_default())
}

pub fn save_language(storage: &Storage, language: Language) -> SocialResult<()> {
    storage.set_setting(LANGUAGE_KEY, language.code())?;
    crate::slog!("settings: language set to {}", language.code());
    Ok(())
}

/// Trim and lowercase an address, rejecting empty and malformed input.
pub fn normalize_email(raw: &str) -> SocialResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(SocialError::Validation("enter an email".to_string()));
    }
    if !looks_like_email(&email) {
        return Err(SocialError::Validation("enter a valid email".to_string()));
    }
    Ok(email)
}

/// `local@domain.tld` with no whitespace and a single `@`.
static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

fn looks_like_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email))
}

/// Queue a reset mail for the auth provider. Returns the normalised address.
pub fn request_password_reset(storage: &Storage, raw_email: &str, now: i64) -> SocialResult<String> {
    let email = normalize_email(raw_email)?;
    if let Err(e) = storage.insert_password_reset(&email, now) {
        crate::slog!("password-reset: failed to queue request: {}", e);
        return Err(e.into());
    }
    crate::slog!("password-reset: queued request");
    Ok(email)
}
