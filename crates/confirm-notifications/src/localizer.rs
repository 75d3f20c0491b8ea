//! Translation bundles loaded from `*.<lang>.yaml` files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_yaml::Value as Yaml;
use tracing::{debug, warn};

use crate::error::{NotificationError, RenderError, Result};
use crate::text::{Compiled, Values};

pub const DEFAULT_LANGUAGE: &str = "en";

/// Two-letter language code of a language tag (`fr-FR` → `fr`).
pub fn language_of(tag: &str) -> Option<String> {
    let code: String = tag.trim().chars().take(2).collect();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_lowercase())
    } else {
        None
    }
}

/// Key → string lookups per language.
#[derive(Debug, Clone)]
pub struct Localizer {
    default_language: String,
    bundles: HashMap<String, HashMap<String, Compiled>>,
}

impl Default for Localizer {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl Localizer {
    pub fn new(default_language: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
            bundles: HashMap::new(),
        }
    }

    /// Loads every `*.<lang>.yaml` (or `.yml`) file in `dir`. Files for the
    /// same language are merged.
    pub fn load(dir: &Path, default_language: &str) -> Result<Self> {
        let mut localizer = Self::new(default_language);
        let entries = fs::read_dir(dir).map_err(|e| NotificationError::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| NotificationError::io(dir, e))?.path();
            let Some(lang) = bundle_language(&path) else {
                continue;
            };
            let raw = fs::read_to_string(&path).map_err(|e| NotificationError::io(&path, e))?;
            let doc: Yaml =
                serde_yaml::from_str(&raw).map_err(|e| NotificationError::parse(&path, e))?;
            let mut flat = HashMap::new();
            flatten("", &doc, &mut flat);
            debug!(file = %path.display(), lang = %lang, keys = flat.len(), "Loaded translations");
            localizer.add_bundle(&lang, flat);
        }
        if !localizer.bundles.contains_key(&localizer.default_language) {
            warn!(
                dir = %dir.display(),
                lang = %localizer.default_language,
                "No translations for the default language"
            );
        }
        Ok(localizer)
    }

    /// Adds (or extends) the bundle for `lang`.
    pub fn add_bundle<I, K, V>(&mut self, lang: &str, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let bundle = self.bundles.entry(lang.to_ascii_lowercase()).or_default();
        for (key, value) in entries {
            bundle.insert(key.into(), Compiled::parse(value.as_ref()));
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.bundles.contains_key(lang)
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.bundles.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    /// The language actually used for `locale`: itself when a bundle exists,
    /// otherwise the default.
    pub fn resolve<'a>(&'a self, locale: &'a str) -> &'a str {
        if self.supports(locale) {
            locale
        } else {
            &self.default_language
        }
    }

    /// Translates `key` and substitutes `data`.
    ///
    /// A missing key fails with [`RenderError::MissingTranslation`], which
    /// carries the visible placeholder (see [`RenderError::placeholder`]) for
    /// callers that tolerate the gap.
    pub fn localize(&self, key: &str, locale: &str, data: &Values) -> std::result::Result<String, RenderError> {
        let lang = self.resolve(locale);
        self.bundles
            .get(lang)
            .and_then(|b| b.get(key))
            .map(|c| c.fill_lenient(data))
            .ok_or_else(|| RenderError::MissingTranslation {
                key: key.to_string(),
                locale: lang.to_string(),
            })
    }
}

fn bundle_language(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if ext != "yaml" && ext != "yml" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (_, lang) = stem.rsplit_once('.')?;
    if lang.len() == 2 && lang.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(lang.to_ascii_lowercase())
    } else {
        warn!(file = %path.display(), "Ignoring translation file without a language suffix");
        None
    }
}

fn flatten(prefix: &str, value: &Yaml, out: &mut HashMap<String, String>) {
    match value {
        Yaml::Mapping(map) => {
            for (k, v) in map {
                let Some(k) = yaml_scalar(k) else { continue };
                let key = if prefix.is_empty() {
                    k
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        other => {
            if let Some(text) = yaml_scalar(other) {
                out.insert(prefix.to_string(), text);
            }
        }
    }
}

fn yaml_scalar(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localizer() -> Localizer {
        let mut l = Localizer::default();
        l.add_bundle("en", [("Hello", "Hello {{Name}}"), ("Bye", "Bye")]);
        l.add_bundle("fr", [("Hello", "Bonjour {{Name}}")]);
        l
    }

    #[test]
    fn translates_and_substitutes() {
        let mut data = Values::new();
        data.insert("Name".into(), "Ana".into());
        let l = localizer();
        assert_eq!(l.localize("Hello", "fr", &data).unwrap(), "Bonjour Ana");
        assert_eq!(l.localize("Hello", "en", &data).unwrap(), "Hello Ana");
    }

    #[test]
    fn unknown_language_uses_default_bundle() {
        let l = localizer();
        assert_eq!(l.resolve("de"), "en");
        assert_eq!(l.localize("Bye", "de", &Values::new()).unwrap(), "Bye");
    }

    #[test]
    fn missing_key_in_existing_bundle_is_an_error() {
        let l = localizer();
        let err = l.localize("Bye", "fr", &Values::new()).unwrap_err();
        assert!(err.is_missing_translation());
        assert_eq!(
            err.placeholder().as_deref(),
            Some("<< Cannot find translation for item Bye >>")
        );
        assert_eq!(err.to_string(), "Cannot find translation for item Bye in locale fr");
        assert_eq!(RenderError::TemplateNotFound("x".into()).placeholder(), None);
    }

    #[test]
    fn language_codes_are_normalized() {
        assert_eq!(language_of("fr-FR,fr;q=0.9"), Some("fr".into()));
        assert_eq!(language_of("EN"), Some("en".into()));
        assert_eq!(language_of("*"), None);
        assert_eq!(language_of(""), None);
    }

    #[test]
    fn loads_yaml_bundles_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("mail.en.yaml"),
            "Greeting: Hello\nsignup:\n  Subject: Confirm your account\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("mail.fr.yaml"), "Greeting: Bonjour\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let l = Localizer::load(dir.path(), "en").unwrap();
        assert_eq!(l.languages(), vec!["en", "fr"]);
        assert_eq!(
            l.localize("signup.Subject", "en", &Values::new()).unwrap(),
            "Confirm your account"
        );
        assert_eq!(l.localize("Greeting", "fr", &Values::new()).unwrap(), "Bonjour");
    }
}
