//! Precompiled email templates.
//!
//! A template directory holds three subdirectories:
//!
//! - `meta/{name}.json`: `{templateFileName, subject?, contentParts, escapeParts}`
//! - `html/{templateFileName}`: the HTML body with `{{Slot}}` placeholders
//! - `locales/*.{lang}.yaml`: translations
//!
//! A content part `P` of template `T` is translated from key `T.P`, or from
//! the shared key `P` when the template has no specific one. The subject key
//! defaults to `T.Subject`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::info;

use crate::error::{NotificationError, RenderError, Result};
use crate::localizer::Localizer;
use crate::text::{Compiled, Values, html_escape, html_to_text};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMeta {
    pub template_file_name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content_parts: Vec<String>,
    #[serde(default)]
    pub escape_parts: Vec<String>,
}

/// Subject, HTML body and its plain-text alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    subject_key: String,
    content_parts: Vec<String>,
    escape_parts: Vec<String>,
    body: Compiled,
}

impl Template {
    pub fn new(name: &str, meta: &TemplateMeta, body: &str) -> Self {
        Self {
            name: name.to_string(),
            subject_key: meta
                .subject
                .clone()
                .unwrap_or_else(|| format!("{name}.Subject")),
            content_parts: meta.content_parts.clone(),
            escape_parts: meta.escape_parts.clone(),
            body: Compiled::parse(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Body slots the caller must supply (everything but content parts).
    pub fn required_values(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .body
            .slots()
            .filter(|s| !self.content_parts.iter().any(|p| p == s))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Renders the subject and body for `locale`.
    pub fn execute(
        &self,
        localizer: &Localizer,
        content: &Values,
        locale: &str,
    ) -> std::result::Result<Rendered, RenderError> {
        let lang = localizer.resolve(locale);

        let mut values: Values = content
            .iter()
            .map(|(k, v)| {
                let v = if self.escape_parts.contains(k) {
                    html_escape(v)
                } else {
                    v.clone()
                };
                (k.clone(), v)
            })
            .collect();

        for part in &self.content_parts {
            let key = format!("{}.{part}", self.name);
            let text = localizer
                .localize(&key, lang, &values)
                .or_else(|_| localizer.localize(part, lang, &values))
                .map_err(|_| RenderError::MissingTranslation {
                    key,
                    locale: lang.to_string(),
                })?;
            values.insert(part.clone(), text);
        }

        let subject = localizer.localize(&self.subject_key, lang, content)?;
        let html = self.body.fill(&values).map_err(|name| RenderError::MissingValue {
            template: self.name.clone(),
            name,
        })?;
        let text = html_to_text(&html);
        Ok(Rendered {
            subject,
            html,
            text,
        })
    }
}

/// Templates plus the translations they render with.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    localizer: Localizer,
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new(localizer: Localizer) -> Self {
        Self {
            localizer,
            templates: HashMap::new(),
        }
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Loads and precompiles everything under `dir`.
    pub fn load(dir: &Path, default_language: &str) -> Result<Self> {
        let localizer = Localizer::load(&dir.join("locales"), default_language)?;
        let mut registry = Self::new(localizer);

        let meta_dir = dir.join("meta");
        let entries = fs::read_dir(&meta_dir).map_err(|e| NotificationError::io(&meta_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| NotificationError::io(&meta_dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path).map_err(|e| NotificationError::io(&path, e))?;
            let meta: TemplateMeta =
                serde_json::from_str(&raw).map_err(|e| NotificationError::parse(&path, e))?;

            let html_path = dir.join("html").join(&meta.template_file_name);
            let body =
                fs::read_to_string(&html_path).map_err(|e| NotificationError::io(&html_path, e))?;
            registry.register(Template::new(name, &meta, &body));
        }

        info!(
            dir = %dir.display(),
            templates = registry.templates.len(),
            languages = ?registry.localizer.languages(),
            "Templates loaded"
        );
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn localizer(&self) -> &Localizer {
        &self.localizer
    }

    pub fn render(
        &self,
        name: &str,
        content: &Values,
        locale: &str,
    ) -> std::result::Result<Rendered, RenderError> {
        self.get(name)
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))?
            .execute(&self.localizer, content, locale)
    }
}

/// The process-wide registry, swappable on reload.
#[derive(Debug)]
pub struct Templates {
    dir: Option<PathBuf>,
    default_language: String,
    current: ArcSwap<TemplateRegistry>,
}

impl Templates {
    pub fn load(dir: impl Into<PathBuf>, default_language: &str) -> Result<Self> {
        let dir = dir.into();
        let registry = TemplateRegistry::load(&dir, default_language)?;
        Ok(Self {
            dir: Some(dir),
            default_language: default_language.to_string(),
            current: ArcSwap::from_pointee(registry),
        })
    }

    /// A fixed registry that cannot be reloaded from disk.
    pub fn from_registry(registry: TemplateRegistry) -> Self {
        Self {
            dir: None,
            default_language: registry.localizer().default_language().to_string(),
            current: ArcSwap::from_pointee(registry),
        }
    }

    pub fn current(&self) -> Arc<TemplateRegistry> {
        self.current.load_full()
    }

    /// Rebuilds the registry from disk and swaps it in. The old registry
    /// stays in place when loading fails.
    pub fn reload(&self) -> Result<usize> {
        let Some(dir) = &self.dir else {
            return Err(NotificationError::InvalidConfig(
                "templates were not loaded from a directory".into(),
            ));
        };
        let registry = TemplateRegistry::load(dir, &self.default_language)?;
        let count = registry.len();
        self.current.store(Arc::new(registry));
        Ok(count)
    }

    pub fn render(
        &self,
        name: &str,
        content: &Values,
        locale: &str,
    ) -> std::result::Result<Rendered, RenderError> {
        self.current.load().render(name, content, locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TemplateRegistry {
        let mut localizer = Localizer::default();
        localizer.add_bundle(
            "en",
            [
                ("invite.Subject", "{{CreatorName}} invited you"),
                ("invite.Body", "<b>{{CreatorName}}</b> wants to share data."),
                ("Signature", "The team"),
            ],
        );
        localizer.add_bundle(
            "fr",
            [
                ("invite.Subject", "{{CreatorName}} vous invite"),
                ("invite.Body", "<b>{{CreatorName}}</b> veut partager."),
            ],
        );
        let meta = TemplateMeta {
            template_file_name: "invite.html".into(),
            subject: None,
            content_parts: vec!["Body".into(), "Signature".into()],
            escape_parts: vec!["CreatorName".into()],
        };
        let mut registry = TemplateRegistry::new(localizer);
        registry.register(Template::new(
            "invite",
            &meta,
            "<p>{{Body}}</p><a href=\"{{ActionURL}}\">go</a><p>{{Signature}}</p>",
        ));
        registry
    }

    fn content(name: &str) -> Values {
        let mut v = Values::new();
        v.insert("CreatorName".into(), name.into());
        v.insert("ActionURL".into(), "https://app/x?a=1&b=2".into());
        v
    }

    #[test]
    fn renders_with_shared_and_specific_parts() {
        let out = registry().render("invite", &content("Ann"), "en").unwrap();
        assert_eq!(out.subject, "Ann invited you");
        assert_eq!(
            out.html,
            "<p><b>Ann</b> wants to share data.</p><a href=\"https://app/x?a=1&b=2\">go</a><p>The team</p>"
        );
        assert!(out.text.contains("Ann wants to share data."));
    }

    #[test]
    fn escape_parts_are_html_escaped_in_body_only() {
        let out = registry()
            .render("invite", &content("<script>"), "en")
            .unwrap();
        assert!(out.html.contains("<b>&lt;script&gt;</b>"));
        assert_eq!(out.subject, "<script> invited you");
    }

    #[test]
    fn missing_translation_fails_render() {
        let err = registry()
            .render("invite", &content("Ann"), "fr")
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingTranslation {
                key: "invite.Signature".into(),
                locale: "fr".into()
            }
        );
    }

    #[test]
    fn missing_value_fails_render() {
        let mut values = content("Ann");
        values.remove("ActionURL");
        let err = registry().render("invite", &values, "en").unwrap_err();
        assert!(matches!(err, RenderError::MissingValue { name, .. } if name == "ActionURL"));
    }

    #[test]
    fn required_values_exclude_content_parts() {
        let registry = registry();
        let template = registry.get("invite").unwrap();
        assert_eq!(template.required_values(), vec!["ActionURL"]);
    }

    #[test]
    fn unknown_template() {
        let err = registry().render("nope", &Values::new(), "en").unwrap_err();
        assert_eq!(err, RenderError::TemplateNotFound("nope".into()));
    }
}
