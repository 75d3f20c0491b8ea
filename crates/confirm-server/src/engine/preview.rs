//! Template preview for development runs.

use confirm_notifications::{RenderError, Values};
use serde::Serialize;
use tracing::info;

use super::{Engine, EngineError, Result};

/// Values any template or translation may reference.
const SAMPLE_VALUES: [&str; 7] = [
    "ActionURL",
    "ClinicName",
    "CreatorName",
    "Email",
    "Otp",
    "TeamName",
    "WebURL",
];

/// A template rendered with placeholder values.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub template: String,
    pub language: String,
    pub subject: String,
    pub html: String,
}

impl Engine {
    /// Renders `name` with each value shown as `[Name]`.
    pub fn preview(&self, name: &str, language: Option<&str>) -> Result<Preview> {
        let registry = self.dispatcher.templates().current();
        let template = registry
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("unknown template {name}")))?;
        let values: Values = SAMPLE_VALUES
            .into_iter()
            .chain(template.required_values())
            .map(|v| (v.to_string(), format!("[{v}]")))
            .collect();
        let language = language
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.settings.default_language)
            .to_string();

        let rendered = registry
            .render(name, &values, &language)
            .map_err(|e| match e {
                RenderError::TemplateNotFound(_) => EngineError::not_found(e.to_string()),
                e => EngineError::internal(e.to_string()),
            })?;
        Ok(Preview {
            template: name.to_string(),
            language,
            subject: rendered.subject,
            html: rendered.html,
        })
    }

    /// Reloads templates and translations from disk.
    pub fn refresh_templates(&self) -> Result<usize> {
        let count = self
            .dispatcher
            .templates()
            .reload()
            .map_err(|e| EngineError::internal(e.to_string()))?;
        info!(count, "Templates reloaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::fixture;

    #[test]
    fn preview_fills_placeholders() {
        let f = fixture();
        let preview = f.engine.preview("careteam_invitation", None).unwrap();
        assert_eq!(preview.language, "en");
        assert!(preview.html.contains("[ActionURL]"));
        assert!(preview.subject.contains("[CreatorName]"));
    }

    #[test]
    fn unknown_template_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.engine.preview("nope", Some("fr")),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn refresh_counts_templates() {
        let f = fixture();
        let count = f.engine.refresh_templates().unwrap();
        assert_eq!(count, f.engine.dispatcher().templates().current().len());
    }
}
