use std::path::PathBuf;
use std::sync::Arc;

use confirm_notifications::{
    Dispatcher, Outgoing, RecordingMailer, RenderError, TemplateRegistry, Templates, Values,
};

fn template_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../templates")
}

fn sample_values() -> Values {
    [
        ("CreatorName", "Dr <House>"),
        ("ClinicName", "Princeton"),
        ("TeamName", "Diagnostics"),
        ("Email", "bob@x.org"),
        ("ActionURL", "https://app.example/confirm?key=abc"),
        ("Otp", "123-456-789"),
        ("WebURL", "https://app.example"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[test]
fn every_bundled_template_renders_in_every_language() {
    let registry = TemplateRegistry::load(&template_dir(), "en").unwrap();
    assert!(registry.len() >= 15);
    let values = sample_values();

    for lang in registry.localizer().languages() {
        for name in registry.names() {
            let rendered = registry
                .render(name, &values, lang)
                .unwrap_or_else(|e| panic!("{name}/{lang}: {e}"));
            assert!(!rendered.subject.is_empty(), "{name}/{lang}");
            assert!(!rendered.html.contains("{{"), "{name}/{lang} left a slot");
            assert!(!rendered.text.contains("<p"), "{name}/{lang} text has markup");
        }
    }
}

#[test]
fn creator_names_are_escaped_in_bodies() {
    let registry = TemplateRegistry::load(&template_dir(), "en").unwrap();
    let rendered = registry
        .render("careteam_invitation", &sample_values(), "en")
        .unwrap();
    assert!(rendered.html.contains("Dr &lt;House&gt;"));
    assert_eq!(rendered.subject, "Dr <House> invites you to their care team");
}

#[test]
fn unsupported_language_falls_back_to_english() {
    let registry = TemplateRegistry::load(&template_dir(), "en").unwrap();
    let rendered = registry
        .render("sanity_check", &sample_values(), "de")
        .unwrap();
    assert_eq!(rendered.subject, "Test email");
}

#[test]
fn reload_swaps_registry() {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["meta", "html", "locales"] {
        std::fs::create_dir(dir.path().join(sub)).unwrap();
    }
    std::fs::write(
        dir.path().join("meta/hello.json"),
        r#"{"templateFileName": "hello.html", "contentParts": ["Body"]}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("html/hello.html"), "<p>{{Body}}</p>").unwrap();
    std::fs::write(
        dir.path().join("locales/m.en.yaml"),
        "hello:\n  Subject: Hi\n  Body: First\n",
    )
    .unwrap();

    let templates = Templates::load(dir.path(), "en").unwrap();
    let before = templates.current();
    assert_eq!(
        templates.render("hello", &Values::new(), "en").unwrap().html,
        "<p>First</p>"
    );

    std::fs::write(
        dir.path().join("locales/m.en.yaml"),
        "hello:\n  Subject: Hi\n  Body: Second\n",
    )
    .unwrap();
    assert_eq!(templates.reload().unwrap(), 1);
    assert_eq!(
        templates.render("hello", &Values::new(), "en").unwrap().html,
        "<p>Second</p>"
    );
    // Readers holding the old registry keep a consistent view.
    assert_eq!(
        before.render("hello", &Values::new(), "en").unwrap().html,
        "<p>First</p>"
    );

    std::fs::remove_file(dir.path().join("html/hello.html")).unwrap();
    assert!(templates.reload().is_err());
    assert_eq!(templates.current().len(), 1);
}

#[tokio::test]
async fn dispatcher_renders_and_sends() {
    let templates = Arc::new(Templates::load(template_dir(), "en").unwrap());
    let mailer = Arc::new(RecordingMailer::new());
    let dispatcher = Dispatcher::new(templates, mailer.clone());

    dispatcher
        .send(Outgoing {
            template: "patient_pin_reset",
            to: "patient@x.org",
            locale: "fr",
            values: sample_values(),
        })
        .await
        .unwrap();

    let email = mailer.last().unwrap();
    assert_eq!(email.to, vec!["patient@x.org".to_string()]);
    assert!(email.html.contains("123-456-789"));
    assert_eq!(email.tags.get("template").map(String::as_str), Some("patient_pin_reset"));
}

#[tokio::test]
async fn dispatcher_surfaces_render_errors() {
    let templates = Arc::new(Templates::load(template_dir(), "en").unwrap());
    let mailer = Arc::new(RecordingMailer::new());
    let dispatcher = Dispatcher::new(templates, mailer.clone());

    let err = dispatcher
        .send(Outgoing {
            template: "careteam_invitation",
            to: "bob@x.org",
            locale: "en",
            values: Values::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        confirm_notifications::NotificationError::Render(RenderError::MissingValue { .. })
    ));
    assert_eq!(mailer.count(), 0);
}
