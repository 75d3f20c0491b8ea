//! `{{Name}}` placeholder parsing and HTML escaping.

use std::collections::BTreeMap;

/// Named values substituted into templates and translations.
pub type Values = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(String),
}

/// A string split once into literal text and `{{Name}}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    segments: Vec<Segment>,
}

impl Compiled {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let name = rest[start + 2..start + 2 + len].trim().trim_start_matches('.');
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            if name.is_empty() {
                segments.push(Segment::Text(rest[start..start + 4 + len].to_string()));
            } else {
                segments.push(Segment::Slot(name.to_string()));
            }
            rest = &rest[start + 4 + len..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Self { segments }
    }

    /// Slot names in order of appearance.
    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Fills every slot, failing on the first one without a value.
    pub fn fill(&self, values: &Values) -> Result<String, String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => match values.get(name) {
                    Some(value) => out.push_str(value),
                    None => return Err(name.clone()),
                },
            }
        }
        Ok(out)
    }

    /// Fills known slots and leaves the others as written.
    pub fn fill_lenient(&self, values: &Values) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => match values.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(name);
                        out.push_str("}}");
                    }
                },
            }
        }
        out
    }
}

pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Plain-text alternative of an HTML body: `<head>` skipped, tags dropped,
/// entities decoded, blank runs collapsed.
pub fn html_to_text(html: &str) -> String {
    let html = html.find("<body").map_or(html, |i| &html[i..]);
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#34;", "\"")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");

    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_slots_with_spacing_and_dot_prefix() {
        let c = Compiled::parse("Hi {{ Name }}, see {{.Link}}!");
        assert_eq!(c.slots().collect::<Vec<_>>(), vec!["Name", "Link"]);
        let out = c.fill(&values(&[("Name", "Bob"), ("Link", "x")])).unwrap();
        assert_eq!(out, "Hi Bob, see x!");
    }

    #[test]
    fn fill_reports_missing_slot() {
        let c = Compiled::parse("{{A}} and {{B}}");
        assert_eq!(c.fill(&values(&[("A", "1")])), Err("B".to_string()));
        assert_eq!(c.fill_lenient(&values(&[("A", "1")])), "1 and {{B}}");
    }

    #[test]
    fn unterminated_braces_are_literal() {
        let c = Compiled::parse("a {{b");
        assert_eq!(c.fill(&Values::new()).unwrap(), "a {{b");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&#34;Tom&#34; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn text_alternative_strips_tags() {
        let text = html_to_text("<p>Hello&nbsp;<b>Bob</b></p>\n<p>Code: 123-456-789</p>");
        assert_eq!(text, "Hello Bob\nCode: 123-456-789");
    }

    #[test]
    fn text_alternative_skips_head() {
        let text = html_to_text("<html><head><style>p { x: y }</style></head><body><p>Hi</p></body></html>");
        assert_eq!(text, "Hi");
    }
}
