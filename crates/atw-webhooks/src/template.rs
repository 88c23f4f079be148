//! Message templates.
//!
//! ```text
//! {player.name}: {chat.message|trim|truncate:200}
//! ```
//!
//! A placeholder is `{key}` optionally followed by `|transform` or
//! `|transform:arg:arg` steps applied left to right. `{{` and `}}` produce
//! literal braces. Inside a placeholder `\|` and `\:` escape the separators.
//! Templates are parsed once when the registry is built; rendering never fails.

use crate::error::TemplateError;
use atw_core::redaction::REDACTED;
use atw_core::{Attributes, RedactionPolicy};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
enum Transform {
    Trim,
    Lower,
    Upper,
    Default(String),
    Truncate(usize),
    Replace { from: String, to: String },
    Regex { pattern: Regex, replacement: String },
    LastPathSegment,
    FirstPathSegment,
    Map(Vec<(String, String)>),
    Json,
    Html,
}

impl Transform {
    fn parse(key: &str, spec: &str) -> Result<Self, TemplateError> {
        let (name, args) = split_transform_spec(spec);
        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(TemplateError::Arity {
                    key: key.to_string(),
                    name: name.clone(),
                    expected,
                    actual: args.len(),
                })
            }
        };

        match name.as_str() {
            "trim" | "lower" | "upper" | "last-path-segment" | "first-path-segment" | "json"
            | "html" => {
                arity("0", args.is_empty())?;
                Ok(match name.as_str() {
                    "trim" => Self::Trim,
                    "lower" => Self::Lower,
                    "upper" => Self::Upper,
                    "last-path-segment" => Self::LastPathSegment,
                    "first-path-segment" => Self::FirstPathSegment,
                    "json" => Self::Json,
                    _ => Self::Html,
                })
            }
            "default" => {
                arity("1", args.len() == 1)?;
                Ok(Self::Default(args[0].clone()))
            }
            "truncate" => {
                arity("1", args.len() == 1)?;
                let max = args[0]
                    .trim()
                    .parse()
                    .map_err(|_| TemplateError::InvalidNumber {
                        key: key.to_string(),
                        value: args[0].clone(),
                    })?;
                Ok(Self::Truncate(max))
            }
            "replace" => {
                arity("2", args.len() == 2)?;
                Ok(Self::Replace {
                    from: args[0].clone(),
                    to: args[1].clone(),
                })
            }
            "regex" => {
                arity("2", args.len() == 2)?;
                let pattern = Regex::new(&args[0]).map_err(|e| TemplateError::InvalidRegex {
                    key: key.to_string(),
                    pattern: args[0].clone(),
                    message: e.to_string(),
                })?;
                Ok(Self::Regex {
                    pattern,
                    replacement: args[1].clone(),
                })
            }
            "map" => {
                arity(
                    "an even, non-zero number of",
                    !args.is_empty() && args.len() % 2 == 0,
                )?;
                Ok(Self::Map(
                    args.chunks(2)
                        .map(|pair| (pair[0].clone(), pair[1].clone()))
                        .collect(),
                ))
            }
            _ => Err(TemplateError::UnknownTransform {
                key: key.to_string(),
                name: name.clone(),
            }),
        }
    }

    fn apply(&self, value: String) -> String {
        match self {
            Self::Trim => value.trim().to_string(),
            Self::Lower => value.to_lowercase(),
            Self::Upper => value.to_uppercase(),
            Self::Default(fallback) if value.is_empty() => fallback.clone(),
            Self::Default(_) => value,
            Self::Truncate(max) => {
                if value.chars().count() <= *max {
                    value
                } else {
                    value.chars().take(*max).collect()
                }
            }
            Self::Replace { from, to } => value.replace(from.as_str(), to),
            Self::Regex {
                pattern,
                replacement,
            } => pattern
                .replace_all(&value, replacement.as_str())
                .into_owned(),
            Self::LastPathSegment => value.rsplit('/').next().unwrap_or_default().to_string(),
            Self::FirstPathSegment => value.split('/').next().unwrap_or_default().to_string(),
            Self::Map(pairs) => pairs
                .iter()
                .find(|(from, _)| *from == value)
                .map(|(_, to)| to.clone())
                .unwrap_or(value),
            Self::Json => escape_json(&value),
            Self::Html => escape_html(&value),
        }
    }
}

#[derive(Debug, Clone)]
struct Placeholder {
    key: String,
    transforms: Vec<Transform>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

/// Output of [`Template::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Placeholder keys that had no value, in template order.
    pub missing: Vec<String>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::StrayClose { position }),
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    while let Some((_, inner)) = chars.next() {
                        match inner {
                            '\\' => {
                                body.push('\\');
                                if let Some((_, escaped)) = chars.next() {
                                    body.push(escaped);
                                }
                            }
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateError::Unclosed { position }),
                            other => body.push(other),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed { position });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(parse_placeholder(&body, position)?));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Attribute keys referenced by placeholders, in template order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(placeholder) => Some(placeholder.key.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render against an attribute map. Missing and absent values render as
    /// the empty string before transforms run; redacted keys render
    /// `[REDACTED]` and skip their transforms.
    pub fn render(&self, attributes: &Attributes, redaction: &RedactionPolicy) -> Rendered {
        let mut text = String::with_capacity(self.source.len());
        let mut missing = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => text.push_str(literal),
                Segment::Placeholder(placeholder) => {
                    if redaction.is_redacted(&placeholder.key) {
                        text.push_str(REDACTED);
                        continue;
                    }
                    let value = match attributes.get(&placeholder.key) {
                        Some(value) if !value.is_absent() => value.as_text().into_owned(),
                        _ => {
                            missing.push(placeholder.key.clone());
                            String::new()
                        }
                    };
                    let value = placeholder
                        .transforms
                        .iter()
                        .fold(value, |current, transform| transform.apply(current));
                    text.push_str(&value);
                }
            }
        }

        Rendered { text, missing }
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_placeholder(body: &str, position: usize) -> Result<Placeholder, TemplateError> {
    let mut steps = split_unescaped(body, '|').into_iter();
    let key = steps.next().unwrap_or_default().trim();
    if key.is_empty() {
        return Err(TemplateError::EmptyPlaceholder { position });
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(TemplateError::InvalidKey {
            key: key.to_string(),
        });
    }

    let transforms = steps
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(|step| Transform::parse(key, step))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Placeholder {
        key: key.to_string(),
        transforms,
    })
}

/// `name:arg1:arg2` into the unescaped name and arguments.
fn split_transform_spec(spec: &str) -> (String, Vec<String>) {
    let mut parts = split_unescaped(spec, ':').into_iter();
    let name = unescape(parts.next().unwrap_or_default()).trim().to_string();
    (name, parts.map(unescape).collect())
}

fn split_unescaped(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Unescape `\:` and `\|`; any other backslash is kept as written.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some(&next)) if next == ':' || next == '|' => {
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value for embedding inside a JSON string literal.
pub fn escape_json(input: &str) -> String {
    match serde_json::to_string(input) {
        Ok(quoted) => quoted[1..quoted.len() - 1].to_string(),
        Err(_) => String::new(),
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use atw_core::AttributeValue;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AttributeValue::from(*v)))
            .collect()
    }

    fn render(template: &str, attributes: &Attributes) -> String {
        Template::parse(template)
            .unwrap()
            .render(attributes, &RedactionPolicy::disabled())
            .text
    }

    #[test]
    fn test_simple_substitution() {
        let attributes = attrs(&[("player", "Alice"), ("text", "hi")]);
        assert_eq!(render("{player}: {text}", &attributes), "Alice: hi");
    }

    #[test]
    fn test_missing_and_absent_render_empty() {
        let mut attributes = attrs(&[]);
        attributes.insert("world.name".into(), AttributeValue::Absent);

        let template = Template::parse("[{player.name}|{world.name}]").unwrap();
        let rendered = template.render(&attributes, &RedactionPolicy::disabled());
        assert_eq!(rendered.text, "[|]");
        assert_eq!(rendered.missing, vec!["player.name", "world.name"]);
    }

    #[test]
    fn test_literal_braces() {
        let attributes = attrs(&[("name", "x")]);
        assert_eq!(
            render(r#"{{"content": "{name}"}}"#, &attributes),
            r#"{"content": "x"}"#
        );
    }

    #[test]
    fn test_transform_chain() {
        let attributes = attrs(&[("msg", "  Hello World  ")]);
        assert_eq!(render("{msg|trim|lower}", &attributes), "hello world");
        assert_eq!(render("{msg|trim|upper|truncate:5}", &attributes), "HELLO");
        assert_eq!(render("{msg|truncate:100}", &attributes), "  Hello World  ");
    }

    #[test]
    fn test_default_applies_to_missing() {
        let attributes = attrs(&[("empty", "")]);
        assert_eq!(render("{nope|default:n/a}", &attributes), "n/a");
        assert_eq!(render("{empty|default:none}", &attributes), "none");
        assert_eq!(render("{nope|default:}", &attributes), "");
    }

    #[test]
    fn test_replace_and_escapes() {
        let attributes = attrs(&[("v", "a:b|c")]);
        assert_eq!(render(r"{v|replace:\::-}", &attributes), "a-b|c");
        assert_eq!(render(r"{v|replace:\|:/}", &attributes), "a:b/c");
    }

    #[test]
    fn test_regex_transform() {
        let attributes = attrs(&[("cmd", "/tp Alice 10 64 10")]);
        assert_eq!(
            render(r"{cmd|regex:^/(\w+).*$:$1}", &attributes),
            "tp"
        );
    }

    #[test]
    fn test_path_segments() {
        let attributes = attrs(&[("p", "minecraft/blocks/stone"), ("flat", "stone")]);
        assert_eq!(render("{p|last-path-segment}", &attributes), "stone");
        assert_eq!(render("{p|first-path-segment}", &attributes), "minecraft");
        assert_eq!(render("{flat|last-path-segment}", &attributes), "stone");
    }

    #[test]
    fn test_map_transform() {
        let attributes = attrs(&[("mode", "SURVIVAL"), ("other", "SPECTATOR")]);
        let template = "{mode|map:SURVIVAL:Survival:CREATIVE:Creative}";
        assert_eq!(render(template, &attributes), "Survival");
        assert_eq!(render("{other|map:SURVIVAL:Survival}", &attributes), "SPECTATOR");
    }

    #[test]
    fn test_escape_json_embeds_in_string_literal() {
        let raw = "tab\there \\ \"quoted\" \u{1}ctl é";
        let escaped = escape_json(raw);
        assert_eq!(escaped, r#"tab\there \\ \"quoted\" \u0001ctl é"#);
        let decoded: String = serde_json::from_str(&format!("\"{}\"", escaped)).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_json_and_html_escaping() {
        let attributes = attrs(&[("m", "say \"hi\"\n<b>&'")]);
        assert_eq!(render("{m|json}", &attributes), r#"say \"hi\"\n<b>&'"#);
        assert_eq!(
            render("{m|html}", &attributes),
            "say &quot;hi&quot;\n&lt;b&gt;&amp;&#39;"
        );
    }

    #[test]
    fn test_redaction_skips_transforms() {
        let attributes = attrs(&[("player.uuid", "1234"), ("player.name", "Bob")]);
        let template = Template::parse("{player.name} {player.uuid|default:x}").unwrap();
        let policy = RedactionPolicy::new(true, vec!["*.uuid".into()]);
        assert_eq!(template.render(&attributes, &policy).text, "Bob [REDACTED]");
    }

    #[test]
    fn test_render_is_deterministic() {
        let attributes = attrs(&[("a", "1"), ("b", "2")]);
        let template = Template::parse("{a}-{b|upper}-{c|default:z}").unwrap();
        let policy = RedactionPolicy::disabled();
        assert_eq!(
            template.render(&attributes, &policy),
            template.render(&attributes, &policy)
        );
    }

    #[test]
    fn test_keys() {
        let template = Template::parse("{a} and {b.c|trim} {{d}}").unwrap();
        assert_eq!(template.keys().collect::<Vec<_>>(), vec!["a", "b.c"]);
    }

    #[test]
    fn test_malformed_templates() {
        assert_eq!(
            Template::parse("hello {name").unwrap_err(),
            TemplateError::Unclosed { position: 6 }
        );
        assert_eq!(
            Template::parse("a } b").unwrap_err(),
            TemplateError::StrayClose { position: 2 }
        );
        assert_eq!(
            Template::parse("{}").unwrap_err(),
            TemplateError::EmptyPlaceholder { position: 0 }
        );
        assert_eq!(
            Template::parse("{|trim}").unwrap_err(),
            TemplateError::EmptyPlaceholder { position: 0 }
        );
        assert!(matches!(
            Template::parse("{bad key}").unwrap_err(),
            TemplateError::InvalidKey { .. }
        ));
        assert!(matches!(
            Template::parse("{a|shout}").unwrap_err(),
            TemplateError::UnknownTransform { .. }
        ));
        assert!(matches!(
            Template::parse("{a|trim:1}").unwrap_err(),
            TemplateError::Arity { .. }
        ));
        assert!(matches!(
            Template::parse("{a|replace:x}").unwrap_err(),
            TemplateError::Arity { .. }
        ));
        assert!(matches!(
            Template::parse("{a|map:x}").unwrap_err(),
            TemplateError::Arity { .. }
        ));
        assert!(matches!(
            Template::parse("{a|truncate:ten}").unwrap_err(),
            TemplateError::InvalidNumber { .. }
        ));
        assert!(matches!(
            Template::parse("{a|regex:(:x}").unwrap_err(),
            TemplateError::InvalidRegex { .. }
        ));
        assert!(matches!(
            Template::parse("{a{b}").unwrap_err(),
            TemplateError::Unclosed { .. }
        ));
    }
}
