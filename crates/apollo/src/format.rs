//! Content format dispatch.
//!
//! Non-properties namespaces (`app.yml`, `app.json`, ...) are served as a single raw
//! blob under [`CONTENT_KEY`]. The [`FormatRegistry`] picks a [`ContentParser`] by the
//! namespace suffix and turns that blob into key/value pairs.

use crate::types::{ApolloConfig, ApolloError};
use parking_lot::RwLock;
use serde_yaml::Value as YamlValue;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

/// Key holding the raw content of non-properties namespaces.
pub const CONTENT_KEY: &str = "content";
/// Format key of the fallback parser.
pub const DEFAULT_FORMAT: &str = "";

/// Converts a raw content blob into key/value pairs.
pub trait ContentParser: Send + Sync + fmt::Debug {
    /// Parse `content`. An empty map means "nothing to replace the raw content with".
    fn parse(&self, content: &str) -> Result<HashMap<String, String>, ApolloError>;
}

/// Format key of a namespace: the text after its last `.`, or [`DEFAULT_FORMAT`].
pub fn format_of(namespace: &str) -> &str {
    namespace.rsplit_once('.').map_or(DEFAULT_FORMAT, |(_, ext)| ext)
}

/// Registry of parsers keyed by format.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    parsers: RwLock<HashMap<String, Arc<dyn ContentParser>>>,
}

impl FormatRegistry {
    /// Registry without any parser. Every namespace passes through raw.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in parsers: pass-through default, `properties`,
    /// `yml` and `yaml`.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register(DEFAULT_FORMAT, Arc::new(PassthroughParser));
        registry.register("properties", Arc::new(PropertiesParser));
        let yaml: Arc<dyn ContentParser> = Arc::new(YamlParser);
        registry.register("yml", yaml.clone());
        registry.register("yaml", yaml);
        registry
    }

    /// Register `parser` for `format`, replacing any previous one.
    pub fn register(&self, format: impl Into<String>, parser: Arc<dyn ContentParser>) {
        self.parsers.write().insert(format.into(), parser);
    }

    /// Remove the parser for `format`.
    pub fn remove(&self, format: &str) -> Option<Arc<dyn ContentParser>> {
        self.parsers.write().remove(format)
    }

    /// Parser registered for exactly `format`.
    pub fn resolve(&self, format: &str) -> Option<Arc<dyn ContentParser>> {
        self.parsers.read().get(format).cloned()
    }

    /// Parser for `namespace`, falling back to the default parser.
    pub fn parser_for(&self, namespace: &str) -> Option<Arc<dyn ContentParser>> {
        self.resolve(format_of(namespace)).or_else(|| self.resolve(DEFAULT_FORMAT))
    }

    /// Run `config` through its parser.
    ///
    /// The parsed pairs replace the configurations wholesale, but only when the parser
    /// produced something. Without a parser, or on a parse failure, the raw content
    /// stays as it was.
    pub fn apply(&self, mut config: ApolloConfig) -> ApolloConfig {
        let Some(parser) = self.parser_for(&config.namespace_name) else {
            return config;
        };
        let content = config.configurations.get(CONTENT_KEY).map(String::as_str).unwrap_or_default();
        match parser.parse(content) {
            Ok(parsed) if !parsed.is_empty() => config.configurations = parsed,
            Ok(_) => {}
            Err(err) => {
                debug!(
                    target: "apollo::format",
                    namespace = %config.namespace_name,
                    phase = "parse",
                    "[Apollo] Failed to parse content, keeping raw: {}",
                    err
                );
            }
        }
        config
    }
}

/// Default parser: leaves the content untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughParser;

impl ContentParser for PassthroughParser {
    fn parse(&self, _content: &str) -> Result<HashMap<String, String>, ApolloError> {
        Ok(HashMap::new())
    }
}

/// Java-style `.properties` parser.
///
/// Keys end at the first unescaped `=`, `:` or whitespace, so `key=value`,
/// `key: value` and `key value` are all accepted. Supports `#`/`!` comment lines,
/// trailing-backslash line continuations and backslash escapes (`\=`, `\:`,
/// `\ `, `\t`, `\n`) in keys and values.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertiesParser;

impl ContentParser for PropertiesParser {
    fn parse(&self, content: &str) -> Result<HashMap<String, String>, ApolloError> {
        let mut out = HashMap::new();
        let mut logical = String::new();
        for line in content.lines() {
            let line = if logical.is_empty() { line.trim_start() } else { line.trim() };
            if logical.is_empty() && (line.is_empty() || line.starts_with(['#', '!'])) {
                continue;
            }
            if let Some(stripped) = continued(line) {
                logical.push_str(stripped);
                continue;
            }
            logical.push_str(line);
            insert_property(&mut out, &logical);
            logical.clear();
        }
        if !logical.is_empty() {
            insert_property(&mut out, &logical);
        }
        Ok(out)
    }
}

/// Line without its continuation backslash, if it ends with an odd number of them.
fn continued(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    (trailing % 2 == 1).then(|| &line[..line.len() - 1])
}

fn insert_property(out: &mut HashMap<String, String>, line: &str) {
    let mut chars = line.char_indices();
    let mut key_end = line.len();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '=' | ':' => {
                key_end = idx;
                break;
            }
            c if c.is_whitespace() => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }

    let key = unescape(&line[..key_end]);
    if key.is_empty() {
        return;
    }

    // Whitespace, then at most one separator, then whitespace.
    let mut rest = line[key_end..].trim_start();
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start();
    }
    out.insert(key, unescape(rest));
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// YAML parser. Nested mappings flatten to dotted keys, sequences to `key[i]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

impl ContentParser for YamlParser {
    fn parse(&self, content: &str) -> Result<HashMap<String, String>, ApolloError> {
        let value: YamlValue =
            serde_yaml::from_str(content).map_err(|e| ApolloError::Parse(e.to_string()))?;
        let mut out = HashMap::new();
        match value {
            YamlValue::Null => {}
            YamlValue::Mapping(_) => flatten_yaml("", value, &mut out),
            _ => return Err(ApolloError::Parse("YAML root is not a mapping".to_string())),
        }
        Ok(out)
    }
}

fn flatten_yaml(prefix: &str, value: YamlValue, out: &mut HashMap<String, String>) {
    match value {
        YamlValue::Mapping(map) => {
            for (key, value) in map {
                let Some(key) = yaml_scalar(&key) else { continue };
                let path = if prefix.is_empty() { key } else { format!("{prefix}.{key}") };
                flatten_yaml(&path, value, out);
            }
        }
        YamlValue::Sequence(items) => {
            for (idx, value) in items.into_iter().enumerate() {
                flatten_yaml(&format!("{prefix}[{idx}]"), value, out);
            }
        }
        YamlValue::Tagged(tagged) => flatten_yaml(prefix, tagged.value, out),
        scalar => {
            out.insert(prefix.to_string(), yaml_scalar(&scalar).unwrap_or_default());
        }
    }
}

fn yaml_scalar(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::Null => Some(String::new()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Tagged(tagged) => yaml_scalar(&tagged.value),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailingParser;

    impl ContentParser for FailingParser {
        fn parse(&self, _content: &str) -> Result<HashMap<String, String>, ApolloError> {
            Err(ApolloError::Parse("boom".to_string()))
        }
    }

    fn raw(namespace: &str, content: &str) -> ApolloConfig {
        ApolloConfig::new(namespace).with_entry(CONTENT_KEY, content)
    }

    #[test]
    fn test_format_of() {
        assert_eq!(format_of("app.yml"), "yml");
        assert_eq!(format_of("foo.bar.yaml"), "yaml");
        assert_eq!(format_of("application"), DEFAULT_FORMAT);
    }

    #[test]
    fn test_registered_suffix_replaces_content() {
        let registry = FormatRegistry::with_defaults();
        let parsed = registry.apply(raw("app.yml", "server:\n  port: 8080\nname: demo\n"));

        assert_eq!(parsed.get("server.port"), Some("8080"));
        assert_eq!(parsed.get("name"), Some("demo"));
        assert_eq!(parsed.get(CONTENT_KEY), None);
    }

    #[test]
    fn test_unregistered_suffix_keeps_raw_content() {
        let registry = FormatRegistry::with_defaults();
        let parsed = registry.apply(raw("app.json", r#"{"k":"v"}"#));
        assert_eq!(parsed.get(CONTENT_KEY), Some(r#"{"k":"v"}"#));
        assert_eq!(parsed.configurations.len(), 1);
    }

    #[test]
    fn test_no_default_parser_keeps_raw_content() {
        let registry = FormatRegistry::empty();
        let parsed = registry.apply(raw("app.txt", "hello"));
        assert_eq!(parsed.get(CONTENT_KEY), Some("hello"));
    }

    #[test]
    fn test_empty_parse_does_not_erase_content() {
        let registry = FormatRegistry::with_defaults();
        let parsed = registry.apply(raw("app.yml", ""));
        assert_eq!(parsed.get(CONTENT_KEY), Some(""));

        let parsed = registry.apply(raw("app.properties", "# only a comment\n"));
        assert_eq!(parsed.get(CONTENT_KEY), Some("# only a comment\n"));
    }

    #[test]
    fn test_parse_error_keeps_raw_content() {
        let registry = FormatRegistry::empty();
        registry.register("bad", Arc::new(FailingParser));
        let parsed = registry.apply(raw("app.bad", "x"));
        assert_eq!(parsed.get(CONTENT_KEY), Some("x"));
    }

    #[test]
    fn test_default_parser_used_for_unknown_suffix() {
        let registry = FormatRegistry::empty();
        registry.register(DEFAULT_FORMAT, Arc::new(PropertiesParser));
        let parsed = registry.apply(raw("app.conf", "a=1\nb=2"));
        assert_eq!(parsed.get("a"), Some("1"));
        assert_eq!(parsed.get("b"), Some("2"));
    }

    #[test]
    fn test_remove_parser() {
        let registry = FormatRegistry::with_defaults();
        assert!(registry.remove("yml").is_some());
        assert!(registry.resolve("yml").is_none());
        assert!(registry.resolve("yaml").is_some());
    }

    #[test]
    fn test_properties_parser() {
        let content = "# comment\n! also comment\n\nhost = localhost\nport:8080\nlist=a,\\\n  b,\\\n  c\nflag\n";
        let parsed = PropertiesParser.parse(content).unwrap();

        assert_eq!(parsed["host"], "localhost");
        assert_eq!(parsed["port"], "8080");
        assert_eq!(parsed["list"], "a,b,c");
        assert_eq!(parsed["flag"], "");
        assert_eq!(parsed.len(), 4);
    }

    #[test]
    fn test_properties_whitespace_separator_and_escapes() {
        let content = "name   Alice\\tBob\ntimeout = 30 \na\\=b\\:c=v=w\nwith\\ space: x\npath=C:\\\\tmp\n  indented : y\n";
        let parsed = PropertiesParser.parse(content).unwrap();

        assert_eq!(parsed["name"], "Alice\tBob");
        assert_eq!(parsed["timeout"], "30 ");
        assert_eq!(parsed["a=b:c"], "v=w");
        assert_eq!(parsed["with space"], "x");
        assert_eq!(parsed["path"], "C:\\tmp");
        assert_eq!(parsed["indented"], "y");
        assert_eq!(parsed.len(), 6);
    }

    #[test]
    fn test_yaml_parser_sequences_and_scalars() {
        let content = "hosts:\n  - a\n  - b\nenabled: true\nratio: 0.5\nempty:\n";
        let parsed = YamlParser.parse(content).unwrap();

        assert_eq!(parsed["hosts[0]"], "a");
        assert_eq!(parsed["hosts[1]"], "b");
        assert_eq!(parsed["enabled"], "true");
        assert_eq!(parsed["ratio"], "0.5");
        assert_eq!(parsed["empty"], "");
    }

    #[test]
    fn test_yaml_parser_rejects_scalar_root() {
        assert!(YamlParser.parse("just a string").is_err());
        assert!(YamlParser.parse("key: [unclosed").is_err());
    }
}
