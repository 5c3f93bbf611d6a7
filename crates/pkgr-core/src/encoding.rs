//! Package encodings and how they are resolved.
//!
//! Two independent lookups decide which grammar governs a payload:
//!
//! - the request `Content-Type` header, matched case-sensitively, which
//!   governs an inline payload and the request envelope itself
//! - a [`PackageRemote`]'s explicit content type, then its URL extension,
//!   both matched case-insensitively, which governs a fetched package
//!
//! Neither path fails. Unknown header values fall back to JSON and unknown
//! remotes fall back to [`Encoding::Source`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialization format of a package or request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Json,
    Yaml,
    Jsonnet,
    /// Self-describing source text; the decoder sniffs the grammar.
    Source,
}

/// `Content-Type` header values with a dedicated encoding. Anything else is JSON.
const HEADER_ENCODINGS: &[(&str, Encoding)] = &[
    ("application/x-jsonnet", Encoding::Jsonnet),
    ("text/yml", Encoding::Yaml),
    ("application/x-yaml", Encoding::Yaml),
];

/// Content-type hints accepted on a remote, compared lowercase.
const REMOTE_CONTENT_TYPES: &[(&str, Encoding)] = &[
    ("jsonnet", Encoding::Jsonnet),
    ("json", Encoding::Json),
    ("yml", Encoding::Yaml),
    ("yaml", Encoding::Yaml),
];

/// URL path extensions accepted on a remote, compared lowercase.
const REMOTE_EXTENSIONS: &[(&str, Encoding)] = &[
    (".jsonnet", Encoding::Jsonnet),
    (".json", Encoding::Json),
    (".yml", Encoding::Yaml),
    (".yaml", Encoding::Yaml),
];

impl Encoding {
    /// Resolve the encoding named by a request `Content-Type` header value.
    ///
    /// The match is exact; parameters such as `; charset=utf-8` make the value
    /// unrecognized, which resolves to JSON like any other unknown value.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        content_type
            .and_then(|ct| lookup(HEADER_ENCODINGS, ct))
            .unwrap_or(Encoding::Json)
    }

    /// The canonical media type used when writing a body in this encoding.
    pub fn media_type(self) -> &'static str {
        match self {
            Encoding::Json | Encoding::Source => "application/json; charset=utf-8",
            Encoding::Yaml => "application/x-yaml",
            Encoding::Jsonnet => "application/x-jsonnet",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Yaml => "yaml",
            Encoding::Jsonnet => "jsonnet",
            Encoding::Source => "source",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package hosted elsewhere (a gist, a raw file in a repository, ...).
///
/// When `content_type` is empty the encoding is discerned from the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRemote {
    #[serde(default)]
    pub url: String,

    #[serde(rename = "contentType", default)]
    pub content_type: String,
}

impl PackageRemote {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: String::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Whether this remote actually supplies the package.
    pub fn is_set(&self) -> bool {
        !self.url.is_empty()
    }

    /// Encoding of the remote content: explicit content type, then URL
    /// extension, then [`Encoding::Source`].
    pub fn encoding(&self) -> Encoding {
        let content_type = self.content_type.to_ascii_lowercase();
        if let Some(encoding) = lookup(REMOTE_CONTENT_TYPES, &content_type) {
            return encoding;
        }

        url_extension(&self.url)
            .and_then(|ext| lookup(REMOTE_EXTENSIONS, &ext))
            .unwrap_or(Encoding::Source)
    }
}

fn lookup(table: &[(&str, Encoding)], key: &str) -> Option<Encoding> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, encoding)| *encoding)
}

/// Lowercased extension (with the leading dot) of the last URL path segment.
/// Query strings and fragments are ignored.
fn url_extension(raw: &str) -> Option<String> {
    let path = match url::Url::parse(raw) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let file = path.rsplit('/').next()?;
    let dot = file.rfind('.')?;
    Some(file[dot..].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_table() {
        assert_eq!(
            Encoding::from_content_type(Some("application/x-jsonnet")),
            Encoding::Jsonnet
        );
        assert_eq!(Encoding::from_content_type(Some("text/yml")), Encoding::Yaml);
        assert_eq!(
            Encoding::from_content_type(Some("application/x-yaml")),
            Encoding::Yaml
        );
        assert_eq!(
            Encoding::from_content_type(Some("application/json")),
            Encoding::Json
        );
    }

    #[test]
    fn test_header_defaults_to_json() {
        assert_eq!(Encoding::from_content_type(None), Encoding::Json);
        assert_eq!(Encoding::from_content_type(Some("text/plain")), Encoding::Json);
        // Case-sensitive on purpose.
        assert_eq!(
            Encoding::from_content_type(Some("Application/X-YAML")),
            Encoding::Json
        );
    }

    #[test]
    fn test_remote_content_type_wins_over_extension() {
        let remote = PackageRemote::new("https://example.com/pkg.json").with_content_type("yaml");
        assert_eq!(remote.encoding(), Encoding::Yaml);

        let remote = PackageRemote::new("https://example.com/pkg.yml").with_content_type("JSONNET");
        assert_eq!(remote.encoding(), Encoding::Jsonnet);
    }

    #[test]
    fn test_remote_extension_table() {
        let cases = [
            ("https://example.com/a/pkg.jsonnet", Encoding::Jsonnet),
            ("https://example.com/a/pkg.json", Encoding::Json),
            ("https://example.com/a/pkg.yml", Encoding::Yaml),
            ("https://example.com/a/pkg.YAML", Encoding::Yaml),
            ("https://example.com/a/pkg.yaml?token=abc#frag", Encoding::Yaml),
            ("https://example.com/a/pkg", Encoding::Source),
            ("https://example.com/a.json/pkg", Encoding::Source),
            ("not a url/pkg.json", Encoding::Json),
        ];
        for (url, expected) in cases {
            assert_eq!(PackageRemote::new(url).encoding(), expected, "{url}");
        }
    }

    #[test]
    fn test_unknown_remote_content_type_falls_through_to_extension() {
        let remote = PackageRemote::new("https://example.com/pkg.json").with_content_type("toml");
        assert_eq!(remote.encoding(), Encoding::Json);
    }

    #[test]
    fn test_remote_is_set() {
        assert!(!PackageRemote::default().is_set());
        assert!(PackageRemote::new("https://example.com").is_set());
    }
}
