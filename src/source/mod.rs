//! Source resolution and caching

pub mod cache;
pub mod resolver;

pub use cache::{BlobCache, CachedBlob};
pub use resolver::{
    detect_mime, InputKind, Resolved, ResolverConfig, SourceResolver, PDF_MIME, ZIP_MIME,
};

use schemars::JsonSchema;
use serde::Serialize;

/// Where a tool reads an input file from
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FileSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the file
        path: String,
    },
    /// Base64 encoded content; a `data:...;base64,` prefix is accepted
    Base64 {
        /// Base64 encoded file content
        base64: String,
    },
    /// URL to download the file from
    Url {
        /// URL of the file
        url: String,
    },
    /// Output of an earlier call
    CacheRef {
        /// Cache key from previous operation
        cache_key: String,
    },
}

const SOURCE_KEYS: [&str; 4] = ["path", "base64", "url", "cache_key"];

impl FileSource {
    /// Name used in results and logs; never contains payload data
    pub fn display_name(&self) -> String {
        match self {
            FileSource::Path { path } => path.clone(),
            FileSource::Base64 { .. } => "<base64>".to_string(),
            FileSource::Url { url } => url.clone(),
            FileSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    /// File name for archive entries: the last path or URL segment when there is one
    pub fn file_name(&self) -> Option<String> {
        let raw = match self {
            FileSource::Path { path } => path.as_str(),
            FileSource::Url { url } => url.split(['?', '#']).next().unwrap_or(url),
            _ => return None,
        };
        raw.rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

impl<'de> serde::Deserialize<'de> for FileSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = serde_json::Value::deserialize(deserializer)?;
        let Some(obj) = value.as_object() else {
            let kind = match &value {
                serde_json::Value::Array(_) => "an array",
                serde_json::Value::String(_) => "a string",
                serde_json::Value::Number(_) => "a number",
                serde_json::Value::Bool(_) => "a boolean",
                serde_json::Value::Null => "null",
                serde_json::Value::Object(_) => "an object",
            };
            return Err(D::Error::custom(format!(
                "Invalid source: expected an object with one of {:?}, but got {}",
                SOURCE_KEYS, kind
            )));
        };

        for key in SOURCE_KEYS {
            let Some(v) = obj.get(key) else { continue };
            let s = v
                .as_str()
                .ok_or_else(|| D::Error::custom(format!("\"{}\" must be a string", key)))?
                .to_string();
            return Ok(match key {
                "path" => FileSource::Path { path: s },
                "base64" => FileSource::Base64 { base64: s },
                "url" => FileSource::Url { url: s },
                _ => FileSource::CacheRef { cache_key: s },
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(D::Error::custom(format!(
            "Invalid source: expected an object with one of {:?}, but got keys: {:?}",
            SOURCE_KEYS, keys
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"path": "/a/b.pdf"}), FileSource::Path { path: "/a/b.pdf".into() })]
    #[case(json!({"base64": "AQID"}), FileSource::Base64 { base64: "AQID".into() })]
    #[case(json!({"url": "https://x.test/f.pdf"}), FileSource::Url { url: "https://x.test/f.pdf".into() })]
    #[case(json!({"cache_key": "k"}), FileSource::CacheRef { cache_key: "k".into() })]
    fn test_deserialize_source(#[case] value: serde_json::Value, #[case] expected: FileSource) {
        assert_eq!(serde_json::from_value::<FileSource>(value).unwrap(), expected);
    }

    #[test]
    fn test_deserialize_errors_are_descriptive() {
        let err = serde_json::from_value::<FileSource>(json!({"file": "x"})).unwrap_err();
        assert!(err.to_string().contains("got keys"));
        let err = serde_json::from_value::<FileSource>(json!("x.pdf")).unwrap_err();
        assert!(err.to_string().contains("a string"));
        let err = serde_json::from_value::<FileSource>(json!({"path": 3})).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_file_name() {
        let path = FileSource::Path {
            path: "/scans/receipt.jpg".into(),
        };
        assert_eq!(path.file_name().as_deref(), Some("receipt.jpg"));
        let url = FileSource::Url {
            url: "https://x.test/docs/id.png?sig=1".into(),
        };
        assert_eq!(url.file_name().as_deref(), Some("id.png"));
        let b64 = FileSource::Base64 { base64: "AA".into() };
        assert_eq!(b64.file_name(), None);
        assert_eq!(b64.display_name(), "<base64>");
    }
}
