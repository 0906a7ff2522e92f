//! Raw (lenient) manifest layer.
//!
//! Only two things are fatal here: unparsable JSON and a missing `metadata`
//! or `readingOrder`. Everything else — malformed link objects, unknown
//! properties, bad option values — is dropped or deferred to the table-driven
//! validation in [`crate::options`].

use serde_json::Value;

use crate::error::{DivinaError, DivinaResult};

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct RawLinkObject {
    pub href: Option<String>,
    #[serde(rename = "type")]
    pub mime: Option<String>,
    /// Distinguishing tag used when ranking alternates (e.g. `"fr"`).
    pub language: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub alternate: Vec<RawLinkObject>,
}

#[derive(Clone, Debug)]
pub struct Manifest {
    pub metadata: Value,
    pub reading_order: Vec<RawLinkObject>,
    pub guided: Vec<RawLinkObject>,
    /// `links` entry with rel "self", used to derive the default folder path.
    pub self_href: Option<String>,
}

impl Manifest {
    pub fn from_json_str(json: &str) -> DivinaResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| DivinaError::parse(format!("unparsable manifest JSON: {e}")))?;
        Self::from_value(value)
    }

    #[tracing::instrument(skip(value))]
    pub fn from_value(value: Value) -> DivinaResult<Self> {
        let Some(object) = value.as_object() else {
            return Err(DivinaError::parse("manifest root must be a JSON object"));
        };

        let metadata = object
            .get("metadata")
            .filter(|m| m.is_object())
            .cloned()
            .ok_or_else(|| DivinaError::parse("manifest has no metadata"))?;

        let raw_reading_order = object
            .get("readingOrder")
            .and_then(Value::as_array)
            .ok_or_else(|| DivinaError::parse("manifest has no readingOrder"))?;

        let reading_order = parse_link_objects(raw_reading_order);
        if reading_order.is_empty() {
            return Err(DivinaError::parse("readingOrder has no usable link objects"));
        }

        let guided = object
            .get("guided")
            .and_then(Value::as_array)
            .map(|items| parse_link_objects(items))
            .unwrap_or_default();

        let self_href = object
            .get("links")
            .and_then(Value::as_array)
            .and_then(|links| links.iter().find_map(self_link_href));

        Ok(Self {
            metadata,
            reading_order,
            guided,
            self_href,
        })
    }

    pub fn has_guided(&self) -> bool {
        !self.guided.is_empty()
    }

    /// Folder prefix derived from the self link, used to resolve relative
    /// resource paths.
    pub fn folder_path(&self) -> Option<String> {
        let href = self.self_href.as_deref()?;
        let (folder, _) = href.rsplit_once('/')?;
        Some(format!("{folder}/"))
    }
}

fn parse_link_objects(items: &[Value]) -> Vec<RawLinkObject> {
    items
        .iter()
        .filter_map(|item| {
            let link: RawLinkObject = serde_json::from_value(item.clone()).ok()?;
            if link.href.is_none() && link.properties.get("layers").is_none() {
                tracing::debug!("dropping link object with no href and no layers");
                return None;
            }
            Some(link)
        })
        .collect()
}

fn self_link_href(link: &Value) -> Option<String> {
    let rel = link.get("rel")?;
    let is_self = match rel {
        Value::String(s) => s == "self",
        Value::Array(items) => items.iter().any(|v| v.as_str() == Some("self")),
        _ => false,
    };
    if !is_self {
        return None;
    }
    link.get("href").and_then(Value::as_str).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_metadata_is_fatal() {
        let err = Manifest::from_value(json!({ "readingOrder": [{ "href": "a.png" }] }));
        assert!(matches!(err, Err(DivinaError::Parse(_))));
    }

    #[test]
    fn missing_reading_order_is_fatal() {
        let err = Manifest::from_value(json!({ "metadata": {} }));
        assert!(matches!(err, Err(DivinaError::Parse(_))));
    }

    #[test]
    fn unparsable_json_is_fatal() {
        assert!(matches!(
            Manifest::from_json_str("{ not json"),
            Err(DivinaError::Parse(_))
        ));
    }

    #[test]
    fn malformed_link_objects_are_skipped() {
        let manifest = Manifest::from_value(json!({
            "metadata": {},
            "readingOrder": [
                { "href": "a.png" },
                { "href": 42 },
                "nonsense",
                { "href": "b.png" }
            ]
        }))
        .unwrap();
        assert_eq!(manifest.reading_order.len(), 2);
    }

    #[test]
    fn self_link_yields_folder_path() {
        let manifest = Manifest::from_value(json!({
            "metadata": {},
            "readingOrder": [{ "href": "a.png" }],
            "links": [
                { "rel": "search", "href": "https://x.test/q" },
                { "rel": ["self"], "href": "https://x.test/story/manifest.json" }
            ]
        }))
        .unwrap();
        assert_eq!(
            manifest.folder_path().as_deref(),
            Some("https://x.test/story/")
        );
    }

    #[test]
    fn guided_list_is_optional() {
        let manifest = Manifest::from_value(json!({
            "metadata": {},
            "readingOrder": [{ "href": "a.png" }],
            "guided": [{ "href": "a.png#xywh=0,0,10,10" }]
        }))
        .unwrap();
        assert!(manifest.has_guided());
    }
}
