use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::{FetchError, ParseError};

/// Seam between the import worker and the network. The HTTP implementation
/// is the only one used in production; tests script their own.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFeedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }
}

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Map::new(),
            text: String::new(),
        }
    }

    /// Text-only elements collapse to a string; elements with children or
    /// attributes become objects, keeping their text under "_".
    fn into_value(mut self) -> Value {
        let text = self.text.trim().to_string();
        if self.children.is_empty() {
            Value::String(text)
        } else {
            if !text.is_empty() {
                self.children.insert("_".to_string(), Value::String(text));
            }
            Value::Object(self.children)
        }
    }
}

/// Inserts a child value, collapsing repeated siblings into an array.
fn insert_child(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(siblings)) => siblings.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn attributes_value(element: &quick_xml::events::BytesStart<'_>) -> Result<Option<Value>, ParseError> {
    let mut attrs = Map::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError(e.to_string()))?
            .to_string();
        attrs.insert(key, Value::String(value));
    }
    if attrs.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Value::Object(attrs)))
    }
}

/// Parses raw feed markup into a generic tree of JSON values. Element names
/// keep their namespace prefixes (`job:company` stays `job:company`), so the
/// normalizer can probe namespaced and bare keys alike.
pub fn parse_feed(xml: &str) -> Result<Value, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = vec![Frame::new(String::new())];

    loop {
        match reader.read_event().map_err(|e| ParseError(e.to_string()))? {
            Event::Start(e) => {
                let mut frame = Frame::new(String::from_utf8_lossy(e.name().as_ref()).to_string());
                if let Some(attrs) = attributes_value(&e)? {
                    frame.children.insert("$".to_string(), attrs);
                }
                stack.push(frame);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let value = match attributes_value(&e)? {
                    Some(attrs) => {
                        let mut map = Map::new();
                        map.insert("$".to_string(), attrs);
                        Value::Object(map)
                    }
                    None => Value::String(String::new()),
                };
                let parent = stack.last_mut().expect("stack holds the document root");
                insert_child(&mut parent.children, name, value);
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| ParseError(e.to_string()))?;
                stack
                    .last_mut()
                    .expect("stack holds the document root")
                    .text
                    .push_str(&text);
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).to_string();
                stack
                    .last_mut()
                    .expect("stack holds the document root")
                    .text
                    .push_str(&text);
            }
            Event::End(_) => {
                let frame = stack.pop().expect("end event matches an open element");
                if stack.is_empty() {
                    return Err(ParseError("unbalanced closing tag".to_string()));
                }
                let name = frame.name.clone();
                let value = frame.into_value();
                let parent = stack.last_mut().expect("checked above");
                insert_child(&mut parent.children, name, value);
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes
            // carry nothing the normalizer cares about.
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(ParseError("unexpected end of document".to_string()));
    }
    let root = stack.pop().expect("checked above");
    if root.children.is_empty() {
        return Err(ParseError("document has no root element".to_string()));
    }
    Ok(Value::Object(root.children))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_wrapped_feed() {
        let xml = r#"
            <rss>
              <channel>
                <title>Jobs</title>
                <item><guid>1</guid><title>One</title></item>
                <item><guid>2</guid><title>Two</title></item>
              </channel>
            </rss>
        "#;
        let tree = parse_feed(xml).unwrap();
        let items = &tree["rss"]["channel"]["item"];
        assert!(items.is_array());
        assert_eq!(items[0]["guid"], "1");
        assert_eq!(items[1]["title"], "Two");
    }

    #[test]
    fn single_item_stays_an_object() {
        let xml = "<rss><channel><item><guid>7</guid></item></channel></rss>";
        let tree = parse_feed(xml).unwrap();
        assert!(tree["rss"]["channel"]["item"].is_object());
        assert_eq!(tree["rss"]["channel"]["item"]["guid"], "7");
    }

    #[test]
    fn attributes_and_text_are_both_kept() {
        let xml = r#"<rss><item><guid isPermaLink="false">abc-123</guid></item></rss>"#;
        let tree = parse_feed(xml).unwrap();
        let guid = &tree["rss"]["item"]["guid"];
        assert_eq!(guid["_"], "abc-123");
        assert_eq!(guid["$"]["isPermaLink"], "false");
    }

    #[test]
    fn cdata_descriptions_survive() {
        let xml = "<rss><item><description><![CDATA[<b>Senior</b> role]]></description></item></rss>";
        let tree = parse_feed(xml).unwrap();
        assert_eq!(tree["rss"]["item"]["description"], "<b>Senior</b> role");
    }

    #[test]
    fn empty_element_becomes_empty_string() {
        let xml = "<rss><item><location/></item></rss>";
        let tree = parse_feed(xml).unwrap();
        assert_eq!(tree["rss"]["item"]["location"], "");
    }

    #[test]
    fn truncated_document_is_a_parse_error() {
        let err = parse_feed("<rss><channel><item>").unwrap_err();
        assert!(err.to_string().contains("not well-formed"));
    }

    #[test]
    fn non_xml_payload_is_a_parse_error() {
        assert!(parse_feed("{\"not\": \"xml\"}").is_err());
        assert!(parse_feed("").is_err());
    }
}
