// Response rendering for the terminal

use std::str::FromStr;

use cfgship_core::ResponseObject;
use cfgship_persistence::Item;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    #[default]
    Human,
    Silent,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            "silent" => Ok(OutputFormat::Silent),
            other => anyhow::bail!("unknown output format '{}' (expected human, json or silent)", other),
        }
    }
}

/// Render a response; `None` when nothing should be printed
pub fn render(resp: &ResponseObject, format: OutputFormat) -> anyhow::Result<Option<String>> {
    match format {
        OutputFormat::Json => Ok(Some(serde_json::to_string(resp)?)),
        OutputFormat::Human => Ok(Some(render_human(resp))),
        OutputFormat::Silent => Ok(None),
    }
}

fn render_human(resp: &ResponseObject) -> String {
    if !resp.is_success() {
        return format!("Error: {}", resp.error);
    }

    let mut lines = Vec::new();
    if !resp.message.is_empty() {
        lines.push(resp.message.clone());
    }
    if let Some(line) = describe_item(&resp.item) {
        lines.push(line);
    }
    if let Some(line) = describe_item(&resp.prev_item) {
        lines.push(format!("previously {line}"));
    }
    lines.join("\n")
}

fn describe_item(item: &Item) -> Option<String> {
    if item.is_empty() {
        return None;
    }

    let value = match item.rendered_value() {
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => "(deleted)".to_string(),
    };

    let mut line = format!("{} = {} (version {})", item.key, value, item.version);
    if let Some(expiration) = item.expiration() {
        line.push_str(&format!(", expires {}", expiration.to_rfc3339()));
    }
    Some(line)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn item(key: &str, value: Option<&'static [u8]>, version: i64) -> Item {
        Item {
            key: key.to_string(),
            value: value.map(Bytes::from_static),
            version,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("Human".parse::<OutputFormat>().unwrap(), OutputFormat::Human);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_human_set_output() {
        let resp = ResponseObject {
            action: "set".to_string(),
            item: item("db/host", Some(b"10.0.0.2"), 2),
            prev_item: item("db/host", Some(b"10.0.0.1"), 1),
            ..Default::default()
        };
        assert_eq!(
            render(&resp, OutputFormat::Human).unwrap().unwrap(),
            "db/host = 10.0.0.2 (version 2)\npreviously db/host = 10.0.0.1 (version 1)"
        );
    }

    #[test]
    fn test_human_delete_output() {
        let resp = ResponseObject {
            action: "delete".to_string(),
            item: item("k", None, 3),
            prev_item: item("k", Some(b"v"), 2),
            ..Default::default()
        };
        let out = render(&resp, OutputFormat::Human).unwrap().unwrap();
        assert!(out.starts_with("k = (deleted) (version 3)"));
    }

    #[test]
    fn test_human_error_output() {
        let resp = ResponseObject::from_error("get", &cfgship_common::CfgError::MissingKeyName);
        assert_eq!(
            render(&resp, OutputFormat::Human).unwrap().unwrap(),
            "Error: missing key name"
        );
    }

    #[test]
    fn test_json_and_silent_output() {
        let resp = ResponseObject::new("which");
        assert_eq!(
            render(&resp, OutputFormat::Json).unwrap().unwrap(),
            r#"{"action":"which"}"#
        );
        assert!(render(&resp, OutputFormat::Silent).unwrap().is_none());
    }
}
