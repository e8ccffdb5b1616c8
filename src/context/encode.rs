//! Structured response bodies.

use serde::Serialize;
use thiserror::Error;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// A value could not be encoded. By the time the caller sees this error a
/// `500` carrying the message has already been written.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML serialization failed: {0}")]
    Xml(String),
}

pub fn to_json<T: Serialize + ?Sized>(value: &T, indent: bool) -> Result<Vec<u8>, SerializationError> {
    let encoded = if indent {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    Ok(encoded)
}

/// Encode `value` as XML. The root element is named after the type.
pub fn to_xml<T: Serialize + ?Sized>(value: &T, indent: bool) -> Result<Vec<u8>, SerializationError> {
    let mut out = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut out);
    if indent {
        serializer.indent(' ', 2);
    }
    value
        .serialize(serializer)
        .map_err(|e| SerializationError::Xml(e.to_string()))?;
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    /// Fails in every format.
    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("value is not encodable"))
        }
    }

    #[derive(Serialize)]
    struct User {
        id: u32,
        name: String,
    }

    #[test]
    fn test_json_compact_and_indented() {
        let user = User {
            id: 7,
            name: "ada".to_string(),
        };
        assert_eq!(to_json(&user, false).unwrap(), br#"{"id":7,"name":"ada"}"#);

        let pretty = String::from_utf8(to_json(&user, true).unwrap()).unwrap();
        assert_eq!(pretty, "{\n  \"id\": 7,\n  \"name\": \"ada\"\n}");
    }

    #[test]
    fn test_json_failure_is_reported() {
        let err = to_json(&Unencodable, false).unwrap_err();
        assert!(matches!(err, SerializationError::Json(_)));
        assert!(err.to_string().contains("not encodable"));
    }

    #[test]
    fn test_xml_root_named_after_type() {
        let user = User {
            id: 7,
            name: "ada".to_string(),
        };
        let xml = String::from_utf8(to_xml(&user, false).unwrap()).unwrap();
        assert_eq!(xml, "<User><id>7</id><name>ada</name></User>");

        let pretty = String::from_utf8(to_xml(&user, true).unwrap()).unwrap();
        assert!(pretty.contains("\n  <id>7</id>"));
    }

    #[test]
    fn test_xml_failure_is_reported() {
        let err = to_xml(&Unencodable, true).unwrap_err();
        assert!(matches!(err, SerializationError::Xml(_)));
        assert!(err.to_string().contains("not encodable"));
    }
}
