//! Validation of incoming peer specifications.

use crate::error::ValidationError;
use crate::model::PeerSpec;
use fedlink_types::{DataType, DataTypeSet, Protocol};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 255;
const MAX_ADDRESS_LEN: usize = 253;

/// Unvalidated peer specification, as submitted by an operator.
///
/// Fields are deliberately loose (strings, wide integers) so every problem
/// can be reported as a [`ValidationError`] naming the field, rather than
/// as an opaque deserialisation failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerSpecInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub port: Option<i64>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub push_data_types: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PeerSpecInput {
    /// Checks every field and produces a [`PeerSpec`].
    ///
    /// Empty `username`/`password`/`notes` strings are normalised to `None`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, in field order.
    pub fn validate(&self) -> Result<PeerSpec, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("name", "must not be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ValidationError::new(
                "name",
                format!("must be at most {MAX_NAME_LEN} characters"),
            ));
        }

        let address = self.address.trim();
        if address.is_empty() {
            return Err(ValidationError::new("address", "must not be empty"));
        }
        if address.len() > MAX_ADDRESS_LEN {
            return Err(ValidationError::new(
                "address",
                format!("must be at most {MAX_ADDRESS_LEN} characters"),
            ));
        }
        if address.chars().any(char::is_whitespace) {
            return Err(ValidationError::new("address", "must not contain whitespace"));
        }

        let port = match self.port {
            Some(p) if (1..=65535).contains(&p) => p as u16,
            Some(p) => {
                return Err(ValidationError::new(
                    "port",
                    format!("must be between 1 and 65535, got {p}"),
                ))
            }
            None => return Err(ValidationError::new("port", "is required")),
        };

        let protocol: Protocol = self.protocol.trim().parse().map_err(|_| {
            ValidationError::new(
                "protocol",
                format!("must be one of tcp, ssl; got '{}'", self.protocol),
            )
        })?;

        let mut push_data_types = DataTypeSet::EMPTY;
        for label in &self.push_data_types {
            let data_type: DataType = label.parse().map_err(|_| {
                ValidationError::new(
                    "push_data_types",
                    format!(
                        "unknown data type '{label}'; expected a subset of cot, chat, missions, datapackages, video"
                    ),
                )
            })?;
            push_data_types.insert(data_type);
        }

        Ok(PeerSpec {
            name: name.to_string(),
            address: address.to_string(),
            port,
            protocol,
            username: non_empty(self.username.as_deref()),
            password: self.password.clone().filter(|p| !p.is_empty()),
            notes: non_empty(self.notes.as_deref()),
            push_data_types,
            enabled: self.enabled,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha() -> PeerSpecInput {
        PeerSpecInput {
            name: "alpha".into(),
            address: "peer.example.com".into(),
            port: Some(8089),
            protocol: "ssl".into(),
            push_data_types: vec!["cot".into(), "chat".into()],
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_a_complete_spec() {
        let spec = alpha().validate().expect("alpha is valid");
        assert_eq!(spec.name, "alpha");
        assert_eq!(spec.port, 8089);
        assert_eq!(spec.protocol, Protocol::Ssl);
        assert!(spec.push_data_types.contains(DataType::Cot));
        assert!(spec.push_data_types.contains(DataType::Chat));
        assert!(!spec.push_data_types.contains(DataType::Video));
    }

    #[test]
    fn empty_data_type_list_is_valid() {
        let spec = PeerSpecInput {
            push_data_types: vec![],
            ..alpha()
        }
        .validate()
        .unwrap();
        assert!(spec.push_data_types.is_empty());
    }

    #[test]
    fn rejects_blank_name_and_address() {
        let err = PeerSpecInput {
            name: "   ".into(),
            ..alpha()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "name");

        let err = PeerSpecInput {
            address: "".into(),
            ..alpha()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "address");

        let err = PeerSpecInput {
            address: "peer example.com".into(),
            ..alpha()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "address");
    }

    #[test]
    fn rejects_out_of_range_ports() {
        for port in [Some(0), Some(-1), Some(65536), None] {
            let err = PeerSpecInput { port, ..alpha() }.validate().unwrap_err();
            assert_eq!(err.field, "port", "port {port:?} should be rejected");
        }
        assert!(PeerSpecInput {
            port: Some(65535),
            ..alpha()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn rejects_unknown_protocol_and_data_type() {
        let err = PeerSpecInput {
            protocol: "udp".into(),
            ..alpha()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "protocol");

        let err = PeerSpecInput {
            push_data_types: vec!["cot".into(), "sms".into()],
            ..alpha()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "push_data_types");
        assert!(err.message.contains("sms"));
    }

    #[test]
    fn empty_optional_strings_become_none() {
        let spec = PeerSpecInput {
            username: Some("".into()),
            password: Some("".into()),
            notes: Some("  ".into()),
            ..alpha()
        }
        .validate()
        .unwrap();
        assert_eq!(spec.username, None);
        assert_eq!(spec.password, None);
        assert_eq!(spec.notes, None);
    }

    #[test]
    fn enabled_defaults_to_true_when_omitted() {
        let input: PeerSpecInput = serde_json::from_str(
            r#"{"name":"a","address":"h","port":1,"protocol":"tcp"}"#,
        )
        .unwrap();
        assert!(input.enabled);
    }
}
