//! Incoming application-command interactions.
//!
//! The chat platform POSTs each slash-command invocation to our HTTP
//! endpoint. Requests are signed with Ed25519 over `timestamp || body`.

use ring::signature::{UnparsedPublicKey, ED25519};
use serde::Deserialize;
use serde_json::{json, Value};

pub const INTERACTION_PING: u8 = 1;
pub const INTERACTION_COMMAND: u8 = 2;

const RESPONSE_PONG: u8 = 1;
const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
const FLAG_EPHEMERAL: u32 = 1 << 6;

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<CommandData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl CommandData {
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.value)
            .filter(|v| !v.is_null())
    }

    pub fn str_option(&self, name: &str) -> Option<String> {
        self.option(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Numeric option. Strings holding a number are accepted too.
    pub fn f64_option(&self, name: &str) -> Option<f64> {
        match self.option(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn i64_option(&self, name: &str) -> Option<i64> {
        match self.option(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

pub fn pong() -> Value {
    json!({ "type": RESPONSE_PONG })
}

/// A reply only the invoking user sees.
pub fn ephemeral_reply(content: &str) -> Value {
    json!({
        "type": RESPONSE_CHANNEL_MESSAGE,
        "data": { "content": content, "flags": FLAG_EPHEMERAL },
    })
}

/// Checks the Ed25519 signature of an interaction request.
///
/// `public_key_hex` and `signature_hex` are hex encoded. Malformed hex is
/// treated as a bad signature.
pub fn verify_signature(
    public_key_hex: &str,
    timestamp: &str,
    body: &[u8],
    signature_hex: &str,
) -> bool {
    let (Ok(key), Ok(signature)) = (hex::decode(public_key_hex), hex::decode(signature_hex)) else {
        return false;
    };
    let mut signed = Vec::with_capacity(timestamp.len() + body.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.extend_from_slice(body);
    UnparsedPublicKey::new(&ED25519, key)
        .verify(&signed, &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};

    fn keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    #[test]
    fn signature_over_timestamp_and_body_verifies() {
        let pair = keypair();
        let public = hex::encode(pair.public_key().as_ref());
        let body = br#"{"type":1}"#;
        let mut signed = b"1700000000".to_vec();
        signed.extend_from_slice(body);
        let sig = hex::encode(pair.sign(&signed).as_ref());

        assert!(verify_signature(&public, "1700000000", body, &sig));
        assert!(!verify_signature(&public, "1700000001", body, &sig));
        assert!(!verify_signature(&public, "1700000000", br#"{"type":2}"#, &sig));
        assert!(!verify_signature(&public, "1700000000", body, "zz"));
    }

    #[test]
    fn options_are_read_by_name() {
        let interaction: Interaction = serde_json::from_value(json!({
            "type": 2,
            "data": {
                "name": "editcarbs",
                "options": [
                    { "name": "id", "type": 3, "value": "A9993E" },
                    { "name": "amount", "type": 10, "value": -1 },
                    { "name": "offset", "type": 4, "value": 30 }
                ]
            }
        }))
        .unwrap();
        assert_eq!(interaction.kind, INTERACTION_COMMAND);
        let data = interaction.data.unwrap();
        assert_eq!(data.str_option("id").as_deref(), Some("A9993E"));
        assert_eq!(data.f64_option("amount"), Some(-1.0));
        assert_eq!(data.i64_option("offset"), Some(30));
        assert_eq!(data.f64_option("units"), None);
    }

    #[test]
    fn replies_are_ephemeral() {
        let reply = ephemeral_reply("ok");
        assert_eq!(reply["type"], 4);
        assert_eq!(reply["data"]["flags"], 64);
        assert_eq!(pong(), json!({ "type": 1 }));
    }
}
