//! Outbound request signing
//!
//! The signable message is the channel's identity tokens followed by the JSON
//! body, concatenated without separators. The signature is HMAC-SHA256 over
//! that message with the shared signing key, hex encoded in lower case.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::{DispatchError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "hmac";

/// Outbound channel of the alarm web service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    TriggerAlarm,
    PushMessage,
}

impl Channel {
    /// Path segment under the web service base URL
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::TriggerAlarm => "triggerAlarm",
            Self::PushMessage => "pushMessage",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Caller identity tokens sent alongside every signed request
#[derive(Clone, Default)]
pub struct IdentityTokens {
    pub web_api_token: String,
    pub selective_call_code: String,
    pub access_token: String,
}

impl fmt::Debug for IdentityTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityTokens")
            .field("web_api_token", &"***")
            .field("selective_call_code", &"***")
            .field("access_token", &"***")
            .finish()
    }
}

impl IdentityTokens {
    /// Tokens in signing order, with their header names
    pub fn for_channel(&self, channel: Channel) -> Vec<(&'static str, &str)> {
        match channel {
            Channel::TriggerAlarm => vec![
                ("webApiToken", self.web_api_token.as_str()),
                ("selectiveCallCode", self.selective_call_code.as_str()),
                ("accessToken", self.access_token.as_str()),
            ],
            Channel::PushMessage => vec![("webApiToken", self.web_api_token.as_str())],
        }
    }
}

/// Serialized body plus the headers that authenticate it
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    pub channel: Channel,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl SignedEnvelope {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn signature(&self) -> Option<&str> {
        self.header(SIGNATURE_HEADER)
    }
}

/// Signs payloads for the alarm web service
pub struct RequestSigner {
    key: Vec<u8>,
    tokens: IdentityTokens,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(signing_key: impl Into<String>, tokens: IdentityTokens) -> Self {
        Self {
            key: signing_key.into().into_bytes(),
            tokens,
        }
    }

    /// Concatenation the signature is computed over
    pub fn signable_message(&self, channel: Channel, body: &str) -> String {
        let mut message: String = self
            .tokens
            .for_channel(channel)
            .into_iter()
            .map(|(_, token)| token)
            .collect();
        message.push_str(body);
        message
    }

    /// Lower-case hex HMAC-SHA256 of `message`
    pub fn compute_signature(&self, message: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| DispatchError::Internal(format!("HMAC key error: {}", e)))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Sign an already serialized body
    pub fn sign(&self, channel: Channel, body: String) -> Result<SignedEnvelope> {
        let signature = self.compute_signature(&self.signable_message(channel, &body))?;
        debug!("[{}] signature {}", channel, signature);

        let mut headers: Vec<(String, String)> = self
            .tokens
            .for_channel(channel)
            .into_iter()
            .map(|(name, token)| (name.to_string(), token.to_string()))
            .collect();
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        headers.push((SIGNATURE_HEADER.to_string(), signature));

        Ok(SignedEnvelope {
            channel,
            body,
            headers,
        })
    }

    /// Serialize then sign
    pub fn sign_json<T: Serialize>(&self, channel: Channel, payload: &T) -> Result<SignedEnvelope> {
        let body = serde_json::to_string(payload)?;
        self.sign(channel, body)
    }
}
