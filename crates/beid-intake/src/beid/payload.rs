use serde::{Deserialize, Deserializer};

/// Card dump as sent by the reader applet: one `key: value` per line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCardPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub national_number: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub middle_name: Option<String>,
    #[serde(rename = "name", deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub date_of_birth: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub place_of_birth: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub gender: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub noble_condition: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub street_and_number: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub zip: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub municipality: Option<String>,
    /// ISO code of the country the reader is configured for.
    #[serde(rename = "reader", deserialize_with = "lenient_string")]
    pub country_code: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub card_number: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub card_delivery_municipality: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub card_validity_date_begin: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub card_validity_date_end: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub document_type: Option<String>,
    /// Base64-encoded JPEG.
    #[serde(deserialize_with = "lenient_string")]
    pub photo: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// A one-line answer is the reader reporting a problem (e.g. no card inserted).
    #[error("{0}")]
    ReaderMessage(String),
    #[error("card data is not a key/value record: {0}")]
    NotARecord(#[from] serde_yaml::Error),
}

impl RawCardPayload {
    pub fn decode(raw: &str) -> Result<Self, PayloadError> {
        if !raw.contains('\n') {
            return Err(PayloadError::ReaderMessage(raw.trim().to_string()));
        }

        Ok(serde_yaml::from_str(raw)?)
    }
}

/// Accept strings, numbers and booleans; blank and null become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    let text = match value {
        None | Some(serde_yaml::Value::Null) => None,
        Some(serde_yaml::Value::String(text)) => Some(text),
        Some(serde_yaml::Value::Number(number)) => Some(number.to_string()),
        Some(serde_yaml::Value::Bool(flag)) => Some(flag.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a scalar value, got {other:?}"
            )))
        }
    };
    Ok(text.filter(|value| !value.trim().is_empty()))
}
