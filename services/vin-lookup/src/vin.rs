//! VIN normalization and the persisted `VinRecord` entity.
//!
//! Only lightweight format checks are applied: a VIN is any 17-character ASCII
//! alphanumeric string. No check digit or ISO 3779 transliteration is verified.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Required VIN length
pub const VIN_LENGTH: usize = 17;

/// Input could not be normalized into a VIN
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("VIN must be a 17 alphanumeric characters string, got {input:?}")]
pub struct InvalidVinFormat {
    pub input: String,
}

/// A decoded attribute failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("field {0} must not be empty")]
    Empty(&'static str),

    #[error("photo URL {0:?} is not an absolute http(s) URL")]
    InvalidPhotoUrl(String),
}

/// Normalized VIN: trimmed, uppercase, 17 ASCII alphanumerics
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VinNumber(String);

impl VinNumber {
    /// Trim, uppercase and validate a candidate VIN
    pub fn normalize(input: &str) -> Result<Self, InvalidVinFormat> {
        let trimmed = input.trim();

        if trimmed.len() != VIN_LENGTH || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidVinFormat {
                input: input.to_string(),
            });
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VinNumber {
    type Err = InvalidVinFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl AsRef<str> for VinNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VinNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for VinNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// Vehicle attributes returned by the decode provider, trimmed and non-empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedAttributes {
    make: String,
    model: String,
    /// Kept as a string: upstream years may be ranges or unknowns
    model_year: String,
    body_class: String,
}

impl DecodedAttributes {
    pub fn new(
        make: &str,
        model: &str,
        model_year: &str,
        body_class: &str,
    ) -> Result<Self, AttributeError> {
        Ok(Self {
            make: non_empty("make", make)?,
            model: non_empty("model", model)?,
            model_year: non_empty("modelYear", model_year)?,
            body_class: non_empty("bodyClass", body_class)?,
        })
    }

    pub fn make(&self) -> &str {
        &self.make
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn model_year(&self) -> &str {
        &self.model_year
    }

    pub fn body_class(&self) -> &str {
        &self.body_class
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<String, AttributeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AttributeError::Empty(field));
    }
    Ok(value.to_string())
}

/// Check that `raw` is an absolute http(s) URL with a host
pub fn parse_photo_url(raw: &str) -> Result<Url, AttributeError> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(url),
        _ => Err(AttributeError::InvalidPhotoUrl(raw.to_string())),
    }
}

/// The persisted lookup result. Always fully valid once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VinRecord {
    vin_number: VinNumber,
    #[serde(flatten)]
    attributes: DecodedAttributes,
    photo_url: Option<Url>,
}

impl VinRecord {
    pub fn new(vin_number: VinNumber, attributes: DecodedAttributes, photo_url: Option<Url>) -> Self {
        Self {
            vin_number,
            attributes,
            photo_url,
        }
    }

    pub fn vin_number(&self) -> &VinNumber {
        &self.vin_number
    }

    pub fn attributes(&self) -> &DecodedAttributes {
        &self.attributes
    }

    pub fn make(&self) -> &str {
        self.attributes.make()
    }

    pub fn model(&self) -> &str {
        self.attributes.model()
    }

    pub fn model_year(&self) -> &str {
        self.attributes.model_year()
    }

    pub fn body_class(&self) -> &str {
        self.attributes.body_class()
    }

    pub fn photo_url(&self) -> Option<&Url> {
        self.photo_url.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_uppercases() {
        let vin = VinNumber::normalize("  1hgcm82633a123456\n").unwrap();
        assert_eq!(vin.as_str(), "1HGCM82633A123456");

        let vin: VinNumber = "1HgCm82633A123456".parse().unwrap();
        assert_eq!(vin.to_string(), "1HGCM82633A123456");
    }

    #[test]
    fn test_normalize_rejects_bad_format() {
        let cases = [
            "",
            "short",
            "123",
            "1HGCM82633A12345",
            "1HGCM82633A1234567",
            "xxxxxxxxxxxxxxxxxx",
            "xxxxxxxxxxxxxxxx;",
            "1HGCM82633A12345-",
            "1HGCM 82633A12345",
            "1HGCM82633A12345é",
            "１HGCM82633A12345",
        ];

        for input in cases {
            let err = VinNumber::normalize(input).unwrap_err();
            assert_eq!(err.input, input, "input {input:?} should be rejected");
        }
    }

    #[test]
    fn test_decoded_attributes_trim_and_reject_empty() {
        let attributes = DecodedAttributes::new(" Honda ", "Accord", " 2003", "Sedan ").unwrap();
        assert_eq!(attributes.make(), "Honda");
        assert_eq!(attributes.model_year(), "2003");
        assert_eq!(attributes.body_class(), "Sedan");

        assert_eq!(
            DecodedAttributes::new("Honda", "  ", "2003", "Sedan"),
            Err(AttributeError::Empty("model"))
        );
        assert_eq!(
            DecodedAttributes::new("Honda", "Accord", "2003", ""),
            Err(AttributeError::Empty("bodyClass"))
        );
    }

    #[test]
    fn test_parse_photo_url() {
        assert!(parse_photo_url("http://www.regcheck.org.uk/image.aspx/@SG9uZGEgQWNjb3Jk").is_ok());
        assert!(parse_photo_url("https://example.com/a.jpg").is_ok());
        assert!(parse_photo_url("").is_err());
        assert!(parse_photo_url("not a url").is_err());
        assert!(parse_photo_url("ftp://example.com/a.jpg").is_err());
        assert!(parse_photo_url("data:image/png;base64,AAAA").is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = VinRecord::new(
            VinNumber::normalize("1HGCM82633A123456").unwrap(),
            DecodedAttributes::new("Honda", "Accord", "2003", "Sedan").unwrap(),
            None,
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "vinNumber": "1HGCM82633A123456",
                "make": "Honda",
                "model": "Accord",
                "modelYear": "2003",
                "bodyClass": "Sedan",
                "photoUrl": null
            })
        );
    }
}
