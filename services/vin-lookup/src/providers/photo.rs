//! Vehicle photo provider backed by the CarImagery `GetImageUrl` endpoint.
//!
//! The endpoint answers with a single XML element whose text is the image URL:
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <string xmlns="http://carimagery.com/">http://www.regcheck.org.uk/image.aspx/@SG9uZGE=</string>
//! ```

use super::{ClientBuildError, HttpTransport, Provider, ProviderFailure};
use crate::config::ProviderConfig;
use crate::vin::parse_photo_url;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("invalid photo search argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Provider(#[from] ProviderFailure),
}

/// Finds a representative photo for a make/model/year
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoProvider: Send + Sync {
    /// `Ok(None)` means the provider has no photo for this vehicle
    async fn find_photo(
        &self,
        make: &str,
        model: &str,
        model_year: &str,
    ) -> Result<Option<Url>, PhotoError>;
}

/// CarImagery HTTP client
pub struct CarImageryClient {
    transport: HttpTransport,
}

impl CarImageryClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ClientBuildError> {
        Ok(Self {
            transport: HttpTransport::new(Provider::Photo, config)?,
        })
    }
}

#[async_trait]
impl PhotoProvider for CarImageryClient {
    #[instrument(skip(self))]
    async fn find_photo(
        &self,
        make: &str,
        model: &str,
        model_year: &str,
    ) -> Result<Option<Url>, PhotoError> {
        let (make, model, model_year) = (make.trim(), model.trim(), model_year.trim());
        if make.is_empty() || model.is_empty() || model_year.is_empty() {
            return Err(PhotoError::InvalidArgument(
                "make, model and model year must not be blank".to_string(),
            ));
        }

        let mut url = self.transport.endpoint("api.asmx/GetImageUrl")?;
        url.query_pairs_mut()
            .append_pair("searchTerm", &format!("{make} {model} {model_year}"));

        let response = self.transport.get(url).await?;
        let body = response.text().await.map_err(ProviderFailure::Transport)?;

        let photo_url = extract_image_url(&body);
        if photo_url.is_none() {
            debug!("No usable photo URL in provider response");
        }

        Ok(photo_url)
    }
}

/// Pull the first text node out of the response document. Malformed XML,
/// an empty document, or text that is not an http(s) URL all mean "no photo".
fn extract_image_url(body: &str) -> Option<Url> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(text)) => {
                let text = text.unescape().ok()?;
                return parse_photo_url(&text).ok();
            }
            Ok(Event::CData(data)) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                return parse_photo_url(&text).ok();
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMAGE_PATH: &str = "/api.asmx/GetImageUrl";

    fn client_for(server: &MockServer) -> CarImageryClient {
        CarImageryClient::new(&ProviderConfig {
            base_url: server.uri(),
            timeout_secs: 2,
            max_retries: 0,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_extract_image_url() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<string xmlns="http://carimagery.com/">http://www.regcheck.org.uk/image.aspx/@SG9uZGE=</string>"#;

        let url = extract_image_url(body).unwrap();
        assert_eq!(url.as_str(), "http://www.regcheck.org.uk/image.aspx/@SG9uZGE=");
    }

    #[test]
    fn test_extract_image_url_returns_none() {
        for body in ["", "<xml></xml>", "<xml>", "<foo></bar>", "<string>no photo</string>"] {
            assert!(extract_image_url(body).is_none(), "body {body:?} should yield no photo");
        }
    }

    #[tokio::test]
    async fn test_blank_arguments_fail_fast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        for (make, model, year) in [("", "", ""), ("", "  ", " "), ("Toyota", "Camry", "  ")] {
            let err = client.find_photo(make, model, year).await.unwrap_err();
            assert!(matches!(err, PhotoError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_find_photo_sends_search_term() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(IMAGE_PATH))
            .and(query_param("searchTerm", "Toyota Camry 2020"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<string xmlns="http://carimagery.com/">https://img.example.com/camry.jpg</string>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let url = client_for(&server)
            .find_photo(" Toyota", "Camry ", "2020")
            .await
            .unwrap();
        assert_eq!(url.unwrap().as_str(), "https://img.example.com/camry.jpg");
    }

    #[tokio::test]
    async fn test_find_photo_empty_document_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(IMAGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<xml>"))
            .mount(&server)
            .await;

        let url = client_for(&server).find_photo("Toyota", "Camry", "2020").await.unwrap();
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn test_find_photo_error_status() {
        for status in [400u16, 500] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(IMAGE_PATH))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = client_for(&server)
                .find_photo("Toyota", "Camry", "2020")
                .await
                .unwrap_err();
            match err {
                PhotoError::Provider(ProviderFailure::Status(s)) => assert_eq!(s.as_u16(), status),
                other => panic!("Expected provider error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_find_photo_timeout_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(IMAGE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<string>https://img.example.com/camry.jpg</string>")
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = CarImageryClient::new(&ProviderConfig {
            base_url: server.uri(),
            timeout_secs: 1,
            max_retries: 0,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
        })
        .unwrap();

        let err = client.find_photo("Toyota", "Camry", "2020").await.unwrap_err();
        assert!(matches!(err, PhotoError::Provider(ProviderFailure::Transport(_))));
    }
}
