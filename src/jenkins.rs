use crate::error::{Error, Result};
use crate::params::BuildParameters;
use crate::watch::{BuildSource, LogChunk};
use async_trait::async_trait;
use log::*;
use reqwest::{
    header::{HeaderMap, ACCEPT, LOCATION},
    redirect::Policy,
    Method, RequestBuilder,
};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use url::Url;

pub const MORE_DATA_HEADER: &str = "X-More-Data";
pub const TEXT_SIZE_HEADER: &str = "X-Text-Size";

#[derive(Debug, Clone)]
/// Authentication information
pub struct Auth {
    /// Username
    username: String,
    /// API token or password
    api_token: String,
}

impl Auth {
    pub fn new(username: String, api_token: String) -> Self {
        Self {
            username,
            api_token,
        }
    }
}

/// CSRF protection token handed out by the crumb issuer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crumb {
    pub crumb: String,
    /// Name of the header the crumb must be sent in
    pub crumb_request_field: String,
}

#[derive(Debug, Deserialize)]
struct QueueItem {
    executable: Option<Executable>,
}

#[derive(Debug, Deserialize)]
struct Executable {
    number: u32,
}

/// The subset of a build's JSON representation we care about
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildInfo {
    pub building: bool,
    /// `None` until the build finishes
    pub result: Option<String>,
}

impl BuildInfo {
    pub fn is_success(&self) -> bool {
        self.result.as_deref() == Some("SUCCESS")
    }
}

/// A Jenkins API client
///
/// Every request carries basic auth. Once [`Client::fetch_crumb`] has succeeded, every request
/// also carries the crumb header. Cookies are kept for the lifetime of the client since Jenkins
/// binds crumbs to the web session.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    credentials: Auth,
    crumb: Option<Crumb>,
    http_client: reqwest::Client,
}

impl Client {
    pub fn new(host_url: &str, credentials: Auth) -> Result<Self> {
        Url::parse(host_url).map_err(|_| Error::Url(host_url.to_string()))?;
        // Redirects stay visible so the queue location of a triggered build isn't lost
        let http_client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            base_url: host_url.trim_end_matches('/').to_string(),
            credentials,
            crumb: None,
            http_client,
        })
    }

    fn crumb_url(&self) -> String {
        format!("{}/crumbIssuer/api/json", self.base_url)
    }

    fn trigger_url(&self, job: &str, params: &BuildParameters) -> Result<Url> {
        let raw = format!("{}/job/{}/buildWithParameters", self.base_url, job);
        let mut url = Url::parse(&raw).map_err(|_| Error::Url(raw.clone()))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Ok(url)
    }

    fn build_url(&self, job: &str, number: u32) -> String {
        format!("{}/job/{}/{}/api/json", self.base_url, job, number)
    }

    fn log_url(&self, job: &str, number: u32, start: u64) -> String {
        format!(
            "{}/job/{}/{}/logText/progressiveText?start={}",
            self.base_url, job, number, start
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut request = self
            .http_client
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.api_token));
        if let Some(crumb) = &self.crumb {
            if !crumb.crumb.is_empty() && !crumb.crumb_request_field.is_empty() {
                request = request.header(crumb.crumb_request_field.as_str(), crumb.crumb.as_str());
            }
        }
        request
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self
            .request(Method::GET, url)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        serde_json::from_str(&body).map_err(|source| Error::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Fetch a crumb from the crumb issuer and attach it to all later requests
    pub async fn fetch_crumb(&mut self) -> Result<&Crumb> {
        let crumb: Crumb = self.get_json(&self.crumb_url()).await?;
        debug!("Got crumb for header {}", crumb.crumb_request_field);
        Ok(&*self.crumb.insert(crumb))
    }

    /// Trigger a build of `job` and return the location of its queue item
    pub async fn trigger(&self, job: &str, params: &BuildParameters) -> Result<String> {
        let url = self.trigger_url(job, params)?;
        info!("Triggering {} with {} parameter(s)", job, params.len());
        let response = self
            .request(Method::POST, url.as_str())
            .send()
            .await?
            .error_for_status()?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::MissingLocation(job.to_string()))?;
        // Resolves relative locations; absolute ones come back unchanged
        let location = response
            .url()
            .join(location)
            .map_err(|_| Error::Url(location.to_string()))?;
        debug!("Queued at {}", location);
        Ok(location.into())
    }

    /// Look up the build number assigned to a queue item, if any
    pub async fn queued_build_number(&self, location: &str) -> Result<Option<u32>> {
        let url = format!("{}/api/json", location.trim_end_matches('/'));
        let item: QueueItem = self.get_json(&url).await?;
        Ok(item.executable.map(|executable| executable.number))
    }

    /// Poll a queue item up to `attempts` times until it has been given a build number
    pub async fn wait_for_build_number(
        &self,
        location: &str,
        attempts: u32,
        interval: Duration,
    ) -> Result<u32> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(number) = self.queued_build_number(location).await? {
                return Ok(number);
            }
            if attempt < attempts {
                debug!("Queue item not scheduled yet ({}/{})", attempt, attempts);
                tokio::time::sleep(interval).await;
            }
        }
        Err(Error::NotScheduled(location.to_string()))
    }

    pub async fn build_info(&self, job: &str, number: u32) -> Result<BuildInfo> {
        self.get_json(&self.build_url(job, number)).await
    }

    /// Fetch raw console bytes starting at byte offset `start`
    pub async fn log_text(&self, job: &str, number: u32, start: u64) -> Result<LogChunk> {
        let response = self
            .request(Method::GET, &self.log_url(job, number, start))
            .send()
            .await?
            .error_for_status()?;
        let (more_data, text_size) = progress_headers(response.headers())?;
        let text = response.bytes().await?.to_vec();
        Ok(LogChunk {
            text,
            text_size,
            more_data,
        })
    }

    /// Handle on a numbered build of `job`
    pub fn build<'a>(&'a self, job: &'a str, number: u32) -> Build<'a> {
        Build {
            client: self,
            job,
            number,
        }
    }
}

/// A scheduled build, followed through [`BuildSource`]
#[derive(Debug, Clone, Copy)]
pub struct Build<'a> {
    client: &'a Client,
    job: &'a str,
    number: u32,
}

#[async_trait]
impl<'a> BuildSource for Build<'a> {
    async fn build_info(&self) -> Result<BuildInfo> {
        self.client.build_info(self.job, self.number).await
    }

    async fn log_since(&self, start: u64) -> Result<LogChunk> {
        self.client.log_text(self.job, self.number, start).await
    }
}

/// Read the "more data" flag and cumulative text size from a progressive log response
///
/// A missing `X-More-Data` header means there is nothing left. `X-Text-Size` is required.
fn progress_headers(headers: &HeaderMap) -> Result<(bool, u64)> {
    let more_data = match headers.get(MORE_DATA_HEADER) {
        None => false,
        Some(value) => {
            let value = value.to_str().unwrap_or_default();
            parse_bool(value).ok_or_else(|| Error::InvalidHeader {
                name: MORE_DATA_HEADER,
                value: value.to_string(),
            })?
        }
    };
    let text_size = headers
        .get(TEXT_SIZE_HEADER)
        .ok_or(Error::MissingHeader(TEXT_SIZE_HEADER))?;
    let text_size = text_size.to_str().unwrap_or_default();
    let text_size = text_size
        .trim()
        .parse()
        .map_err(|_| Error::InvalidHeader {
            name: TEXT_SIZE_HEADER,
            value: text_size.to_string(),
        })?;
    Ok((more_data, text_size))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;
    use httpmock::prelude::*;
    use reqwest::header::HeaderValue;

    fn client(host: &str) -> Client {
        Client::new(host, Auth::new("user".into(), "token".into())).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> BuildParameters {
        pairs
            .iter()
            .map(|(name, value)| Parameter {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect()
    }

    #[test]
    fn urls_without_trailing_slash() {
        let client = client("http://www.myjenkins.com/");
        assert_eq!(
            "http://www.myjenkins.com/crumbIssuer/api/json",
            client.crumb_url()
        );
        assert_eq!(
            "http://www.myjenkins.com/job/project/101/api/json",
            client.build_url("project", 101)
        );
        assert_eq!(
            "http://www.myjenkins.com/job/project/101/logText/progressiveText?start=42",
            client.log_url("project", 101, 42)
        );
    }

    #[test]
    fn trigger_url_without_params_has_no_query() {
        let url = client("http://www.myjenkins.com")
            .trigger_url("project", &BuildParameters::default())
            .unwrap();
        assert_eq!(
            "http://www.myjenkins.com/job/project/buildWithParameters",
            url.as_str()
        );
    }

    #[test]
    fn trigger_url_encodes_every_param_once() {
        let params = params(&[
            ("BRANCH", "feature/new thing"),
            ("EXPR", "a=b&c"),
            ("EMPTY", ""),
            ("UNICODE", "héllo"),
        ]);
        let url = client("http://www.myjenkins.com")
            .trigger_url("project", &params)
            .unwrap();
        let query = url.query().unwrap();
        assert!(!query.contains(' '));
        assert!(!query.contains("a=b&c"));

        let decoded: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(decoded.len(), params.len());
        for (name, value) in params.iter() {
            let hits: Vec<_> = decoded.iter().filter(|(k, _)| k == name).collect();
            assert_eq!(hits.len(), 1, "{} should appear once", name);
            assert_eq!(hits[0].1, value);
        }
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = Client::new("", Auth::new(String::new(), String::new())).unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn missing_more_data_means_done() {
        let mut headers = HeaderMap::new();
        headers.insert(TEXT_SIZE_HEADER, HeaderValue::from_static("1024"));
        assert_eq!((false, 1024), progress_headers(&headers).unwrap());
    }

    #[test]
    fn bad_progress_headers_are_errors() {
        let headers = HeaderMap::new();
        assert!(matches!(
            progress_headers(&headers),
            Err(Error::MissingHeader(TEXT_SIZE_HEADER))
        ));

        let mut headers = HeaderMap::new();
        headers.insert(TEXT_SIZE_HEADER, HeaderValue::from_static("lots"));
        assert!(matches!(
            progress_headers(&headers),
            Err(Error::InvalidHeader { .. })
        ));

        let mut headers = HeaderMap::new();
        headers.insert(TEXT_SIZE_HEADER, HeaderValue::from_static("10"));
        headers.insert(MORE_DATA_HEADER, HeaderValue::from_static("maybe"));
        assert!(matches!(
            progress_headers(&headers),
            Err(Error::InvalidHeader { .. })
        ));
    }

    #[test]
    fn bool_spellings() {
        assert_eq!(Some(true), parse_bool("true"));
        assert_eq!(Some(true), parse_bool("True"));
        assert_eq!(Some(false), parse_bool("0"));
        assert_eq!(None, parse_bool("yes"));
    }

    #[tokio::test]
    async fn crumb_is_sent_on_later_requests() {
        let server = MockServer::start_async().await;
        let crumb_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/crumbIssuer/api/json")
                    .header("Authorization", "Basic dXNlcjp0b2tlbg==");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"crumb":"abc","crumbRequestField":"Jenkins-Crumb"}"#);
            })
            .await;
        let build_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/job/project/7/api/json")
                    .header("Jenkins-Crumb", "abc")
                    .header("Authorization", "Basic dXNlcjp0b2tlbg==");
                then.status(200)
                    .body(r#"{"building":true,"result":null,"number":7}"#);
            })
            .await;

        let mut client = client(&server.base_url());
        let crumb = client.fetch_crumb().await.unwrap().clone();
        assert_eq!(
            Crumb {
                crumb: "abc".into(),
                crumb_request_field: "Jenkins-Crumb".into()
            },
            crumb
        );

        let info = client.build_info("project", 7).await.unwrap();
        assert!(info.building);
        assert_eq!(None, info.result);
        crumb_mock.assert_async().await;
        build_mock.assert_async().await;
    }

    #[tokio::test]
    async fn crumb_decode_failure_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/crumbIssuer/api/json");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let mut client = client(&server.base_url());
        let err = client.fetch_crumb().await.unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(client.crumb.is_none());
    }

    #[tokio::test]
    async fn trigger_returns_queue_location() {
        let server = MockServer::start_async().await;
        let location = server.url("/queue/item/12/");
        let trigger_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/job/project/buildWithParameters")
                    .query_param("BRANCH", "feature/x-y")
                    .query_param("COUNT", "3");
                then.status(201).header("Location", location.as_str());
            })
            .await;

        let client = client(&server.base_url());
        let params = params(&[("BRANCH", "feature/x-y"), ("COUNT", "3")]);
        let queued = client.trigger("project", &params).await.unwrap();
        assert_eq!(location, queued);
        trigger_mock.assert_async().await;
    }

    #[tokio::test]
    async fn trigger_without_location_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/job/project/buildWithParameters");
                then.status(201);
            })
            .await;

        let client = client(&server.base_url());
        let err = client
            .trigger("project", &BuildParameters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingLocation(job) if job == "project"));
    }

    #[tokio::test]
    async fn trigger_rejected_by_server() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/job/project/buildWithParameters");
                then.status(403);
            })
            .await;

        let client = client(&server.base_url());
        let err = client
            .trigger("project", &BuildParameters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[tokio::test]
    async fn queue_item_number() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/queue/item/12/api/json");
                then.status(200)
                    .body(r#"{"id":12,"executable":{"number":34,"url":"x"}}"#);
            })
            .await;

        let client = client(&server.base_url());
        let number = client
            .wait_for_build_number(&server.url("/queue/item/12/"), 1, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(34, number);
    }

    #[tokio::test]
    async fn unscheduled_queue_item_is_polled_up_to_the_limit() {
        let server = MockServer::start_async().await;
        let queue_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/queue/item/12/api/json");
                then.status(200).body(r#"{"id":12,"why":"Waiting for executor"}"#);
            })
            .await;

        let client = client(&server.base_url());
        let err = client
            .wait_for_build_number(&server.url("/queue/item/12"), 3, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotScheduled(_)));
        queue_mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn log_text_reads_progress_headers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/job/project/7/logText/progressiveText")
                    .query_param("start", "100");
                then.status(200)
                    .header(MORE_DATA_HEADER, "true")
                    .header(TEXT_SIZE_HEADER, "112")
                    .body("Building...\n");
            })
            .await;

        let client = client(&server.base_url());
        let chunk = client.log_text("project", 7, 100).await.unwrap();
        assert_eq!(b"Building...\n".to_vec(), chunk.text);
        assert_eq!(112, chunk.text_size);
        assert!(chunk.more_data);
    }
}
