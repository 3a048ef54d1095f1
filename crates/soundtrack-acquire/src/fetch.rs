use soundtrack_model::{DownloadConfig, FetchError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// The one HTTP client of a run.
///
/// Built once from the config and cloned into every task; clones share the
/// connection pool and the global request limit. No retries happen here.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

/// An open response whose body is read chunk by chunk.
///
/// Holds one request permit until dropped.
pub struct Download {
    response: reqwest::Response,
    url: Url,
    _permit: OwnedSemaphorePermit,
}

impl PageFetcher {
    pub fn new(config: &DownloadConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            timeout: config.request_timeout,
        })
    }

    /// Fetch a page and return its body as text.
    pub async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let _permit = self.permit().await?;
        tracing::debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify(e, url))?;
        let response = check_status(response, url)?;

        let body = response.text().await.map_err(|e| classify(e, url))?;
        tracing::debug!(url = %url, bytes = body.len(), "Received page");
        Ok(body)
    }

    /// Start a download. The timeout covers only the wait for the response
    /// headers so large files are never cut off mid-stream.
    pub async fn open_stream(&self, url: &Url) -> Result<Download, FetchError> {
        let permit = self.permit().await?;
        tracing::debug!(url = %url, "Opening download");

        let response = tokio::time::timeout(self.timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| FetchError::Timeout(url.to_string()))?
            .map_err(|e| classify(e, url))?;
        let response = check_status(response, url)?;

        Ok(Download {
            response,
            url: url.clone(),
            _permit: permit,
        })
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, FetchError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Network("request limiter closed".into()))
    }
}

impl Download {
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub fn header(&self, name: reqwest::header::HeaderName) -> Option<&str> {
        self.response.headers().get(name)?.to_str().ok()
    }

    /// Next piece of the body, `None` once it is exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
        self.response
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| classify(e, &self.url))
    }
}

fn check_status(response: reqwest::Response, url: &Url) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

fn classify(err: reqwest::Error, url: &Url) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }
    } else {
        FetchError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(timeout: Duration) -> PageFetcher {
        PageFetcher::new(&DownloadConfig {
            request_timeout: timeout,
            ..DownloadConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/album/kh"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h2>KH</h2>"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/album/kh", server.uri())).unwrap();
        let body = fetcher(Duration::from_secs(5)).fetch(&url).await.unwrap();
        assert_eq!(body, "<h2>KH</h2>");
    }

    #[tokio::test]
    async fn test_fetch_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/album/missing", server.uri())).unwrap();
        let err = fetcher(Duration::from_secs(5)).fetch(&url).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::HttpStatus {
                status: 404,
                url: url.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let fetcher = fetcher(Duration::from_millis(100));
        assert!(matches!(fetcher.fetch(&url).await, Err(FetchError::Timeout(_))));
        assert!(matches!(fetcher.open_stream(&url).await, Err(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let url = Url::parse("http://127.0.0.1:1/album").unwrap();
        let err = fetcher(Duration::from_secs(5)).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_stream_reads_whole_body() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/files/01.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/files/01.mp3", server.uri())).unwrap();
        let mut download = fetcher(Duration::from_secs(5)).open_stream(&url).await.unwrap();
        assert_eq!(download.content_length(), Some(body.len() as u64));

        let mut received = Vec::new();
        while let Some(chunk) = download.chunk().await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, body);
    }

    #[tokio::test]
    async fn test_open_download_holds_a_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&DownloadConfig {
            max_connections: 1,
            ..DownloadConfig::default()
        })
        .unwrap();
        let file = Url::parse(&format!("{}/files/01.mp3", server.uri())).unwrap();
        let page = Url::parse(&format!("{}/album/kh", server.uri())).unwrap();

        let download = fetcher.open_stream(&file).await.unwrap();
        let waiting = Duration::from_millis(200);
        assert!(tokio::time::timeout(waiting, fetcher.fetch(&page)).await.is_err());
        assert!(tokio::time::timeout(waiting, fetcher.open_stream(&file)).await.is_err());

        drop(download);
        let body = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch(&page))
            .await
            .expect("permit released")
            .unwrap();
        assert_eq!(body, "body");
    }
}
