use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::redirect;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

#[derive(Debug)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    Status { url: String, code: u16 },
    /// Connection, timeout, TLS or body decoding failure.
    Transport { url: String, message: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status { url, code } => write!(f, "Failed to fetch {url}: HTTP {code}"),
            FetchError::Transport { url, message } => write!(f, "Failed to fetch {url}: {message}"),
        }
    }
}

impl Error for FetchError {}

/// Anything that can hand back the body of a URL.
pub trait PageSource {
    fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

/// Blocking HTTP fetcher that waits a fixed delay before every request.
pub struct Fetcher {
    client: Client,
    delay: Duration,
}

impl Fetcher {
    pub fn new(user_agent: &str, delay: Duration) -> Result<Self, reqwest::Error> {
        let redirect_policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                attempt.error("Too many redirects")
            } else {
                attempt.follow()
            }
        });

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(redirect_policy)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Fetcher { client, delay })
    }
}

impl PageSource for Fetcher {
    fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        debug!("GET {url}");

        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let resp = self.client.get(url).send().map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }
        resp.text().map_err(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    /// Serves one canned HTTP response on a local port and returns its URL.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}/lot/details/1")
    }

    #[test]
    fn errors_name_the_url() {
        let err = FetchError::Status {
            url: "https://example.com/a".into(),
            code: 500,
        };
        assert_eq!(err.to_string(), "Failed to fetch https://example.com/a: HTTP 500");

        let err = FetchError::Transport {
            url: "https://example.com/b".into(),
            message: "timed out".into(),
        };
        assert!(err.to_string().ends_with("timed out"));
    }

    #[test]
    fn server_error_maps_to_status_after_delay() {
        let url = serve_once("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let delay = Duration::from_millis(200);
        let fetcher = Fetcher::new("test-agent/1.0", delay).unwrap();

        let started = Instant::now();
        let err = fetcher.fetch_html(&url).unwrap_err();
        assert!(started.elapsed() >= delay);
        assert!(matches!(err, FetchError::Status { code: 500, .. }), "got {err}");
    }

    #[test]
    fn success_returns_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 20\r\nConnection: close\r\n\r\n<h1>3 Oak Lane</h1>\n",
        );
        let fetcher = Fetcher::new("test-agent/1.0", Duration::ZERO).unwrap();
        assert_eq!(fetcher.fetch_html(&url).unwrap(), "<h1>3 Oak Lane</h1>\n");
    }
}
