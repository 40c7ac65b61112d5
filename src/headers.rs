//! Request headers attached to every outbound call.
//!
//! The provider side is an external concern; the core only asks for a header
//! map per request. `BrowserHeaders` produces plausible, randomized browser
//! headers, `FixedHeaders` a deterministic set for tests.

use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};

/// Supplies the headers for one outbound request.
pub trait HeaderProvider: Send + Sync {
    fn headers(&self) -> HeaderMap;
}

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36 Edg/{v}.0.0.0",
];

const PLATFORMS: &[&str] = &["\"Windows\"", "\"macOS\"", "\"Linux\""];

/// Randomized browser-like headers, regenerated on every call.
#[derive(Debug, Clone, Default)]
pub struct BrowserHeaders;

impl HeaderProvider for BrowserHeaders {
    fn headers(&self) -> HeaderMap {
        let mut rng = rand::thread_rng();
        let version: u32 = rng.gen_range(70..=100);
        let brand_version: u32 = rng.gen_range(70..=100);
        let agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .replace("{v}", &version.to_string());
        let platform = PLATFORMS.choose(&mut rng).copied().unwrap_or(PLATFORMS[0]);
        let sec_ch_ua = format!(
            "\"Chromium\";v=\"{version}\", \"Google Chrome\";v=\"{brand_version}\", \"Not;A=Brand\";v=\"99\""
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&agent) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(
            HeaderName::from_static("sec-ch-ua-platform"),
            HeaderValue::from_static(platform),
        );
        if let Ok(value) = HeaderValue::from_str(&sec_ch_ua) {
            headers.insert(HeaderName::from_static("sec-ch-ua"), value);
        }
        headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
        headers
    }
}

/// Deterministic headers for tests.
#[derive(Debug, Clone)]
pub struct FixedHeaders {
    headers: HeaderMap,
}

impl FixedHeaders {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

impl Default for FixedHeaders {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("roadtest-monitor-test"));
        Self { headers }
    }
}

impl HeaderProvider for FixedHeaders {
    fn headers(&self) -> HeaderMap {
        self.headers.clone()
    }
}
