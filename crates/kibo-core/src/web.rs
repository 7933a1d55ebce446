//! Web lookups for grounded answers: Ollama cloud search and fetch, with a
//! plain GET for named URLs when no Ollama key is configured.

use std::sync::LazyLock;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::CapabilityError;
use crate::types::Source;

const OLLAMA_WEB_SEARCH_URL: &str = "https://ollama.com/api/web_search";
const OLLAMA_WEB_FETCH_URL: &str = "https://ollama.com/api/web_fetch";

const MAX_RESULTS: usize = 5;
/// At most this many URLs from one question are fetched.
const MAX_URLS: usize = 2;
const PAGE_CHARS: usize = 3000;

static URL_RE: LazyLock<regex_lite::Regex> =
    LazyLock::new(|| regex_lite::Regex::new(r"https?://[^\s]+").unwrap());

/// One retrieved page.
#[derive(Debug, Clone, PartialEq)]
pub struct WebPage {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl WebPage {
    pub fn source(&self) -> Source {
        let title = if self.title.trim().is_empty() {
            self.url.clone()
        } else {
            self.title.trim().to_string()
        };
        Source {
            uri: self.url.clone(),
            title,
        }
    }
}

pub fn contains_url(text: &str) -> bool {
    URL_RE.is_match(text)
}

/// URLs named in `text`, without trailing punctuation.
pub fn find_urls(text: &str) -> Vec<&str> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '"', '\'']))
        .collect()
}

/// One source per distinct URL, in retrieval order.
pub fn sources_for(pages: &[WebPage]) -> Vec<Source> {
    let mut seen = std::collections::HashSet::new();
    pages
        .iter()
        .filter(|p| seen.insert(p.url.as_str()))
        .map(WebPage::source)
        .collect()
}

/// Numbered excerpts the model answers from.
pub fn grounding_context(pages: &[WebPage]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}\nURL: {}\n{}", i + 1, p.title, p.url, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn parse_search_results(data: &Value) -> Vec<WebPage> {
    data.get("results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    let url = r.get("url").and_then(|v| v.as_str())?;
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return None;
                    }
                    Some(WebPage {
                        title: r.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        url: url.to_string(),
                        content: truncate(
                            r.get("content").and_then(|v| v.as_str()).unwrap_or(""),
                            PAGE_CHARS,
                        ),
                    })
                })
                .take(MAX_RESULTS)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_fetch_result(data: &Value, url: &str) -> Option<WebPage> {
    let content = data.get("content").and_then(|v| v.as_str()).unwrap_or("");
    if content.trim().is_empty() {
        return None;
    }
    Some(WebPage {
        title: data.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        url: url.to_string(),
        content: truncate(content, PAGE_CHARS),
    })
}

/// Strip scripts, styles and tags, and collapse whitespace.
fn strip_html(html: &str) -> String {
    let mut text = html.to_string();
    for (open, close) in [("<script", "</script>"), ("<style", "</style>")] {
        loop {
            let lower = text.to_ascii_lowercase();
            let Some(start) = lower.find(open) else { break };
            let Some(end) = lower[start..].find(close) else { break };
            text.replace_range(start..start + end + close.len(), "");
        }
    }

    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                stripped.push(' ');
            }
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn html_title(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let Some(start) = lower.find("<title") else {
        return String::new();
    };
    let Some(open_end) = lower[start..].find('>') else {
        return String::new();
    };
    let body_start = start + open_end + 1;
    let Some(len) = lower[body_start..].find("</title>") else {
        return String::new();
    };
    html[body_start..body_start + len].trim().to_string()
}

pub struct WebClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl WebClient {
    pub fn new(api_key: Option<String>) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .user_agent("Kibo/1.0")
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, api_key })
    }

    /// Pages for a question: the URLs it names, or search hits for it.
    /// Without an Ollama key only named URLs can be looked up.
    pub async fn gather(&self, question: &str) -> Result<Vec<WebPage>, CapabilityError> {
        let urls = find_urls(question);
        if !urls.is_empty() {
            let mut pages = Vec::new();
            for url in urls.into_iter().take(MAX_URLS) {
                match self.fetch(url).await {
                    Ok(Some(page)) => pages.push(page),
                    Ok(None) => warn!("Nothing readable at {}", url),
                    Err(e) => warn!("Failed to fetch {}: {}", url, e),
                }
            }
            return Ok(pages);
        }

        if self.api_key.is_none() {
            warn!("OLLAMA_API_KEY not set, answering without web search");
            return Ok(Vec::new());
        }
        self.search(question).await
    }

    async fn search(&self, query: &str) -> Result<Vec<WebPage>, CapabilityError> {
        info!("web_search: {}", query);
        let body = json!({ "query": query, "max_results": MAX_RESULTS });
        let data = self.post_ollama(OLLAMA_WEB_SEARCH_URL, &body).await?;
        Ok(parse_search_results(&data))
    }

    async fn fetch(&self, url: &str) -> Result<Option<WebPage>, CapabilityError> {
        info!("web_fetch: {}", url);
        if self.api_key.is_some() {
            let data = self.post_ollama(OLLAMA_WEB_FETCH_URL, &json!({ "url": url })).await?;
            return Ok(parse_fetch_result(&data, url));
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Http {
                status: status.as_u16(),
                body: format!("GET {}", url),
            });
        }
        let html = response.text().await?;
        let content = strip_html(&html);
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(WebPage {
            title: html_title(&html),
            url: url.to_string(),
            content: truncate(&content, PAGE_CHARS),
        }))
    }

    async fn post_ollama(&self, endpoint: &str, body: &Value) -> Result<Value, CapabilityError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CapabilityError::Unavailable("OLLAMA_API_KEY is not set".into()))?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Http {
                status: status.as_u16(),
                body: truncate(&text, 500),
            });
        }
        Ok(response.json().await?)
    }
}
