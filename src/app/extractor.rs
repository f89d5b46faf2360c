use crate::game::ProductInfo;
use anyhow::{
    Context,
    anyhow,
};
use rust_decimal::Decimal;
use url::Url;

const FALLBACK_PRODUCT_NAME: &str = "Product";
const MAX_PRODUCT_NAME_LEN: usize = 100;

/// Raw page material handed back by the extractor: the extracted text plus
/// whatever title metadata was available.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub text: String,
    pub title: Option<String>,
}

/// External page-content collaborator. Price discovery on top of the
/// extracted text is done here, not by the collaborator.
pub trait PageExtractor {
    async fn extract(&self, url: &Url) -> crate::Result<PageContent>;
}

/// Fetches the page over HTTP and treats the body as the extracted text.
pub struct HttpExtractor {
    http: reqwest::Client,
}

impl HttpExtractor {
    pub fn new() -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client for page extraction")?;
        Ok(Self { http })
    }
}

impl PageExtractor for HttpExtractor {
    async fn extract(&self, url: &Url) -> crate::Result<PageContent> {
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .context("product page request failed")?;
        let status = res.status();
        if !status.is_success() {
            return Err(anyhow!("product page responded with {status}"));
        }
        let body = res
            .text()
            .await
            .context("failed to read product page body")?;
        let title = page_title(&body);
        Ok(PageContent { text: body, title })
    }
}

/// Best-effort price discovery: the first `$` currency pattern in the
/// extracted text decides. A non-positive first match means no price, it does
/// not fall through to later matches.
pub fn first_price(text: &str) -> Option<Decimal> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        let mut saw_digit = false;
        while end < bytes.len()
            && (bytes[end].is_ascii_digit() || bytes[end] == b',')
        {
            saw_digit |= bytes[end].is_ascii_digit();
            end += 1;
        }
        if !saw_digit {
            i += 1;
            continue;
        }
        if end < bytes.len() && bytes[end] == b'.' {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        let candidate: String = text[start..end]
            .chars()
            .filter(|c| *c != ',')
            .collect();
        let candidate = candidate.trim_end_matches('.');
        return candidate
            .parse::<Decimal>()
            .ok()
            .filter(|price| *price > Decimal::ZERO);
    }
    None
}

/// Assemble the transient product details the wager flow needs. When no
/// price pattern was found, `price` stays `None` and the caller requests
/// manual entry.
pub fn product_from_page(url: &Url, content: &PageContent) -> ProductInfo {
    let name = content
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(FALLBACK_PRODUCT_NAME);
    let name: String = name.chars().take(MAX_PRODUCT_NAME_LEN).collect();
    ProductInfo {
        url: url.to_string(),
        name: Some(name),
        price: first_price(&content.text),
        image: None,
    }
}

fn page_title(html: &str) -> Option<String> {
    // ascii lowering keeps byte offsets aligned with the original text
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let open_end = lower[open..].find('>').map(|i| open + i + 1)?;
    let close = lower[open_end..].find("</title>").map(|i| open_end + i)?;
    let title = html[open_end..close].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}
