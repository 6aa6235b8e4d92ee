use std::time::{ Duration, Instant };

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::FetchError;

const CARD_API_BASE: &str = "https://u-card.wb.ru/cards/v4/detail";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const XPOW_TTL: Duration = Duration::from_secs(300);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// One fetch's raw result, not yet reconciled against history.
/// Prices are in rubles (the API reports kopecks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub basic_price: i64,
    pub product_price: i64,
    pub qty: i64,
    pub name: String,
    pub fetched_at: DateTime<Utc>,
}

impl Observation {
    pub fn is_out_of_stock(&self) -> bool {
        self.qty == 0
    }
}

/// Contract the scheduler drives products through. The destination code
/// must be encoded into the request: the same article priced for two
/// destinations returns two different prices.
#[async_trait]
pub trait ProductFetcher: Send + Sync {
    async fn fetch(
        &self,
        nm_id: i64,
        dest: i32,
        selected_size: Option<&str>
    ) -> FetchResult<Observation>;
}

/// Source of the `x-pow` anti-automation header. Token capture runs
/// outside this crate (a headless browser in production); the default
/// provider supplies nothing and lets the API decide.
#[async_trait]
pub trait XpowProvider: Send + Sync {
    async fn token(&self, nm_id: i64, dest: i32) -> Option<String>;
}

pub struct NoXpow;

#[async_trait]
impl XpowProvider for NoXpow {
    async fn token(&self, _nm_id: i64, _dest: i32) -> Option<String> {
        None
    }
}

// ─── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CardResponse {
    #[serde(default)]
    products: Vec<CardProduct>,
}

#[derive(Debug, Deserialize)]
struct CardProduct {
    #[serde(default)]
    name: String,
    #[serde(default)]
    sizes: Vec<CardSize>,
}

#[derive(Debug, Deserialize)]
struct CardSize {
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: CardPrice,
    #[serde(default)]
    stocks: Vec<CardStock>,
}

#[derive(Debug, Default, Deserialize)]
struct CardPrice {
    #[serde(default)]
    basic: i64,
    #[serde(default)]
    product: i64,
}

#[derive(Debug, Deserialize)]
struct CardStock {
    #[serde(default)]
    qty: i64,
}

// ─── Fetcher ─────────────────────────────────────────────────────────

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

pub struct CardFetcher {
    client: reqwest::Client,
    xpow: Box<dyn XpowProvider>,
    xpow_cache: Mutex<Option<CachedToken>>,
}

impl CardFetcher {
    pub fn new(xpow: Box<dyn XpowProvider>) -> FetchResult<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Permanent(format!("client build failed: {}", e)))?;

        Ok(Self {
            client,
            xpow,
            xpow_cache: Mutex::new(None),
        })
    }

    async fn xpow_token(&self, nm_id: i64, dest: i32) -> Option<String> {
        let mut cache = self.xpow_cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < XPOW_TTL {
                return Some(cached.token.clone());
            }
        }

        let token = self.xpow.token(nm_id, dest).await?;
        *cache = Some(CachedToken {
            token: token.clone(),
            fetched_at: Instant::now(),
        });
        Some(token)
    }

    async fn request_card(&self, nm_id: i64, dest: i32) -> FetchResult<CardProduct> {
        let mut request = self.client
            .get(CARD_API_BASE)
            .query(
                &[
                    ("appType", "1".to_string()),
                    ("curr", "rub".to_string()),
                    ("dest", dest.to_string()),
                    ("spp", "30".to_string()),
                    ("hide_dtype", "11".to_string()),
                    ("ab_testing", "false".to_string()),
                    ("lang", "ru".to_string()),
                    ("nm", nm_id.to_string()),
                ]
            )
            .header("User-Agent", USER_AGENT)
            .header("Accept", "*/*")
            .header("Accept-Language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7")
            .header(
                "Referer",
                format!("https://www.wildberries.ru/catalog/{}/detail.aspx", nm_id)
            )
            .header("Origin", "https://www.wildberries.ru");

        if let Some(token) = self.xpow_token(nm_id, dest).await {
            request = request.header("x-pow", token);
        }

        let response = request.send().await.map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body: CardResponse = response
            .json().await
            .map_err(|e| FetchError::Permanent(format!("malformed card body: {}", e)))?;

        body.products
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Permanent(format!("empty card response for nm={}", nm_id)))
    }
}

#[async_trait]
impl ProductFetcher for CardFetcher {
    async fn fetch(
        &self,
        nm_id: i64,
        dest: i32,
        selected_size: Option<&str>
    ) -> FetchResult<Observation> {
        let card = self.request_card(nm_id, dest).await?;
        resolve_observation(card, selected_size)
    }
}

fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        FetchError::Transient(e.to_string())
    } else {
        FetchError::Permanent(e.to_string())
    }
}

fn classify_status(status: reqwest::StatusCode) -> FetchError {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            FetchError::Blocked(format!("HTTP {}", status))
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            FetchError::Permanent(format!("HTTP {}", status))
        }
        s if s.is_server_error() => FetchError::Transient(format!("HTTP {}", s)),
        s => FetchError::Permanent(format!("HTTP {}", s)),
    }
}

/// Collapse a card into a single observation.
///
/// Cards with real named sizes require the tracked product to have picked
/// one; sizeless cards carry a single anonymous size block. Kopeck prices
/// are converted to rubles here.
fn resolve_observation(card: CardProduct, selected_size: Option<&str>) -> FetchResult<Observation> {
    let has_real_sizes = card.sizes.iter().any(|s| !s.name.is_empty() && s.name != "0");

    let size = if has_real_sizes {
        let wanted = selected_size.ok_or_else(|| {
            FetchError::Permanent("card has sizes but no size is selected".to_string())
        })?;
        card.sizes
            .iter()
            .find(|s| s.name == wanted)
            .ok_or_else(|| {
                FetchError::Permanent(format!("selected size '{}' not on card", wanted))
            })?
    } else {
        card.sizes
            .first()
            .ok_or_else(|| FetchError::Permanent("card has no price data".to_string()))?
    };

    let qty: i64 = size.stocks
        .iter()
        .map(|s| s.qty)
        .sum();

    Ok(Observation {
        basic_price: size.price.basic / 100,
        product_price: size.price.product / 100,
        qty,
        name: card.name,
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(json: &str) -> CardProduct {
        let response: CardResponse = serde_json::from_str(json).unwrap();
        response.products.into_iter().next().unwrap()
    }

    #[test]
    fn resolves_sizeless_card() {
        let card = card(
            r#"{"products":[{"name":"Кофеварка","sizes":[
                {"name":"","origName":"0","price":{"basic":250000,"product":189900},
                 "stocks":[{"qty":3},{"qty":2}]}
            ]}]}"#
        );

        let obs = resolve_observation(card, None).unwrap();
        assert_eq!(obs.basic_price, 2500);
        assert_eq!(obs.product_price, 1899);
        assert_eq!(obs.qty, 5);
        assert_eq!(obs.name, "Кофеварка");
        assert!(!obs.is_out_of_stock());
    }

    #[test]
    fn resolves_selected_size() {
        let card = card(
            r#"{"products":[{"name":"Кроссовки","sizes":[
                {"name":"40","price":{"basic":500000,"product":420000},"stocks":[{"qty":1}]},
                {"name":"41","price":{"basic":500000,"product":430000},"stocks":[]}
            ]}]}"#
        );

        let obs = resolve_observation(card, Some("41")).unwrap();
        assert_eq!(obs.product_price, 4300);
        assert_eq!(obs.qty, 0);
        assert!(obs.is_out_of_stock());
    }

    #[test]
    fn sized_card_without_selection_fails() {
        let card = card(
            r#"{"products":[{"name":"Кроссовки","sizes":[
                {"name":"40","price":{"basic":1,"product":1},"stocks":[]}
            ]}]}"#
        );

        assert!(matches!(resolve_observation(card, None), Err(FetchError::Permanent(_))));
    }

    #[test]
    fn missing_selected_size_fails() {
        let card = card(
            r#"{"products":[{"name":"Кроссовки","sizes":[
                {"name":"40","price":{"basic":1,"product":1},"stocks":[]}
            ]}]}"#
        );

        assert!(matches!(resolve_observation(card, Some("44")), Err(FetchError::Permanent(_))));
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;

        assert!(matches!(classify_status(StatusCode::TOO_MANY_REQUESTS), FetchError::Blocked(_)));
        assert!(matches!(classify_status(StatusCode::FORBIDDEN), FetchError::Blocked(_)));
        assert!(matches!(classify_status(StatusCode::NOT_FOUND), FetchError::Permanent(_)));
        assert!(matches!(classify_status(StatusCode::BAD_GATEWAY), FetchError::Transient(_)));
        assert!(matches!(classify_status(StatusCode::IM_A_TEAPOT), FetchError::Permanent(_)));
    }
}
