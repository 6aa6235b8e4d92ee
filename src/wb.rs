//! Marketplace helpers: article extraction from user input and wallet
//! discount arithmetic.

/// Extract the nm_id (marketplace article) from a catalog link, a bare
/// article, or free text containing one.
///
/// Accepted forms:
/// - links with `/catalog/<digits>/detail.aspx`
/// - a bare 5-12 digit article
/// - any 6-12 digit run inside other text
pub fn extract_nm_id(text: &str) -> Option<i64> {
    if let Some(pos) = text.find("/catalog/") {
        let rest = &text[pos + "/catalog/".len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if (5..=12).contains(&digits.len()) && rest[digits.len()..].starts_with("/detail.aspx") {
            return digits.parse().ok();
        }
    }

    let trimmed = text.trim();
    if (5..=12).contains(&trimmed.len()) && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.parse().ok();
    }

    // Fallback: first standalone digit run of plausible length
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_ascii_digit(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                let run = &text[s..i];
                if (6..=12).contains(&run.len()) {
                    return run.parse().ok();
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        let run = &text[s..];
        if (6..=12).contains(&run.len()) {
            return run.parse().ok();
        }
    }

    None
}

/// Canonical catalog URL for an article.
pub fn product_url(nm_id: i64) -> String {
    format!("https://www.wildberries.ru/catalog/{}/detail.aspx", nm_id)
}

/// Apply the wallet discount, rounding down.
pub fn apply_wallet_discount(price: i64, discount_percent: i32) -> i64 {
    if discount_percent <= 0 {
        return price;
    }
    price * (100 - discount_percent as i64) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_catalog_link() {
        let url = "https://www.wildberries.ru/catalog/173297644/detail.aspx?targetUrl=SP";
        assert_eq!(extract_nm_id(url), Some(173297644));
    }

    #[test]
    fn extracts_bare_article() {
        assert_eq!(extract_nm_id("173297644"), Some(173297644));
        assert_eq!(extract_nm_id("  54321 "), Some(54321));
    }

    #[test]
    fn extracts_from_free_text() {
        assert_eq!(extract_nm_id("смотри артикул 173297644 вот"), Some(173297644));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(extract_nm_id("no numbers here"), None);
        assert_eq!(extract_nm_id("1234"), None);
        assert_eq!(extract_nm_id("1234567890123456"), None);
    }

    #[test]
    fn wallet_discount_floors() {
        assert_eq!(apply_wallet_discount(1000, 3), 970);
        assert_eq!(apply_wallet_discount(999, 3), 969);
        assert_eq!(apply_wallet_discount(1000, 0), 1000);
        assert_eq!(apply_wallet_discount(1000, -5), 1000);
    }

    #[test]
    fn product_url_shape() {
        assert_eq!(
            product_url(42),
            "https://www.wildberries.ru/catalog/42/detail.aspx"
        );
    }
}
