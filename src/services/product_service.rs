use sea_orm::DatabaseConnection;

use crate::config::Config;
use crate::db::entity::{ price_history, product, user };
use crate::db::{ PriceHistoryRepository, ProductRepository, UserRepository };
use crate::enums::{ NotifyRule, SortMode };
use crate::error::{ AppError, Result };
use crate::wb;

const PLACEHOLDER_NAME: &str = "Загрузка...";

/// Whether the user may track one more link. Pure; consulted at admission
/// time only, never inside tracking cycles.
pub fn can_admit(max_links: i32, active_count: u64) -> bool {
    active_count < max_links as u64
}

/// Entry points the bot interface calls to manage a user's tracked set.
pub struct ProductService {
    products: ProductRepository,
    users: UserRepository,
    history: PriceHistoryRepository,
    default_dest: i32,
    default_max_links: i32,
}

impl ProductService {
    pub fn new(db: DatabaseConnection, config: &Config) -> Self {
        Self {
            products: ProductRepository::new(db.clone()),
            users: UserRepository::new(db.clone()),
            history: PriceHistoryRepository::new(db),
            default_dest: config.default_dest,
            default_max_links: config.default_max_free_links,
        }
    }

    /// Admit a new tracked product from a link or bare article. The name
    /// is a placeholder until the first successful fetch fills it in.
    pub async fn add_product(
        &self,
        user_id: i64,
        text: &str,
        selected_size: Option<String>
    ) -> Result<product::Model> {
        let nm_id = wb
            ::extract_nm_id(text)
            .ok_or_else(|| AppError::InvalidInput("No article found in message".to_string()))?;

        let user = self.users.get_or_create(
            user_id,
            self.default_dest,
            self.default_max_links
        ).await?;

        let active = self.products.count_for_user(user_id).await?;
        if !can_admit(user.max_links, active) {
            return Err(AppError::QuotaExceeded);
        }

        if self.products.find_by_nm_id(user_id, nm_id).await?.is_some() {
            return Err(AppError::DuplicateProduct);
        }

        self.products.create(
            user_id,
            wb::product_url(nm_id),
            nm_id,
            PLACEHOLDER_NAME.to_string(),
            selected_size
        ).await
    }

    pub async fn remove_product(&self, user_id: i64, product_id: i64) -> Result<()> {
        self.products.delete(product_id, user_id).await
    }

    pub async fn set_custom_name(&self, user_id: i64, product_id: i64, name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.chars().count() < 3 {
            return Err(AppError::InvalidInput("Name too short (minimum 3 characters)".to_string()));
        }
        if trimmed.chars().count() > 200 {
            return Err(AppError::InvalidInput("Name too long (maximum 200 characters)".to_string()));
        }

        self.products.set_custom_name(product_id, user_id, trimmed.to_string()).await
    }

    pub async fn set_notify_rule(
        &self,
        user_id: i64,
        product_id: i64,
        rule: NotifyRule
    ) -> Result<()> {
        validate_rule(&rule)?;
        let (mode, value) = rule.to_columns();
        self.products.set_notify_rule(
            product_id,
            user_id,
            mode.map(str::to_string),
            value
        ).await
    }

    /// A user's products in their preferred order.
    pub async fn list_products(&self, user: &user::Model) -> Result<Vec<product::Model>> {
        let mut products = self.products.list_for_user(user.id).await?;

        // Repository already returns newest-updated first
        if user.sort_mode.parse::<SortMode>().unwrap_or(SortMode::Updated) == SortMode::Savings {
            products.sort_by_key(|p| {
                let basic = p.last_basic_price.unwrap_or(0);
                let current = p.last_product_price.unwrap_or(basic);
                std::cmp::Reverse(basic - current)
            });
        }

        Ok(products)
    }

    /// Newest-first history slice for one of the user's products.
    pub async fn price_history(
        &self,
        user_id: i64,
        product_id: i64,
        limit: u64
    ) -> Result<Vec<price_history::Model>> {
        let product = self.products.find_by_id(product_id).await?;
        if product.user_id != user_id {
            return Err(AppError::ProductNotFound);
        }

        self.history.recent(product_id, limit).await
    }

    /// How much the user would save buying everything now versus at each
    /// product's recent peak, in whole rubles.
    pub async fn potential_savings(&self, user_id: i64) -> Result<i64> {
        let products = self.products.list_for_user(user_id).await?;

        let mut total = 0;
        for product in &products {
            let history = self.history.recent(product.id, 30).await?;
            total += savings_against_peak(&history, product.last_product_price);
        }

        Ok(total)
    }
}

fn savings_against_peak(history: &[price_history::Model], current: Option<i64>) -> i64 {
    let Some(current) = current else {
        return 0;
    };

    let peak = history
        .iter()
        .map(|entry| entry.product_price)
        .max()
        .unwrap_or(current);

    (peak - current).max(0)
}

fn validate_rule(rule: &NotifyRule) -> Result<()> {
    match rule {
        NotifyRule::AllChanges => Ok(()),
        NotifyRule::PercentDrop(v) if (1..=100).contains(v) => Ok(()),
        NotifyRule::PercentDrop(_) => {
            Err(AppError::InvalidInput("Percent must be between 1 and 100".to_string()))
        }
        NotifyRule::Threshold(v) if *v > 0 => Ok(()),
        NotifyRule::Threshold(_) => {
            Err(AppError::InvalidInput("Threshold must be positive".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn history_entry(product_price: i64) -> price_history::Model {
        price_history::Model {
            id: 0,
            product_id: 1,
            basic_price: product_price + 500,
            product_price,
            qty: 5,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn savings_measured_against_recent_peak() {
        let history = vec![history_entry(1200), history_entry(1500), history_entry(1000)];

        assert_eq!(savings_against_peak(&history, Some(1000)), 500);
        // Current price above the peak never goes negative
        assert_eq!(savings_against_peak(&history, Some(1600)), 0);
        // No baseline yet
        assert_eq!(savings_against_peak(&history, None), 0);
        // No history: nothing to compare against
        assert_eq!(savings_against_peak(&[], Some(1000)), 0);
    }

    #[test]
    fn quota_boundary() {
        assert!(can_admit(5, 0));
        assert!(can_admit(5, 4));
        assert!(!can_admit(5, 5));
        assert!(!can_admit(5, 6));
        assert!(!can_admit(0, 0));
    }

    #[test]
    fn rule_validation() {
        assert!(validate_rule(&NotifyRule::AllChanges).is_ok());
        assert!(validate_rule(&NotifyRule::PercentDrop(10)).is_ok());
        assert!(validate_rule(&NotifyRule::PercentDrop(0)).is_err());
        assert!(validate_rule(&NotifyRule::PercentDrop(150)).is_err());
        assert!(validate_rule(&NotifyRule::Threshold(900)).is_ok());
        assert!(validate_rule(&NotifyRule::Threshold(0)).is_err());
    }
}
