use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ LinkPreviewOptions, ParseMode };
use teloxide::RequestError;

use crate::db::entity::user;
use crate::enums::{ NotificationKind, Plan };
use crate::error::{ AppError, Result };
use crate::wb::apply_wallet_discount;

/// One user-facing message about a tracked product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub product_name: String,
    pub url: String,
}

/// Fire-and-forget hand-off to the messaging side. Delivery is not
/// retried here; emission either happens or is logged and dropped.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user: &user::Model, notification: &Notification) -> Result<()>;
}

pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn format_message(&self, user: &user::Model, notification: &Notification) -> String {
        let plan = user.plan.parse::<Plan>().unwrap_or(Plan::Free);
        let header = format!(
            "📦 {name}\n🔗 <a href='{url}'>Открыть товар</a>\n",
            name = notification.product_name,
            url = notification.url
        );

        match &notification.kind {
            NotificationKind::PriceChange { old_price, new_price } => {
                let discount = user.discount_percent;
                let (old_display, new_display) = (
                    apply_wallet_discount(*old_price, discount),
                    apply_wallet_discount(*new_price, discount),
                );

                let title = if new_price < old_price {
                    "🔔 <b>Цена снизилась!</b>"
                } else {
                    "📈 <b>Цена изменилась</b>"
                };

                let mut message = format!("{}\n\n{}\n", title, header);

                if discount > 0 {
                    message.push_str(
                        &format!(
                            "💳 <b>Цена с WB кошельком ({discount}%):</b>\n\
                             ✅ <b>Сейчас:</b> {new_display} ₽\n\
                             📉 <b>Было:</b> {old_display} ₽\n\n\
                             <i>Без кошелька: {new_price} ₽ (было {old_price} ₽)</i>\n"
                        )
                    );
                } else {
                    message.push_str(
                        &format!(
                            "💰 <b>Новая цена:</b> {new_display} ₽\n📉 <b>Было:</b> {old_display} ₽\n"
                        )
                    );
                }

                message
            }
            NotificationKind::Restock { qty, price } => {
                let mut message = format!("✅ <b>Товар снова в наличии!</b>\n\n{}", header);

                let display_price = apply_wallet_discount(*price, user.discount_percent);
                message.push_str(&format!("💰 <b>Цена:</b> {} ₽\n", display_price));

                if plan.shows_stock_counts() && *qty > 0 {
                    message.push_str(&format!("📦 <b>Остаток:</b> {} шт.\n", qty));
                }

                message
            }
            NotificationKind::OutOfStock => {
                format!("⚠️ <b>Товар закончился!</b>\n\n{}", header)
            }
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, user: &user::Model, notification: &Notification) -> Result<()> {
        let message = self.format_message(user, notification);

        let result = self.bot
            .send_message(ChatId(user.id), message)
            .parse_mode(ParseMode::Html)
            .link_preview_options(LinkPreviewOptions {
                is_disabled: true,
                url: None,
                prefer_small_media: false,
                prefer_large_media: false,
                show_above_text: false,
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Sent {} notification to user {}", notification.kind, user.id);
                Ok(())
            }
            // The user blocked the bot; nothing to deliver, not an error
            Err(RequestError::Api(teloxide::ApiError::BotBlocked)) => {
                tracing::warn!("User {} blocked the bot, dropping notification", user.id);
                Ok(())
            }
            Err(e) => Err(AppError::Notify(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_user(discount: i32, plan: &str) -> user::Model {
        user::Model {
            id: 100,
            plan: plan.to_string(),
            discount_percent: discount,
            max_links: 5,
            dest: -1257786,
            pvz_address: None,
            sort_mode: "updated".to_string(),
            created_at: Utc::now(),
        }
    }

    fn sink() -> TelegramSink {
        TelegramSink::new(Bot::new("0:TEST"))
    }

    #[test]
    fn price_drop_message_shows_wallet_price() {
        let notification = Notification {
            kind: NotificationKind::PriceChange { old_price: 1000, new_price: 890 },
            product_name: "Чайник".to_string(),
            url: "https://www.wildberries.ru/catalog/42/detail.aspx".to_string(),
        };

        let message = sink().format_message(&test_user(3, "plan_basic"), &notification);
        assert!(message.contains("Цена снизилась"));
        assert!(message.contains("863 ₽")); // 890 * 0.97 floored
        assert!(message.contains("Без кошелька: 890 ₽"));
    }

    #[test]
    fn restock_qty_only_for_pro() {
        let notification = Notification {
            kind: NotificationKind::Restock { qty: 7, price: 500 },
            product_name: "Чайник".to_string(),
            url: "https://example".to_string(),
        };

        let pro = sink().format_message(&test_user(0, "plan_pro"), &notification);
        assert!(pro.contains("7 шт."));

        let free = sink().format_message(&test_user(0, "plan_free"), &notification);
        assert!(!free.contains("7 шт."));
    }
}
