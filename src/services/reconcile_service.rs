use std::sync::Arc;

use sea_orm::{ DatabaseConnection, EntityTrait, TransactionError, TransactionTrait };

use crate::db::entity::{ product, user };
use crate::db::{ PriceHistoryRepository, ProductCacheUpdate, ProductRepository };
use crate::enums::{ NotificationKind, NotifyRule };
use crate::error::{ AppError, Result };
use crate::notifier::{ Notification, NotificationSink };
use crate::services::fetch_service::Observation;

/// The slice of stored product state the evaluator compares against.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub last_basic_price: Option<i64>,
    pub last_product_price: Option<i64>,
    pub last_qty: Option<i64>,
    pub out_of_stock: bool,
    pub name: String,
    pub rule: NotifyRule,
    pub fail_count: i32,
}

impl From<&product::Model> for ProductSnapshot {
    fn from(p: &product::Model) -> Self {
        Self {
            last_basic_price: p.last_basic_price,
            last_product_price: p.last_product_price,
            last_qty: p.last_qty,
            out_of_stock: p.out_of_stock,
            name: p.name_product.clone(),
            rule: p.notify_rule(),
            fail_count: p.fail_count,
        }
    }
}

/// What a reconciliation decided: the history row to append, the cache
/// fields to write, whether the failure counter needs clearing and at
/// most one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub history: Option<HistoryEntry>,
    pub cache: Option<ProductCacheUpdate>,
    pub notification: Option<NotificationKind>,
    pub reset_fail_count: bool,
}

impl Reconciliation {
    fn noop() -> Self {
        Self { history: None, cache: None, notification: None, reset_fail_count: false }
    }

    pub fn changed(&self) -> bool {
        self.cache.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub basic_price: i64,
    pub product_price: i64,
    pub qty: i64,
}

/// Compare an observation against the stored snapshot and decide on
/// persistence and notification. Pure; never touches the store.
///
/// Rules:
/// - first observation fills the baseline silently;
/// - unchanged (price, qty, name) is a no-op, so replaying the same
///   observation can never duplicate history or notifications;
/// - any successful observation clears a nonzero failure counter, even
///   when nothing else changed;
/// - a sold-out observation keeps the last known price in the cache and
///   the history row (qty still records the zero);
/// - restock is always notification-eligible; stock-out only under the
///   all-changes rule; name-only changes never notify.
pub fn evaluate(snapshot: &ProductSnapshot, observation: &Observation) -> Reconciliation {
    let reset_fail_count = snapshot.fail_count > 0;
    // Keep the last known price while the product is unavailable instead
    // of caching the API's zero placeholder.
    let (basic_price, product_price) = if
        observation.is_out_of_stock() && snapshot.last_product_price.is_some()
    {
        (
            snapshot.last_basic_price.unwrap_or(observation.basic_price),
            snapshot.last_product_price.unwrap_or(observation.product_price),
        )
    } else {
        (observation.basic_price, observation.product_price)
    };

    let price_changed = snapshot.last_product_price != Some(product_price);
    let qty_changed = snapshot.last_qty != Some(observation.qty);
    let name_changed = !observation.name.is_empty() && snapshot.name != observation.name;

    if !price_changed && !qty_changed && !name_changed {
        return Reconciliation { reset_fail_count, ..Reconciliation::noop() };
    }

    let cache = ProductCacheUpdate {
        basic_price,
        product_price,
        qty: observation.qty,
        out_of_stock: observation.is_out_of_stock(),
        name: name_changed.then(|| observation.name.clone()),
    };

    let history = HistoryEntry {
        basic_price,
        product_price,
        qty: observation.qty,
    };

    let notification = decide_notification(snapshot, observation, product_price, price_changed);

    Reconciliation {
        history: Some(history),
        cache: Some(cache),
        notification,
        reset_fail_count,
    }
}

fn decide_notification(
    snapshot: &ProductSnapshot,
    observation: &Observation,
    new_price: i64,
    price_changed: bool
) -> Option<NotificationKind> {
    // Restocking is time-sensitive and ignores the configured rule.
    if snapshot.out_of_stock && observation.qty > 0 {
        return Some(NotificationKind::Restock {
            qty: observation.qty,
            price: new_price,
        });
    }

    // No baseline yet: nothing to compare a rule against.
    let old_price = snapshot.last_product_price?;

    if price_changed {
        let eligible = match snapshot.rule {
            NotifyRule::AllChanges => true,
            NotifyRule::PercentDrop(v) => new_price * 100 <= old_price * (100 - v),
            NotifyRule::Threshold(v) => new_price <= v,
        };

        if eligible {
            return Some(NotificationKind::PriceChange {
                old_price,
                new_price,
            });
        }
    }

    // Stock running out is an availability change under all-changes.
    let went_out = !snapshot.out_of_stock
        && snapshot.last_qty.is_some_and(|q| q > 0)
        && observation.is_out_of_stock();
    if went_out && snapshot.rule == NotifyRule::AllChanges {
        return Some(NotificationKind::OutOfStock);
    }

    None
}

/// Commits reconciliations and emits their notifications. The only
/// component that writes history or enqueues outbound messages.
pub struct ReconcileService {
    db: DatabaseConnection,
    sink: Arc<dyn NotificationSink>,
}

/// Per-product result the scheduler folds into cycle stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub changed: bool,
    pub notified: bool,
}

impl ReconcileService {
    pub fn new(db: DatabaseConnection, sink: Arc<dyn NotificationSink>) -> Self {
        Self { db, sink }
    }

    /// Reconcile one successful observation: re-read the product inside a
    /// transaction, evaluate against that fresh row, commit the history
    /// append, cache update and failure-counter reset atomically, then
    /// hand off the notification.
    pub async fn process(
        &self,
        owner: &user::Model,
        product_id: i64,
        observation: Observation
    ) -> Result<ReconcileReport> {
        let outcome = self.db.transaction::<_, (Reconciliation, Option<product::Model>), AppError>(
            move |txn| {
                let observation = observation.clone();
                Box::pin(async move {
                    let Some(fresh) = product::Entity::find_by_id(product_id).one(txn).await? else {
                        // Deleted mid-cycle; nothing to do
                        return Ok((Reconciliation::noop(), None));
                    };

                    let reconciliation = evaluate(&ProductSnapshot::from(&fresh), &observation);

                    if let Some(cache) = &reconciliation.cache {
                        ProductRepository::update_cache(txn, product_id, cache.clone()).await?;
                    }

                    if let Some(entry) = &reconciliation.history {
                        PriceHistoryRepository::append(
                            txn,
                            product_id,
                            entry.basic_price,
                            entry.product_price,
                            entry.qty
                        ).await?;
                    }

                    if reconciliation.reset_fail_count {
                        ProductRepository::reset_fail_count(txn, product_id).await?;
                    }

                    Ok((reconciliation, Some(fresh)))
                })
            }
        ).await;

        let (reconciliation, fresh) = match outcome {
            Ok(v) => v,
            Err(TransactionError::Connection(e)) => {
                return Err(AppError::Database(e));
            }
            Err(TransactionError::Transaction(e)) => {
                return Err(e);
            }
        };

        let mut notified = false;
        if let (Some(kind), Some(product)) = (&reconciliation.notification, &fresh) {
            let notification = Notification {
                kind: kind.clone(),
                product_name: product.display_name().to_string(),
                url: product.url_product.clone(),
            };

            // Emission only; a sink failure never fails the reconciliation
            match self.sink.notify(owner, &notification).await {
                Ok(()) => {
                    notified = true;
                }
                Err(e) => {
                    tracing::warn!("Failed to notify user {}: {}", owner.id, e);
                }
            }
        }

        Ok(ReconcileReport {
            changed: reconciliation.changed(),
            notified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(price: Option<i64>, qty: Option<i64>, out_of_stock: bool, rule: NotifyRule) -> ProductSnapshot {
        ProductSnapshot {
            last_basic_price: price.map(|p| p + 500),
            last_product_price: price,
            last_qty: qty,
            out_of_stock,
            name: "Чайник".to_string(),
            rule,
            fail_count: 0,
        }
    }

    fn observation(price: i64, qty: i64) -> Observation {
        Observation {
            basic_price: price + 500,
            product_price: price,
            qty,
            name: "Чайник".to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn unchanged_observation_is_noop() {
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::AllChanges);
        let rec = evaluate(&snap, &observation(1000, 5));

        assert_eq!(rec, Reconciliation::noop());

        // Idempotence: evaluating again can never produce more output
        let again = evaluate(&snap, &observation(1000, 5));
        assert_eq!(again.history, None);
        assert_eq!(again.notification, None);
    }

    #[test]
    fn first_observation_fills_baseline_silently() {
        let snap = snapshot(None, None, false, NotifyRule::AllChanges);
        let rec = evaluate(&snap, &observation(1000, 5));

        assert!(rec.history.is_some());
        assert!(rec.cache.is_some());
        assert_eq!(rec.notification, None);
    }

    #[test]
    fn percent_drop_boundary() {
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::PercentDrop(10));

        // 8% drop: history yes, notification no
        let rec = evaluate(&snap, &observation(920, 5));
        assert!(rec.history.is_some());
        assert_eq!(rec.notification, None);

        // 11% drop: notification with the new price
        let rec = evaluate(&snap, &observation(890, 5));
        assert_eq!(
            rec.notification,
            Some(NotificationKind::PriceChange { old_price: 1000, new_price: 890 })
        );
        assert_eq!(rec.history.unwrap().product_price, 890);

        // exact 10% drop is inclusive
        let rec = evaluate(&snap, &observation(900, 5));
        assert!(rec.notification.is_some());
    }

    #[test]
    fn percent_drop_never_notifies_on_increase() {
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::PercentDrop(10));
        let rec = evaluate(&snap, &observation(1500, 5));

        assert!(rec.history.is_some());
        assert_eq!(rec.notification, None);
    }

    #[test]
    fn threshold_is_direction_independent() {
        let snap = snapshot(Some(700), Some(5), false, NotifyRule::Threshold(900));

        // Increase, but still at or below the threshold
        let rec = evaluate(&snap, &observation(850, 5));
        assert_eq!(
            rec.notification,
            Some(NotificationKind::PriceChange { old_price: 700, new_price: 850 })
        );

        // Above the threshold never notifies
        let rec = evaluate(&snap, &observation(950, 5));
        assert_eq!(rec.notification, None);
    }

    #[test]
    fn all_changes_notifies_on_any_price_move() {
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::AllChanges);

        assert!(evaluate(&snap, &observation(999, 5)).notification.is_some());
        assert!(evaluate(&snap, &observation(1001, 5)).notification.is_some());
    }

    #[test]
    fn restock_notifies_regardless_of_rule() {
        for rule in [NotifyRule::AllChanges, NotifyRule::PercentDrop(10), NotifyRule::Threshold(1)] {
            let snap = snapshot(Some(1000), Some(0), true, rule);
            let rec = evaluate(&snap, &observation(1000, 3));

            assert_eq!(
                rec.notification,
                Some(NotificationKind::Restock { qty: 3, price: 1000 }),
                "rule {:?} must not suppress restock",
                rule
            );
            assert!(!rec.cache.unwrap().out_of_stock);
        }
    }

    #[test]
    fn stock_out_notifies_only_under_all_changes() {
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::AllChanges);
        let rec = evaluate(&snap, &observation(0, 0));
        assert_eq!(rec.notification, Some(NotificationKind::OutOfStock));

        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::PercentDrop(10));
        let rec = evaluate(&snap, &observation(0, 0));
        assert_eq!(rec.notification, None);
        // History still records the transition
        assert!(rec.history.is_some());
    }

    #[test]
    fn sold_out_keeps_last_known_price() {
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::AllChanges);
        let rec = evaluate(&snap, &observation(0, 0));

        let entry = rec.history.unwrap();
        assert_eq!(entry.product_price, 1000);
        assert_eq!(entry.qty, 0);

        let cache = rec.cache.unwrap();
        assert_eq!(cache.product_price, 1000);
        assert!(cache.out_of_stock);
    }

    #[test]
    fn name_only_change_updates_without_notifying() {
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::AllChanges);
        let mut obs = observation(1000, 5);
        obs.name = "Чайник электрический".to_string();

        let rec = evaluate(&snap, &obs);
        assert_eq!(rec.notification, None);
        assert_eq!(rec.cache.unwrap().name.as_deref(), Some("Чайник электрический"));
        assert!(rec.history.is_some());
    }

    #[test]
    fn success_after_failures_clears_the_counter_even_on_noop() {
        // A product that failed a few times and then fetches fine with
        // unchanged values must not keep looking dead.
        let mut snap = snapshot(Some(1000), Some(5), false, NotifyRule::AllChanges);
        snap.fail_count = 3;

        let rec = evaluate(&snap, &observation(1000, 5));
        assert_eq!(rec.history, None);
        assert_eq!(rec.cache, None);
        assert_eq!(rec.notification, None);
        assert!(rec.reset_fail_count);

        // A changed observation clears it too
        let rec = evaluate(&snap, &observation(890, 5));
        assert!(rec.reset_fail_count);

        // Healthy products stay untouched
        snap.fail_count = 0;
        let rec = evaluate(&snap, &observation(1000, 5));
        assert!(!rec.reset_fail_count);
    }

    #[test]
    fn consecutive_entries_never_repeat_state() {
        // Apply an observation, feed the resulting cache back as the next
        // snapshot, and replay the same observation: no second entry.
        let snap = snapshot(Some(1000), Some(5), false, NotifyRule::AllChanges);
        let obs = observation(890, 4);

        let first = evaluate(&snap, &obs);
        let cache = first.cache.unwrap();

        let next = ProductSnapshot {
            last_basic_price: Some(cache.basic_price),
            last_product_price: Some(cache.product_price),
            last_qty: Some(cache.qty),
            out_of_stock: cache.out_of_stock,
            name: cache.name.unwrap_or_else(|| snap.name.clone()),
            rule: NotifyRule::AllChanges,
            fail_count: 0,
        };

        let second = evaluate(&next, &obs);
        assert_eq!(second.history, None);
        assert_eq!(second.notification, None);
    }
}
