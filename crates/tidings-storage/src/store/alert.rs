use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use std::collections::HashSet;
use tidings_common::types::{Alert, NotificationPayload, Query};

use crate::entities::alert::{self, Column, Entity};
use crate::entities::notification;
use crate::entities::role;
use crate::error::{Result, StorageError};
use crate::store::notification::to_notification;
use crate::store::AlertStore;
use crate::MatchRecord;

fn to_alert(m: alert::Model) -> Result<Alert> {
    let query: Query = serde_json::from_str(&m.query_json)?;
    Ok(Alert {
        id: m.id,
        owner_id: m.owner_id,
        query,
        notified_at: m.notified_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

impl AlertStore {
    pub async fn create_alert(&self, owner_id: &str, query: &Query) -> Result<Alert> {
        let owner = role::Entity::find_by_id(owner_id).one(self.db()).await?;
        if owner.is_none() {
            return Err(StorageError::NotFound {
                entity: "role",
                id: owner_id.to_owned(),
            });
        }

        let now = Utc::now().fixed_offset();
        let am = alert::ActiveModel {
            id: Set(tidings_common::id::next_id()),
            owner_id: Set(owner_id.to_owned()),
            query_json: Set(query.canonical_json()?),
            notified_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        };
        let model = am.insert(self.db()).await?;
        to_alert(model)
    }

    /// Gets a live alert by id. Deleted alerts read as `None`.
    pub async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let model = Entity::find_by_id(id)
            .filter(Column::DeletedAt.is_null())
            .one(self.db())
            .await?;
        model.map(to_alert).transpose()
    }

    pub async fn list_alerts(&self, owner_id: Option<&str>) -> Result<Vec<Alert>> {
        let mut q = Entity::find().filter(Column::DeletedAt.is_null());
        if let Some(owner) = owner_id {
            q = q.filter(Column::OwnerId.eq(owner));
        }
        let rows = q
            .order_by(Column::CreatedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_alert).collect()
    }

    pub async fn list_alert_ids(&self) -> Result<Vec<String>> {
        let ids = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::DeletedAt.is_null())
            .order_by(Column::CreatedAt, Order::Asc)
            .into_tuple::<String>()
            .all(self.db())
            .await?;
        Ok(ids)
    }

    /// Soft-deletes an alert. Returns true if a live alert was found.
    pub async fn delete_alert(&self, id: &str) -> Result<bool> {
        let now = Utc::now().fixed_offset();
        let res = Entity::update_many()
            .col_expr(Column::DeletedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_null())
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Moves the notification cursor directly: a future value snoozes the
    /// alert, `None` makes the next check consider all history.
    pub async fn set_notified_at(
        &self,
        id: &str,
        notified_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Alert>> {
        let model = Entity::find_by_id(id)
            .filter(Column::DeletedAt.is_null())
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: alert::ActiveModel = m.into();
            am.notified_at = Set(notified_at.map(|t| t.fixed_offset()));
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_alert(updated)?))
        } else {
            Ok(None)
        }
    }

    /// Keeps the oldest alert per (owner, query) and soft-deletes the rest.
    pub async fn dedupe_alerts(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let txn = self.db().begin().await?;

        let rows = Entity::find()
            .filter(Column::DeletedAt.is_null())
            .order_by(Column::CreatedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(&txn)
            .await?;

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for row in rows {
            if !seen.insert((row.owner_id, row.query_json)) {
                duplicates.push(row.id);
            }
        }

        if duplicates.is_empty() {
            txn.rollback().await?;
            return Ok(0);
        }

        let now = Utc::now().fixed_offset();
        let res = Entity::update_many()
            .col_expr(Column::DeletedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.is_in(duplicates))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(removed = res.rows_affected, "Removed duplicate alerts");
        Ok(res.rows_affected)
    }

    /// Records one match for an alert: inserts the notification and advances
    /// `notified_at` to `at` in a single transaction.
    ///
    /// The cursor update is a compare-and-set against `expected_notified_at`,
    /// issued before the insert. If it touches no row the transaction is
    /// rolled back and the caller learns whether the alert moved on
    /// ([`MatchRecord::Conflict`]) or disappeared ([`MatchRecord::Gone`]).
    pub async fn record_match(
        &self,
        alert_id: &str,
        expected_notified_at: Option<DateTime<Utc>>,
        payload: &NotificationPayload,
        at: DateTime<Utc>,
    ) -> Result<MatchRecord> {
        let payload_json = serde_json::to_string(payload)?;
        let at_fixed = at.fixed_offset();

        let _guard = self.write_lock.lock().await;
        let txn = self.db().begin().await?;

        let cursor = match expected_notified_at {
            Some(prev) => Column::NotifiedAt.eq(prev.fixed_offset()),
            None => Column::NotifiedAt.is_null(),
        };
        let advanced = Entity::update_many()
            .col_expr(Column::NotifiedAt, Expr::value(at_fixed))
            .col_expr(Column::UpdatedAt, Expr::value(at_fixed))
            .filter(Column::Id.eq(alert_id))
            .filter(Column::DeletedAt.is_null())
            .filter(cursor)
            .exec(&txn)
            .await?;

        if advanced.rows_affected == 0 {
            let current = Entity::find_by_id(alert_id)
                .filter(Column::DeletedAt.is_null())
                .one(&txn)
                .await?;
            txn.rollback().await?;
            return Ok(match current {
                Some(m) => MatchRecord::Conflict {
                    notified_at: m.notified_at.map(|t| t.with_timezone(&Utc)),
                },
                None => MatchRecord::Gone,
            });
        }

        let owner_id = Entity::find_by_id(alert_id)
            .select_only()
            .column(Column::OwnerId)
            .into_tuple::<String>()
            .one(&txn)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "alert",
                id: alert_id.to_owned(),
            })?;

        let am = notification::ActiveModel {
            id: Set(tidings_common::id::next_id()),
            owner_id: Set(owner_id),
            alert_id: Set(alert_id.to_owned()),
            payload_json: Set(payload_json),
            created_at: Set(at_fixed),
        };
        let model = am.insert(&txn).await?;
        txn.commit().await?;

        Ok(MatchRecord::Recorded(to_notification(model)?))
    }
}
