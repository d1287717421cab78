use chrono::Utc;
use sea_orm::{
    ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};
use tidings_common::types::{Notification, NotificationPayload};

use crate::entities::notification::{self, Column, Entity};
use crate::error::Result;
use crate::store::AlertStore;

/// Filter for listing notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub owner_id: Option<String>,
    pub alert_id: Option<String>,
}

impl NotificationFilter {
    pub fn owner(owner_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_owned()),
            alert_id: None,
        }
    }

    fn apply(&self, mut q: Select<Entity>) -> Select<Entity> {
        if let Some(owner) = &self.owner_id {
            q = q.filter(Column::OwnerId.eq(owner.as_str()));
        }
        if let Some(alert) = &self.alert_id {
            q = q.filter(Column::AlertId.eq(alert.as_str()));
        }
        q
    }
}

pub(crate) fn to_notification(m: notification::Model) -> Result<Notification> {
    let payload: NotificationPayload = serde_json::from_str(&m.payload_json)?;
    Ok(Notification {
        id: m.id,
        owner_id: m.owner_id,
        alert_id: m.alert_id,
        payload,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl AlertStore {
    /// Lists notifications newest first.
    pub async fn list_notifications(
        &self,
        filter: &NotificationFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Notification>> {
        let rows = filter
            .apply(Entity::find())
            .order_by(Column::CreatedAt, Order::Desc)
            .order_by(Column::Id, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_notification).collect()
    }

    pub async fn count_notifications(&self, filter: &NotificationFilter) -> Result<u64> {
        Ok(filter.apply(Entity::find()).count(self.db()).await?)
    }

    pub async fn get_notification(&self, id: &str) -> Result<Option<Notification>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        model.map(to_notification).transpose()
    }
}
