use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tidings_common::types::Role;

use crate::entities::role::{self, Column, Entity};
use crate::error::Result;
use crate::store::AlertStore;

fn to_role(m: role::Model) -> Role {
    Role {
        id: m.id,
        name: m.name,
        email: m.email,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    pub async fn create_role(&self, name: &str, email: Option<&str>) -> Result<Role> {
        let now = Utc::now().fixed_offset();
        let am = role::ActiveModel {
            id: Set(tidings_common::id::next_id()),
            name: Set(name.to_owned()),
            email: Set(email.map(str::to_owned)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_role(model))
    }

    pub async fn get_role(&self, id: &str) -> Result<Option<Role>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_role))
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let model = Entity::find()
            .filter(Column::Name.eq(name))
            .one(self.db())
            .await?;
        Ok(model.map(to_role))
    }

    /// Sets or clears (`None`) the delivery address of a role.
    pub async fn set_role_email(&self, id: &str, email: Option<&str>) -> Result<Option<Role>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let mut am: role::ActiveModel = m.into();
            am.email = Set(email.map(str::to_owned));
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_role(updated)))
        } else {
            Ok(None)
        }
    }
}
