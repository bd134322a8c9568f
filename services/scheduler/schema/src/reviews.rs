use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Review content owned by the surrounding application. Read-only here.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub video_url: Option<String>,
    /// JSON array of [`AffiliateLinkJson`].
    pub affiliate_links: Json,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Element shape of the `affiliate_links` column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateLinkJson {
    pub platform: String,
    pub url: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::schedules::Entity")]
    Schedules,
}

impl Related<super::schedules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
