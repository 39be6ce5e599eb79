//! Report entity (an incident submission).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "report")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Author snapshot, copied from the identity at submission time
    pub author_id: String,

    #[sea_orm(nullable)]
    pub author_name: Option<String>,

    #[sea_orm(nullable)]
    pub author_photo_url: Option<String>,

    #[sea_orm(default_value = false)]
    pub pinned: bool,

    #[sea_orm(default_value = false)]
    pub resolved: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::report_comment::Entity")]
    Comments,

    #[sea_orm(has_many = "super::report_supporter::Entity")]
    Supporters,
}

impl Related<super::report_comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl Related<super::report_supporter::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supporters.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
