//! Profile entity (application-side record for a signed-in identity).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profile")]
pub struct Model {
    /// Identity id issued by the identity provider
    #[sea_orm(primary_key, auto_increment = false)]
    pub identity_id: String,

    #[sea_orm(nullable)]
    pub display_name: Option<String>,

    #[sea_orm(nullable)]
    pub email: Option<String>,

    #[sea_orm(nullable)]
    pub photo_url: Option<String>,

    /// Set out-of-band only; profiles are created with `false`.
    #[sea_orm(default_value = false)]
    pub is_admin: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
