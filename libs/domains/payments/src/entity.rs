use crate::models::{NewPayment, PaymentStatus};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;

/// Sea-ORM Entity for the payment ledger
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "payment_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub order_id: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// Conversion from Sea-ORM Model to domain Payment
impl From<Model> for crate::models::Payment {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            amount: model.amount,
            status: model.status,
            created_at: model.created_at.into(),
        }
    }
}

// New rows always start PROCESSING; the id comes from the sequence
impl From<NewPayment> for ActiveModel {
    fn from(input: NewPayment) -> Self {
        ActiveModel {
            id: NotSet,
            order_id: Set(input.order_id),
            amount: Set(input.amount),
            status: Set(PaymentStatus::Processing),
            created_at: Set(chrono::Utc::now().into()),
        }
    }
}
