use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, SqlErr,
};

use crate::{
    entity,
    error::{PaymentError, PaymentResult},
    models::{NewPayment, Payment, PaymentStatus},
    repository::PaymentRepository,
};

/// Table matching [`entity::Model`]; safe to run on every start.
const CREATE_PAYMENT_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS payment_events (
    id SERIAL PRIMARY KEY,
    order_id TEXT NOT NULL UNIQUE,
    amount BIGINT NOT NULL,
    status VARCHAR(16) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub struct PgPaymentRepository {
    db: DatabaseConnection,
}

impl PgPaymentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create `payment_events` if it does not exist yet
    pub async fn ensure_schema(&self) -> PaymentResult<()> {
        self.db.execute_unprepared(CREATE_PAYMENT_EVENTS).await?;
        tracing::info!("payment_events schema ready");
        Ok(())
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn map_insert_error(order_id: &str, err: DbErr) -> PaymentError {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                PaymentError::DuplicateOrder(order_id.to_string())
            }
            _ => err.into(),
        }
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn find_by_order_id(&self, order_id: &str) -> PaymentResult<Option<Payment>> {
        let model = entity::Entity::find()
            .filter(entity::Column::OrderId.eq(order_id))
            .one(&self.db)
            .await?;

        Ok(model.map(Into::into))
    }

    async fn create_processing(&self, input: NewPayment) -> PaymentResult<Payment> {
        let order_id = input.order_id.clone();
        let active_model: entity::ActiveModel = input.into();

        let model = active_model
            .insert(&self.db)
            .await
            .map_err(|e| Self::map_insert_error(&order_id, e))?;

        tracing::info!(order_id = %model.order_id, payment_id = model.id, "Created payment");
        Ok(model.into())
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
    ) -> PaymentResult<Payment> {
        if !PaymentStatus::Processing.can_transition_to(status) {
            return Err(PaymentError::InvalidTransition {
                order_id: order_id.to_string(),
                from: PaymentStatus::Processing,
                to: status,
            });
        }

        // Single conditional UPDATE so a concurrent writer cannot move the row twice
        let result = entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value(status))
            .filter(entity::Column::OrderId.eq(order_id))
            .filter(entity::Column::Status.eq(PaymentStatus::Processing))
            .exec(&self.db)
            .await?;

        let current = self
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(order_id.to_string()))?;

        if result.rows_affected == 0 {
            return Err(PaymentError::InvalidTransition {
                order_id: order_id.to_string(),
                from: current.status,
                to: status,
            });
        }

        tracing::info!(order_id = %order_id, status = %status, "Updated payment status");
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn model(id: i32, order_id: &str, status: PaymentStatus) -> entity::Model {
        entity::Model {
            id,
            order_id: order_id.to_string(),
            amount: 100,
            status,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_order_id_maps_model() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model(7, "ORD-1", PaymentStatus::Processing)]])
            .into_connection();
        let repo = PgPaymentRepository::new(db);

        let payment = repo.find_by_order_id("ORD-1").await.unwrap().unwrap();
        assert_eq!(payment.id, 7);
        assert_eq!(payment.status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn test_find_by_order_id_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<entity::Model>::new()])
            .into_connection();
        let repo = PgPaymentRepository::new(db);

        assert!(repo.find_by_order_id("ORD-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_success() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![model(1, "ORD-1", PaymentStatus::Success)]])
            .into_connection();
        let repo = PgPaymentRepository::new(db);

        let payment = repo
            .update_status("ORD-1", PaymentStatus::Success)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn test_update_status_rejects_settled_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![model(1, "ORD-1", PaymentStatus::Success)]])
            .into_connection();
        let repo = PgPaymentRepository::new(db);

        let err = repo
            .update_status("ORD-1", PaymentStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidTransition {
                from: PaymentStatus::Success,
                to: PaymentStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_status_missing_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([Vec::<entity::Model>::new()])
            .into_connection();
        let repo = PgPaymentRepository::new(db);

        let err = repo
            .update_status("ORD-404", PaymentStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(id) if id == "ORD-404"));
    }

    #[tokio::test]
    async fn test_update_status_to_processing_is_rejected_without_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = PgPaymentRepository::new(db);

        let err = repo
            .update_status("ORD-1", PaymentStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransition { .. }));
    }
}
