use crate::{
    db::DbPool,
    entities::{product, OrderItemModel, Product, ProductModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Inventory ledger: applies stock reservations and restorations
/// atomically relative to order transitions.
///
/// Both operations are single conditional `UPDATE`s checked by
/// rows-affected, so two checkouts racing for the last unit cannot both
/// win regardless of isolation level. Callers run them inside the same
/// transaction as the order mutation they accompany.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Reserves `quantity` units of a product by decrementing its stock.
    ///
    /// The decrement only applies while `stock_quantity >= quantity`;
    /// when the guard fails the product is re-read to report its name and
    /// the quantity actually available.
    #[instrument(skip(self, conn))]
    pub async fn reserve_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "reservation quantity must be positive, got {}",
                quantity
            )));
        }

        let result = Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::StockQuantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let product = Product::find_by_id(product_id)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;
            return Err(ServiceError::InsufficientStock(format!(
                "{} (available: {})",
                product.name, product.stock_quantity
            )));
        }

        info!(%product_id, quantity, "Reserved stock");
        Ok(())
    }

    /// Returns `quantity` units of a product to stock.
    #[instrument(skip(self, conn))]
    pub async fn release_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        info!(%product_id, quantity, "Released stock");
        Ok(())
    }

    /// Restores stock for every line of an order. Callers guard this with
    /// the order-status check so a replayed cancellation event cannot
    /// restore twice.
    pub async fn restore_for_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        items: &[OrderItemModel],
    ) -> Result<(), ServiceError> {
        for item in items {
            self.release_stock(conn, item.product_id, item.quantity)
                .await?;
        }
        Ok(())
    }
}
