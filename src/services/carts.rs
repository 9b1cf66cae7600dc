use crate::{
    db::DbPool,
    entities::{cart, cart_item, Cart, CartItem, CartItemModel, CartModel, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service.
///
/// Each user has one live cart, created lazily on first access and kept
/// (empty) after checkout completes. Cart totals are always computed from
/// live product prices; prices are only locked in when a cart becomes an
/// order.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches the user's cart, creating it on first access.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<CartModel, ServiceError> {
        if let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            return Ok(cart);
        }

        let cart_id = Uuid::new_v4();
        let cart = cart::ActiveModel {
            id: Set(cart_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let cart = cart.insert(&*self.db).await?;

        self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;
        info!(%cart_id, %user_id, "Created cart");
        Ok(cart)
    }

    /// Adds a product to the user's cart, or bumps the quantity of the
    /// existing line. Stock is checked softly here (validation only);
    /// nothing is reserved until checkout.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartItemModel, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be greater than zero".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(user_id).await?;
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        let requested = existing.as_ref().map_or(0, |item| item.quantity) + input.quantity;
        if product.stock_quantity < requested {
            return Err(ServiceError::InsufficientStock(format!(
                "{} (available: {})",
                product.name, product.stock_quantity
            )));
        }

        let item = if let Some(item) = existing {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(requested);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                quantity: Set(input.quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(cart_id = %cart.id, product_id = %input.product_id, quantity = item.quantity, "Added item to cart");
        Ok(item)
    }

    /// Sets the quantity of a cart line. Zero or negative removes the
    /// line entirely.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Option<CartItemModel>, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart.id {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }

        if quantity <= 0 {
            item.delete(&txn).await?;
            txn.commit().await?;
            return Ok(None);
        }

        let product = Product::find_by_id(item.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;
        if product.stock_quantity < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "{} (available: {})",
                product.name, product.stock_quantity
            )));
        }

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        let item = item.update(&txn).await?;
        txn.commit().await?;

        Ok(Some(item))
    }

    /// Removes a single line from the user's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        self.update_item_quantity(user_id, item_id, 0).await?;
        Ok(())
    }

    /// Retrieves the user's cart with item and product rows.
    pub async fn cart_with_items(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let items = lines
            .into_iter()
            .map(|(item, product)| {
                let product = product.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "cart item {} references missing product",
                        item.id
                    ))
                })?;
                Ok(CartLine { item, product })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(CartWithItems { cart, items })
    }

    /// Live cart total from current product prices.
    pub async fn cart_total(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        let cart = self.cart_with_items(user_id).await?;
        Ok(cart.total_amount())
    }

    /// Empties the user's cart. The cart row itself is kept.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;
        let txn = self.db.begin().await?;
        self.clear_cart_on(&txn, cart.id).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Empties a cart by user id on an existing connection. Used by the
    /// payment-success paths, which clear the originating cart inside
    /// their own transaction. Missing cart is a no-op.
    pub async fn clear_for_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?;
        if let Some(cart) = cart {
            self.clear_cart_on(conn, cart.id).await?;
        }
        Ok(())
    }

    async fn clear_cart_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        info!(%cart_id, "Cleared cart");
        Ok(())
    }
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A cart line joined with its product
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub item: CartItemModel,
    pub product: ProductModel,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.item.quantity)
    }
}

/// Cart with items
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<CartLine>,
}

impl CartWithItems {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_amount(&self) -> Decimal {
        self.items.iter().map(CartLine::line_total).sum()
    }

    pub fn total_items(&self) -> i32 {
        self.items.iter().map(|line| line.item.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, quantity: i32) -> CartLine {
        CartLine {
            item: CartItemModel {
                id: Uuid::new_v4(),
                cart_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                quantity,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            product: ProductModel {
                id: Uuid::new_v4(),
                name: "Widget".to_string(),
                sku: None,
                description: None,
                price,
                stock_quantity: 100,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    #[test]
    fn totals_sum_live_prices() {
        let cart = CartWithItems {
            cart: CartModel {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            items: vec![line(dec!(10.00), 2), line(dec!(5.50), 3)],
        };

        assert_eq!(cart.total_amount(), dec!(36.50));
        assert_eq!(cart.total_items(), 5);
        assert!(!cart.is_empty());
    }

    #[test]
    fn line_total_multiplies_quantity() {
        assert_eq!(line(dec!(19.99), 3).line_total(), dec!(59.97));
    }
}
