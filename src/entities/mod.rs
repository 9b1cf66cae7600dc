/// Domain entities for the lifecycle core
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod refund;
pub mod webhook_event;

// Re-export entities
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentStatus};
pub use product::{Entity as Product, Model as ProductModel};
pub use refund::{Entity as Refund, Model as RefundModel, RefundStatus};
pub use webhook_event::{Entity as ProcessedWebhookEvent, Model as ProcessedWebhookEventModel};
