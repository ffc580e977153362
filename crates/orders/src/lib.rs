//! `crawlnet-orders`: order history domain.
//!
//! Order summaries, per-order details and the derivation of a product item
//! list from purchased lines.

pub mod details;
pub mod order;

pub use details::{MISSING, OrderDetails, OrderInfo, OrderLine, items_from_order_details};
pub use order::{Order, OrderStats, order_id_from_view_link};
