//! Request, response, and wire-boundary types for stock updates.
//!
//! The HTTP transport itself lives outside this crate; these types pin
//! down the shapes it exchanges. Wire DTOs keep the original field names
//! (`idx`, `purchaseQuantity`), domain types use crate naming.

use serde::{Deserialize, Serialize};

/// One line of an inbound update. `quantity` is always a decrement amount;
/// a negative value restocks. The non-zero constraint is enforced by the
/// external request validation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub item_id: u64,
    pub quantity: i64,
}

/// A nonempty ordered sequence of order lines. The same item id may repeat;
/// repeated lines accumulate against the same quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub orders: Vec<OrderLine>,
}

/// Resulting quantity for one order line, in the original line order.
/// Duplicate item ids resolve to the same final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockUpdate {
    pub item_id: u64,
    pub quantity: i64,
}

/// Wire shape of one inbound order line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StockOrderDto {
    pub idx: u64,
    pub purchase_quantity: i64,
}

/// Wire shape of the PATCH body: `{ "orders": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateStockDto {
    pub orders: Vec<StockOrderDto>,
}

/// Wire shape of one success-response entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockResDto {
    pub idx: u64,
    pub quantity: i64,
}

impl From<UpdateStockDto> for UpdateRequest {
    fn from(dto: UpdateStockDto) -> Self {
        Self {
            orders: dto
                .orders
                .into_iter()
                .map(|order| OrderLine {
                    item_id: order.idx,
                    quantity: order.purchase_quantity,
                })
                .collect(),
        }
    }
}

impl From<StockUpdate> for StockResDto {
    fn from(update: StockUpdate) -> Self {
        Self {
            idx: update.item_id,
            quantity: update.quantity,
        }
    }
}
