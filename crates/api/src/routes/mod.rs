pub mod catalog;
pub mod ops;
pub mod orders;

use common::OrderId;

use crate::error::ApiError;

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::bad_request("invalid_order_id", format!("Invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
