use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use fulfillment_engine::traits::{AllocationError, InventoryError, OrderFlowError, PollingError, VerifierError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
    #[error("{0}")]
    Inventory(#[from] InventoryError),
    #[error("{0}")]
    Polling(#[from] PollingError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::OrderFlow(e) => order_flow_status(e),
            Self::Inventory(e) => inventory_status(e),
            Self::Polling(e) => match e {
                PollingError::OrderFlow(e) => order_flow_status(e),
                PollingError::Verifier(e) => verifier_status(e),
                PollingError::DatabaseError(_) | PollingError::CorruptTask(..) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn order_flow_status(e: &OrderFlowError) -> StatusCode {
    use OrderFlowError::*;
    match e {
        DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ValidationError(_) => StatusCode::BAD_REQUEST,
        OrderIdNotFound(_) | OrderNotFound(_) => StatusCode::NOT_FOUND,
        CatalogItemNotFound(_) | PromoCodeNotFound(_) | PaymentMethodNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CatalogItemInactive(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Allocation(e) => allocation_status(e),
        Inventory(e) => inventory_status(e),
        PromoCodeExhausted(_) => StatusCode::CONFLICT,
        OrderModificationNoOp => StatusCode::OK,
        OrderModificationForbidden { .. } | NothingToDeliver(_) | CannotDelete(_) => StatusCode::CONFLICT,
        RefundDeclined(_) => StatusCode::BAD_GATEWAY,
        Verifier(e) => verifier_status(e),
    }
}

fn inventory_status(e: &InventoryError) -> StatusCode {
    use InventoryError::*;
    match e {
        DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CatalogItemNotFound(_) | PoolNotFound(_) | VirtualPoolNotFound(_) | BindingNotFound(_) => {
            StatusCode::NOT_FOUND
        },
        ReservationNotFound(_) => StatusCode::NOT_FOUND,
        DuplicateBinding | PoolNotDeletable(_) | VirtualItemNotAvailable(_) => StatusCode::CONFLICT,
        StockCheck(_) | InsufficientVirtualStock { .. } => StatusCode::CONFLICT,
        Allocation(e) => allocation_status(e),
        InvalidImport(_) | InvalidQuantity(_) => StatusCode::BAD_REQUEST,
    }
}

fn allocation_status(e: &AllocationError) -> StatusCode {
    match e {
        AllocationError::MissingAttribute(_) => StatusCode::BAD_REQUEST,
        AllocationError::NoMatchingConfiguration => StatusCode::UNPROCESSABLE_ENTITY,
        AllocationError::Unavailable | AllocationError::InsufficientStockForAllocation(_) => StatusCode::CONFLICT,
    }
}

fn verifier_status(e: &VerifierError) -> StatusCode {
    match e {
        VerifierError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        VerifierError::Transport(_) | VerifierError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        VerifierError::NotConfigured(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

#[cfg(test)]
mod test {
    use fulfillment_engine::db_types::{OrderNo, OrderStatusType, StockCheckError};

    use super::*;

    #[test]
    fn engine_errors_map_to_status_codes() {
        let not_found = ServerError::from(OrderFlowError::OrderNotFound(OrderNo::from("X".to_string())));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        let forbidden = ServerError::from(OrderFlowError::OrderModificationForbidden {
            from: OrderStatusType::Shipped,
            to: OrderStatusType::Cancelled,
        });
        assert_eq!(forbidden.status_code(), StatusCode::CONFLICT);
        let missing = ServerError::from(OrderFlowError::from(AllocationError::MissingAttribute("size".into())));
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
        let sold_out = ServerError::from(InventoryError::StockCheck(StockCheckError::Insufficient {
            pool_id: 1,
            requested: 2,
            available: 1,
        }));
        assert_eq!(sold_out.status_code(), StatusCode::CONFLICT);
        let timeout = ServerError::from(PollingError::Verifier(VerifierError::Timeout));
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
