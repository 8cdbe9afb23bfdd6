use utoipa::{OpenApi, openapi::OpenApi as OpenApiSpec};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        address::{AddressInput, AddressValidation},
        slots::SlotList,
        orders::{
            CreateOrderRequest, CreateOrderResponse, OrderDetail, OrderLineRequest, OrderList,
            UpdateOrderStatusRequest,
        },
    },
    error::ErrorData,
    models::{
        Address, AustralianState, DeliveryMethod, DeliverySlot, Order, OrderItem, OrderStatus,
        SlotWindow, StatusHistoryEntry,
    },
    response::{ApiResponse, Meta},
    routes::{address, admin, health, orders, params, slots},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        slots::get_slots,
        address::validate_address,
        orders::create_order,
        orders::get_order,
        admin::list_orders,
        admin::update_order_status
    ),
    components(
        schemas(
            Address,
            AustralianState,
            DeliveryMethod,
            DeliverySlot,
            Order,
            OrderItem,
            OrderStatus,
            SlotWindow,
            StatusHistoryEntry,
            AddressInput,
            AddressValidation,
            CreateOrderRequest,
            CreateOrderResponse,
            OrderLineRequest,
            OrderDetail,
            OrderList,
            UpdateOrderStatusRequest,
            SlotList,
            ErrorData,
            params::Pagination,
            params::SortOrder,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<CreateOrderResponse>,
            ApiResponse<AddressValidation>,
            ApiResponse<SlotList>,
            ApiResponse<ErrorData>
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Slots", description = "Delivery window availability"),
        (name = "Address", description = "Delivery address validation"),
        (name = "Orders", description = "Order placement and lookup"),
        (name = "Admin", description = "Back office order management"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
