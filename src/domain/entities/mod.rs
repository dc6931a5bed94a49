pub mod customer;
pub mod gateway_event;
pub mod invoice;
pub mod payment_method;
pub mod plan;
pub mod subscription;
pub mod usage_record;
