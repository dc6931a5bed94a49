pub mod billing_events;
pub mod payment_gateway;
