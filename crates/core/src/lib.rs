pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod normalize;
pub mod payload;
pub mod ports;
pub mod rate_limit;
pub mod types;
pub mod vapid;
pub mod webpush;

pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::{DispatchError, StoreError, TransportError};
pub use types::{
    DeliveryTag, DispatchRequest, DispatchResult, DispatchScope, PushMessage, SubscriptionDescriptor,
    SubscriptionRecord,
};
