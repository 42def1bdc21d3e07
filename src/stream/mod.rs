//! Stream combinators for topic subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
