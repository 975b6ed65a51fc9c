pub mod clock;
pub mod codes;
pub mod error;
pub mod response;
pub mod retry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::AppError;
pub use retry::RetryPolicy;
