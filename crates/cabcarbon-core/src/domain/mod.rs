mod fleet;
mod period;
mod trip;

pub use fleet::Fleet;
pub use period::{Period, MAX_YEAR, MIN_YEAR};
pub use trip::{format_timestamp, parse_timestamp, TripRecord};
