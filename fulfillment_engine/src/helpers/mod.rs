mod attributes;
mod durations;
mod order_no;
mod weighted;

pub use attributes::{attributes_hash, normalize_attributes};
pub use durations::{parse_duration, DurationParseError};
pub use order_no::{batch_number, new_order_no, new_serial};
pub use weighted::{weighted_pick, Weighted};
