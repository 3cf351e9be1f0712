use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

/// Generates a new order number of the form `yyyymmddHHMMSS` followed by six random digits.
pub fn new_order_no(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}{suffix:06}", now.format("%Y%m%d%H%M%S"))
}

/// Generates an anti-counterfeit serial number.
pub fn new_serial() -> String {
    let code: String = rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect();
    format!("SN{}", code.to_uppercase())
}

/// The batch identifier for a bulk import of virtual stock.
pub fn batch_number(now: DateTime<Utc>) -> String {
    format!("BATCH-{}", now.format("%Y%m%d%H%M%S"))
}
