mod fulfillment_world;
mod steps;

pub use fulfillment_world::FulfillmentWorld;
