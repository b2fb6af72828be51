pub mod client;
#[allow(clippy::all)]
pub mod proto;
pub mod schema;

pub use client::RelationshipEngineClient;
