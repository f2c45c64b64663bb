//! Generic request handling: query building, CRUD templates, response
//! envelopes and error normalization

pub mod error;
pub mod factory;
pub mod payload;
pub mod query;
pub mod response;

pub use error::{normalize_errors, route_not_found, ErrorNormalizer, ErrorReport};
pub use factory::{filter_body, HandlerFactory};
pub use payload::Payload;
pub use query::{compose, ApiFeatures, QuerySpec};
pub use response::{DataEnvelope, ItemResponse, ListResponse, NoContent, SUCCESS};
