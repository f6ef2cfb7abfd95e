mod field_value;
mod point;
mod line_protocol;
mod default_tags;
mod util;
mod error;
mod options;
mod batch_writer;
mod retry;
mod events;
mod transport;
mod write_api;
mod client;
mod client_builder;

pub use crate::point::{Point, PointBuilder, ToPoint};
pub use crate::field_value::{FieldValue, Encode};
pub use crate::line_protocol::encode;
pub use crate::default_tags::{DefaultTags, ResolvedTags, TagResolver, env_resolver};
pub use crate::error::WriteError;
pub use crate::options::{TimestampPrecision, WriteOptions};
pub use crate::batch_writer::BatchKey;
pub use crate::retry::is_retryable;
pub use crate::events::{WriteEvent, WriteEventListener};
pub use crate::transport::{HttpTransport, WriteTransport};
pub use crate::write_api::WriteApi;
pub use crate::client::Client;
pub use crate::client_builder::ClientBuilder;
