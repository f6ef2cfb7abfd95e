pub use influxdb_writer_core::{
    BatchKey, Client, ClientBuilder, DefaultTags, Encode, FieldValue, HttpTransport, Point,
    PointBuilder, ResolvedTags, TagResolver, TimestampPrecision, ToPoint, WriteApi, WriteError,
    WriteEvent, WriteEventListener, WriteOptions, WriteTransport, encode, env_resolver,
    is_retryable,
};

#[cfg(feature = "derive")]
pub use influxdb_writer_macro::ToPoint;
