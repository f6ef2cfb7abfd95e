use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod to_point;
mod parser;
mod util;

/// Derives `ToPoint` for a struct with named fields.
///
/// Struct attribute `#[influxdb(measurement = "name")]` overrides the measurement,
/// which otherwise is the snake cased struct name. Field attributes: `tag`, `time`,
/// `rename = "name"` and `ignore`. A field named `time` is the timestamp unless
/// another field is marked with `#[influxdb(time)]`; it must be a `chrono::DateTime`.
#[proc_macro_derive(ToPoint, attributes(influxdb))]
pub fn derive_to_point(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    to_point::derive_to_point_impl(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
