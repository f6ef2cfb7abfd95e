use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Error};

use crate::parser::{FieldType, parse_struct};

pub fn derive_to_point_impl(input: DeriveInput) -> Result<TokenStream, Error> {
    let struct_info = parse_struct(&input)?;
    let measurement = &struct_info.measurement;
    let struct_name = struct_info.struct_name;
    let (impl_generics, ty_generics, where_clause) = struct_info.generics.split_for_impl();

    let mut field_assignments = Vec::new();
    let mut tag_assignments = Vec::new();
    let mut time_assignment = None;

    for info in struct_info.fields {
        if info.ignore {
            continue;
        }

        let field_name = &info.field_name;
        let point_name = info.rename.unwrap_or_else(|| field_name.to_string());

        match info.field_type {
            FieldType::Time => {
                time_assignment = Some(quote! {
                    .timestamp_datetime(&self.#field_name, precision)
                });
            }
            FieldType::Tag => {
                tag_assignments.push(quote! {
                    .tag(#point_name, &::std::string::ToString::to_string(&self.#field_name))
                });
            }
            FieldType::Field => {
                field_assignments.push(quote! {
                    .field(#point_name, self.#field_name)
                });
            }
        }
    }

    if field_assignments.is_empty() {
        return Err(Error::new(
            struct_name.span(),
            "ToPoint requires at least one field that is not a tag, the time or ignored"
        ));
    }

    let expanded = quote! {
        impl #impl_generics ::influxdb_writer::ToPoint for #struct_name #ty_generics #where_clause {
            fn to_point(
                self,
                precision: ::influxdb_writer::TimestampPrecision,
            ) -> ::std::result::Result<::influxdb_writer::Point, ::influxdb_writer::WriteError> {
                let _ = precision;
                ::influxdb_writer::PointBuilder::measurement(#measurement)
                    #time_assignment
                    #(#tag_assignments)*
                    #(#field_assignments)*
                    .build()
            }
        }
    };

    Ok(expanded)
}
