use syn::{Data, DeriveInput, Error, Fields, LitStr, spanned::Spanned as _};

use crate::util::to_snake_case;

#[derive(Debug)]
pub(crate) enum FieldType {
    Time,
    Tag,
    Field,
}

#[derive(Debug)]
pub(crate) struct FieldInfo {
    pub field_name: syn::Ident,
    pub field_type: FieldType,
    pub rename: Option<String>,
    pub ignore: bool,
}

#[derive(Debug)]
pub(crate) struct StructInfo<'a> {
    pub struct_name: &'a syn::Ident,
    pub generics: &'a syn::Generics,
    pub measurement: String,
    pub fields: Vec<FieldInfo>,
}

pub(crate) fn parse_struct(input: &'_ DeriveInput) -> Result<StructInfo<'_>, Error> {
    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => return Err(Error::new(
            input.span(),
            "ToPoint can only be derived for structs"
        )),
    };

    let mut measurement_name = None;

    for attr in &input.attrs {
        if attr.path().is_ident("influxdb") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("measurement") {
                    let name: LitStr = meta.value()?.parse()?;
                    if name.value().trim().is_empty() {
                        return Err(meta.error("Measurement name cannot be empty"));
                    }
                    measurement_name = Some(name.value());
                    Ok(())
                } else {
                    Err(meta.error("Unknown influxdb attribute"))
                }
            })?;
        }
    }

    let fields = parse_fields(&data_struct.fields)?;
    let measurement = measurement_name.unwrap_or_else(|| {
        to_snake_case(&input.ident.to_string())
    });

    Ok(StructInfo {
        struct_name: &input.ident,
        generics: &input.generics,
        measurement,
        fields,
    })
}

struct FieldAttrs {
    field: syn::Field,
    rename: Option<String>,
    time: bool,
    tag: bool,
    ignore: bool,
}

fn parse_field_attrs(field: &syn::Field) -> Result<FieldAttrs, Error> {
    let mut attrs = FieldAttrs {
        field: field.clone(),
        rename: None,
        time: false,
        tag: false,
        ignore: false,
    };

    for attr in &field.attrs {
        if attr.path().is_ident("influxdb") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("time") {
                    attrs.time = true;
                    Ok(())
                } else if meta.path.is_ident("tag") {
                    attrs.tag = true;
                    Ok(())
                } else if meta.path.is_ident("rename") {
                    let name: LitStr = meta.value()?.parse()?;
                    if name.value().trim().is_empty() {
                        return Err(meta.error("Renamed field cannot be empty"));
                    }
                    attrs.rename = Some(name.value());
                    Ok(())
                } else if meta.path.is_ident("ignore") {
                    attrs.ignore = true;
                    Ok(())
                } else {
                    Err(meta.error("Unknown influxdb attribute"))
                }
            })?;
        }
    }

    if attrs.ignore && (attrs.tag || attrs.time) {
        return Err(Error::new(
            field.span(),
            "Ignored fields cannot be marked as tag or time"
        ));
    }

    if attrs.tag && attrs.time {
        return Err(Error::new(
            field.span(),
            "A field cannot be both a tag and the time"
        ));
    }

    Ok(attrs)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldInfo>, Error> {
    let named = match fields {
        Fields::Named(fields) => &fields.named,
        _ => return Err(Error::new(
            fields.span(),
            "ToPoint can only be derived for structs with named fields"
        )),
    };

    let parsed = named.iter().map(parse_field_attrs).collect::<Result<Vec<_>, _>>()?;
    let has_time_attr = parsed.iter().any(|attrs| attrs.time);

    let mut field_infos = Vec::new();
    let mut time_field_count = 0;

    for attrs in parsed {
        let Some(field_name) = attrs.field.ident.clone() else {
            return Err(Error::new(attrs.field.span(), "Expected a named field"));
        };

        // A field called `time` is only the timestamp when no other field claims it.
        let is_time = attrs.time
            || (!has_time_attr && !attrs.ignore && !attrs.tag && field_name == "time");

        let field_type = if is_time {
            time_field_count += 1;
            FieldType::Time
        } else if attrs.tag {
            FieldType::Tag
        } else {
            FieldType::Field
        };

        if time_field_count > 1 {
            return Err(Error::new(
                attrs.field.span(),
                "Only one field can be marked as time"
            ));
        }

        field_infos.push(FieldInfo {
            field_name,
            field_type,
            rename: attrs.rename,
            ignore: attrs.ignore,
        });
    }
    Ok(field_infos)
}
