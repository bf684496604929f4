//! `#[derive(Entity)]` and `#[derive(IndexOf)]`: the compile-time stand-in
//! for the reflected schema discovery the source CLR implementation
//! performs at runtime (see `dynamorm::entity`).
//!
//! `#[derive(Entity)]` reads `#[dynamorm(...)]` attributes off the struct
//! and its fields and emits an `impl Entity` whose `fields()` returns a
//! static slice of [`dynamorm::entity::FieldAccessor`]s — one
//! non-capturing `fn` pointer pair per field, built once and reused for
//! every instance, rather than a reflected accessor resolved per call.

use heck::ToUpperCamelCase;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, LitStr, PathArguments, Type};

/// Derives `dynamorm::Entity` for a struct of named fields.
///
/// ```ignore
/// #[derive(Entity, Default)]
/// #[dynamorm(table = "Order")]
/// #[dynamorm(global_index = "ByStatus/Status/CreatedAt")]
/// struct Order {
///     #[dynamorm(hash_key)]
///     customer_id: i64,
///     #[dynamorm(range_key)]
///     order_id: i64,
///     #[dynamorm(rename = "Status")]
///     status: String,
///     created_at: i64,
///     #[dynamorm(db_type = "string_set")]
///     tags: Vec<String>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(dynamorm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_entity(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derives `dynamorm::IndexOf` for a zero-sized marker type naming one
/// secondary index of a base `Entity`.
///
/// ```ignore
/// #[derive(IndexOf)]
/// #[dynamorm(base = "Order", index = "ByStatus", global)]
/// struct ByStatus;
/// ```
#[proc_macro_derive(IndexOf, attributes(dynamorm))]
pub fn derive_index_of(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_index_of(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct ContainerArgs {
    table: Option<String>,
    read_capacity: Option<i64>,
    write_capacity: Option<i64>,
    local_indexes: Vec<String>,
    global_indexes: Vec<String>,
}

fn parse_container_args(input: &DeriveInput) -> syn::Result<ContainerArgs> {
    let mut args = ContainerArgs {
        table: None,
        read_capacity: None,
        write_capacity: None,
        local_indexes: Vec::new(),
        global_indexes: Vec::new(),
    };

    for attr in &input.attrs {
        if !attr.path().is_ident("dynamorm") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                args.table = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("read_capacity") {
                let value: syn::LitInt = meta.value()?.parse()?;
                args.read_capacity = Some(value.base10_parse()?);
                Ok(())
            } else if meta.path.is_ident("write_capacity") {
                let value: syn::LitInt = meta.value()?.parse()?;
                args.write_capacity = Some(value.base10_parse()?);
                Ok(())
            } else if meta.path.is_ident("local_index") {
                let value: LitStr = meta.value()?.parse()?;
                args.local_indexes.push(value.value());
                Ok(())
            } else if meta.path.is_ident("global_index") {
                let value: LitStr = meta.value()?.parse()?;
                args.global_indexes.push(value.value());
                Ok(())
            } else {
                Err(meta.error("unrecognized #[dynamorm(...)] container attribute"))
            }
        })?;
    }

    Ok(args)
}

/// One secondary index, as parsed from a `"Name/HashOrRangeField[/...]"`
/// string. Local indexes encode `"Name/RangeField[/projection]"`; global
/// indexes encode `"Name/HashField[/RangeField][/projection]"`.
struct IndexSpec {
    name: String,
    hash_key: Option<String>,
    range_key: Option<String>,
    projection: ProjectionSpec,
}

enum ProjectionSpec {
    All,
    KeysOnly,
    Include(Vec<String>),
}

fn parse_projection_segment(segment: &str) -> Option<ProjectionSpec> {
    if segment == "all" {
        Some(ProjectionSpec::All)
    } else if segment == "keys_only" {
        Some(ProjectionSpec::KeysOnly)
    } else if let Some(fields) = segment.strip_prefix("include:") {
        Some(ProjectionSpec::Include(
            fields.split(',').map(|s| s.trim().to_string()).collect(),
        ))
    } else {
        None
    }
}

fn parse_local_index(spec: &str) -> syn::Result<IndexSpec> {
    let segments: Vec<&str> = spec.split('/').collect();
    let name = segments
        .first()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| syn::Error::new(proc_macro2::Span::call_site(), "local_index must start with a name"))?
        .to_string();
    let range_key = segments
        .get(1)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            syn::Error::new(
                proc_macro2::Span::call_site(),
                "local_index must name a range key field: \"Name/RangeField\"",
            )
        })?;
    let projection = segments
        .get(2)
        .and_then(|s| parse_projection_segment(s))
        .unwrap_or(ProjectionSpec::All);
    Ok(IndexSpec {
        name,
        hash_key: None,
        range_key: Some(range_key),
        projection,
    })
}

fn parse_global_index(spec: &str) -> syn::Result<IndexSpec> {
    let segments: Vec<&str> = spec.split('/').collect();
    let name = segments
        .first()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| syn::Error::new(proc_macro2::Span::call_site(), "global_index must start with a name"))?
        .to_string();
    let hash_key = segments
        .get(1)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            syn::Error::new(
                proc_macro2::Span::call_site(),
                "global_index must name a hash key field: \"Name/HashField\"",
            )
        })?;

    let mut range_key = None;
    let mut projection = ProjectionSpec::All;
    for segment in segments.iter().skip(2) {
        if let Some(p) = parse_projection_segment(segment) {
            projection = p;
        } else {
            range_key = Some(segment.to_string());
        }
    }

    Ok(IndexSpec {
        name,
        hash_key: Some(hash_key),
        range_key,
        projection,
    })
}

fn projection_tokens(projection: &ProjectionSpec) -> TokenStream2 {
    match projection {
        ProjectionSpec::All => quote! { ::dynamorm::Projection::All },
        ProjectionSpec::KeysOnly => quote! { ::dynamorm::Projection::KeysOnly },
        ProjectionSpec::Include(fields) => {
            quote! { ::dynamorm::Projection::Include(vec![#(#fields),*]) }
        }
    }
}

enum FieldKind {
    Scalar,
    OptionScalar,
    List,
    Map,
    StringSet,
    NumberSet,
    BinarySet,
    ValueSerialized,
}

const SCALAR_IDENTS: &[&str] = &[
    "i8", "i16", "i32", "i64", "isize", "u8", "u16", "u32", "u64", "usize", "f32", "f64", "bool",
    "String",
];

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(p) => p.path.segments.last(),
        _ => None,
    }
}

fn first_generic_arg(segment: &syn::PathSegment) -> Option<&Type> {
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|a| match a {
            GenericArgument::Type(t) => Some(t),
            _ => None,
        }),
        _ => None,
    }
}

fn is_vec_u8(ty: &Type) -> bool {
    match last_segment(ty) {
        Some(segment) if segment.ident == "Vec" => match first_generic_arg(segment) {
            Some(inner) => last_segment(inner).map(|s| s.ident == "u8").unwrap_or(false),
            None => false,
        },
        _ => false,
    }
}

fn classify(ty: &Type, db_type_override: Option<&str>) -> FieldKind {
    if let Some(override_) = db_type_override {
        return match override_ {
            "string_set" => FieldKind::StringSet,
            "number_set" => FieldKind::NumberSet,
            "binary_set" => FieldKind::BinarySet,
            _ => FieldKind::ValueSerialized,
        };
    }

    let Some(segment) = last_segment(ty) else {
        return FieldKind::ValueSerialized;
    };

    let ident = segment.ident.to_string();
    match ident.as_str() {
        "Option" => {
            let inner_is_scalar = first_generic_arg(segment)
                .map(|inner| {
                    is_vec_u8(inner)
                        || last_segment(inner)
                            .map(|s| SCALAR_IDENTS.contains(&s.ident.to_string().as_str()))
                            .unwrap_or(false)
                })
                .unwrap_or(false);
            if inner_is_scalar {
                FieldKind::OptionScalar
            } else {
                FieldKind::ValueSerialized
            }
        }
        "Vec" if is_vec_u8(ty) => FieldKind::Scalar,
        "Vec" => FieldKind::List,
        "HashMap" | "BTreeMap" => FieldKind::Map,
        other if SCALAR_IDENTS.contains(&other) => FieldKind::Scalar,
        _ => FieldKind::ValueSerialized,
    }
}

fn db_type_tokens(kind: &FieldKind, ty: &Type) -> TokenStream2 {
    match kind {
        FieldKind::Scalar if is_vec_u8(ty) => quote! { ::dynamorm::DbType::Binary },
        FieldKind::Scalar => match last_segment(ty).map(|s| s.ident.to_string()).as_deref() {
            Some("bool") => quote! { ::dynamorm::DbType::Bool },
            Some("String") => quote! { ::dynamorm::DbType::String },
            _ => quote! { ::dynamorm::DbType::Number },
        },
        FieldKind::OptionScalar => {
            let inner = last_segment(ty).and_then(first_generic_arg);
            match inner {
                Some(inner) if is_vec_u8(inner) => quote! { ::dynamorm::DbType::Binary },
                Some(inner) => match last_segment(inner).map(|s| s.ident.to_string()).as_deref() {
                    Some("bool") => quote! { ::dynamorm::DbType::Bool },
                    Some("String") => quote! { ::dynamorm::DbType::String },
                    _ => quote! { ::dynamorm::DbType::Number },
                },
                None => quote! { ::dynamorm::DbType::String },
            }
        }
        FieldKind::List => quote! { ::dynamorm::DbType::List },
        FieldKind::Map => quote! { ::dynamorm::DbType::Map },
        FieldKind::StringSet => quote! { ::dynamorm::DbType::StringSet },
        FieldKind::NumberSet => quote! { ::dynamorm::DbType::NumberSet },
        FieldKind::BinarySet => quote! { ::dynamorm::DbType::BinarySet },
        FieldKind::ValueSerialized => quote! { ::dynamorm::DbType::String },
    }
}

fn accessor_tokens(kind: &FieldKind, ident: &syn::Ident) -> (TokenStream2, TokenStream2) {
    match kind {
        FieldKind::Scalar => (
            quote! { ::dynamorm::Encodable::encode(&v.#ident) },
            quote! { v.#ident = ::dynamorm::Encodable::decode(a)?; },
        ),
        FieldKind::OptionScalar => (
            quote! { ::dynamorm::codec::encode_option(&v.#ident) },
            quote! { v.#ident = ::dynamorm::codec::decode_option(a)?; },
        ),
        FieldKind::List => (
            quote! { ::dynamorm::codec::encode_list(&v.#ident) },
            quote! { v.#ident = ::dynamorm::codec::decode_list(a)?; },
        ),
        FieldKind::Map => (
            quote! { ::dynamorm::codec::encode_map(&v.#ident) },
            quote! { v.#ident = ::dynamorm::codec::decode_map(a)?; },
        ),
        FieldKind::StringSet => (
            quote! { Ok(::dynamorm::codec::encode_string_set(v.#ident.clone())) },
            quote! { v.#ident = ::dynamorm::codec::decode_string_set(a)?; },
        ),
        FieldKind::NumberSet => (
            quote! { Ok(::dynamorm::codec::encode_number_set(&v.#ident)) },
            quote! { v.#ident = ::dynamorm::codec::decode_number_set(a)?; },
        ),
        FieldKind::BinarySet => (
            quote! { Ok(::dynamorm::codec::encode_binary_set(v.#ident.clone())) },
            quote! { v.#ident = ::dynamorm::codec::decode_binary_set(a)?; },
        ),
        FieldKind::ValueSerialized => (
            quote! { ::dynamorm::codec::encode_value_serialized(&v.#ident) },
            quote! { v.#ident = ::dynamorm::codec::decode_value_serialized(a)?; },
        ),
    }
}

struct FieldArgs {
    is_hash_key: bool,
    is_range_key: bool,
    rename: Option<String>,
    db_type: Option<String>,
}

fn parse_field_args(attrs: &[syn::Attribute]) -> syn::Result<FieldArgs> {
    let mut args = FieldArgs {
        is_hash_key: false,
        is_range_key: false,
        rename: None,
        db_type: None,
    };
    for attr in attrs {
        if !attr.path().is_ident("dynamorm") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("hash_key") {
                args.is_hash_key = true;
                Ok(())
            } else if meta.path.is_ident("range_key") {
                args.is_range_key = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                args.rename = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("db_type") {
                let value: LitStr = meta.value()?.parse()?;
                args.db_type = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unrecognized #[dynamorm(...)] field attribute"))
            }
        })?;
    }
    Ok(args)
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ty = &input.ident;
    let container = parse_container_args(&input)?;
    let table_name = container
        .table
        .unwrap_or_else(|| ty.to_string().to_upper_camel_case());

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "#[derive(Entity)] requires a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "#[derive(Entity)] can only be applied to a struct",
            ))
        }
    };

    let mut accessors = Vec::new();
    let mut hash_key_wire_name: Option<String> = None;
    for field in fields {
        let ident = field.ident.as_ref().expect("named field");
        let field_args = parse_field_args(&field.attrs)?;
        let wire_name = field_args
            .rename
            .clone()
            .unwrap_or_else(|| ident.to_string().to_upper_camel_case());
        let kind = classify(&field.ty, field_args.db_type.as_deref());
        let db_type = db_type_tokens(&kind, &field.ty);
        let (get_body, set_body) = accessor_tokens(&kind, ident);
        let is_hash_key = field_args.is_hash_key;
        let is_range_key = field_args.is_range_key;
        if is_hash_key {
            hash_key_wire_name = Some(wire_name.clone());
        }

        accessors.push(quote! {
            ::dynamorm::entity::FieldAccessor {
                name: #wire_name,
                db_type: #db_type,
                is_hash_key: #is_hash_key,
                is_range_key: #is_range_key,
                get: |v| #get_body,
                set: |v, a| {
                    #set_body
                    Ok(())
                },
            }
        });
    }

    let local_indexes = container
        .local_indexes
        .iter()
        .map(|s| parse_local_index(s))
        .collect::<syn::Result<Vec<_>>>()?;
    let global_indexes = container
        .global_indexes
        .iter()
        .map(|s| parse_global_index(s))
        .collect::<syn::Result<Vec<_>>>()?;

    if !local_indexes.is_empty() && hash_key_wire_name.is_none() {
        return Err(syn::Error::new_spanned(
            &input,
            "local_index requires a field marked #[dynamorm(hash_key)]",
        ));
    }

    let local_index_fns = local_indexes.iter().map(|idx| {
        let name = &idx.name;
        let hash_key = hash_key_wire_name.as_deref().unwrap_or_default();
        let range_key = match &idx.range_key {
            Some(r) => quote! { Some(#r) },
            None => quote! { None },
        };
        let projection = projection_tokens(&idx.projection);
        quote! {
            || ::dynamorm::IndexSchema {
                name: #name,
                hash_key: #hash_key,
                range_key: #range_key,
                projection: #projection,
                global: false,
                read_capacity: None,
                write_capacity: None,
            }
        }
    });

    let global_index_fns = global_indexes.iter().map(|idx| {
        let name = &idx.name;
        let hash_key = idx.hash_key.as_deref().unwrap_or_default();
        let range_key = match &idx.range_key {
            Some(r) => quote! { Some(#r) },
            None => quote! { None },
        };
        let projection = projection_tokens(&idx.projection);
        quote! {
            || ::dynamorm::IndexSchema {
                name: #name,
                hash_key: #hash_key,
                range_key: #range_key,
                projection: #projection,
                global: true,
                read_capacity: None,
                write_capacity: None,
            }
        }
    });

    let read_capacity = match container.read_capacity {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    };
    let write_capacity = match container.write_capacity {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    };

    let fields_static = format_ident!("__DYNAMORM_{}_FIELDS", ty.to_string().to_uppercase());

    Ok(quote! {
        impl ::dynamorm::Entity for #ty {
            const TABLE_NAME: &'static str = #table_name;

            const LOCAL_INDEXES: &'static [fn() -> ::dynamorm::IndexSchema] = &[
                #(#local_index_fns),*
            ];

            const GLOBAL_INDEXES: &'static [fn() -> ::dynamorm::IndexSchema] = &[
                #(#global_index_fns),*
            ];

            const READ_CAPACITY: Option<i64> = #read_capacity;
            const WRITE_CAPACITY: Option<i64> = #write_capacity;

            fn fields() -> &'static [::dynamorm::entity::FieldAccessor<Self>] {
                static #fields_static: ::dynamorm::__private::Lazy<Vec<::dynamorm::entity::FieldAccessor<#ty>>> =
                    ::dynamorm::__private::Lazy::new(|| vec![#(#accessors),*]);
                &#fields_static
            }
        }
    })
}

fn expand_index_of(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ty = &input.ident;
    let mut base = None;
    let mut index_name = None;
    let mut is_global = false;

    for attr in &input.attrs {
        if !attr.path().is_ident("dynamorm") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("base") {
                let value: LitStr = meta.value()?.parse()?;
                base = Some(value.parse::<Type>()?);
                Ok(())
            } else if meta.path.is_ident("index") {
                let value: LitStr = meta.value()?.parse()?;
                index_name = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("global") {
                is_global = true;
                Ok(())
            } else if meta.path.is_ident("local") {
                is_global = false;
                Ok(())
            } else {
                Err(meta.error("unrecognized #[dynamorm(...)] attribute on IndexOf"))
            }
        })?;
    }

    let base = base.ok_or_else(|| {
        syn::Error::new_spanned(
            &input,
            "#[derive(IndexOf)] requires #[dynamorm(base = \"BaseType\", index = \"IndexName\")]",
        )
    })?;
    let index_name = index_name.ok_or_else(|| {
        syn::Error::new_spanned(
            &input,
            "#[derive(IndexOf)] requires #[dynamorm(base = \"BaseType\", index = \"IndexName\")]",
        )
    })?;

    Ok(quote! {
        impl ::dynamorm::IndexOf for #ty {
            type Base = #base;
            const INDEX_NAME: &'static str = #index_name;
            const IS_GLOBAL: bool = #is_global;
        }
    })
}
