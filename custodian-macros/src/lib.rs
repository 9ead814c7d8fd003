//! Proc macros for custodian tool definitions.
//!
//! `#[derive(Tool)]` turns a struct with named fields into a Claude tool:
//! the struct doc comment becomes the tool description and each field
//! becomes a property of the input schema.
//!
//! # Example
//!
//! ```ignore
//! /// Report the player's stat changes
//! #[derive(Tool)]
//! #[tool(name = "report_stat_changes")]
//! struct ReportStatChanges {
//!     /// New health value
//!     health: Option<i64>,
//!     /// Full replacement inventory
//!     #[tool(rename = "items")]
//!     inventory: Option<Vec<String>>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, DeriveInput, Expr, Field, Lit, LitStr, Meta, Type};

/// Derive macro for generating tool definitions.
///
/// # Attributes
///
/// - `#[tool(name = "...")]` on the struct overrides the tool name (snake_case of the struct otherwise)
/// - `#[tool(optional)]` on a field keeps it out of `required`
/// - `#[tool(rename = "...")]` on a field changes its schema property name
///
/// `Option<T>` fields are never required.
#[proc_macro_derive(Tool, attributes(tool))]
pub fn derive_tool(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    optional: bool,
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let tool_name = struct_tool_name(&input)?;
    let description = doc_text(&input.attrs);

    let syn::Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(&input, "Tool can only be derived for structs"));
    };
    let syn::Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input,
            "Tool can only be derived for structs with named fields",
        ));
    };

    let mut properties = Vec::with_capacity(named.named.len());
    let mut required = Vec::new();

    for field in &named.named {
        let attrs = field_attrs(field)?;
        let name = match attrs.rename {
            Some(rename) => rename,
            None => field_ident(field)?,
        };
        let schema = schema_for(&field.ty);
        let doc = doc_text(&field.attrs);
        let describe = (!doc.is_empty()).then(|| {
            quote! { schema["description"] = serde_json::Value::from(#doc); }
        });

        properties.push(quote! {
            {
                let mut schema = #schema;
                #describe
                properties.insert(#name.to_string(), schema);
            }
        });

        if !attrs.optional && !is_option(&field.ty) {
            required.push(name);
        }
    }

    Ok(quote! {
        impl #ident {
            /// Name the model calls this tool by.
            pub fn tool_name() -> &'static str {
                #tool_name
            }

            /// Description shown to the model.
            pub fn tool_description() -> &'static str {
                #description
            }

            /// JSON schema for the tool input.
            pub fn input_schema() -> serde_json::Value {
                let mut properties = serde_json::Map::new();
                #(#properties)*
                serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": [#(#required),*],
                })
            }

            /// Tool definition for the Claude API.
            pub fn as_tool() -> claude::Tool {
                claude::Tool {
                    name: Self::tool_name().to_string(),
                    description: Self::tool_description().to_string(),
                    input_schema: Self::input_schema(),
                }
            }
        }
    })
}

fn struct_tool_name(input: &DeriveInput) -> syn::Result<String> {
    let mut name = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("tool")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `name = \"...\"`"))
            }
        })?;
    }
    Ok(name.unwrap_or_else(|| snake_case(&input.ident.to_string())))
}

fn field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("tool")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("optional") {
                attrs.optional = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `optional` or `rename = \"...\"`"))
            }
        })?;
    }
    Ok(attrs)
}

fn field_ident(field: &Field) -> syn::Result<String> {
    field
        .ident
        .as_ref()
        .map(|i| i.to_string().trim_start_matches("r#").to_string())
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

fn doc_text(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .filter_map(|a| match &a.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(expr) => match &expr.lit {
                    Lit::Str(s) => Some(s.value().trim().to_string()),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The last path segment and its first generic argument, if any.
fn last_segment(ty: &Type) -> Option<(String, Option<&Type>)> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    let inner = match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            syn::GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    };
    Some((segment.ident.to_string(), inner))
}

fn is_option(ty: &Type) -> bool {
    matches!(last_segment(ty), Some((name, _)) if name == "Option")
}

fn schema_for(ty: &Type) -> TokenStream2 {
    let Some((name, inner)) = last_segment(ty) else {
        return quote! { serde_json::json!({}) };
    };

    match (name.as_str(), inner) {
        ("String" | "str", _) => quote! { serde_json::json!({"type": "string"}) },
        ("i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize", _) => {
            quote! { serde_json::json!({"type": "integer"}) }
        }
        ("f32" | "f64", _) => quote! { serde_json::json!({"type": "number"}) },
        ("bool", _) => quote! { serde_json::json!({"type": "boolean"}) },
        ("Option", Some(inner)) => schema_for(inner),
        ("Vec", Some(inner)) => {
            let items = schema_for(inner);
            quote! { serde_json::json!({"type": "array", "items": #items}) }
        }
        ("Vec", None) => quote! { serde_json::json!({"type": "array"}) },
        ("Value", _) => quote! { serde_json::json!({}) },
        _ => quote! { serde_json::json!({"type": "object"}) },
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.char_indices() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
