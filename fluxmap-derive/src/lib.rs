//! `#[derive(Measurement)]` for fluxmap.
//!
//! The derive only reads the markers and emits a `Measurement` impl. It does
//! not validate the shape (duplicate names, several timestamps, members with
//! more than one marker); the runtime resolver does that, so derived and
//! hand-written impls are held to the same rules.
//!
//! Accepted attributes:
//!
//! ```text
//! #[influx(measurement = "name")]           on the struct
//! #[influx(tag)] / #[influx(tag = "name")]  on a member
//! #[influx(field)] / #[influx(field = "name")]
//! #[influx(timestamp)] / #[influx(timestamp, precision = "ms")]
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input};

/// Derives `fluxmap::Measurement` from `#[influx(...)]` markers.
#[proc_macro_derive(Measurement, attributes(influx))]
pub fn derive_measurement(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Clone, Copy)]
enum MarkerKind {
    Tag,
    Field,
    Timestamp,
}

struct Member {
    ident: Ident,
    ty: Type,
    rename: Option<LitStr>,
    markers: Vec<MarkerKind>,
    precision: Option<TokenStream2>,
}

impl Member {
    fn is_timestamp(&self) -> bool {
        self.markers
            .iter()
            .any(|m| matches!(m, MarkerKind::Timestamp))
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "Measurement can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            data.fields.span(),
            "Measurement requires a struct with named members",
        ));
    };

    let measurement = struct_measurement(input)?
        .unwrap_or_else(|| LitStr::new(&name.to_string(), name.span()));

    let mut members = Vec::new();
    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        if let Some(member) = parse_member(ident, &field.ty, &field.attrs)? {
            members.push(member);
        }
    }

    let specs = members.iter().map(member_spec);

    let value_arms = members.iter().enumerate().filter(|(_, m)| !m.is_timestamp()).map(|(i, m)| {
        let ident = &m.ident;
        quote! { #i => ::fluxmap::MemberValue::to_field_value(&self.#ident), }
    });

    let set_arms = members.iter().enumerate().filter(|(_, m)| !m.is_timestamp()).map(|(i, m)| {
        let ident = &m.ident;
        quote! {
            #i => {
                self.#ident = ::fluxmap::MemberValue::from_field_value(value)?;
                ::core::result::Result::Ok(())
            }
        }
    });

    let timestamp_methods = members.iter().find(|m| m.is_timestamp()).map(|m| {
        let ident = &m.ident;
        quote! {
            fn timestamp(&self) -> ::core::option::Option<::fluxmap::chrono::DateTime<::fluxmap::chrono::Utc>> {
                ::fluxmap::TimestampValue::to_timestamp(&self.#ident)
            }

            fn set_timestamp(&mut self, timestamp: ::fluxmap::chrono::DateTime<::fluxmap::chrono::Utc>) {
                self.#ident = ::fluxmap::TimestampValue::from_timestamp(timestamp);
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::fluxmap::Measurement for #name #ty_generics #where_clause {
            fn shape() -> ::fluxmap::Shape {
                ::fluxmap::Shape {
                    type_name: ::core::any::type_name::<Self>(),
                    measurement: #measurement,
                    members: ::std::vec![#(#specs),*],
                }
            }

            fn member_value(&self, index: usize) -> ::core::option::Option<::fluxmap::FieldValue> {
                match index {
                    #(#value_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn set_member_value(
                &mut self,
                index: usize,
                value: ::fluxmap::FieldValue,
            ) -> ::core::result::Result<(), ::fluxmap::error::CoercionError> {
                match index {
                    #(#set_arms)*
                    _ => ::core::result::Result::Ok(()),
                }
            }

            #timestamp_methods
        }
    })
}

fn struct_measurement(input: &DeriveInput) -> syn::Result<Option<LitStr>> {
    let mut measurement = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("influx")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("measurement") {
                measurement = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("unknown struct attribute, expected `measurement`"))
            }
        })?;
    }
    Ok(measurement)
}

fn parse_member(ident: &Ident, ty: &Type, attrs: &[syn::Attribute]) -> syn::Result<Option<Member>> {
    let mut member = Member {
        ident: ident.clone(),
        ty: ty.clone(),
        rename: None,
        markers: Vec::new(),
        precision: None,
    };

    for attr in attrs.iter().filter(|a| a.path().is_ident("influx")) {
        attr.parse_nested_meta(|meta| {
            let marker = if meta.path.is_ident("tag") {
                MarkerKind::Tag
            } else if meta.path.is_ident("field") {
                MarkerKind::Field
            } else if meta.path.is_ident("timestamp") {
                MarkerKind::Timestamp
            } else if meta.path.is_ident("precision") {
                let lit = meta.value()?.parse::<LitStr>()?;
                member.precision = Some(precision_tokens(&lit)?);
                return Ok(());
            } else {
                return Err(meta.error(
                    "unknown member attribute, expected `tag`, `field`, `timestamp` or `precision`",
                ));
            };

            if meta.input.peek(syn::Token![=]) {
                let lit = meta.value()?.parse::<LitStr>()?;
                if matches!(marker, MarkerKind::Timestamp) {
                    return Err(syn::Error::new(lit.span(), "the timestamp marker takes no name"));
                }
                member.rename = Some(lit);
            }
            member.markers.push(marker);
            Ok(())
        })?;
    }

    if member.precision.is_some() && !member.is_timestamp() {
        return Err(syn::Error::new(
            ident.span(),
            "`precision` is only allowed together with `timestamp`",
        ));
    }

    Ok((!member.markers.is_empty()).then_some(member))
}

fn precision_tokens(lit: &LitStr) -> syn::Result<TokenStream2> {
    let variant = match lit.value().as_str() {
        "ns" => quote!(Nanoseconds),
        "u" | "us" => quote!(Microseconds),
        "ms" => quote!(Milliseconds),
        "s" => quote!(Seconds),
        "m" => quote!(Minutes),
        "h" => quote!(Hours),
        _ => {
            return Err(syn::Error::new(
                lit.span(),
                "unknown precision, expected one of ns, u, ms, s, m, h",
            ));
        }
    };
    Ok(quote!(::fluxmap::Precision::#variant))
}

fn member_spec(member: &Member) -> TokenStream2 {
    let ident = member.ident.to_string();
    let rename = match &member.rename {
        Some(lit) => quote!(::core::option::Option::Some(#lit)),
        None => quote!(::core::option::Option::None),
    };

    let precision = member
        .precision
        .clone()
        .unwrap_or_else(|| quote!(::fluxmap::Precision::Nanoseconds));
    let markers = member.markers.iter().map(|m| match m {
        MarkerKind::Tag => quote!(::fluxmap::Marker::Tag),
        MarkerKind::Field => quote!(::fluxmap::Marker::Field),
        MarkerKind::Timestamp => quote!(::fluxmap::Marker::Timestamp(#precision)),
    });

    let ty = &member.ty;
    let (kind, required) = if member.is_timestamp() {
        (quote!(::fluxmap::ValueKind::Timestamp), quote!(false))
    } else {
        (
            quote!(<#ty as ::fluxmap::MemberValue>::KIND),
            quote!(<#ty as ::fluxmap::MemberValue>::REQUIRED),
        )
    };

    quote! {
        ::fluxmap::MemberSpec {
            ident: #ident,
            rename: #rename,
            markers: ::std::vec![#(#markers),*],
            kind: #kind,
            required: #required,
        }
    }
}
