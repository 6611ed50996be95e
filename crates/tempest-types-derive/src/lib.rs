//! `#[derive(Serializable)]` expands to a field-by-field
//! `Serializable`/`Deserializable` impl in declaration order — Rust's
//! compile-time field order stands in for the reflection-based member
//! enumeration the source material used (spec.md §9).
//!
//! Fields tagged `#[tempest(skip)]` are excluded from the wire and
//! reconstructed via `Default::default()` on read.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

#[proc_macro_derive(Serializable, attributes(tempest))]
pub fn derive_serializable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).into()
}

fn field_is_skipped(field: &syn::Field) -> bool {
    field.attrs.iter().any(|attr| {
        attr.path().is_ident("tempest")
            && attr
                .parse_nested_meta(|meta| {
                    if meta.path.is_ident("skip") {
                        Ok(())
                    } else {
                        Err(meta.error("unrecognized tempest attribute"))
                    }
                })
                .is_ok()
    })
}

fn expand(input: &DeriveInput) -> TokenStream2 {
    let name = &input.ident;
    let Data::Struct(data) = &input.data else {
        return syn::Error::new_spanned(
            input,
            "#[derive(Serializable)] only supports structs with named fields",
        )
        .to_compile_error();
    };
    let Fields::Named(fields) = &data.fields else {
        return syn::Error::new_spanned(
            input,
            "#[derive(Serializable)] only supports structs with named fields",
        )
        .to_compile_error();
    };

    let mut write_stmts = Vec::new();
    let mut read_field_names = Vec::new();
    let mut read_stmts = Vec::new();

    for field in &fields.named {
        let ident = field.ident.as_ref().expect("named field");
        if field_is_skipped(field) {
            read_field_names.push(quote! { #ident: ::std::default::Default::default() });
            continue;
        }
        write_stmts.push(quote! {
            ::tempest_types::Serializable::write_body(&self.#ident, ctx, writer)?;
        });
        read_stmts.push(quote! {
            let #ident = ::tempest_types::Deserializable::read_body(ctx, reader)?;
        });
        read_field_names.push(quote! { #ident });
    }

    quote! {
        impl ::tempest_types::Serializable for #name {
            fn write_body(
                &self,
                ctx: &::tempest_types::SerializeContext,
                writer: &mut ::tempest_wire::FrameWriter,
            ) -> ::tempest_types::SerializeResult<()> {
                #(#write_stmts)*
                Ok(())
            }
        }

        impl ::tempest_types::Deserializable for #name {
            fn read_body(
                ctx: &::tempest_types::SerializeContext,
                reader: &mut ::tempest_wire::FrameReader<'_>,
            ) -> ::tempest_types::SerializeResult<Self> {
                #(#read_stmts)*
                Ok(#name {
                    #(#read_field_names),*
                })
            }
        }
    }
}
