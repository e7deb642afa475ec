use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

use syn::spanned::Spanned as _;
use syn::{
    Attribute, Data, DeriveInput, Error, Fields, FnArg, GenericArgument, ImplItem, ImplItemFn,
    ItemImpl, LitStr, PathArguments, ReturnType, Type,
};

const WIRING_ATTR: &str = "wiring";
const CONSTRUCTOR_ATTR: &str = "constructor";
const FACTORY_ATTR: &str = "factory";
const METHOD_ATTR: &str = "method";

/// Derive macro for the `Instantiable` trait.
///
/// The generated constructor takes one argument per field, in declaration
/// order. Generated accessors name the type by its `crate::` path; an
/// explicit `#[wiring(rust_path = "...")]` replaces that path.
#[proc_macro_derive(Instantiable, attributes(wiring))]
pub fn derive_instantiable(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    handle_derive_instantiable(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Attribute macro for impl blocks exposing a constructor, factories and
/// methods to the container.
///
/// Functions marked `#[constructor]` or `#[factory]` must not take `self`;
/// functions marked `#[method]` must take `&mut self` or `&self`.
#[proc_macro_attribute]
pub fn instantiable(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut rust_path = None;
    let parser = syn::meta::parser(|meta| parse_rust_path(meta, &mut rust_path));
    syn::parse_macro_input!(attr with parser);
    if let Ok(item_impl) = syn::parse::<ItemImpl>(item) {
        return handle_instantiable_impl(item_impl, rust_path)
            .unwrap_or_else(Error::into_compile_error)
            .into();
    }
    TokenStream::from(
        Error::new(
            proc_macro2::Span::call_site(),
            "#[instantiable] can only be applied to impl blocks",
        )
        .to_compile_error(),
    )
}

fn parse_rust_path(
    meta: syn::meta::ParseNestedMeta<'_>,
    rust_path: &mut Option<LitStr>,
) -> syn::Result<()> {
    if meta.path.is_ident("rust_path") {
        *rust_path = Some(meta.value()?.parse()?);
        Ok(())
    } else {
        Err(meta.error("unsupported instantiable property"))
    }
}

fn extract_rust_path(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut rust_path = None;
    for attr in attrs {
        if attr.path().is_ident(WIRING_ATTR) {
            attr.parse_nested_meta(|meta| parse_rust_path(meta, &mut rust_path))?;
        }
    }
    Ok(rust_path)
}

/// Records the expanding crate so generated accessors can spell its paths
/// with `crate::`, then applies an explicit path if one was given.
fn rust_path_stmt(rust_path: Option<LitStr>) -> TokenStream2 {
    let local_crate = quote! { ty.local_crate(::core::env!("CARGO_CRATE_NAME")); };
    match rust_path {
        Some(path) => quote! { #local_crate ty.rust_path(#path); },
        None => local_crate,
    }
}

fn handle_derive_instantiable(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Generic types are not supported",
        ));
    }
    let fields = match &input.data {
        Data::Struct(s) => &s.fields,
        _ => return Err(Error::new(name.span(), "Only structs are supported")),
    };
    let rust_path = rust_path_stmt(extract_rust_path(&input.attrs)?);
    let count = fields.len();
    let body = match fields {
        Fields::Named(fields) => {
            let inits = fields.named.iter().map(|field| {
                let ident = &field.ident;
                let ty = &field.ty;
                quote! { #ident: args.next::<#ty>()? }
            });
            quote! { Self { #(#inits,)* } }
        }
        Fields::Unnamed(fields) => {
            let inits = fields.unnamed.iter().map(|field| {
                let ty = &field.ty;
                quote! { args.next::<#ty>()? }
            });
            quote! { Self(#(#inits,)*) }
        }
        Fields::Unit => quote! { Self },
    };

    Ok(quote! {
        impl ::wiring::Instantiable for #name {
            fn describe(ty: &mut ::wiring::TypeBuilder<Self>) {
                #rust_path
                ty.constructor(
                    |args: &mut ::wiring::Args| -> ::std::result::Result<Self, ::wiring::CallError> {
                        args.expect(#count)?;
                        Ok(#body)
                    },
                );
            }
        }
    })
}

enum Role {
    Constructor,
    Factory,
    Method,
}

fn role_of(method: &ImplItemFn) -> syn::Result<Option<Role>> {
    let mut role = None;
    for attr in &method.attrs {
        let next = if attr.path().is_ident(CONSTRUCTOR_ATTR) {
            Role::Constructor
        } else if attr.path().is_ident(FACTORY_ATTR) {
            Role::Factory
        } else if attr.path().is_ident(METHOD_ATTR) {
            Role::Method
        } else {
            continue;
        };
        if role.is_some() {
            return Err(Error::new(attr.span(), "Only one role per function allowed"));
        }
        role = Some(next);
    }
    Ok(role)
}

fn is_role_attr(attr: &Attribute) -> bool {
    [CONSTRUCTOR_ATTR, FACTORY_ATTR, METHOD_ATTR]
        .iter()
        .any(|name| attr.path().is_ident(name))
}

/// Binds every typed parameter to the next argument.
fn bind_arguments(method: &ImplItemFn) -> syn::Result<(Vec<TokenStream2>, Vec<TokenStream2>)> {
    let mut lets = Vec::new();
    let mut names = Vec::new();
    for fn_arg in &method.sig.inputs {
        let FnArg::Typed(pat_type) = fn_arg else {
            continue;
        };
        let ty = &pat_type.ty;
        if let Type::Reference(_) = ty.as_ref() {
            return Err(Error::new(
                ty.span(),
                "Arguments must be owned values, use Arc<T> for services",
            ));
        }
        let name = format_ident!("arg{}", names.len());
        lets.push(quote! { let #name = args.next::<#ty>()?; });
        names.push(quote! { #name });
    }
    Ok((lets, names))
}

fn receiver_of(method: &ImplItemFn) -> Option<&syn::Receiver> {
    match method.sig.inputs.first() {
        Some(FnArg::Receiver(receiver)) => Some(receiver),
        _ => None,
    }
}

fn handle_instantiable_impl(
    input: ItemImpl,
    rust_path: Option<LitStr>,
) -> syn::Result<TokenStream2> {
    if input.trait_.is_some() {
        return Err(Error::new(input.span(), "Trait impls are not supported"));
    }
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Generic impls are not supported",
        ));
    }

    let self_ty = &input.self_ty;
    let mut has_constructor = false;
    let mut stmts = Vec::new();

    for item in &input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let Some(role) = role_of(method)? else {
            continue;
        };
        let method_name = &method.sig.ident;
        let name = method_name.to_string();
        if method.sig.asyncness.is_some() {
            return Err(Error::new(method.sig.span(), "Async functions are not supported"));
        }
        let (lets, arg_names) = bind_arguments(method)?;
        let count = arg_names.len();
        let output = match &method.sig.output {
            ReturnType::Default => None,
            ReturnType::Type(_, ty) => Some(ty.as_ref()),
        };

        match role {
            Role::Constructor | Role::Factory => {
                if let Some(receiver) = receiver_of(method) {
                    return Err(Error::new(
                        receiver.span(),
                        "Constructor and factory functions cannot have self parameter",
                    ));
                }
                let Some(output) = output else {
                    return Err(Error::new(
                        method.sig.span(),
                        "Constructor and factory functions must have a return type",
                    ));
                };
                let (value_type, is_result) = extract_value_type(output);
                let call = if is_result {
                    quote! { Self::#method_name(#(#arg_names),*).map_err(::wiring::CallError::failed) }
                } else {
                    quote! { Ok(Self::#method_name(#(#arg_names),*)) }
                };
                let func = quote! {
                    |args: &mut ::wiring::Args| -> ::std::result::Result<#value_type, ::wiring::CallError> {
                        args.expect(#count)?;
                        #(#lets)*
                        #call
                    }
                };
                if let Role::Constructor = role {
                    if has_constructor {
                        return Err(Error::new(
                            method.sig.span(),
                            "Only one constructor function allowed",
                        ));
                    }
                    has_constructor = true;
                    stmts.push(quote! { ty.constructor(#func); });
                } else if is_instance_type(&value_type) {
                    stmts.push(quote! { ty.dynamic_factory(#name, #func); });
                } else {
                    stmts.push(quote! { ty.factory::<#value_type, _>(#name, #func); });
                }
            }
            Role::Method => {
                match receiver_of(method) {
                    Some(receiver) if receiver.reference.is_some() => {}
                    _ => {
                        return Err(Error::new(
                            method.sig.span(),
                            "Methods must take &mut self or &self",
                        ));
                    }
                }
                let is_result = output.is_some_and(|ty| extract_value_type(ty).1);
                let call = if is_result {
                    quote! { this.#method_name(#(#arg_names),*).map_err(::wiring::CallError::failed)?; }
                } else {
                    quote! { let _ = this.#method_name(#(#arg_names),*); }
                };
                stmts.push(quote! {
                    ty.method(
                        #name,
                        |this: &mut Self, args: &mut ::wiring::Args| -> ::std::result::Result<(), ::wiring::CallError> {
                            args.expect(#count)?;
                            #(#lets)*
                            #call
                            Ok(())
                        },
                    );
                });
            }
        }
    }

    let mut cleaned_input = input.clone();
    for item in &mut cleaned_input.items {
        if let ImplItem::Fn(method) = item {
            method.attrs.retain(|attr| !is_role_attr(attr));
        }
    }
    let rust_path = rust_path_stmt(rust_path);

    Ok(quote! {
        #cleaned_input

        impl ::wiring::Instantiable for #self_ty {
            fn describe(ty: &mut ::wiring::TypeBuilder<Self>) {
                #rust_path
                #(#stmts)*
            }
        }
    })
}

fn is_instance_type(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Path(type_path)
            if type_path.path.segments.last().is_some_and(|v| v.ident == "Instance")
    )
}

fn extract_value_type(ty: &Type) -> (Type, bool) {
    // Result<T, E> produces T
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == "Result"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return (inner.clone(), true);
    }
    (ty.clone(), false)
}
