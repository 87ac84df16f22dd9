extern crate proc_macro;

use itertools::Itertools;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, ExprPath, Fields, GenericArgument, LitStr,
    PathArguments, Type,
};

/// Options parsed from `#[bson(...)]` annotations
///
/// The same parser serves struct fields, enum containers and enum variants;
/// each caller passes the keys it accepts.
#[derive(Default)]
struct BsonAttributes {
    rename: Option<String>,
    type_selector: Option<ExprPath>,
    repr: Option<LitStr>,
    not_null: bool,
}

/// Extract and merge `#[bson(...)]` attribute values
///
/// # Supported Attributes
///
/// * `#[bson(rename = "name")]` - Key (field) or string value (variant) used on the wire
/// * `#[bson(type_selector = "path")]` - `fn(&Self) -> &'static Type` for an `AnyValue` field
/// * `#[bson(repr = "string")]` - Enum representation: `string`, `i32` or `i64`
/// * `#[bson(not_null)]` - Null enum values are rejected
///
/// Multiple attributes can be combined: `#[bson(repr = "i32", not_null)]`
fn get_bson_attributes(attrs: &[Attribute], allowed: &[&str]) -> syn::Result<BsonAttributes> {
    let mut parsed = BsonAttributes::default();

    for attr in attrs {
        if !attr.path().is_ident("bson") {
            continue;
        }
        attr.parse_args_with(|input: syn::parse::ParseStream| {
            while !input.is_empty() {
                let ident = input.parse::<syn::Ident>()?;
                let key = ident.to_string();
                if !allowed.contains(&key.as_str()) {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("Unknown or misplaced attribute: {}", ident),
                    ));
                }

                match key.as_str() {
                    "rename" => {
                        input.parse::<syn::Token![=]>()?;
                        parsed.rename = Some(input.parse::<LitStr>()?.value());
                    }
                    "type_selector" => {
                        input.parse::<syn::Token![=]>()?;
                        let lit = input.parse::<LitStr>()?;
                        parsed.type_selector = Some(lit.parse::<ExprPath>()?);
                    }
                    "repr" => {
                        input.parse::<syn::Token![=]>()?;
                        parsed.repr = Some(input.parse::<LitStr>()?);
                    }
                    "not_null" => parsed.not_null = true,
                    _ => unreachable!("allowed list only names handled keys"),
                }

                // Consume comma if present, otherwise end
                if input.peek(syn::Token![,]) {
                    input.parse::<syn::Token![,]>()?;
                }
            }
            Ok(())
        })?;
    }

    Ok(parsed)
}

/// Last path segment of a type, e.g. `AnyValue` for `typed_bson::AnyValue`.
fn last_segment_is(ty: &Type, name: &str) -> bool {
    if let Type::Path(type_path) = ty {
        type_path
            .path
            .segments
            .last()
            .map_or(false, |seg| seg.ident == name)
    } else {
        false
    }
}

/// Extract the inner type `T` from `Option<T>`
fn extract_inner_type_from_option(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    if let PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(GenericArgument::Type(inner_ty)) = args.args.first() {
            return Some(inner_ty);
        }
    }
    None
}

fn is_any_value_slot(ty: &Type) -> bool {
    let inner = extract_inner_type_from_option(ty).unwrap_or(ty);
    last_segment_is(inner, "AnyValue")
}

/// The boilerplate half of `Reflect` plus the non-nullable `Slot` impl.
fn reflect_plumbing(input: &DeriveInput) -> (TokenStream2, TokenStream2) {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let methods = quote! {
        fn value_type(&self) -> &'static typed_bson::Type {
            <Self as typed_bson::Reflect>::type_of()
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
            self
        }
    };

    let slot = quote! {
        impl #impl_generics typed_bson::Slot for #name #ty_generics #where_clause {
            const NULLABLE: bool = false;

            fn slot_type() -> &'static typed_bson::Type {
                <Self as typed_bson::Reflect>::type_of()
            }

            fn get(&self) -> ::std::option::Option<&dyn typed_bson::Reflect> {
                ::std::option::Option::Some(self)
            }

            fn from_reflect(
                value: ::std::option::Option<::std::boxed::Box<dyn typed_bson::Reflect>>,
            ) -> typed_bson::Result<Self> {
                typed_bson::types::required::<Self>(value)
            }
        }
    };

    (methods, slot)
}

/// Derive macro for structs with named fields
///
/// Generates `Reflect`, `Object` and `Slot`. The struct must implement
/// `Default`: the decoder starts from a default instance and overwrites the
/// fields present in the document.
///
/// # Supported Attributes
///
/// * `#[bson(rename = "key")]` - Use a different document key for the field
/// * `#[bson(type_selector = "path")]` - Resolve the concrete type of an `AnyValue` field
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Object, Default)]
/// struct Envelope {
///     kind: String,
///     #[bson(type_selector = "Envelope::payload_type")]
///     payload: Option<AnyValue>,
/// }
/// ```
#[proc_macro_derive(Object, attributes(bson))]
pub fn derive_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_object(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_object(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "#[derive(Object)] is only supported for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            name,
            "#[derive(Object)] requires named fields",
        ));
    };

    let mut keys = Vec::new();
    let mut descriptors = Vec::new();
    let mut getters = Vec::new();
    let mut setters = Vec::new();

    for (index, f) in fields.named.iter().enumerate() {
        let Some(field_ident) = &f.ident else {
            continue;
        };
        let attrs = get_bson_attributes(&f.attrs, &["rename", "type_selector"])?;
        let key = attrs.rename.unwrap_or_else(|| field_ident.to_string());
        let ty = &f.ty;

        let selector = match attrs.type_selector {
            Some(path) => {
                if !is_any_value_slot(ty) {
                    return Err(syn::Error::new_spanned(
                        ty,
                        "type_selector is only allowed on AnyValue fields",
                    ));
                }
                quote! {
                    ::std::option::Option::Some(
                        |object: &dyn typed_bson::Reflect| -> typed_bson::Result<&'static typed_bson::Type> {
                            let object = typed_bson::types::downcast_ref::<Self>(object)?;
                            ::std::result::Result::Ok(#path(object))
                        }
                    )
                }
            }
            None => quote! { ::std::option::Option::None },
        };

        descriptors.push(quote! {
            typed_bson::Field {
                name: #key,
                ty: <#ty as typed_bson::Slot>::slot_type,
                nullable: <#ty as typed_bson::Slot>::NULLABLE,
                type_selector: #selector,
            }
        });
        getters.push(quote! {
            #index => typed_bson::Slot::get(&self.#field_ident),
        });
        setters.push(quote! {
            #index => self.#field_ident = <#ty as typed_bson::Slot>::from_reflect(value)?,
        });
        keys.push(key);
    }

    if let Some(duplicate) = keys.iter().duplicates().next() {
        return Err(syn::Error::new_spanned(
            name,
            format!("Key '{}' is used by more than one field of '{}'", duplicate, name),
        ));
    }

    let (plumbing, slot) = reflect_plumbing(input);

    Ok(quote! {
        impl #impl_generics typed_bson::Reflect for #name #ty_generics #where_clause {
            fn type_of() -> &'static typed_bson::Type {
                typed_bson::resolve_type::<Self>(|| {
                    typed_bson::Type::new::<Self>(
                        typed_bson::ClassId::OBJECT,
                        typed_bson::TypeKind::Object(typed_bson::ObjectInfo {
                            fields: ::std::vec![#(#descriptors),*],
                            create: || -> ::std::boxed::Box<dyn typed_bson::Reflect> {
                                ::std::boxed::Box::new(<Self as ::std::default::Default>::default())
                            },
                        }),
                    )
                })
            }

            #plumbing

            fn reflect_ref(&self) -> typed_bson::ReflectRef<'_> {
                typed_bson::ReflectRef::Object(self)
            }

            fn as_object_mut(&mut self) -> ::std::option::Option<&mut dyn typed_bson::Object> {
                ::std::option::Option::Some(self)
            }
        }

        impl #impl_generics typed_bson::Object for #name #ty_generics #where_clause {
            fn field(&self, index: usize) -> ::std::option::Option<&dyn typed_bson::Reflect> {
                match index {
                    #(#getters)*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn set_field(
                &mut self,
                index: usize,
                value: ::std::option::Option<::std::boxed::Box<dyn typed_bson::Reflect>>,
            ) -> typed_bson::Result<()> {
                match index {
                    #(#setters)*
                    _ => {
                        return ::std::result::Result::Err(typed_bson::BsonError::Decode(
                            ::std::format!("Field index {} out of range for {}", index, stringify!(#name)),
                        ))
                    }
                }
                ::std::result::Result::Ok(())
            }
        }

        #slot
    })
}

/// Derive macro for fieldless enums
///
/// Generates `Reflect` with enum metadata and `Slot`. The enum is written as
/// its representation: the variant name (or `rename`) for `string`, the
/// discriminant for `i32`/`i64`.
///
/// # Supported Attributes
///
/// * `#[bson(repr = "string" | "i32" | "i64")]` - On the enum, default `string`
/// * `#[bson(not_null)]` - On the enum, reject null values
/// * `#[bson(rename = "NAME")]` - On a variant, its string representation
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Enum, Clone, Copy)]
/// #[bson(repr = "i32", not_null)]
/// enum Level {
///     Low = 1,
///     High = 10,
/// }
/// ```
#[proc_macro_derive(Enum, attributes(bson))]
pub fn derive_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_enum(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

enum Repr {
    String,
    Int(syn::Ident),
}

fn expand_enum(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "#[derive(Enum)] is only supported for enums",
        ));
    };

    let container = get_bson_attributes(&input.attrs, &["repr", "not_null"])?;
    let not_null = container.not_null;
    let repr = match &container.repr {
        None => Repr::String,
        Some(lit) => match lit.value().as_str() {
            "string" => Repr::String,
            "i32" | "i64" => Repr::Int(syn::Ident::new(&lit.value(), Span::call_site())),
            other => {
                return Err(syn::Error::new(
                    lit.span(),
                    format!("Unsupported repr '{}', expected string, i32 or i64", other),
                ))
            }
        },
    };

    let mut values = Vec::new();
    let mut to_arms = Vec::new();
    let mut from_arms = Vec::new();

    for v in &data.variants {
        if !matches!(v.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                v,
                "#[derive(Enum)] only supports unit variants",
            ));
        }
        let variant_ident = &v.ident;
        let attrs = get_bson_attributes(&v.attrs, &["rename"])?;

        match &repr {
            Repr::String => {
                let value = attrs.rename.unwrap_or_else(|| variant_ident.to_string());
                to_arms.push(quote! {
                    Self::#variant_ident => ::std::string::String::from(#value),
                });
                from_arms.push(quote! {
                    #value => ::std::result::Result::Ok(Self::#variant_ident),
                });
                values.push(value);
            }
            Repr::Int(int_ty) => {
                if attrs.rename.is_some() {
                    return Err(syn::Error::new_spanned(
                        v,
                        "rename has no effect on an integer enum representation",
                    ));
                }
                to_arms.push(quote! {
                    Self::#variant_ident => Self::#variant_ident as #int_ty,
                });
                from_arms.push(quote! {
                    x if x == Self::#variant_ident as #int_ty => ::std::result::Result::Ok(Self::#variant_ident),
                });
            }
        }
    }

    if let Some(duplicate) = values.iter().duplicates().next() {
        return Err(syn::Error::new_spanned(
            name,
            format!("Value '{}' is used by more than one variant of '{}'", duplicate, name),
        ));
    }

    let (repr_ty, lookup) = match &repr {
        Repr::String => (
            quote! { ::std::string::String },
            quote! {
                match repr.as_str() {
                    #(#from_arms)*
                    _ => ::std::result::Result::Err(repr.clone()),
                }
            },
        ),
        Repr::Int(int_ty) => (
            quote! { #int_ty },
            quote! {
                match repr {
                    #(#from_arms)*
                    other => ::std::result::Result::Err(other.to_string()),
                }
            },
        ),
    };

    let (plumbing, slot) = reflect_plumbing(input);

    Ok(quote! {
        impl #impl_generics typed_bson::Reflect for #name #ty_generics #where_clause {
            fn type_of() -> &'static typed_bson::Type {
                typed_bson::resolve_type::<Self>(|| {
                    typed_bson::Type::new::<Self>(
                        typed_bson::ClassId::ENUM,
                        typed_bson::TypeKind::Enum(typed_bson::EnumInfo {
                            not_null: #not_null,
                            repr: <#repr_ty as typed_bson::Reflect>::type_of,
                            to_repr: |value: &dyn typed_bson::Reflect| -> typed_bson::Result<::std::boxed::Box<dyn typed_bson::Reflect>> {
                                let value = typed_bson::types::enum_value::<Self>(value)?;
                                let repr: #repr_ty = match value {
                                    #(#to_arms)*
                                };
                                ::std::result::Result::Ok(::std::boxed::Box::new(repr))
                            },
                            from_repr: |value: ::std::boxed::Box<dyn typed_bson::Reflect>| -> typed_bson::Result<::std::boxed::Box<dyn typed_bson::Reflect>> {
                                let enum_name = ::std::any::type_name::<Self>();
                                let repr = typed_bson::types::enum_repr::<#repr_ty>(enum_name, value)?;
                                let found: ::std::result::Result<Self, ::std::string::String> = #lookup;
                                match found {
                                    ::std::result::Result::Ok(variant) => {
                                        ::std::result::Result::Ok(::std::boxed::Box::new(variant) as ::std::boxed::Box<dyn typed_bson::Reflect>)
                                    }
                                    ::std::result::Result::Err(value) => ::std::result::Result::Err(
                                        typed_bson::EnumInterpreterError::EntryNotFound { enum_name, value }.into(),
                                    ),
                                }
                            },
                        }),
                    )
                })
            }

            #plumbing
        }

        #slot
    })
}
