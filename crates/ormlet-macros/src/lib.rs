//! Procedural macros for ormlet.
//!
//! `ormlet-macros` is the **compile-time codegen layer**. `#[derive(Entity)]`
//! turns a struct into a persistent entity by generating its static
//! `EntityDescriptor` and the field access the session relies on for
//! snapshots, dirty checking and hydration.
//!
//! The macro is used by application crates via the `ormlet` facade.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;

mod parse;
mod validate;

use parse::{EntityDef, FieldDef, FieldRole, parse_entity};

/// Derive macro for the `Entity` trait.
///
/// # Attributes
///
/// - `#[entity(table = "name")]` - Table name (defaults to the struct name)
/// - `#[entity(id)]` - Identifier field; exactly one is required
/// - `#[entity(version)]` - Optimistic-lock version counter
/// - `#[entity(column = "name")]` - Override column name
/// - `#[entity(many_to_one, join_column = "x")]` - Owning reference, type `Option<T>`
/// - `#[entity(one_to_one, join_column = "x")]` - Owning reference, type `Option<T>`
/// - `#[entity(one_to_many)]` - Inverse collection, type `LazyList<T>`;
///   `mapped_by = "field"` names the owning field on `T` when ambiguous
/// - `#[entity(transient)]` - Not persisted; filled with `Default` on load
///
/// # Example
///
/// ```ignore
/// use ormlet::{Entity, LazyList};
///
/// #[derive(Entity, Clone, Debug)]
/// #[entity(table = "persons")]
/// struct Person {
///     #[entity(id)]
///     id: Option<i64>,
///     #[entity(column = "first_name")]
///     first_name: String,
///     #[entity(one_to_many)]
///     notes: LazyList<Note>,
/// }
///
/// #[derive(Entity, Clone, Debug)]
/// #[entity(table = "notes")]
/// struct Note {
///     #[entity(id)]
///     id: Option<i64>,
///     title: String,
///     #[entity(many_to_one, join_column = "person_id")]
///     person: Option<Person>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let entity = match parse_entity(&input) {
        Ok(e) => e,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_entity(&entity) {
        return e.to_compile_error().into();
    }

    generate_entity_impl(&entity).into()
}

fn generate_entity_impl(entity: &EntityDef) -> TokenStream2 {
    let name = &entity.name;
    let name_str = name.to_string();

    let table = entity.table.as_ref().map(|t| quote! { .table(#t) });

    let persistent: Vec<&FieldDef> = entity
        .fields
        .iter()
        .filter(|f| f.role != FieldRole::Transient)
        .collect();
    let field_count = persistent.len();
    let descriptors = persistent.iter().map(|f| field_descriptor(f));

    let field_value_arms = persistent
        .iter()
        .filter_map(|f| field_value_arm(f));
    let set_field_arms = persistent
        .iter()
        .filter(|f| f.role == FieldRole::Column)
        .map(|f| {
            let ident = &f.name;
            let key = ident.to_string();
            quote! {
                #key => {
                    self.#ident = ::ormlet_core::FromValue::from_value(value)?;
                    ::core::result::Result::Ok(())
                }
            }
        });

    let id_column = entity
        .fields
        .iter()
        .find(|f| f.id)
        .map(column_name)
        .unwrap_or_default();
    let hydrate = entity.fields.iter().map(|f| hydrate_field(f, &id_column));

    quote! {
        impl ::ormlet_core::Entity for #name {
            fn descriptor() -> &'static ::ormlet_core::EntityDescriptor {
                static FIELDS: [::ormlet_core::FieldDescriptor; #field_count] = [
                    #(#descriptors),*
                ];
                static DESCRIPTOR: ::ormlet_core::EntityDescriptor =
                    ::ormlet_core::EntityDescriptor::new(
                        ::core::concat!(::core::module_path!(), "::", #name_str),
                        #name_str,
                    )
                    #table
                    .fields(&FIELDS);
                &DESCRIPTOR
            }

            fn field_value(&self, field: &str) -> ::core::option::Option<::ormlet_core::Value> {
                match field {
                    #(#field_value_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            fn set_field_value(
                &mut self,
                field: &str,
                value: &::ormlet_core::Value,
            ) -> ::ormlet_core::Result<()> {
                match field {
                    #(#set_field_arms)*
                    _ => ::core::result::Result::Ok(()),
                }
            }

            fn from_row<L: ::ormlet_core::RelationLoader>(
                row: &::ormlet_core::Row,
                loader: &L,
            ) -> ::ormlet_core::Result<Self> {
                let _ = loader;
                ::core::result::Result::Ok(Self {
                    #(#hydrate),*
                })
            }
        }
    }
}

fn column_name(field: &FieldDef) -> String {
    field
        .column
        .as_ref()
        .map_or_else(|| field.name.to_string(), syn::LitStr::value)
}

/// `FieldDescriptor::new("name")` with its builder calls.
fn field_descriptor(field: &FieldDef) -> TokenStream2 {
    let key = field.name.to_string();
    let mut tokens = quote! { ::ormlet_core::FieldDescriptor::new(#key) };

    if let Some(column) = &field.column {
        tokens.extend(quote! { .column(#column) });
    }
    if field.id {
        tokens.extend(quote! { .id() });
    }
    if field.version {
        tokens.extend(quote! { .version() });
    }
    if field.role == FieldRole::Column && field.is_integral() {
        tokens.extend(quote! { .integral() });
    }
    if let Some(target) = field.target_type() {
        let target_fn = quote! { <#target as ::ormlet_core::Entity>::descriptor };
        tokens.extend(match field.role {
            FieldRole::ManyToOne => quote! { .many_to_one(#target_fn) },
            FieldRole::OneToOne => quote! { .one_to_one(#target_fn) },
            _ => quote! { .one_to_many(#target_fn) },
        });
    }
    if let Some(join_column) = &field.join_column {
        tokens.extend(quote! { .join_column(#join_column) });
    }
    if let Some(mapped_by) = &field.mapped_by {
        tokens.extend(quote! { .mapped_by(#mapped_by) });
    }
    tokens
}

/// Match arm reading a field as a `Value`; owning references yield the target's id.
fn field_value_arm(field: &FieldDef) -> Option<TokenStream2> {
    let ident = &field.name;
    let key = ident.to_string();
    match field.role {
        FieldRole::Column => Some(quote! {
            #key => ::core::option::Option::Some(::ormlet_core::Value::from(
                ::core::clone::Clone::clone(&self.#ident),
            ))
        }),
        FieldRole::ManyToOne | FieldRole::OneToOne => Some(quote! {
            #key => ::core::option::Option::Some(
                self.#ident
                    .as_ref()
                    .map_or(::ormlet_core::Value::Null, ::ormlet_core::Entity::id_value),
            )
        }),
        FieldRole::OneToMany | FieldRole::Transient => None,
    }
}

/// Struct field initializer used by `from_row`.
fn hydrate_field(field: &FieldDef, id_column: &str) -> TokenStream2 {
    let ident = &field.name;
    let key = ident.to_string();
    match field.role {
        FieldRole::Column => {
            let column = column_name(field);
            quote! { #ident: row.get_named(#column)? }
        }
        FieldRole::ManyToOne | FieldRole::OneToOne => {
            let join_column = field
                .join_column
                .as_ref()
                .map(syn::LitStr::value)
                .unwrap_or_default();
            let target = field.target_type();
            quote! {
                #ident: ::ormlet_core::RelationLoader::load_reference::<#target>(
                    loader,
                    row.value_named(#join_column)?,
                )?
            }
        }
        FieldRole::OneToMany => {
            let target = field.target_type();
            quote! {
                #ident: ::ormlet_core::RelationLoader::lazy_collection::<Self, #target>(
                    loader,
                    #key,
                    row.value_named(#id_column)?,
                )?
            }
        }
        FieldRole::Transient => quote! { #ident: ::core::default::Default::default() },
    }
}
