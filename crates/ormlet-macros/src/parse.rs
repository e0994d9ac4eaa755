//! Parsing logic for the Entity derive macro.
//!
//! Extracts the struct-level and field-level `#[entity(...)]` attributes into
//! `EntityDef` and `FieldDef`, which drive validation and code generation.

use proc_macro2::Span;
use syn::{
    Attribute, Data, DeriveInput, Error, Field, Fields, GenericArgument, Ident, Lit, LitStr,
    PathArguments, Result, Type,
};

/// Parsed entity definition from a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name (e.g., `Person`).
    pub name: Ident,
    /// Explicit table name, if given.
    pub table: Option<LitStr>,
    pub fields: Vec<FieldDef>,
    /// Whether the struct declares generic parameters (rejected by validation).
    pub has_generics: bool,
}

/// How a field takes part in persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Column,
    ManyToOne,
    OneToOne,
    OneToMany,
    /// Not persisted; filled with `Default` when hydrating.
    Transient,
}

impl FieldRole {
    pub fn is_owning(self) -> bool {
        matches!(self, FieldRole::ManyToOne | FieldRole::OneToOne)
    }

    pub fn is_relation(self) -> bool {
        self.is_owning() || self == FieldRole::OneToMany
    }
}

/// Parsed definition of one struct field.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    pub ty: Type,
    pub role: FieldRole,
    pub column: Option<LitStr>,
    pub id: bool,
    pub version: bool,
    pub join_column: Option<LitStr>,
    pub mapped_by: Option<LitStr>,
    /// Span of the first relationship attribute, for duplicate-role errors.
    pub role_conflict: Option<Span>,
}

impl FieldDef {
    /// The related entity type for relationship fields: `T` in `Option<T>`
    /// (owning references) or `LazyList<T>` (collections).
    pub fn target_type(&self) -> Option<&Type> {
        match self.role {
            FieldRole::ManyToOne | FieldRole::OneToOne => single_generic_argument(&self.ty, "Option"),
            FieldRole::OneToMany => single_generic_argument(&self.ty, "LazyList"),
            FieldRole::Column | FieldRole::Transient => None,
        }
    }

    /// Whether the field is `i8`..`i64`, bare or wrapped in `Option`.
    pub fn is_integral(&self) -> bool {
        let ty = single_generic_argument(&self.ty, "Option").unwrap_or(&self.ty);
        let Type::Path(type_path) = ty else {
            return false;
        };
        type_path.qself.is_none()
            && type_path
                .path
                .get_ident()
                .is_some_and(|ident| ["i8", "i16", "i32", "i64"].iter().any(|t| ident == t))
    }
}

/// Parse a derive input into an entity definition.
pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    let name = input.ident.clone();

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    let table = parse_struct_attrs(&input.attrs)?;

    Ok(EntityDef {
        name,
        table,
        fields,
        has_generics: !input.generics.params.is_empty(),
    })
}

/// Parse `#[entity(table = "...")]` on the struct.
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<LitStr>> {
    let mut table = None;

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                if table.is_some() {
                    return Err(Error::new_spanned(
                        meta.path,
                        "duplicate entity attribute: table",
                    ));
                }
                table = Some(string_value(&meta, "table name")?);
                Ok(())
            } else {
                Err(meta.error("unknown entity attribute; expected `table = \"...\"`"))
            }
        })?;
    }

    Ok(table)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with fields, not a unit struct",
        )),
    }
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut def = FieldDef {
        name,
        ty: field.ty.clone(),
        role: FieldRole::Column,
        column: None,
        id: false,
        version: false,
        join_column: None,
        mapped_by: None,
        role_conflict: None,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;

            if path.is_ident("id") {
                def.id = true;
            } else if path.is_ident("version") {
                def.version = true;
            } else if path.is_ident("transient") {
                set_role(&mut def, FieldRole::Transient, path);
            } else if path.is_ident("many_to_one") {
                set_role(&mut def, FieldRole::ManyToOne, path);
            } else if path.is_ident("one_to_one") {
                set_role(&mut def, FieldRole::OneToOne, path);
            } else if path.is_ident("one_to_many") {
                set_role(&mut def, FieldRole::OneToMany, path);
            } else if path.is_ident("column") {
                def.column = Some(string_value(&meta, "column name")?);
            } else if path.is_ident("join_column") {
                def.join_column = Some(string_value(&meta, "join column")?);
            } else if path.is_ident("mapped_by") {
                def.mapped_by = Some(string_value(&meta, "mapped_by")?);
            } else {
                return Err(meta.error(
                    "unknown entity attribute; expected one of `id`, `version`, `column`, \
                     `transient`, `many_to_one`, `one_to_one`, `one_to_many`, \
                     `join_column`, `mapped_by`",
                ));
            }
            Ok(())
        })?;
    }

    Ok(def)
}

fn set_role(def: &mut FieldDef, role: FieldRole, path: &syn::Path) {
    if def.role != FieldRole::Column && def.role != role {
        def.role_conflict.get_or_insert(syn::spanned::Spanned::span(path));
    }
    def.role = role;
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<LitStr> {
    let value: Lit = meta.value()?.parse()?;
    match value {
        Lit::Str(lit) => Ok(lit),
        other => Err(Error::new_spanned(
            other,
            format!("expected string literal for {what}"),
        )),
    }
}

/// `T` in `Wrapper<T>`, matching the wrapper by its last path segment.
pub fn single_generic_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;
    use syn::parse_quote;

    #[test]
    fn parses_struct_and_field_attributes() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "notes")]
            struct Note {
                #[entity(id)]
                id: Option<i64>,
                #[entity(column = "note_title")]
                title: String,
                #[entity(many_to_one, join_column = "person_id")]
                person: Option<Person>,
                #[entity(transient)]
                scratch: String,
            }
        };

        let def = parse_entity(&input).unwrap();
        assert_eq!(def.name, "Note");
        assert_eq!(def.table.as_ref().map(LitStr::value).as_deref(), Some("notes"));
        assert!(!def.has_generics);

        assert!(def.fields[0].id);
        assert_eq!(
            def.fields[1].column.as_ref().map(LitStr::value).as_deref(),
            Some("note_title")
        );

        let person = &def.fields[2];
        assert_eq!(person.role, FieldRole::ManyToOne);
        assert_eq!(
            person.join_column.as_ref().map(LitStr::value).as_deref(),
            Some("person_id")
        );
        let target = person.target_type().unwrap();
        assert_eq!(target.to_token_stream().to_string(), "Person");

        assert_eq!(def.fields[3].role, FieldRole::Transient);
    }

    #[test]
    fn collection_target_comes_from_lazy_list() {
        let input: DeriveInput = parse_quote! {
            struct Person {
                #[entity(id)]
                id: i64,
                #[entity(one_to_many, mapped_by = "person")]
                notes: ormlet::LazyList<Note>,
            }
        };
        let def = parse_entity(&input).unwrap();
        let notes = &def.fields[1];
        assert_eq!(notes.role, FieldRole::OneToMany);
        assert_eq!(
            notes.mapped_by.as_ref().map(LitStr::value).as_deref(),
            Some("person")
        );
        assert_eq!(
            notes.target_type().unwrap().to_token_stream().to_string(),
            "Note"
        );
    }

    #[test]
    fn conflicting_roles_are_recorded() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[entity(many_to_one, one_to_many)]
                other: Option<Other>,
            }
        };
        let def = parse_entity(&input).unwrap();
        assert!(def.fields[0].role_conflict.is_some());
    }

    #[test]
    fn rejects_unknown_attributes_and_shapes() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[entity(primary_key)]
                id: i64,
            }
        };
        assert!(parse_entity(&input).is_err());

        let input: DeriveInput = parse_quote! {
            struct Tuple(i64);
        };
        assert!(parse_entity(&input).is_err());

        let input: DeriveInput = parse_quote! {
            enum NotAStruct { A }
        };
        assert!(parse_entity(&input).is_err());
    }

    #[test]
    fn generic_argument_extraction() {
        let ty: Type = parse_quote!(Option<Person>);
        assert!(single_generic_argument(&ty, "Option").is_some());
        assert!(single_generic_argument(&ty, "LazyList").is_none());

        let ty: Type = parse_quote!(std::option::Option<Person>);
        assert!(single_generic_argument(&ty, "Option").is_some());

        let ty: Type = parse_quote!(Person);
        assert!(single_generic_argument(&ty, "Option").is_none());
    }
}
