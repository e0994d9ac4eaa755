//! Compile-time validation for the Entity derive macro.
//!
//! Mirrors the checks the metadata resolver performs at run time so that a
//! derived entity with a broken mapping fails to compile instead.

use syn::Error;

use crate::parse::{EntityDef, FieldRole};

/// Validate a parsed entity, reporting every problem at once.
pub fn validate_entity(entity: &EntityDef) -> Result<(), Error> {
    let mut errors = Vec::new();

    if entity.has_generics {
        errors.push(Error::new(
            entity.name.span(),
            "Entity cannot be derived for generic structs",
        ));
    }

    let ids: Vec<_> = entity.fields.iter().filter(|f| f.id).collect();
    match ids.as_slice() {
        [] => errors.push(Error::new(
            entity.name.span(),
            "identifier is not specified; mark one field with #[entity(id)]",
        )),
        [_] => {}
        [_, rest @ ..] => {
            for extra in rest {
                errors.push(Error::new(
                    extra.name.span(),
                    "more than one identifier field declared",
                ));
            }
        }
    }

    let versions: Vec<_> = entity.fields.iter().filter(|f| f.version).collect();
    for extra in versions.iter().skip(1) {
        errors.push(Error::new(
            extra.name.span(),
            "more than one version field declared",
        ));
    }

    for field in &entity.fields {
        if field.version && field.role == FieldRole::Column && !field.is_integral() {
            errors.push(Error::new_spanned(
                &field.ty,
                "version field must have an integer type: i8, i16, i32, i64 or an Option of one",
            ));
        }

        if let Some(span) = field.role_conflict {
            errors.push(Error::new(
                span,
                "a field can have only one of `transient`, `many_to_one`, `one_to_one`, `one_to_many`",
            ));
        }

        if field.role.is_relation() || field.role == FieldRole::Transient {
            if field.id || field.version {
                errors.push(Error::new(
                    field.name.span(),
                    "relationship and transient fields cannot be the identifier or version",
                ));
            }
            if field.column.is_some() {
                errors.push(Error::new(
                    field.name.span(),
                    "`column` applies to plain column fields only",
                ));
            }
        }

        if field.join_column.is_some() && !field.role.is_owning() {
            errors.push(Error::new(
                field.name.span(),
                "`join_column` requires `many_to_one` or `one_to_one`",
            ));
        }
        if field.role.is_owning() && field.join_column.is_none() {
            errors.push(Error::new(
                field.name.span(),
                "owning reference must declare a join column: #[entity(join_column = \"...\")]",
            ));
        }
        if field.mapped_by.is_some() && field.role != FieldRole::OneToMany {
            errors.push(Error::new(
                field.name.span(),
                "`mapped_by` requires `one_to_many`",
            ));
        }

        if field.role.is_relation() && field.target_type().is_none() {
            let expected = if field.role.is_owning() {
                "owning reference fields must have type Option<T> where T is an entity"
            } else {
                "one_to_many fields must have type LazyList<T> where T is an entity"
            };
            errors.push(Error::new_spanned(&field.ty, expected));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let mut combined = errors.remove(0);
        for err in errors {
            combined.combine(err);
        }
        Err(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_entity;
    use syn::{DeriveInput, parse_quote};

    fn errors_of(input: &DeriveInput) -> Vec<String> {
        let def = parse_entity(input).unwrap();
        match validate_entity(&def) {
            Ok(()) => Vec::new(),
            Err(e) => e.into_iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn accepts_a_complete_mapping() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "persons")]
            struct Person {
                #[entity(id)]
                id: Option<i64>,
                #[entity(version)]
                version: Option<i64>,
                #[entity(one_to_many)]
                notes: LazyList<Note>,
                #[entity(one_to_one, join_column = "address_id")]
                address: Option<Address>,
            }
        };
        assert!(errors_of(&input).is_empty());
    }

    #[test]
    fn missing_and_duplicate_identifiers() {
        let input: DeriveInput = parse_quote! {
            struct NoId { name: String }
        };
        let errors = errors_of(&input);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("identifier is not specified"));

        let input: DeriveInput = parse_quote! {
            struct TwoIds {
                #[entity(id)] a: i64,
                #[entity(id)] b: i64,
                #[entity(version)] v1: i64,
                #[entity(version)] v2: i64,
            }
        };
        let errors = errors_of(&input);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("identifier")));
        assert!(errors.iter().any(|e| e.contains("version")));
    }

    #[test]
    fn version_field_must_be_an_integer() {
        let input: DeriveInput = parse_quote! {
            struct Draft {
                #[entity(id)] id: i64,
                #[entity(version)] version: Option<String>,
            }
        };
        let errors = errors_of(&input);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("version field must have an integer type"));

        let valid: [DeriveInput; 2] = [
            parse_quote! { struct A { #[entity(id)] id: i64, #[entity(version)] v: i32 } },
            parse_quote! { struct B { #[entity(id)] id: i64, #[entity(version)] v: Option<i16> } },
        ];
        for input in &valid {
            assert!(errors_of(input).is_empty());
        }

        let input: DeriveInput = parse_quote! {
            struct C { #[entity(id)] id: i64, #[entity(version)] v: f64 }
        };
        assert_eq!(errors_of(&input).len(), 1);
    }

    #[test]
    fn join_column_must_pair_with_owning_reference() {
        let input: DeriveInput = parse_quote! {
            struct Dangling {
                #[entity(id)] id: i64,
                #[entity(join_column = "person_id")] person: Option<Person>,
            }
        };
        assert!(errors_of(&input)[0].contains("requires `many_to_one`"));

        let input: DeriveInput = parse_quote! {
            struct Unpaired {
                #[entity(id)] id: i64,
                #[entity(many_to_one)] person: Option<Person>,
            }
        };
        assert!(errors_of(&input)[0].contains("must declare a join column"));
    }

    #[test]
    fn relation_field_types_are_checked() {
        let input: DeriveInput = parse_quote! {
            struct Note {
                #[entity(id)] id: i64,
                #[entity(many_to_one, join_column = "person_id")] person: Person,
                #[entity(one_to_many)] tags: Vec<Tag>,
            }
        };
        let errors = errors_of(&input);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("Option<T>"));
        assert!(errors[1].contains("LazyList<T>"));
    }
}
