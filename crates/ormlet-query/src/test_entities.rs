//! Hand-written entities shared by the builder and translator tests.

use ormlet_core::{
    Entity, EntityDescriptor, FieldDescriptor, FromValue, LazyList, RelationLoader, Result, Row,
    Value,
};

#[derive(Debug, Clone, Default)]
pub struct Person {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub male: Option<String>,
    pub notes: LazyList<Note>,
}

static PERSON: EntityDescriptor = EntityDescriptor::new("ormlet_query::test_entities::Person", "Person")
    .table("persons")
    .fields(&[
        FieldDescriptor::new("id").id(),
        FieldDescriptor::new("firstName").column("first_name"),
        FieldDescriptor::new("lastName").column("last_name"),
        FieldDescriptor::new("age"),
        FieldDescriptor::new("male"),
        FieldDescriptor::new("notes").one_to_many(<Note as Entity>::descriptor),
    ]);

impl Entity for Person {
    fn descriptor() -> &'static EntityDescriptor {
        &PERSON
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "firstName" => Some(self.first_name.clone().into()),
            "lastName" => Some(self.last_name.clone().into()),
            "age" => Some(self.age.into()),
            "male" => Some(self.male.clone().into()),
            _ => None,
        }
    }

    fn set_field_value(&mut self, field: &str, value: &Value) -> Result<()> {
        match field {
            "id" => self.id = FromValue::from_value(value)?,
            "firstName" => self.first_name = FromValue::from_value(value)?,
            "lastName" => self.last_name = FromValue::from_value(value)?,
            "age" => self.age = FromValue::from_value(value)?,
            "male" => self.male = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn from_row<L: RelationLoader>(row: &Row, loader: &L) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            first_name: row.get_named("first_name")?,
            last_name: row.get_named("last_name")?,
            age: row.get_named("age")?,
            male: row.get_named("male")?,
            notes: loader.lazy_collection::<Self, Note>("notes", row.value_named("id")?)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Note {
    pub id: Option<i64>,
    pub title: String,
    pub body: Option<String>,
    pub person: Option<Person>,
}

static NOTE: EntityDescriptor = EntityDescriptor::new("ormlet_query::test_entities::Note", "Note")
    .table("notes")
    .fields(&[
        FieldDescriptor::new("body"),
        FieldDescriptor::new("person")
            .many_to_one(<Person as Entity>::descriptor)
            .join_column("person_id"),
        FieldDescriptor::new("title"),
        FieldDescriptor::new("id").id(),
    ]);

impl Entity for Note {
    fn descriptor() -> &'static EntityDescriptor {
        &NOTE
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "title" => Some(self.title.clone().into()),
            "body" => Some(self.body.clone().into()),
            "person" => Some(self.person.as_ref().map_or(Value::Null, Entity::id_value)),
            _ => None,
        }
    }

    fn set_field_value(&mut self, field: &str, value: &Value) -> Result<()> {
        match field {
            "id" => self.id = FromValue::from_value(value)?,
            "title" => self.title = FromValue::from_value(value)?,
            "body" => self.body = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn from_row<L: RelationLoader>(row: &Row, loader: &L) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            title: row.get_named("title")?,
            body: row.get_named("body")?,
            person: loader.load_reference(row.value_named("person_id")?)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Versioned {
    pub id: Option<i64>,
    pub name: String,
    pub version: Option<i64>,
}

static VERSIONED: EntityDescriptor =
    EntityDescriptor::new("ormlet_query::test_entities::Versioned", "Versioned")
        .table("versioned")
        .fields(&[
            FieldDescriptor::new("id").id(),
            FieldDescriptor::new("name"),
            FieldDescriptor::new("version").version().integral(),
        ]);

impl Entity for Versioned {
    fn descriptor() -> &'static EntityDescriptor {
        &VERSIONED
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "version" => Some(self.version.into()),
            _ => None,
        }
    }

    fn set_field_value(&mut self, field: &str, value: &Value) -> Result<()> {
        match field {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            "version" => self.version = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn from_row<L: RelationLoader>(row: &Row, _loader: &L) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            version: row.get_named("version")?,
        })
    }
}
