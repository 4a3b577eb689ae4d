use chrono::{Datelike, NaiveDate, Timelike};
use lazyrecord_core::{
    AttrType, Data, Field, InsertOptions, Markup, ModelDef, Schema, Store, Value,
};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn datetime_attribute_parses_and_reports_updates() {
    let updates = Rc::new(Cell::new(0));
    let counter = updates.clone();
    let schema = Schema::new()
        .with(
            ModelDef::new("Thread", "name").field(
                Field::attr("date")
                    .attr_type(AttrType::DateTime)
                    .on_update(move |_| {
                        counter.set(counter.get() + 1);
                        Ok(())
                    }),
            ),
        )
        .unwrap();
    let store = Store::new(schema).unwrap();
    let threads = store.model("Thread").unwrap();
    let take = || updates.replace(0);
    let day = |record: &lazyrecord_core::Record| {
        record
            .get("date")
            .unwrap()
            .as_datetime()
            .map(|stamp| stamp.day())
    };
    assert_eq!(take(), 0);

    let general = threads
        .insert(Data::new().field("name", "General").field("date", "2024-02-20 14:42:00"))
        .unwrap();
    assert_eq!(take(), 1);
    assert_eq!(day(&general), Some(20));

    threads
        .insert(Data::new().field("name", "General").field("date", "2024-02-21 14:42:00"))
        .unwrap();
    assert_eq!(take(), 1);
    assert_eq!(day(&general), Some(21));
    threads
        .insert(Data::new().field("name", "General").field("date", "2024-02-21T14:42:00"))
        .unwrap();
    assert_eq!(take(), 0);

    threads
        .insert(Data::new().field("name", "General").field("date", Value::Undefined))
        .unwrap();
    assert_eq!(take(), 1);
    assert_eq!(general.get("date").unwrap(), Value::Undefined);

    let stamp = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|date| date.and_hms_opt(9, 30, 0))
        .unwrap();
    let same = threads
        .insert(Data::new().field("name", "General").field("date", stamp))
        .unwrap();
    assert_eq!(take(), 1);
    assert_eq!(same, general);
    assert_eq!(general.get("date").unwrap(), Value::DateTime(stamp));

    threads
        .insert(Data::new().field("name", "General").field("date", false))
        .unwrap();
    assert_eq!(take(), 1);
    assert_eq!(general.get("date").unwrap(), Value::Bool(false));

    threads
        .insert(Data::new().field("name", "General").field("date", "2024-02-22 14:42:00"))
        .unwrap();
    assert_eq!(take(), 1);
    assert_eq!(day(&general), Some(22));
}

#[test]
fn datetime_attribute_falls_back_to_undefined() {
    let schema = Schema::new()
        .with(
            ModelDef::new("Thread", "name")
                .field(Field::attr("date").attr_type(AttrType::DateTime)),
        )
        .unwrap();
    let store = Store::new(schema).unwrap();
    let thread = store.model("Thread").unwrap().insert("General").unwrap();

    thread.set("date", "2024-02-22").unwrap();
    let midnight = thread.get("date").unwrap().as_datetime().unwrap();
    assert_eq!((midnight.day(), midnight.hour()), (22, 0));

    thread.set("date", "next tuesday").unwrap();
    assert_eq!(thread.get("date").unwrap(), Value::Undefined);
    thread.set("date", 42).unwrap();
    assert_eq!(thread.get("date").unwrap(), Value::Undefined);
    thread.set("date", Value::Null).unwrap();
    assert_eq!(thread.get("date").unwrap(), Value::Undefined);
}

#[test]
fn trusted_insert_on_html_field_stores_markup() {
    let schema = Schema::new()
        .with(ModelDef::new("Message", "body").field(Field::attr("body").default("").html()))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let messages = store.model("Message").unwrap();
    let hello = messages
        .insert_with("<p>hello</p>", InsertOptions::trusted())
        .unwrap();
    let world = messages.insert("<p>world</p>").unwrap();

    assert_eq!(
        hello.get("body").unwrap(),
        Value::Markup(Markup::new("<p>hello</p>"))
    );
    assert_eq!(hello.get("body").unwrap().to_string(), "<p>hello</p>");
    assert_eq!(world.get("body").unwrap(), Value::from("<p>world</p>"));
    assert_eq!(messages.get("<p>hello</p>").unwrap(), Some(hello));
}

#[test]
fn trust_is_reapplied_even_when_the_text_is_unchanged() {
    let schema = Schema::new()
        .with(ModelDef::new("Message", "id").field(Field::attr("body").default("").html()))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let messages = store.model("Message").unwrap();
    let raw = || Data::new().field("id", 1).field("body", "<p>hello</p>");

    let message = messages.insert(raw()).unwrap();
    assert!(!message.get("body").unwrap().is_markup());
    let message = messages.insert_with(raw(), InsertOptions::trusted()).unwrap();
    assert!(message.get("body").unwrap().is_markup());
    let message = messages.insert(raw()).unwrap();
    assert!(!message.get("body").unwrap().is_markup());

    message
        .set_with("body", "<b>bold</b>", InsertOptions::trusted())
        .unwrap();
    assert!(message.get("body").unwrap().is_markup());
}

#[test]
fn trust_is_ignored_on_fields_not_declared_html() {
    let schema = Schema::new()
        .with(ModelDef::new("Message", "id").field(Field::attr("subject")))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let message = store
        .model("Message")
        .unwrap()
        .insert_with(
            Data::new().field("id", 1).field("subject", "<i>hi</i>"),
            InsertOptions::trusted(),
        )
        .unwrap();
    assert_eq!(message.get("subject").unwrap(), Value::from("<i>hi</i>"));
}

#[test]
fn declared_defaults_seed_new_records() {
    let schema = Schema::new()
        .with(
            ModelDef::new("Channel", "id")
                .field(Field::attr("count").default(0))
                .field(Field::attr("muted").default(false))
                .field(Field::attr("topic")),
        )
        .unwrap();
    let store = Store::new(schema).unwrap();
    let channel = store.model("Channel").unwrap().insert(1).unwrap();
    assert_eq!(channel.get("count").unwrap(), Value::Int(0));
    assert_eq!(channel.get("muted").unwrap(), Value::Bool(false));
    assert_eq!(channel.get("topic").unwrap(), Value::Undefined);

    channel.set("muted", Value::Undefined).unwrap();
    assert_eq!(channel.get("muted").unwrap(), Value::Undefined);
    assert_ne!(channel.get("muted").unwrap(), Value::Bool(false));

    let upserted = store
        .model("Channel")
        .unwrap()
        .insert(Data::new().field("id", 1).field("topic", "release"))
        .unwrap();
    assert_eq!(upserted.get("count").unwrap(), Value::Int(0));
    assert_eq!(upserted.get("muted").unwrap(), Value::Undefined);
}
