use lazyrecord_core::{Data, Field, InsertOptions, ModelDef, Record, Schema, Store, Value};
use serde_json::json;

fn chat_store() -> Store {
    let schema = Schema::new()
        .with(
            ModelDef::new("Thread", "name")
                .field(Field::many("messages", "Message").inverse("thread"))
                .field(Field::many("members", "Persona")),
        )
        .unwrap()
        .with(
            ModelDef::new("Message", "id")
                .field(Field::attr("body").html())
                .field(Field::attr("pinned"))
                .field(Field::one("thread", "Thread")),
        )
        .unwrap()
        .with(ModelDef::new("Persona", "name"))
        .unwrap();
    Store::new(schema).unwrap()
}

fn names(records: Vec<Record>) -> Vec<String> {
    records
        .iter()
        .map(|record| record.get("name").unwrap().to_string())
        .collect()
}

#[test]
fn nested_json_objects_insert_related_records() {
    let store = chat_store();
    let message = store
        .model("Message")
        .unwrap()
        .insert(json!({
            "id": 1,
            "body": "<p>hello</p>",
            "thread": { "name": "General", "members": ["John", "Marc"] },
        }))
        .unwrap();

    let thread = store.get("Thread", "General").unwrap().unwrap();
    assert_eq!(message.one("thread").unwrap(), Some(thread.clone()));
    assert_eq!(
        thread.many("messages").unwrap().records().unwrap(),
        vec![message.clone()]
    );
    assert_eq!(
        names(thread.many("members").unwrap().records().unwrap()),
        ["John", "Marc"]
    );
    assert!(!message.get("body").unwrap().is_markup());
}

#[test]
fn json_command_pairs_apply_in_order() {
    let store = chat_store();
    let thread = store.model("Thread").unwrap().insert("General").unwrap();
    thread
        .set(
            "members",
            json!([
                ["ADD", { "name": "John" }],
                ["ADD", "Marc"],
                ["DELETE", "John"],
                ["ADD", "Jane"]
            ]),
        )
        .unwrap();
    assert_eq!(
        names(thread.many("members").unwrap().records().unwrap()),
        ["Marc", "Jane"]
    );

    thread
        .set("members", json!([["DELETE", "Nobody"]]))
        .unwrap();
    assert_eq!(thread.many("members").unwrap().len().unwrap(), 2);
    assert!(store.get("Persona", "Nobody").unwrap().is_none());

    thread.set("members", json!(["Jane", "John"])).unwrap();
    assert_eq!(
        names(thread.many("members").unwrap().records().unwrap()),
        ["Jane", "John"]
    );
}

#[test]
fn json_null_clears_relations_and_is_kept_on_attributes() {
    let store = chat_store();
    let message = store
        .model("Message")
        .unwrap()
        .insert(json!({ "id": 1, "pinned": true, "thread": "General" }))
        .unwrap();
    let thread = store.get("Thread", "General").unwrap().unwrap();

    message
        .assign(
            Data::new()
                .field("pinned", json!(null))
                .field("thread", json!(null)),
        )
        .unwrap();
    assert_eq!(message.get("pinned").unwrap(), Value::Null);
    assert!(!message.get("pinned").unwrap().is_truthy());
    assert_eq!(message.one("thread").unwrap(), None);
    assert!(thread.many("messages").unwrap().is_empty().unwrap());

    thread.set("members", json!(["John"])).unwrap();
    thread.set("members", json!(null)).unwrap();
    assert!(thread.many("members").unwrap().is_empty().unwrap());
}

#[test]
fn json_numbers_identify_records_across_int_and_float() {
    let store = chat_store();
    let messages = store.model("Message").unwrap();
    let inserted = messages
        .insert_many(vec![json!({ "id": 1 }), json!({ "id": 2.0 })])
        .unwrap();
    assert_eq!(messages.get(json!(1.0)).unwrap(), Some(inserted[0].clone()));
    assert_eq!(messages.get(json!(2)).unwrap(), Some(inserted[1].clone()));
    assert_eq!(messages.len(), 2);
}

#[test]
fn trusted_json_payload_marks_html_fields() {
    let store = chat_store();
    let message = store
        .model("Message")
        .unwrap()
        .insert_with(
            json!({ "id": 7, "body": "<b>hi</b>", "pinned": "<b>no</b>" }),
            InsertOptions::trusted(),
        )
        .unwrap();
    assert!(message.get("body").unwrap().is_markup());
    assert!(!message.get("pinned").unwrap().is_markup());
}
