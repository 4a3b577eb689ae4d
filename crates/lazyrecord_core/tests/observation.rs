use lazyrecord_core::{
    Data, Field, FieldValue, ModelDef, Record, Schema, Store, StoreConfig, StoreError,
    StoreResult, View,
};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

type Steps = Rc<RefCell<Vec<String>>>;

fn take(steps: &Steps) -> Vec<String> {
    steps.borrow_mut().drain(..).collect()
}

fn push(steps: &Steps, step: impl Into<String>) {
    steps.borrow_mut().push(step.into());
}

fn joined_ids(records: &[Record]) -> String {
    records
        .iter()
        .map(|record| record.get("id").unwrap().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[test]
fn lazy_compute_recomputes_while_observed() {
    let steps = Steps::default();
    let computing = steps.clone();
    let schema = Schema::new()
        .with(
            ModelDef::new("Channel", "id")
                .field(Field::attr("count").default(0))
                .field(Field::attr("multiplicity").compute(move |channel| {
                    push(&computing, "computing");
                    let count = channel.get("count")?.as_int().unwrap_or_default();
                    Ok(if count > 3 { "many" } else { "few" })
                })),
        )
        .unwrap();
    let store = Store::new(schema).unwrap();
    let channel = store.model("Channel").unwrap().insert(1).unwrap();

    let observing = Rc::new(Cell::new(true));
    let render = {
        let (steps, observing, channel) = (steps.clone(), observing.clone(), channel.clone());
        Rc::new(move |view: &View| -> StoreResult<()> {
            if observing.get() {
                let multiplicity = view.get(&channel, "multiplicity")?;
                push(&steps, format!("render {multiplicity}"));
            }
            Ok(())
        })
    };
    let observer = store.observe({
        let render = render.clone();
        move |view| render(view)
    });
    render(observer.view()).unwrap();
    assert_eq!(take(&steps), ["computing", "render few"]);
    assert!(store.is_observed(&channel, "multiplicity").unwrap());

    channel.set("count", 2).unwrap();
    assert_eq!(take(&steps), ["computing"]);
    channel.set("count", 5).unwrap();
    assert_eq!(take(&steps), ["computing", "render many"]);

    observing.set(false);
    channel.set("count", 6).unwrap();
    assert_eq!(take(&steps), ["computing"]);
    channel.set("count", 7).unwrap();
    assert_eq!(take(&steps), ["computing"]);
    channel.set("count", 1).unwrap();
    assert_eq!(take(&steps), ["computing"]);
    assert!(!store.is_observed(&channel, "multiplicity").unwrap());

    channel.set("count", 0).unwrap();
    channel.set("count", 7).unwrap();
    channel.set("count", 1).unwrap();
    assert!(take(&steps).is_empty());
    assert_eq!(channel.get("multiplicity").unwrap().to_string(), "few");
    assert_eq!(take(&steps), ["computing"]);

    observing.set(true);
    render(observer.view()).unwrap();
    assert_eq!(take(&steps), ["render few"]);
    channel.set("count", 7).unwrap();
    assert_eq!(take(&steps), ["computing", "render many"]);
}

#[test]
fn lazy_sort_resorts_while_observed() {
    let schema = Schema::new()
        .with(
            ModelDef::new("Thread", "id").field(Field::many("messages", "Message").sort(
                |left, right| {
                    let sequence = |message: &Record| -> StoreResult<i64> {
                        Ok(message.get("sequence")?.as_int().unwrap_or_default())
                    };
                    Ok(sequence(left)?.cmp(&sequence(right)?))
                },
            )),
        )
        .unwrap()
        .with(ModelDef::new("Message", "id").field(Field::attr("sequence")))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let thread = store.model("Thread").unwrap().insert(1).unwrap();
    let list = thread.many("messages").unwrap();
    let pushed = list
        .push([
            Data::new().field("id", 1).field("sequence", 1),
            Data::new().field("id", 2).field("sequence", 2),
        ])
        .unwrap();
    assert_eq!(joined_ids(&list.records().unwrap()), "1,2");

    let steps = Steps::default();
    let observing = Rc::new(Cell::new(true));
    let render = {
        let (steps, observing, thread) = (steps.clone(), observing.clone(), thread.clone());
        Rc::new(move |view: &View| -> StoreResult<()> {
            if observing.get() {
                let messages = view.records(&thread, "messages")?;
                push(&steps, format!("render {}", joined_ids(&messages)));
            }
            Ok(())
        })
    };
    let observer = store.observe({
        let render = render.clone();
        move |view| render(view)
    });
    render(observer.view()).unwrap();
    let message = list.first().unwrap().unwrap();
    assert_eq!(take(&steps), ["render 1,2"]);

    message.set("sequence", 3).unwrap();
    assert_eq!(take(&steps), ["render 2,1"]);
    message.set("sequence", 4).unwrap();
    assert!(take(&steps).is_empty());
    message.set("sequence", 5).unwrap();
    assert!(take(&steps).is_empty());
    message.set("sequence", 1).unwrap();
    assert_eq!(take(&steps), ["render 1,2"]);

    let reversed = FieldValue::Many(vec![pushed[1].local_id(), pushed[0].local_id()]);
    observing.set(false);
    message.set("sequence", 10).unwrap();
    assert_eq!(thread.peek("messages").unwrap(), reversed);
    assert!(take(&steps).is_empty());
    message.set("sequence", 1).unwrap();
    assert_eq!(thread.peek("messages").unwrap(), reversed);
    assert_eq!(joined_ids(&list.records().unwrap()), "1,2");

    observing.set(true);
    render(observer.view()).unwrap();
    assert_eq!(take(&steps), ["render 1,2"]);
    message.set("sequence", 10).unwrap();
    assert_eq!(take(&steps), ["render 2,1"]);
}

#[test]
fn manual_sort_in_an_observer_tracks_what_it_compares() {
    let schema = Schema::new()
        .with(
            ModelDef::new("Thread", "id")
                .field(Field::many("messages", "Message").inverse("thread")),
        )
        .unwrap()
        .with(
            ModelDef::new("Message", "id")
                .field(Field::attr("body"))
                .field(Field::attr("author"))
                .field(Field::one("thread", "Thread").inverse("messages")),
        )
        .unwrap();
    let store = Store::new(schema).unwrap();
    let thread = store.model("Thread").unwrap().insert(1).unwrap();
    let messages = store
        .model("Message")
        .unwrap()
        .insert_many([
            Data::new().field("id", 1).field("body", "a").field("thread", &thread),
            Data::new().field("id", 2).field("body", "b").field("thread", &thread),
        ])
        .unwrap();
    let list = thread.many("messages").unwrap();

    let steps = Steps::default();
    let sort_messages = {
        let (steps, list) = (steps.clone(), list.clone());
        move |view: &View| -> StoreResult<()> {
            view.scope(|| {
                list.sort_by(|left, right| {
                    let (left, right) = (left.get("body")?, right.get("body")?);
                    Ok(if left.to_string() < right.to_string() {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    })
                })
            })?;
            push(&steps, "sortMessages");
            Ok(())
        }
    };
    let observer = store.observe(sort_messages.clone());
    assert_eq!(joined_ids(&list.records().unwrap()), "1,2");
    sort_messages(observer.view()).unwrap();
    assert_eq!(joined_ids(&list.records().unwrap()), "1,2");
    assert_eq!(take(&steps), ["sortMessages"]);

    messages[0].set("body", "c").unwrap();
    assert_eq!(joined_ids(&list.records().unwrap()), "2,1");
    assert_eq!(take(&steps), ["sortMessages", "sortMessages"]);
    messages[0].set("body", "d").unwrap();
    assert_eq!(joined_ids(&list.records().unwrap()), "2,1");
    assert_eq!(take(&steps), ["sortMessages"]);
    messages[0].set("author", "Jane").unwrap();
    assert_eq!(joined_ids(&list.records().unwrap()), "2,1");
    assert!(take(&steps).is_empty());

    store
        .model("Message")
        .unwrap()
        .insert(Data::new().field("id", 3).field("body", "c").field("thread", &thread))
        .unwrap();
    assert_eq!(joined_ids(&list.records().unwrap()), "2,3,1");
    assert_eq!(take(&steps), ["sortMessages", "sortMessages"]);

    messages[0].delete().unwrap();
    assert_eq!(joined_ids(&list.records().unwrap()), "2,3");
    assert_eq!(take(&steps), ["sortMessages"]);
}

#[test]
fn store_state_is_observable_from_every_handle() {
    let schema = Schema::new()
        .with(ModelDef::new("Thread", "name"))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let steps = Steps::default();
    let on_update = {
        let steps = steps.clone();
        move |view: &View| -> StoreResult<()> {
            push(&steps, format!("abc:{}", view.state("abc")));
            Ok(())
        }
    };
    let observer = store.observe(on_update.clone());
    on_update(observer.view()).unwrap();
    assert_eq!(take(&steps), ["abc:undefined"]);

    store.set_state("abc", 1).unwrap();
    assert_eq!(take(&steps), ["abc:1"]);
    let other = store.clone();
    other.set_state("abc", 2).unwrap();
    assert_eq!(take(&steps), ["abc:2"]);
    let thread = store.model("Thread").unwrap().insert("General").unwrap();
    thread.store().set_state("abc", 3).unwrap();
    assert_eq!(take(&steps), ["abc:3"]);

    store.set_state("abc", 3).unwrap();
    assert!(take(&steps).is_empty());
}

#[test]
fn on_change_reports_every_changing_call() {
    let schema = Schema::new()
        .with(ModelDef::new("Message", "id").field(Field::attr("body")))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let message = store.model("Message").unwrap().insert(1).unwrap();
    let steps = Steps::default();
    let guard = {
        let steps = steps.clone();
        message
            .on_change("body", move |_| {
                push(&steps, "BODY_CHANGED");
                Ok(())
            })
            .unwrap()
    };
    assert!(take(&steps).is_empty());

    message.assign(Data::new().field("body", "test1")).unwrap();
    message.set("body", "test2").unwrap();
    assert_eq!(take(&steps), ["BODY_CHANGED", "BODY_CHANGED"]);
    message.set("body", "test2").unwrap();
    assert!(take(&steps).is_empty());

    drop(guard);
    message.set("body", "test3").unwrap();
    assert!(take(&steps).is_empty());
    assert!(!store.is_observed(&message, "body").unwrap());
}

#[test]
fn observer_runs_once_per_batch() {
    let schema = Schema::new()
        .with(
            ModelDef::new("Persona", "name")
                .field(Field::attr("status"))
                .field(Field::attr("nickname")),
        )
        .unwrap();
    let store = Store::new(schema).unwrap();
    let john = store.model("Persona").unwrap().insert("John").unwrap();
    let steps = Steps::default();
    let render = {
        let (steps, john) = (steps.clone(), john.clone());
        move |view: &View| -> StoreResult<()> {
            let status = view.get(&john, "status")?;
            let nickname = view.get(&john, "nickname")?;
            push(&steps, format!("{status}/{nickname}"));
            Ok(())
        }
    };
    let observer = store.observe(render.clone());
    render(observer.view()).unwrap();
    assert!(observer.is_subscribed(&john, "status").unwrap());
    assert!(!observer.is_subscribed(&john, "name").unwrap());
    take(&steps);

    store
        .batch_update(|| {
            john.set("status", "away")?;
            john.set("nickname", "Johnny")?;
            john.set("status", "online")
        })
        .unwrap();
    assert_eq!(take(&steps), ["online/Johnny"]);
}

#[test]
fn dropped_observer_is_never_called() {
    let schema = Schema::new()
        .with(ModelDef::new("Persona", "name").field(Field::attr("status")))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let john = store.model("Persona").unwrap().insert("John").unwrap();
    let calls = Rc::new(Cell::new(0));
    let observer = {
        let calls = calls.clone();
        store.observe(move |_| {
            calls.set(calls.get() + 1);
            Ok(())
        })
    };
    observer.track(&john, "status").unwrap();
    assert!(store.is_observed(&john, "status").unwrap());

    john.set("status", "away").unwrap();
    assert_eq!(calls.get(), 1);
    observer.track(&john, "status").unwrap();
    drop(observer);
    john.set("status", "online").unwrap();
    assert_eq!(calls.get(), 1);
    assert!(!store.is_observed(&john, "status").unwrap());
}

#[test]
fn observer_owned_by_a_dropped_callback_stops_as_well() {
    let schema = Schema::new()
        .with(ModelDef::new("Persona", "name").field(Field::attr("status")))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let john = store.model("Persona").unwrap().insert("John").unwrap();
    let steps = Steps::default();
    let inner = {
        let (steps, john) = (steps.clone(), john.clone());
        store.observe(move |view| {
            push(&steps, format!("status={}", view.get(&john, "status")?));
            Ok(())
        })
    };
    inner.track(&john, "status").unwrap();
    let outer = store.observe(move |_| {
        let _owned = &inner;
        Ok(())
    });

    john.set("status", "away").unwrap();
    assert_eq!(take(&steps), ["status=away"]);
    assert!(store.is_observed(&john, "status").unwrap());

    drop(outer);
    assert!(!store.is_observed(&john, "status").unwrap());
    john.set("status", "online").unwrap();
    assert!(take(&steps).is_empty());
}

#[test]
fn failing_observer_fails_the_call_but_keeps_the_data() {
    let schema = Schema::new()
        .with(ModelDef::new("Persona", "name").field(Field::attr("status")))
        .unwrap();
    let store = Store::new(schema).unwrap();
    let john = store.model("Persona").unwrap().insert("John").unwrap();
    let observer = store.observe(|_| Err(StoreError::callback("render failed")));
    observer.track(&john, "status").unwrap();

    let err = john.set("status", "away").unwrap_err();
    assert_eq!(err, StoreError::callback("render failed"));
    assert_eq!(john.get("status").unwrap().to_string(), "away");
    assert!(!store.is_observed(&john, "status").unwrap());
}

#[test]
fn self_triggering_observer_hits_the_flush_limit() {
    let schema = Schema::new()
        .with(ModelDef::new("Thread", "name"))
        .unwrap();
    let config = StoreConfig {
        max_flush_jobs: 50,
        ..StoreConfig::default()
    };
    let store = Store::with_config(schema, config).unwrap();
    let bump = |view: &View| -> StoreResult<()> {
        let next = view.state("n").as_int().unwrap_or_default() + 1;
        view.store().set_state("n", next)
    };
    let observer = store.observe(bump);
    let err = bump(observer.view()).unwrap_err();
    assert_eq!(err, StoreError::FlushLimitExceeded(50));
    assert!(store.state("n").as_int().unwrap() > 1);
}
