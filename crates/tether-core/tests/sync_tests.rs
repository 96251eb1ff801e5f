//! Synchronization scenarios: snapshots, diffs and list edit scripts checked
//! against a client-side mirror.

use serde_json::{json, Value};
use tether_core::{encode_diff, reflect_struct, Fields, Mirror, Model, ModelState, Node, Structure};

#[derive(Default)]
struct Details {
    model: Model,
    name: String,
}

impl Details {
    fn named(name: &str) -> Option<Box<Details>> {
        Some(Box::new(Details {
            name: name.to_string(),
            ..Details::default()
        }))
    }
}

impl Structure for Details {
    fn declare(fields: &mut Fields<Self>) {
        fields.field("Name", |d| &d.name);
    }
}

reflect_struct!(Details, node = model);

#[derive(Default)]
struct MyModel {
    model: Model,
    age: i32,
    details: Option<Box<Details>>,
    details2: Option<Box<Details>>,
    list: Vec<Option<Box<Details>>>,
}

impl Structure for MyModel {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .field("Age", |m| &m.age)
            .field("Details", |m| &m.details)
            .field("Details2", |m| &m.details2)
            .field("List", |m| &m.list);
    }
}

reflect_struct!(MyModel, node = model);

#[derive(Default)]
struct AgeOnly {
    model: Model,
    age: i32,
}

impl Structure for AgeOnly {
    fn declare(fields: &mut Fields<Self>) {
        fields.field("Age", |m| &m.age);
    }
}

reflect_struct!(AgeOnly, node = model);

fn frame<M: tether_core::Reflect>(root: &M) -> String {
    let bytes = encode_diff(Some(root)).unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn details_json(details: &Option<Box<Details>>) -> Value {
    match details {
        Some(d) => json!({ "Name": d.name }),
        None => Value::Null,
    }
}

/// What the client should hold for `m`.
fn expected(m: &MyModel) -> Value {
    json!({
        "Age": m.age,
        "Details": details_json(&m.details),
        "Details2": details_json(&m.details2),
        "List": m.list.iter().map(details_json).collect::<Vec<_>>(),
    })
}

fn sync(mirror: &mut Mirror, m: &MyModel) -> String {
    let text = frame(m);
    mirror.apply_frame(&text).unwrap();
    assert_eq!(mirror.root(), &expected(m), "after frame {}", text);
    text
}

fn names(m: &MyModel) -> Vec<String> {
    m.list
        .iter()
        .map(|d| d.as_ref().map(|d| d.name.clone()).unwrap_or_default())
        .collect()
}

#[test]
fn test_snapshot_then_diff_then_nothing() {
    let mut m = AgeOnly {
        age: 42,
        ..AgeOnly::default()
    };
    assert_eq!(frame(&m), r#"{"m":{"$m":1,"Age":42}}"#);
    assert_eq!(m.model_state(), ModelState::Synced);

    m.age = 30;
    m.mark_dirty();
    assert_eq!(frame(&m), r#"{"m":{"Age":30}}"#);
    assert_eq!(frame(&m), r#"{"m":null}"#);
}

#[test]
fn test_full_snapshot_marks_every_new_node() {
    let m = MyModel {
        age: 42,
        details: Details::named("Joe"),
        list: vec![Details::named("A"), None],
        ..MyModel::default()
    };
    assert_eq!(
        frame(&m),
        r#"{"m":{"$m":1,"Age":42,"Details":{"$m":1,"Name":"Joe"},"Details2":null,"List":[{"$m":1,"Name":"A"},null]}}"#
    );
    assert_eq!(m.details.as_ref().unwrap().model_state(), ModelState::Synced);
}

#[test]
fn test_child_change_propagates_to_parent() {
    let mut mirror = Mirror::new();
    let mut m = MyModel {
        age: 1,
        details: Details::named("Joe"),
        ..MyModel::default()
    };
    sync(&mut mirror, &m);

    let details = m.details.as_mut().unwrap();
    details.name = "Ann".into();
    details.mark_dirty();
    assert_eq!(details.model_state(), ModelState::Dirty);
    assert_eq!(m.model_state(), ModelState::ChildDirty);

    // Own fields of a parent with only dirty children are left out.
    m.age = 99;
    let text = sync_without_check(&mut mirror, &m);
    assert_eq!(
        text,
        r#"{"m":{"Details":{"Name":"Ann"},"List":{"$a":[0],"$l":0}}}"#
    );
    assert_eq!(mirror.root()["Age"], json!(1));

    m.mark_dirty();
    sync(&mut mirror, &m);
}

fn sync_without_check(mirror: &mut Mirror, m: &MyModel) -> String {
    let text = frame(m);
    mirror.apply_frame(&text).unwrap();
    text
}

#[test]
fn test_new_node_does_not_propagate() {
    let m = MyModel {
        details: Details::named("Joe"),
        ..MyModel::default()
    };
    frame(&m);

    let fresh = Details::default();
    fresh.mark_dirty();
    assert_eq!(fresh.model_state(), ModelState::New);
    assert_eq!(m.model_state(), ModelState::Synced);
}

#[test]
fn test_moved_node_is_sent_as_new() {
    let mut mirror = Mirror::new();
    let mut m = MyModel {
        details: Details::named("Joe"),
        ..MyModel::default()
    };
    sync(&mut mirror, &m);

    m.details2 = m.details.take();
    m.mark_dirty();
    let text = sync(&mut mirror, &m);
    assert!(text.contains(r#""Details":null"#), "{}", text);
    assert!(text.contains(r#""Details2":{"$m":1,"Name":"Joe"}"#), "{}", text);
}

#[test]
fn test_list_insertions_around_kept_elements() {
    let mut mirror = Mirror::new();
    let mut m = MyModel {
        list: vec![Details::named("A"), Details::named("B")],
        ..MyModel::default()
    };
    sync(&mut mirror, &m);

    let mut old = std::mem::take(&mut m.list).into_iter();
    let a = old.next().unwrap();
    let b = old.next().unwrap();
    m.list = vec![
        Details::named("X"),
        a,
        b,
        Details::named("Y"),
        Details::named("Z"),
    ];
    m.mark_dirty();
    let text = sync(&mut mirror, &m);
    assert!(
        text.contains(
            r#""List":{"$a":[0,{"$m":1,"Name":"X"},{"$i":1},2,{"$m":1,"Name":"Y"},{"$m":1,"Name":"Z"},{"$i":2}],"$l":2}"#
        ),
        "{}",
        text
    );

    // Keep B and Y only.
    m.list.drain(0..2);
    m.list.truncate(2);
    m.mark_dirty();
    let text = sync(&mut mirror, &m);
    assert!(text.contains(r#""List":{"$a":[0,{"$d":2},2],"$l":4}"#), "{}", text);
    assert_eq!(names(&m), vec!["B", "Y"]);
}

#[test]
fn test_list_replaced_element_then_head_removed() {
    let mut mirror = Mirror::new();
    let mut m = MyModel {
        list: vec![Details::named("A"), Details::named("B")],
        ..MyModel::default()
    };
    sync(&mut mirror, &m);

    // A is swapped for a fresh copy, B is kept.
    let b = m.list.pop().unwrap();
    m.list = vec![
        Details::named("X"),
        Details::named("A"),
        b,
        Details::named("Y"),
        Details::named("Z"),
    ];
    m.mark_dirty();
    let text = sync(&mut mirror, &m);
    assert!(
        text.contains(
            r#""List":{"$a":[0,{"$m":1,"Name":"X"},{"$m":1,"Name":"A"},{"$i":1},1,{"$m":1,"Name":"Y"},{"$m":1,"Name":"Z"},{"$i":2}],"$l":2}"#
        ),
        "{}",
        text
    );

    m.list.remove(0);
    m.mark_dirty();
    let text = sync(&mut mirror, &m);
    assert!(text.contains(r#""List":{"$a":[0,{"$d":1},4],"$l":5}"#), "{}", text);
    assert_eq!(names(&m), vec!["A", "B", "Y", "Z"]);
}

#[test]
fn test_list_element_change_is_patched_in_place() {
    let mut mirror = Mirror::new();
    let mut m = MyModel {
        list: vec![Details::named("A"), Details::named("B")],
        ..MyModel::default()
    };
    sync(&mut mirror, &m);

    let first = m.list[0].as_mut().unwrap();
    first.name = "A2".into();
    first.mark_dirty();
    assert_eq!(m.model_state(), ModelState::ChildDirty);
    let text = sync(&mut mirror, &m);
    assert_eq!(text, r#"{"m":{"List":{"$a":[0,{"Name":"A2"},1],"$l":2}}}"#);
}

#[test]
fn test_list_reorder_and_removal() {
    let mut mirror = Mirror::new();
    let mut m = MyModel {
        list: vec![
            Details::named("A"),
            Details::named("B"),
            Details::named("C"),
        ],
        ..MyModel::default()
    };
    sync(&mut mirror, &m);

    m.list.swap(0, 2);
    m.mark_dirty();
    sync(&mut mirror, &m);
    assert_eq!(names(&m), vec!["C", "B", "A"]);

    m.list.remove(1);
    m.list.push(None);
    m.mark_dirty();
    sync(&mut mirror, &m);

    m.list.clear();
    m.mark_dirty();
    sync(&mut mirror, &m);
    assert_eq!(mirror.root()["List"], json!([]));
}

#[test]
fn test_shared_node_is_rejected() {
    struct Pair {
        model: Model,
        left: std::sync::Arc<Details>,
        right: std::sync::Arc<Details>,
    }

    impl Structure for Pair {
        fn declare(fields: &mut Fields<Self>) {
            fields
                .field("Left", |p| &p.left)
                .field("Right", |p| &p.right);
        }
    }

    reflect_struct!(Pair, node = model);

    let shared = std::sync::Arc::new(Details::default());
    let pair = Pair {
        model: Model::new(),
        left: shared.clone(),
        right: shared,
    };
    let err = encode_diff(Some(&pair)).unwrap_err();
    assert!(err.is_encoding_error());
    assert_eq!(pair.model_state(), ModelState::New);
}

#[derive(Default)]
struct EmbedModel {
    model: Model,
    name: String,
    more: Details,
}

impl Structure for EmbedModel {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .field("Name", |e| &e.name)
            .field("More", |e| &e.more);
    }
}

reflect_struct!(EmbedModel, node = model);

#[derive(Default)]
struct Outer {
    model: Model,
    age: i32,
    embed: EmbedModel,
}

impl Structure for Outer {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .field("Age", |o| &o.age)
            .field("Embed", |o| &o.embed);
    }
}

reflect_struct!(Outer, node = model);

#[test]
fn test_value_nodes_report_through_each_level() {
    let mut outer = Outer::default();
    outer.embed.name = "Embedded".into();
    outer.embed.more.name = "Sub-Embedded".into();
    assert_eq!(
        frame(&outer),
        r#"{"m":{"$m":1,"Age":0,"Embed":{"$m":1,"Name":"Embedded","More":{"$m":1,"Name":"Sub-Embedded"}}}}"#
    );

    outer.embed.more.name = "Subby".into();
    outer.embed.more.mark_dirty();
    assert_eq!(outer.embed.model_state(), ModelState::ChildDirty);
    assert_eq!(outer.model_state(), ModelState::ChildDirty);
    assert_eq!(frame(&outer), r#"{"m":{"Embed":{"More":{"Name":"Subby"}}}}"#);
    assert_eq!(frame(&outer), r#"{"m":null}"#);
}
