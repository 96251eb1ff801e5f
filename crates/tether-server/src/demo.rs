//! Demo remote object and the model it mutates.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tether_core::{reflect_struct, Fields, Model, Node, Operations, Remote, Structure};
use tracing::info;

#[derive(Debug, Default)]
pub struct DetailsModel {
    model: Model,
    pub name: String,
}

impl DetailsModel {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            model: Model::new(),
            name: name.into(),
        }
    }
}

impl Structure for DetailsModel {
    fn declare(fields: &mut Fields<Self>) {
        fields.field("Name", |d| &d.name);
    }
}

reflect_struct!(DetailsModel, node = model);

#[derive(Debug, Default)]
pub struct EmbedModel {
    model: Model,
    pub name: String,
    pub more: DetailsModel,
}

impl Structure for EmbedModel {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .field("Name", |e| &e.name)
            .field("More", |e| &e.more);
    }
}

reflect_struct!(EmbedModel, node = model);

/// Root of the demo model.
#[derive(Debug, Default)]
pub struct DemoModel {
    model: Model,
    pub age: i64,
    pub details: Option<Box<DetailsModel>>,
    pub details2: Option<Box<DetailsModel>>,
    pub embed: EmbedModel,
    pub list: Vec<Option<Box<DetailsModel>>>,
}

impl Structure for DemoModel {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .field("Age", |m| &m.age)
            .field("Details", |m| &m.details)
            .field("Details2", |m| &m.details2)
            .field("Embed", |m| &m.embed)
            .field("List", |m| &m.list);
    }
}

reflect_struct!(DemoModel, node = model);

impl DemoModel {
    pub fn sample() -> Self {
        let mut model = Self {
            age: 42,
            details: Some(Box::new(DetailsModel::named("Joe"))),
            ..Self::default()
        };
        model.embed.name = "Embedded".to_string();
        model.embed.more.name = "Sub-Embedded".to_string();
        model.list = vec![
            Some(Box::new(DetailsModel::named("Elem 1"))),
            Some(Box::new(DetailsModel::named("Elem 2"))),
        ];
        model
    }
}

/// Operations callable from the client.
pub struct DemoRemote {
    model: Arc<Mutex<DemoModel>>,
}

impl DemoRemote {
    pub fn new(model: Arc<Mutex<DemoModel>>) -> Self {
        Self { model }
    }

    fn model(&self) -> MutexGuard<'_, DemoModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hello(&self, msg: String) -> String {
        info!("Hello: {}", msg);
        "Hello browser".to_string()
    }

    fn do_me(&self) {
        info!("DoMe called");
    }

    fn foo(&self) -> i64 {
        self.model().age
    }

    fn foo_err(&self, i: i64) -> Result<i64, String> {
        if i < 0 {
            return Err("Value is negative".to_string());
        }
        Ok(i * 2)
    }

    fn foo_arr(&self, i: i64, j: i64) -> (i64, i64) {
        (i + j, i * j)
    }

    fn foo_arr_err(&self, i: i64, j: i64) -> Result<(i64, i64), String> {
        if j == 0 {
            return Err("Division by zero".to_string());
        }
        Ok((i / j, i % j))
    }

    fn set_age(&self, age: i64) {
        let mut model = self.model();
        model.age = age;
        model.mark_dirty();
    }

    /// Rename a list element, or the details when `index` is negative.
    fn rename(&self, index: i64, name: String) -> Result<(), String> {
        let mut model = self.model();
        let target = match usize::try_from(index) {
            Err(_) => model.details.as_deref_mut(),
            Ok(i) => model.list.get_mut(i).and_then(|slot| slot.as_deref_mut()),
        };
        let Some(details) = target else {
            return Err(format!("No details at {}", index));
        };
        details.name = name;
        details.mark_dirty();
        Ok(())
    }

    fn push(&self, name: String) -> usize {
        let mut model = self.model();
        model.list.push(Some(Box::new(DetailsModel::named(name))));
        model.mark_dirty();
        model.list.len()
    }
}

impl Remote for DemoRemote {
    fn expose(ops: &mut Operations<Self>) {
        ops.add("Hello", DemoRemote::hello)
            .add("DoMe", DemoRemote::do_me)
            .add("Foo", DemoRemote::foo)
            .add("FooErr", DemoRemote::foo_err)
            .add("FooArr", DemoRemote::foo_arr)
            .add("FooArrErr", DemoRemote::foo_arr_err)
            .add("SetAge", DemoRemote::set_age)
            .add("Rename", DemoRemote::rename)
            .add("Push", DemoRemote::push);
    }
}
