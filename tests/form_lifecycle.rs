use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde_json::{Value, json};

use formulary::{
    EmitEvent, EntryId, EventBus, EventKind, FieldDef, FieldView, FormBuilder, FormController, JsonSchema,
    ListDef, Schema, Validation, ValidationErrors,
};

#[derive(Clone, Default)]
struct Log(Rc<RefCell<Vec<Value>>>);

impl Log {
    fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    fn values(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    fn len(&self) -> usize {
        self.0.borrow().len()
    }
}

fn login_schema() -> Rc<JsonSchema> {
    Rc::new(
        JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "login": {"type": "string"},
                "password": {"type": "string"}
            },
            "required": ["login", "password"]
        }))
        .unwrap(),
    )
}

fn title_schema() -> Rc<JsonSchema> {
    Rc::new(
        JsonSchema::new(json!({
            "type": "object",
            "properties": {"title": {"type": "string"}},
            "required": ["title"]
        }))
        .unwrap(),
    )
}

fn title_form(submitted: &Log) -> Rc<FormController> {
    let submitted = submitted.clone();
    let form = FormBuilder::new()
        .schema(title_schema())
        .field(FieldDef::leaf("title"))
        .on_submit(move |model| submitted.push(model.clone()))
        .build();
    form.mount();
    form
}

#[test]
fn empty_login_reports_both_fields_once() {
    let submitted = Log::default();
    let rejected = Log::default();
    let on_submit = submitted.clone();
    let on_error = rejected.clone();
    let form = FormBuilder::new()
        .schema(login_schema())
        .field(FieldDef::leaf("login"))
        .field(FieldDef::leaf("password"))
        .on_submit(move |model| on_submit.push(model.clone()))
        .on_error(move |errors, _| on_error.push(errors.to_value()))
        .build();
    form.mount();

    form.events().submit();

    assert_eq!(submitted.len(), 0);
    assert_eq!(rejected.len(), 1);
    let errors = &rejected.values()[0];
    let keys: Vec<&String> = errors.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["login", "password"]);
    assert!(form.field("login").unwrap().has_error());
}

#[test]
fn reset_then_submit_submits_the_payload() {
    let submitted = Log::default();
    let form = title_form(&submitted);

    form.events().reset(Some(json!({"title": "new"})));
    form.events().submit();

    assert_eq!(submitted.values(), vec![json!({"title": "new"})]);
    assert_eq!(form.field("title").unwrap().value(), json!("new"));
}

#[test]
fn reset_clears_errors() {
    let submitted = Log::default();
    let form = title_form(&submitted);
    form.events().validate();
    assert!(!form.errors().is_empty());

    form.events().reset(Some(json!({"title": ""})));
    assert!(form.errors().is_empty());
}

#[test]
fn set_model_then_submit_keeps_existing_errors_until_validated() {
    let submitted = Log::default();
    let form = title_form(&submitted);
    form.events().validate();
    assert_eq!(form.errors().messages("title"), ["title is required".to_string()]);

    form.events().set_model(json!({"title": "new"}));
    assert_eq!(form.errors().messages("title"), ["title is required".to_string()]);
    assert_eq!(form.field("title").unwrap().value(), json!("new"));

    form.events().submit();
    assert_eq!(submitted.values(), vec![json!({"title": "new"})]);
}

#[test]
fn named_events_drive_the_form_like_typed_ones() {
    let submitted = Log::default();
    let form = title_form(&submitted);

    form.events().emit_named("setModel", json!({"title": "named"}));
    form.events().emit_named("submit", Value::Null);
    assert_eq!(submitted.values(), vec![json!({"title": "named"})]);
}

#[test]
fn reset_without_payload_uses_schema_defaults() {
    let submitted = Log::default();
    let on_submit = submitted.clone();
    let schema = JsonSchema::new(json!({
        "type": "object",
        "properties": {
            "title": {"type": "string", "default": "untitled"},
            "pages": {"type": "integer"}
        }
    }))
    .unwrap();
    let form = FormBuilder::new()
        .schema(Rc::new(schema))
        .model(json!({"title": "draft", "pages": 3}))
        .field(FieldDef::leaf("title"))
        .field(FieldDef::leaf("pages"))
        .on_submit(move |model| on_submit.push(model.clone()))
        .build();
    form.mount();

    form.events().reset(None);
    form.events().submit();
    assert_eq!(submitted.values(), vec![json!({"title": "untitled"})]);
}

#[test]
fn sync_schema_errors_are_displayed_unchanged() {
    let schema = login_schema();
    let model = json!({"login": "", "password": 7});
    let expected = schema.validate(&model).try_ready().unwrap();

    let form = FormBuilder::new()
        .schema(schema)
        .model(model)
        .field(FieldDef::leaf("login"))
        .field(FieldDef::leaf("password"))
        .build();
    form.mount();
    form.validate();

    assert_eq!(form.errors(), expected);
    assert_eq!(
        form.errors().messages("password"),
        ["password must be of type string, got integer".to_string()]
    );
}

#[tokio::test]
async fn delayed_custom_errors_follow_schema_errors() {
    let rejected = Log::default();
    let on_error = rejected.clone();
    let schema = JsonSchema::new(json!({
        "type": "object",
        "properties": {"login": {"type": "string", "minLength": 6}}
    }))
    .unwrap();
    let form = FormBuilder::new()
        .schema(Rc::new(schema))
        .model(json!({"login": "test2"}))
        .field(FieldDef::leaf("login"))
        .custom_validation(|_| {
            Validation::pending(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let mut errors = ValidationErrors::new();
                errors.push("login", "async validation failed");
                errors
            })
        })
        .on_error(move |errors, _| on_error.push(errors.to_value()))
        .build();
    form.mount();

    form.submit().await;

    assert_eq!(
        rejected.values(),
        vec![json!({"login": ["login must be at least 6 characters", "async validation failed"]})]
    );
    assert_eq!(form.field("login").unwrap().errors().len(), 2);
}

#[tokio::test]
async fn schema_async_validator_parks_until_settled() {
    let rejected = Log::default();
    let on_error = rejected.clone();
    let schema = JsonSchema::new(json!({
        "type": "object",
        "properties": {"login": {"type": "string"}}
    }))
    .unwrap()
    .with_async_validator("login", "async validation failed", |value| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        value == json!("test")
    });
    let form = FormBuilder::new()
        .schema(Rc::new(schema))
        .model(json!({"login": "test2"}))
        .field(FieldDef::leaf("login"))
        .on_error(move |errors, _| on_error.push(errors.to_value()))
        .build();
    form.mount();

    form.events().submit();
    assert!(form.has_pending());
    assert_eq!(rejected.len(), 0);

    form.settle().await;
    assert_eq!(rejected.values(), vec![json!({"login": ["async validation failed"]})]);
}

#[test]
fn unmount_removes_every_model_change_listener() {
    let bus = EventBus::new();
    let form = FormBuilder::new()
        .events(bus.clone())
        .field(FieldDef::leaf("title").on_model_change(|_, _| {}))
        .field(FieldDef::object(
            "publisher",
            vec![FieldDef::leaf("name").on_model_change(|_, _| {})],
        ))
        .field(FieldDef::List(
            ListDef::new("tags", FieldDef::leaf("tag").on_model_change(|_, _| {})),
        ))
        .model(json!({"tags": ["a", "b"]}))
        .build();

    form.mount();
    assert_eq!(bus.listener_count(&EventKind::ModelChange), 4);
    assert_eq!(bus.listener_count(&EventKind::Submit), 1);

    form.unmount();
    assert_eq!(bus.listener_count(&EventKind::ModelChange), 0);
    assert_eq!(bus.listener_count(&EventKind::Submit), 0);
}

#[test]
fn model_change_reaches_listeners_with_their_own_field() {
    let seen = Log::default();
    let sink = seen.clone();
    let form = FormBuilder::new()
        .field(FieldDef::leaf("title"))
        .field(FieldDef::leaf("description").on_model_change(move |change, field| {
            sink.push(json!({"name": change.name, "value": change.value, "listener": field.path()}));
        }))
        .build();
    form.mount();

    form.field("title").unwrap().change(json!("new title"));

    assert_eq!(
        seen.values(),
        vec![json!({"name": "form.title", "value": "new title", "listener": "form.description"})]
    );
}

#[test]
fn nested_change_notifies_a_sibling_twice() {
    let seen = Log::default();
    let sink = seen.clone();
    let form = FormBuilder::new()
        .field(FieldDef::object("publisher", vec![FieldDef::leaf("name")]))
        .field(FieldDef::leaf("title").on_model_change(move |change, _| {
            sink.push(json!(change.name));
        }))
        .build();
    form.mount();

    form.field("publisher.name").unwrap().change(json!("Tor"));

    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen.values(),
        vec![json!("form.publisher"), json!("form.publisher.name")]
    );
    assert_eq!(form.model(), json!({"publisher": {"name": "Tor"}}));
}

#[test]
fn emit_events_accept_one_or_many() {
    let form = FormBuilder::new()
        .field(FieldDef::leaf("title").on_emit(EmitEvent::new("clearTitle", |_, field| {
            field.change(json!(""));
        })))
        .field(FieldDef::leaf("subtitle").on_emit_events(vec![
            EmitEvent::new("clearTitle", |_, field| field.change(json!(""))),
            EmitEvent::new("fillSubtitle", |event, field| {
                field.change(event.payload().cloned().unwrap_or_default());
            }),
        ]))
        .model(json!({"title": "a", "subtitle": "b"}))
        .build();
    form.mount();

    form.events().emit_named("fillSubtitle", json!("filled"));
    assert_eq!(form.model(), json!({"title": "a", "subtitle": "filled"}));

    form.events().emit_named("clearTitle", Value::Null);
    assert_eq!(form.model(), json!({"title": "", "subtitle": ""}));

    form.unmount();
    assert_eq!(
        form.events()
            .listener_count(&EventKind::Custom("clearTitle".to_string())),
        0
    );
}

#[test]
fn field_callbacks_report_changes_and_errors() {
    let changes = Log::default();
    let errors = Log::default();
    let on_change = changes.clone();
    let on_error = errors.clone();
    let form = FormBuilder::new()
        .schema(title_schema())
        .field(
            FieldDef::leaf("title")
                .on_change(move |value| on_change.push(value.clone()))
                .on_error(move |messages| on_error.push(json!(messages))),
        )
        .build();
    form.mount();

    form.field("title").unwrap().change(json!("test"));
    assert_eq!(changes.values(), vec![json!("test")]);

    form.events().reset(Some(json!({"title": ""})));
    form.events().validate();
    assert_eq!(errors.values(), vec![json!(["title is required"])]);

    form.events().validate();
    assert_eq!(errors.len(), 1);
}

#[test]
fn message_change_rerenders_even_with_same_count() {
    let form = FormBuilder::new()
        .field(FieldDef::leaf("login"))
        .custom_validation(|model| {
            let mut errors = ValidationErrors::new();
            match model["login"].as_str() {
                Some("") | None => errors.push("login", "login is required"),
                Some(_) => errors.push("login", "login is taken"),
            }
            errors.into()
        })
        .build();
    form.mount();
    let login = form.field("login").unwrap();
    let initial = login.render_count();

    form.validate();
    let after_first = login.render_count();
    assert_eq!(after_first, initial + 1);

    form.validate();
    assert_eq!(login.render_count(), after_first);

    form.events().set_model(json!({"login": "taken"}));
    let after_model = login.render_count();
    assert_eq!(after_model, after_first + 1);

    form.validate();
    assert_eq!(login.errors(), vec!["login is taken"]);
    assert_eq!(login.render_count(), after_model + 1);
}

#[test]
fn subform_renders_without_a_wrapper() {
    let form = FormBuilder::new().subform(true).build();
    assert!(form.is_subform());
    assert!(!form.view().has_form_wrapper);
    assert!(FormBuilder::new().build().view().has_form_wrapper);
}

fn list_keys(form: &FormController) -> Vec<EntryId> {
    match form.view().fields[0].clone() {
        FieldView::List { items, .. } => items.iter().map(|item| item.key).collect(),
        other => panic!("expected a list view, got {:?}", other),
    }
}

#[test]
fn list_entries_keep_keys_in_the_view() {
    let schema = JsonSchema::new(json!({
        "type": "object",
        "properties": {
            "authors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"name": {"type": "string", "default": "anonymous"}},
                    "required": ["name"]
                }
            }
        }
    }))
    .unwrap();
    let form = FormBuilder::new()
        .schema(Rc::new(schema))
        .model(json!({"authors": [{"name": "Le Guin"}]}))
        .field(FieldDef::List(
            ListDef::new(
                "authors",
                FieldDef::object("author", vec![FieldDef::leaf("name")]),
            )
            .min_length(1),
        ))
        .build();
    form.mount();

    let authors = form.field("authors").unwrap();
    let list = authors.as_list().unwrap();
    assert!(list.add_list_element());
    assert_eq!(
        form.model(),
        json!({"authors": [{"name": "Le Guin"}, {"name": "anonymous"}]})
    );

    let before = list_keys(&form);

    form.field("authors.authors-1.name").unwrap().change(json!(""));
    form.validate();
    let view = form.view();
    let name = view.fields[0]
        .find("form.authors.authors-1.name")
        .unwrap();
    assert_eq!(name.errors(), ["name is required".to_string()]);

    assert!(list.remove_list_element(0));
    assert_eq!(list_keys(&form), before[1..].to_vec());
    assert!(!list.remove_list_element(0));
    assert_eq!(
        form.field("authors.authors-0.name").unwrap().value(),
        json!("")
    );
}
