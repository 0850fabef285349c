mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use support::MockServer;
use wirecall_client::{Api, Call, ClientConfig, Composer, Method, MethodSpec, RequestObject};
use wirecall_common::transform::{unsupported, Model, Schema, Transformer, TypeAdapter, Wire};
use wirecall_common::{Result, WirecallError};

#[derive(Debug, Default, Clone, PartialEq)]
struct NewUser {
    user_name: String,
    age: i64,
    email: Option<String>,
}

impl Model for NewUser {
    fn describe(schema: &mut Schema<'_, Self>) {
        schema
            .field("user_name", |m| &m.user_name, |m| &mut m.user_name)
            .field("age", |m| &m.age, |m| &mut m.age)
            .field_as("email", "mail", |m| &m.email, |m| &mut m.email);
    }
}

wirecall_common::wire_model!(NewUser);

struct Secret;

impl Wire for Secret {
    fn adapter(_transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Err(unsupported::<Self>())
    }
}

fn assert_composition<T: std::fmt::Debug>(result: Result<T>) {
    match result {
        Err(WirecallError::Composition(_)) => {}
        other => panic!("expected composition error, got {:?}", other),
    }
}

#[test]
fn test_names_are_derived_and_overridden() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let composer = client.composer();

    let method = composer
        .compose::<(i64, String), String>(
            MethodSpec::new("move_file")
                .param("file_id")
                .param_as("target_dir", "to"),
        )
        .unwrap();
    assert_eq!(method.name(), "moveFile");
    assert_eq!(method.bindings()[0].wire_name, "fileId");
    assert_eq!(method.bindings()[1].wire_name, "to");

    method.call((3, "/tmp".to_string())).unwrap().execute().unwrap();
    let received = server.received();
    assert_eq!(received[0].method, "moveFile");
    assert_eq!(received[0].param("fileId"), Some(&json!(3)));
    assert_eq!(received[0].param("to"), Some(&json!("/tmp")));

    let renamed = composer
        .compose::<(), String>(MethodSpec::new("list_all").wire_name("list"))
        .unwrap();
    assert_eq!(renamed.name(), "list");
}

#[test]
fn test_absent_arguments_are_omitted() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let search = client
        .composer()
        .compose::<(String, Option<i64>), String>(
            MethodSpec::new("search").param("query").param("limit"),
        )
        .unwrap();

    search.call(("rust".to_string(), None)).unwrap().execute().unwrap();
    search.call(("rust".to_string(), Some(5))).unwrap().execute().unwrap();

    let received = server.received();
    assert_eq!(received[0].params.len(), 1);
    assert_eq!(received[0].param("limit"), None);
    assert_eq!(received[1].param("limit"), Some(&json!(5)));
}

#[test]
fn test_request_object_fields_are_inlined() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let create = client
        .composer()
        .compose::<RequestObject<NewUser>, String>(MethodSpec::new("create_user").request_object())
        .unwrap();

    let user = NewUser {
        user_name: "ada".to_string(),
        age: 36,
        email: None,
    };
    assert_eq!(create.call(RequestObject(user)).unwrap().execute().unwrap(), "createUser");

    let received = server.received();
    assert_eq!(received[0].param("userName"), Some(&json!("ada")));
    assert_eq!(received[0].param("age"), Some(&json!(36)));
    assert!(!received[0].params.contains_key("mail"));
}

#[test]
fn test_model_response_decodes() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let echo = client
        .composer()
        .compose::<(BTreeMap<String, String>,), NewUser>(MethodSpec::new("echo").param("value"))
        .unwrap();

    let mut sent = BTreeMap::new();
    sent.insert("userName".to_string(), "grace".to_string());
    sent.insert("mail".to_string(), "g@example.com".to_string());
    let user = echo.call((sent,)).unwrap().execute().unwrap();
    assert_eq!(
        user,
        NewUser {
            user_name: "grace".to_string(),
            age: 0,
            email: Some("g@example.com".to_string()),
        }
    );
}

#[test]
fn test_arity_mismatch_is_rejected() {
    let server = MockServer::echo();
    let composer = server.client(ClientConfig::default()).composer();
    assert_composition(composer.compose::<(i64, i64), String>(MethodSpec::new("add").param("a")));
    assert_composition(composer.compose::<(), String>(MethodSpec::new("ping").param("extra")));
}

#[test]
fn test_duplicate_wire_names_are_rejected() {
    let server = MockServer::echo();
    let composer = server.client(ClientConfig::default()).composer();
    assert_composition(composer.compose::<(i64, i64), String>(
        MethodSpec::new("pair").param("user_id").param_as("other", "userId"),
    ));
}

#[test]
fn test_mixed_argument_forms_are_rejected() {
    let server = MockServer::echo();
    let composer = server.client(ClientConfig::default()).composer();
    assert_composition(composer.compose::<RequestObject<NewUser>, String>(
        MethodSpec::new("create").request_object().param("extra"),
    ));
    assert_composition(
        composer.compose::<RequestObject<NewUser>, String>(MethodSpec::new("create")),
    );
    assert_composition(
        composer.compose::<(i64,), String>(MethodSpec::new("create").request_object()),
    );
}

#[test]
fn test_request_object_needs_fields() {
    let server = MockServer::echo();
    let composer = server.client(ClientConfig::default()).composer();
    assert_composition(
        composer.compose::<RequestObject<i64>, i64>(MethodSpec::new("echo").request_object()),
    );
    assert_composition(
        composer.compose::<RequestObject<Vec<String>>, i64>(MethodSpec::new("echo").request_object()),
    );

    let by_map = composer
        .compose::<RequestObject<BTreeMap<String, i64>>, i64>(MethodSpec::new("echo").request_object())
        .unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("value".to_string(), 4);
    assert_eq!(by_map.call(RequestObject(fields)).unwrap().execute().unwrap(), 4);
}

#[test]
fn test_empty_method_name_is_rejected() {
    let server = MockServer::echo();
    let composer = server.client(ClientConfig::default()).composer();
    assert_composition(composer.compose::<(), String>(MethodSpec::new("")));
}

#[test]
fn test_unsupported_types_fail_at_composition() {
    let server = MockServer::echo();
    let composer = server.client(ClientConfig::default()).composer();
    assert_composition(composer.compose::<(Secret,), String>(MethodSpec::new("hide").param("secret")));
    assert_composition(composer.compose::<(), Secret>(MethodSpec::new("reveal")));
    assert_eq!(server.connects(), 0);
}

struct Users {
    create: Method<RequestObject<NewUser>, String>,
    count: Method<(), i64>,
}

impl Api for Users {
    fn compose(composer: &Composer) -> Result<Self> {
        Ok(Users {
            create: composer.compose(MethodSpec::new("create_user").request_object())?,
            count: composer.compose(MethodSpec::new("echo").param("value").wire_name("echo"))?,
        })
    }
}

#[test]
fn test_api_composition_fails_as_a_whole() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    // `count` declares a parameter its argument tuple does not have
    assert_composition(
        client
            .create::<Users>()
            .map(|users| (users.create.name().to_string(), users.count.name().to_string())),
    );
}

struct Stats {
    total: Method<(), String>,
}

impl Api for Stats {
    fn compose(composer: &Composer) -> Result<Self> {
        Ok(Stats {
            total: composer.compose(MethodSpec::new("total_count"))?,
        })
    }
}

#[test]
fn test_api_create() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let stats: Stats = client.create().unwrap();
    let call: Call<String> = stats.total.call(()).unwrap();
    assert_eq!(call.execute().unwrap(), "totalCount");
}
