//! Directory-tree loading against an in-memory route table.

use std::sync::Arc;

use fs_router::http::{HttpServer, Limits};
use fs_router::routing::{
    Conventions, HookName, HttpMethod, LoadError, LoadWarning, RegistrationError, RouteLoader, RoutePrefix,
    RouteTable, SchemaTarget,
};
use serde_json::json;

mod common;

use common::{tracing_registry, RouteTree, Trace};

async fn load(tree: &RouteTree, trace: &Trace) -> Result<(RouteTable, fs_router::routing::LoadReport), LoadError> {
    let loader = RouteLoader::new(Conventions::default(), Arc::new(tracing_registry(trace)));
    let mut table = RouteTable::new();
    let report = loader
        .load(tree.root(), RoutePrefix::root(), Vec::new(), &mut table)
        .await?;
    Ok((table, report))
}

#[tokio::test]
async fn test_root_handler_gets_setting_hooks() {
    let tree = RouteTree::new();
    tree.file("get.toml", "default = \"ok\"\n")
        .file("setting.toml", "onRequest = \"a\"\n");

    let (table, report) = load(&tree, &Trace::default()).await.unwrap();
    assert_eq!(report.routes, 1);

    let route = table.find(HttpMethod::Get, "/").unwrap();
    assert_eq!(table.effective_hooks(route).names(HookName::OnRequest), vec!["a"]);
}

#[tokio::test]
async fn test_subdirectory_becomes_prefix() {
    let tree = RouteTree::new();
    tree.file("users/post.json", r#"{"default": "ok"}"#);

    let (table, _) = load(&tree, &Trace::default()).await.unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.routes()[0].method, HttpMethod::Post);
    assert_eq!(table.routes()[0].prefix.to_string(), "/users");
}

#[tokio::test]
async fn test_unknown_verb_warns_and_skips() {
    let tree = RouteTree::new();
    tree.file("weird.toml", "default = \"ok\"\n");

    let (table, report) = load(&tree, &Trace::default()).await.unwrap();
    assert!(table.is_empty());
    assert!(matches!(
        report.warnings.as_slice(),
        [LoadWarning::UnsupportedMethod { method, .. }] if method == "WEIRD"
    ));
}

#[tokio::test]
async fn test_method_names_are_case_insensitive() {
    let tree = RouteTree::new();
    tree.file("Get.toml", "default = \"ok\"\n")
        .file("PROPFIND.json", r#"{"default": "ok"}"#);

    let (table, _) = load(&tree, &Trace::default()).await.unwrap();
    assert!(table.find(HttpMethod::Get, "/").is_some());
    assert!(table.find(HttpMethod::Propfind, "/").is_some());
}

#[tokio::test]
async fn test_skip_marker_hides_files_and_directories() {
    let tree = RouteTree::new();
    tree.file("get.skip.toml", "this is not even toml = = =")
        .file("setting.skip.toml", "onRequest = \"a\"\n")
        .file("drafts.skip./get.toml", "default = \"ok\"\n")
        .file("post.toml", "default = \"ok\"\n");

    let (table, report) = load(&tree, &Trace::default()).await.unwrap();
    assert_eq!(table.len(), 1);
    assert!(report.warnings.is_empty());
    let route = table.find(HttpMethod::Post, "/").unwrap();
    assert!(table.effective_hooks(route).is_empty());
}

#[tokio::test]
async fn test_ancestor_hooks_precede_descendant_and_group_hooks() {
    let tree = RouteTree::new();
    tree.file("setting.toml", "onRequest = \"a\"\n")
        .file("users/setting.toml", "onRequest = \"b\"\n")
        .file(
            "users/:id/get.toml",
            r#"
default = "ok"

["$audit"]
onRequest = "d"

["$audit"."$nested"]
onRequest = "a"
"#,
        )
        .file("users/:id/post.toml", "default = \"ok\"\nonRequest = [\"c\", \"d\"]\n")
        .file("other/get.toml", "default = \"ok\"\n");

    let (table, _) = load(&tree, &Trace::default()).await.unwrap();

    let get = table.find(HttpMethod::Get, "/users/:id").unwrap();
    assert_eq!(table.effective_hooks(get).names(HookName::OnRequest), vec!["a", "b", "d", "a"]);

    let post = table.find(HttpMethod::Post, "/users/:id").unwrap();
    assert_eq!(table.effective_hooks(post).names(HookName::OnRequest), vec!["a", "b", "c", "d"]);

    let other = table.find(HttpMethod::Get, "/other").unwrap();
    assert_eq!(table.effective_hooks(other).names(HookName::OnRequest), vec!["a"]);
}

#[tokio::test]
async fn test_own_hooks_come_before_groups_regardless_of_key_order() {
    let tree = RouteTree::new();
    tree.file(
        "get.json",
        r#"{"$first": {"preHandler": "b"}, "preHandler": "a", "$second": {"preHandler": "c"}, "default": "ok"}"#,
    );

    let (table, _) = load(&tree, &Trace::default()).await.unwrap();
    let route = table.find(HttpMethod::Get, "/").unwrap();
    assert_eq!(route.hooks.names(HookName::PreHandler), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_schema_merges_own_group_and_inherited() {
    let tree = RouteTree::new();
    tree.file(
        "setting.toml",
        r#"
[schema.headers]
type = "object"
required = ["x-tenant"]
"#,
    )
    .file(
        "items/post.toml",
        r#"
default = "ok"

[schema.body]
type = "object"
required = ["name"]

["$paging".schema.querystring.properties.page]
type = "integer"
"#,
    )
    .file("items/get.toml", "default = \"ok\"\n");

    let (table, _) = load(&tree, &Trace::default()).await.unwrap();

    let post = table.find(HttpMethod::Post, "/items").unwrap();
    let schema = post.schema.as_ref().unwrap();
    assert_eq!(schema.get(SchemaTarget::Body).unwrap()["required"], json!(["name"]));
    assert_eq!(
        schema.get(SchemaTarget::Querystring).unwrap(),
        &json!({"properties": {"page": {"type": "integer"}}})
    );
    assert_eq!(schema.get(SchemaTarget::Headers).unwrap()["required"], json!(["x-tenant"]));

    // Only the inherited fragment applies to the sibling.
    let get = table.find(HttpMethod::Get, "/items").unwrap();
    let schema = get.schema.as_ref().unwrap();
    assert!(schema.get(SchemaTarget::Body).is_none());
    assert!(schema.get(SchemaTarget::Headers).is_some());
}

#[tokio::test]
async fn test_no_fragments_means_no_schema() {
    let tree = RouteTree::new();
    tree.file("get.toml", "default = \"ok\"\n");

    let (table, _) = load(&tree, &Trace::default()).await.unwrap();
    assert!(table.routes()[0].schema.is_none());
}

#[tokio::test]
async fn test_unknown_keys_warn() {
    let tree = RouteTree::new();
    tree.file("get.toml", "default = \"ok\"\nonRequets = \"a\"\ncolour = 1\n");

    let (table, report) = load(&tree, &Trace::default()).await.unwrap();
    assert_eq!(table.len(), 1);
    match report.warnings.as_slice() {
        [LoadWarning::InvalidKeys { keys, .. }] => assert_eq!(keys, &vec!["onRequets".to_string(), "colour".to_string()]),
        other => panic!("unexpected warnings: {:?}", other),
    }
}

#[tokio::test]
async fn test_hard_failures_abort_the_load() {
    let tree = RouteTree::new();
    tree.file("ok/get.toml", "default = \"ok\"\n")
        .file("zz/deeper/get.toml", "default = \"nobody\"\n");
    let err = load(&tree, &Trace::default()).await.unwrap_err();
    assert!(matches!(err, LoadError::UnknownHandler { ref name, .. } if name == "nobody"));

    let tree = RouteTree::new();
    tree.file("setting.toml", "onSend = \"missing\"\n");
    let err = load(&tree, &Trace::default()).await.unwrap_err();
    assert!(matches!(err, LoadError::UnknownHook { hook: HookName::OnSend, .. }));

    let tree = RouteTree::new();
    tree.file("get.json", "{ not json");
    let err = load(&tree, &Trace::default()).await.unwrap_err();
    assert!(matches!(err, LoadError::Json { .. }));

    let tree = RouteTree::new();
    tree.file("get.toml", "onRequest = \"a\"\n");
    let err = load(&tree, &Trace::default()).await.unwrap_err();
    assert!(matches!(err, LoadError::MissingHandler { .. }));
}

#[tokio::test]
async fn test_duplicate_route_across_formats_fails() {
    let tree = RouteTree::new();
    tree.file("get.json", r#"{"default": "ok"}"#)
        .file("get.toml", "default = \"ok\"\n");
    let err = load(&tree, &Trace::default()).await.unwrap_err();
    assert!(matches!(err, LoadError::Registration { .. }));
}

#[tokio::test]
async fn test_unroutable_directory_names_fail_the_load() {
    for name in ["*rest", ":", "a{b", "{x}", "x}"] {
        let tree = RouteTree::new();
        tree.file(&format!("{}/get.toml", name), "default = \"ok\"\n");
        let err = load(&tree, &Trace::default()).await.unwrap_err();
        assert!(
            matches!(
                err,
                LoadError::Registration {
                    source: RegistrationError::InvalidSegment { ref segment, .. },
                    ..
                } if segment == name
            ),
            "{}: {:?}",
            name,
            err
        );
    }
}

#[tokio::test]
async fn test_param_names_must_agree_at_every_depth() {
    let tree = RouteTree::new();
    tree.file("users/:id/get.toml", "default = \"ok\"\n")
        .file("users/:name/posts/get.toml", "default = \"ok\"\n");
    let err = load(&tree, &Trace::default()).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::Registration {
            source: RegistrationError::ParamConflict { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_loaded_tree_compiles_into_a_router() {
    let tree = RouteTree::new();
    tree.file("users/:id/get.toml", "default = \"ok\"\n")
        .file("users/:id/posts/get.toml", "default = \"ok\"\n")
        .file("users/me/get.toml", "default = \"ok\"\n");
    let (table, _) = load(&tree, &Trace::default()).await.unwrap();
    assert_eq!(table.len(), 3);

    let limits = Limits {
        request_timeout: std::time::Duration::from_secs(1),
        max_body_bytes: 1024,
    };
    HttpServer::new(&table, limits);
}

#[tokio::test]
async fn test_bundled_demo_tree_loads() {
    let config_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/router.toml");
    let config = fs_router::config::load_config(&config_path).unwrap();

    let (table, report) =
        fs_router::lifecycle::startup::load_routes(&config.routes, Arc::new(fs_router::registry::builtin()))
            .await
            .unwrap();
    assert_eq!(report.routes, 7);
    assert!(report.warnings.is_empty());
    assert!(table.find(HttpMethod::Propfind, "/files").is_some());
    assert!(table.find(HttpMethod::Put, "/files").is_none());

    let post = table.find(HttpMethod::Post, "/users").unwrap();
    let hooks = table.effective_hooks(post);
    assert_eq!(hooks.names(HookName::OnRequest), vec!["log_request", "timer.start"]);
    assert_eq!(hooks.names(HookName::OnResponse), vec!["timer.log", "log_request"]);
}
