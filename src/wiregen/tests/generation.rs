use quote::ToTokens;

use wiregen::config::{CodegenConfig, CompilerMode};
use wiregen::diagnostics::CollectingDiagnostics;
use wiregen::graph::{
    Binding, BindingGraph, BindingRequest, ComponentRequirement, GraphBuilder, Key, Scope,
};
use wiregen::output::TypeSpec;

fn key(source: &str) -> Key {
    Key::parse(source).unwrap()
}

fn path(source: &str) -> syn::Path {
    syn::parse_str(source).unwrap()
}

fn ty(source: &str) -> syn::Type {
    syn::parse_str(source).unwrap()
}

fn generate(graph: &BindingGraph, config: &CodegenConfig) -> TypeSpec {
    let mut diagnostics = CollectingDiagnostics::new();
    let generated = wiregen::codegen::generate(graph, config, &mut diagnostics).unwrap();
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.entries());
    generated
}

fn rendered(graph: &BindingGraph, config: &CodegenConfig) -> String {
    generate(graph, config).to_token_stream().to_string()
}

/// An unscoped provision chain: `Server` depends on `Config`.
fn simple_graph() -> BindingGraph {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
    builder.bind(
        root,
        Binding::injection(
            key("Server"),
            path("Server"),
            vec![BindingRequest::instance(key("Config"))],
        ),
    );
    builder.method(root, "server", BindingRequest::instance(key("Server")));
    builder.finish().unwrap()
}

fn cyclic_graph() -> BindingGraph {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(
        root,
        Binding::injection(key("A"), path("A"), vec![BindingRequest::provider(key("B"))])
            .with_scope(Scope::Singleton),
    );
    builder.bind(
        root,
        Binding::injection(key("B"), path("B"), vec![BindingRequest::provider(key("A"))])
            .with_scope(Scope::Singleton),
    );
    builder.method(root, "a", BindingRequest::instance(key("A")));
    builder.finish().unwrap()
}

#[test]
fn generation_is_deterministic() {
    let config = CodegenConfig::default();
    let first = rendered(&simple_graph(), &config);
    let second = rendered(&simple_graph(), &config);
    assert_eq!(first, second);

    let cyclic = CodegenConfig::default();
    assert_eq!(
        rendered(&cyclic_graph(), &cyclic),
        rendered(&cyclic_graph(), &cyclic)
    );
}

#[test]
fn an_unscoped_dependency_is_inlined_without_a_field() {
    let config = CodegenConfig::default();
    let output = rendered(&simple_graph(), &config);
    assert!(output.contains("Server :: new (Config :: new ())"));
    assert!(!output.contains("server_provider"));
    assert!(!output.contains("config_provider"));
}

#[test]
fn fast_init_providers_multiplex_through_a_switching_class() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
    builder.bind(
        root,
        Binding::injection(
            key("Server"),
            path("Server"),
            vec![BindingRequest::instance(key("Config"))],
        ),
    );
    builder.method(root, "server", BindingRequest::provider(key("Server")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::with_mode(CompilerMode::FastInit);
    let output = rendered(&graph, &config);
    assert!(output.contains("SwitchingProvider"));
    assert!(!output.contains("server_provider"));
}

#[test]
fn a_scoped_binding_gets_exactly_one_double_checked_field() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(
        root,
        Binding::injection(key("Config"), path("Config"), Vec::new())
            .with_scope(Scope::Singleton),
    );
    builder.method(root, "config", BindingRequest::instance(key("Config")));
    builder.method(root, "config_provider", BindingRequest::provider(key("Config")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let generated = generate(&graph, &config);
    let provider_fields = generated
        .fields
        .iter()
        .filter(|field| field.name.to_string().contains("config_provider"))
        .count();
    assert_eq!(provider_fields, 1);

    let output = generated.to_token_stream().to_string();
    assert_eq!(output.matches("DoubleCheck :: provider").count(), 1);
}

#[test]
fn generation_terminates_on_a_cycle_with_one_delegate_indirection() {
    let config = CodegenConfig::default();
    let output = rendered(&cyclic_graph(), &config);
    assert_eq!(output.matches("DelegateProvider :: new").count(), 1);
    assert_eq!(output.matches("set_delegate").count(), 1);
}

#[test]
fn representations_are_not_rebuilt_when_requests_revisit_keys() {
    let graph = cyclic_graph();
    let config = CodegenConfig::default();
    let mut diagnostics = CollectingDiagnostics::new();
    let mut generator = wiregen::codegen::Generator::new(&graph, &config, &mut diagnostics);
    generator.generate().unwrap();

    // (A, instance), (A, provider), (B, provider): the cyclic revisits of A
    // and B reuse the cached representations.
    assert_eq!(generator.representations_created(), 3);
}

#[test]
fn initialization_methods_respect_the_statement_ceiling() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    for at in 0..7 {
        let name = format!("T{at}");
        builder.bind(
            root,
            Binding::injection(key(&name), path(&name), Vec::new()).with_scope(Scope::Singleton),
        );
        builder.method(root, &format!("t{at}"), BindingRequest::instance(key(&name)));
    }
    let graph = builder.finish().unwrap();

    let mut config = CodegenConfig::default();
    config.statements_per_init_method = 3;
    let generated = generate(&graph, &config);

    let initializers: Vec<String> = generated
        .methods
        .iter()
        .map(|method| method.name.to_string())
        .filter(|name| name.starts_with("initialize"))
        .collect();
    assert_eq!(initializers, vec!["initialize", "initialize2", "initialize3"]);
    let statements: usize = generated
        .methods
        .iter()
        .filter(|method| method.name.to_string().starts_with("initialize"))
        .map(|method| method.body.len())
        .sum();
    assert_eq!(statements, 7);
}

#[test]
fn shards_only_reach_backward_into_earlier_shards() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    for at in 0..9 {
        let name = format!("T{at}");
        let dependencies = if at == 0 {
            Vec::new()
        } else {
            vec![BindingRequest::instance(key(&format!("T{}", at - 1)))]
        };
        builder.bind(
            root,
            Binding::injection(key(&name), path(&name), dependencies)
                .with_scope(Scope::Singleton),
        );
    }
    builder.method(root, "t8", BindingRequest::instance(key("T8")));
    let graph = builder.finish().unwrap();

    let mut config = CodegenConfig::default();
    config.keys_per_shard = 3;
    let generated = generate(&graph, &config);

    let shard_names: Vec<String> = generated
        .nested
        .iter()
        .map(|nested| nested.name.to_string())
        .filter(|name| name.starts_with("Shard"))
        .collect();
    assert_eq!(shard_names, vec!["Shard1", "Shard2"]);

    for nested in &generated.nested {
        let name = nested.name.to_string();
        let Some(index) = name.strip_prefix("Shard").and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };
        let body = nested.to_token_stream().to_string();
        for later in (index + 1)..=shard_names.len() {
            assert!(
                !body.contains(&format!(". shard{later} .")),
                "{name} should not reach forward into shard{later}"
            );
        }
    }
}

#[test]
fn shard_instantiation_follows_shard_order() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    for at in 0..9 {
        let name = format!("T{at}");
        let dependencies = if at == 0 {
            Vec::new()
        } else {
            vec![BindingRequest::instance(key(&format!("T{}", at - 1)))]
        };
        builder.bind(
            root,
            Binding::injection(key(&name), path(&name), dependencies)
                .with_scope(Scope::Singleton),
        );
    }
    builder.method(root, "t8", BindingRequest::instance(key("T8")));
    let graph = builder.finish().unwrap();

    let mut config = CodegenConfig::default();
    config.keys_per_shard = 3;
    let generated = generate(&graph, &config);

    let constructor = generated
        .methods
        .iter()
        .find(|method| method.name == "new")
        .unwrap();
    let body: Vec<String> = constructor.body.iter().map(ToString::to_string).collect();
    let position = |needle: &str| body.iter().position(|statement| statement.contains(needle));
    if let (Some(first), Some(second)) =
        (position("Shard1 :: new"), position("Shard2 :: new"))
    {
        assert!(first < second);
    } else {
        panic!("both shards should be instantiated from the component constructor");
    }
}

#[test]
fn module_provision_flows_through_the_creator() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.require(root, ComponentRequirement::module(ty("HttpModule")));
    builder.bind(
        root,
        Binding::provision(
            key("Client"),
            ty("HttpModule"),
            syn::parse_str("client").unwrap(),
            Vec::new(),
        ),
    );
    builder.method(root, "client", BindingRequest::instance(key("Client")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let generated = generate(&graph, &config);
    assert!(generated
        .fields
        .iter()
        .any(|field| field.name == "http_module"));
    assert!(generated
        .nested
        .iter()
        .any(|nested| nested.name == "AppComponentBuilder"));

    let output = generated.to_token_stream().to_string();
    assert!(output.contains("self . http_module . client ()"));
}

#[test]
fn subcomponents_reach_inherited_bindings_through_the_parent() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    let child = builder.component(root, "RequestComponent");
    builder.bind(
        root,
        Binding::injection(key("Config"), path("Config"), Vec::new())
            .with_scope(Scope::Singleton),
    );
    builder.bind(
        root,
        Binding::subcomponent_creator(key("RequestComponentBuilder"), "RequestComponent"),
    );
    builder.method(
        root,
        "request_component",
        BindingRequest::instance(key("RequestComponentBuilder")),
    );
    builder.bind(
        child,
        Binding::injection(
            key("Handler"),
            path("Handler"),
            vec![BindingRequest::instance(key("Config"))],
        ),
    );
    builder.method(child, "handler", BindingRequest::instance(key("Handler")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let generated = generate(&graph, &config);
    let output = generated.to_token_stream().to_string();
    assert!(output.contains("RequestComponentImpl"));
    assert!(output.contains("self . parent . config_provider"));
    assert!(output.contains("RequestComponentBuilder :: new"));
}

#[test]
fn members_injection_methods_assign_each_site() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
    builder.bind(
        root,
        Binding::members_injection(
            key("Activity"),
            vec![(
                syn::parse_str("config").unwrap(),
                BindingRequest::instance(key("Config")),
            )],
        ),
    );
    builder.method(
        root,
        "inject_activity",
        BindingRequest::members_injection(key("Activity")),
    );
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let output = rendered(&graph, &config);
    assert!(output.contains("instance . config = Config :: new ()"));
    assert!(output.contains("& mut Activity"));
}

#[test]
fn duplicate_entry_point_signatures_are_emitted_once() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
    // The same structural signature declared by two supertypes.
    builder.method(root, "config", BindingRequest::instance(key("Config")));
    builder.method(root, "config", BindingRequest::instance(key("Config")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let generated = generate(&graph, &config);
    let implementations = generated
        .methods
        .iter()
        .filter(|method| method.name == "config")
        .count();
    assert_eq!(implementations, 1);
}

#[test]
fn multibindings_and_optionals_inline_their_contributions() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(root, Binding::injection(key("GetHandler"), path("GetHandler"), Vec::new()));
    builder.bind(root, Binding::injection(key("PutHandler"), path("PutHandler"), Vec::new()));
    builder.bind(
        root,
        Binding::multibound_map(
            key("std::collections::HashMap<&'static str, Handler>"),
            vec![
                ("get".to_owned(), BindingRequest::instance(key("GetHandler"))),
                ("put".to_owned(), BindingRequest::instance(key("PutHandler"))),
            ],
        ),
    );
    builder.bind(
        root,
        Binding::optional_present(
            key("Option<GetHandler>"),
            BindingRequest::instance(key("GetHandler")),
        ),
    );
    builder.method(
        root,
        "handlers",
        BindingRequest::instance(key("std::collections::HashMap<&'static str, Handler>")),
    );
    builder.method(
        root,
        "maybe_handler",
        BindingRequest::instance(key("Option<GetHandler>")),
    );
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let output = rendered(&graph, &config);
    assert!(output.contains("HashMap :: from"));
    assert!(output.contains("\"get\""));
    assert!(output.contains("Some (GetHandler :: new ())"));
}

#[test]
fn name_collisions_with_generated_members_are_reported() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
    builder.method(root, "new", BindingRequest::instance(key("Config")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let mut diagnostics = CollectingDiagnostics::new();
    wiregen::codegen::generate(&graph, &config, &mut diagnostics).unwrap();
    assert!(diagnostics.has_errors());
}

#[test]
fn bound_instances_resolve_through_requirement_fields() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.require(root, ComponentRequirement::bound_instance(key("AppConfig")));
    builder.bind(root, Binding::bound_instance(key("AppConfig")));
    builder.method(root, "config", BindingRequest::instance(key("AppConfig")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let generated = generate(&graph, &config);
    assert!(generated
        .fields
        .iter()
        .any(|field| field.name == "app_config"));

    let creator = generated
        .nested
        .iter()
        .find(|nested| nested.name == "AppComponentBuilder")
        .unwrap();
    assert!(creator
        .methods
        .iter()
        .any(|method| method.name == "app_config"));

    let output = generated.to_token_stream().to_string();
    assert!(output.contains("pub fn config (& self ,) -> AppConfig { self . app_config }"));
}

#[test]
fn lazy_requests_wrap_the_provider_representation() {
    let mut builder = GraphBuilder::new("AppComponent");
    let root = builder.root();
    builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
    builder.method(root, "lazy_config", BindingRequest::lazy(key("Config")));
    let graph = builder.finish().unwrap();

    let config = CodegenConfig::default();
    let output = rendered(&graph, &config);
    assert!(output.contains("Lazy :: new (ConfigFactory :: create ())"));
}
