use std::cell::RefCell;
use std::sync::Arc;

use stylegraph::errors::StyleGraphError;
use stylegraph::graph::{DependencyGraph, NodeId};
use stylegraph::resolution::*;
use stylegraph::stylesheet::Syntax;
use stylegraph::types::ReloadOutcome;
use url::Url;

/// A memory resolver whose files can be edited after the graph is built.
#[derive(Debug)]
struct EditableResolver(RefCell<MemoryResolver>);

impl EditableResolver {
    fn write(&self, path: &str, contents: &str) {
        self.0.borrow_mut().insert(path, contents, Syntax::Scss);
    }

    fn delete(&self, path: &str) {
        self.0.borrow_mut().remove(path);
    }
}

impl Resolver for EditableResolver {
    fn canonicalize(&self, url: &str) -> Option<Url> {
        self.0.borrow().canonicalize(url)
    }

    fn load(&self, canonical_url: &Url) -> Option<ResolverResult> {
        self.0.borrow().load(canonical_url)
    }
}

/// Builds a graph over `app:` files, returning the editable resolver too.
fn setup(files: &[(&str, &str)]) -> (DependencyGraph, Arc<EditableResolver>) {
    let mut memory = MemoryResolver::new("app");
    for (path, contents) in files {
        memory.insert(path, contents, Syntax::for_path(path));
    }
    let resolver = Arc::new(EditableResolver(RefCell::new(memory)));
    let cache = ResolutionCache::new(vec![resolver.clone() as SharedResolver]);
    (DependencyGraph::new(cache), resolver)
}

fn url(path: &str) -> Url {
    Url::parse(&format!("app:///{path}")).unwrap()
}

fn id_of(graph: &DependencyGraph, path: &str) -> NodeId {
    graph
        .node_id(&url(path))
        .unwrap_or_else(|| panic!("{path} is not in the graph"))
}

/// Asserts that every upstream edge has its matching downstream back-edge.
fn assert_edges_consistent(graph: &DependencyGraph) {
    for node in graph.nodes() {
        for &up in node.upstream() {
            let upstream = graph.get(up).unwrap();
            assert!(
                upstream.downstream().contains(&node.id()),
                "{} missing from downstream of {}",
                node.canonical_url(),
                upstream.canonical_url()
            );
        }
    }
}

/// main -> a, b; a -> c; b -> c; top -> main
fn diamond() -> (DependencyGraph, Arc<EditableResolver>) {
    setup(&[
        ("top.scss", "@use \"main\";"),
        ("main.scss", "@use \"a\";\n@use \"b\";\n.x { color: red; }"),
        ("_a.scss", "@use \"c\";"),
        ("b.scss", "@forward \"c\";"),
        ("c.scss", "$c: 1;"),
    ])
}

#[test]
fn test_add_builds_every_transitive_import() {
    let (mut graph, _) = diamond();
    graph.add("app:main").unwrap();

    assert_eq!(graph.len(), 4);
    let main = graph.node(&url("main.scss")).unwrap();
    assert_eq!(main.upstream(), &[id_of(&graph, "_a.scss"), id_of(&graph, "b.scss")]);

    let c = graph.node(&url("c.scss")).unwrap();
    assert_eq!(c.downstream().len(), 2);
    assert!(c.downstream().contains(&id_of(&graph, "_a.scss")));
    assert!(c.downstream().contains(&id_of(&graph, "b.scss")));
    assert_edges_consistent(&graph);
}

#[test]
fn test_add_is_idempotent() {
    let (mut graph, _) = diamond();
    let first = graph.add("app:main").unwrap();
    let count = graph.len();

    let second = graph.add("app:main").unwrap();
    let third = graph.add("app:///main.scss").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(graph.len(), count);
}

#[test]
fn test_adding_a_second_root_reuses_shared_nodes() {
    let (mut graph, _) = diamond();
    graph.add("app:main").unwrap();
    let c = id_of(&graph, "c.scss");

    graph.add("app:top").unwrap();
    assert_eq!(graph.len(), 5);
    assert_eq!(id_of(&graph, "c.scss"), c);
    let main = graph.node(&url("main.scss")).unwrap();
    assert!(main.downstream().contains(&id_of(&graph, "top.scss")));
    assert_edges_consistent(&graph);
}

#[test]
fn test_unresolved_nested_import_is_omitted() {
    let (mut graph, _) = setup(&[
        ("main.scss", "@use \"missing\";\n@use \"a\";"),
        ("a.scss", ""),
    ]);

    graph.add("app:main").unwrap();

    let main = graph.node(&url("main.scss")).unwrap();
    assert_eq!(main.upstream(), &[id_of(&graph, "a.scss")]);
    assert_eq!(graph.len(), 2);
    assert_eq!(main.unresolved(), &["missing".to_string()]);
}

#[test]
fn test_unresolvable_root_fails_without_inserting() {
    let (mut graph, _) = diamond();

    let err = graph.add("app:nope").unwrap_err();
    assert!(matches!(err, StyleGraphError::NotFound { .. }));
    assert_eq!(err.to_string(), "stylesheet not found at app:nope");
    assert!(graph.is_empty());
}

#[test]
fn test_root_that_cannot_be_loaded_is_not_found() {
    /// Recognises everything, loads nothing.
    #[derive(Debug)]
    struct NoLoad;

    impl Resolver for NoLoad {
        fn canonicalize(&self, url: &str) -> Option<Url> {
            Url::parse(url).ok()
        }

        fn load(&self, _canonical_url: &Url) -> Option<ResolverResult> {
            None
        }
    }

    let mut graph = DependencyGraph::new(ResolutionCache::new(vec![Arc::new(NoLoad) as SharedResolver]));
    let err = graph.add("any:thing").unwrap_err();
    assert!(matches!(err, StyleGraphError::NotFound { .. }));
    assert!(graph.is_empty());
}

#[test]
fn test_nested_parse_error_fails_the_add() {
    let (mut graph, _) = setup(&[
        ("main.scss", "@use \"a\";"),
        ("a.scss", "@use \"unterminated;\n"),
    ]);

    let err = graph.add("app:main").unwrap_err();
    assert!(matches!(err, StyleGraphError::Parse { .. }));
    assert!(!graph.contains(&url("main.scss")));
}

#[test]
fn test_duplicate_imports_collapse_to_one_edge() {
    let (mut graph, _) = setup(&[
        ("main.scss", "@use \"a\";\n@import \"a\";"),
        ("a.scss", ""),
    ]);
    graph.add("app:main").unwrap();

    let main = id_of(&graph, "main.scss");
    assert_eq!(graph.get(main).unwrap().upstream().len(), 1);

    graph.detach(main);
    assert!(graph.node(&url("a.scss")).unwrap().downstream().is_empty());
}

#[test]
fn test_relative_imports_use_the_importers_resolver() {
    let app: SharedResolver = Arc::new(
        MemoryResolver::new("app")
            .with_file("main.scss", "@use \"./a\";\n@use \"lib:tools\";")
            .with_file("a.scss", ""),
    );
    let lib: SharedResolver = Arc::new(MemoryResolver::new("lib").with_file("_tools.scss", ""));
    let mut graph = DependencyGraph::new(ResolutionCache::new(vec![app.clone(), lib.clone()]));

    graph.add("app:main").unwrap();

    let a = graph.node(&url("a.scss")).unwrap();
    assert!(same_resolver(a.resolver(), &app));
    let tools = graph
        .node(&Url::parse("lib:///_tools.scss").unwrap())
        .unwrap();
    assert!(same_resolver(tools.resolver(), &lib));
}

#[test]
fn test_circular_import_is_an_error() {
    let (mut graph, _) = setup(&[("a.scss", "@use \"b\";"), ("b.scss", "@use \"a\";")]);

    let err = graph.add("app:a").unwrap_err();
    assert!(matches!(err, StyleGraphError::CircularImport { ref url } if url == "app:///a.scss"));
    assert!(graph.is_empty());
}

#[test]
fn test_self_import_is_circular() {
    let (mut graph, _) = setup(&[("a.scss", "@use \"a\";")]);
    assert!(matches!(
        graph.add("app:a"),
        Err(StyleGraphError::CircularImport { .. })
    ));
}

#[test]
fn test_circular_import_is_dropped_without_detection() {
    let (graph, _) = setup(&[("a.scss", "@use \"b\";"), ("b.scss", "@use \"a\";")]);
    let mut graph = graph.with_cycle_detection(false);

    graph.add("app:a").unwrap();

    let a = id_of(&graph, "a.scss");
    let b = id_of(&graph, "b.scss");
    assert_eq!(graph.get(a).unwrap().upstream(), &[b]);
    assert!(graph.get(b).unwrap().upstream().is_empty());
    assert_edges_consistent(&graph);
}

#[test]
fn test_detach_leaves_downstream_and_map_entry() {
    let (mut graph, _) = diamond();
    graph.add("app:top").unwrap();
    let main = id_of(&graph, "main.scss");
    let top = id_of(&graph, "top.scss");

    graph.detach(main);

    assert!(!graph.node(&url("_a.scss")).unwrap().downstream().contains(&main));
    assert!(!graph.node(&url("b.scss")).unwrap().downstream().contains(&main));
    let node = graph.node(&url("main.scss")).unwrap();
    assert!(node.downstream().contains(&top));
    assert_eq!(node.upstream().len(), 2);
}

#[test]
#[should_panic(expected = "missing from the downstream set")]
fn test_detaching_twice_is_an_invariant_violation() {
    let (mut graph, _) = diamond();
    graph.add("app:main").unwrap();
    let main = id_of(&graph, "main.scss");

    graph.detach(main);
    graph.detach(main);
}

#[test]
fn test_retire_then_add_creates_a_fresh_node() {
    let (mut graph, _) = diamond();
    graph.add("app:main").unwrap();
    let old = id_of(&graph, "main.scss");

    assert_eq!(graph.retire(&url("main.scss")), Some(old));
    assert!(graph.node(&url("main.scss")).is_none());
    assert!(graph.get(old).is_some());
    assert!(graph.node(&url("_a.scss")).unwrap().downstream().is_empty());

    graph.add("app:main").unwrap();
    let new = id_of(&graph, "main.scss");
    assert_ne!(old, new);
    assert!(graph.node(&url("_a.scss")).unwrap().downstream().contains(&new));
    assert_edges_consistent(&graph);
}

#[test]
fn test_reload_unchanged_keeps_edges() {
    let (mut graph, _) = diamond();
    graph.add("app:main").unwrap();
    let before = graph.node(&url("main.scss")).unwrap().upstream().to_vec();

    assert_eq!(graph.reload(&url("main.scss")).unwrap(), ReloadOutcome::Unchanged);
    assert_eq!(graph.node(&url("main.scss")).unwrap().upstream(), before.as_slice());
}

#[test]
fn test_reload_replaces_upstream_in_place() {
    let (mut graph, files) = diamond();
    graph.add("app:top").unwrap();
    let main = id_of(&graph, "main.scss");
    let top = id_of(&graph, "top.scss");

    files.write("main.scss", "@use \"c\";\n@use \"fresh\";");
    files.write("fresh.scss", "");
    assert_eq!(graph.reload(&url("main.scss")).unwrap(), ReloadOutcome::Updated);

    let node = graph.node(&url("main.scss")).unwrap();
    assert_eq!(node.id(), main);
    assert_eq!(node.upstream(), &[id_of(&graph, "c.scss"), id_of(&graph, "fresh.scss")]);
    assert!(node.downstream().contains(&top));
    assert!(!graph.node(&url("_a.scss")).unwrap().downstream().contains(&main));
    assert!(node.stylesheet().rules().len() == 2);
    assert_edges_consistent(&graph);
}

#[test]
fn test_reload_of_deleted_file_evicts_it() {
    let (mut graph, files) = diamond();
    graph.add("app:main").unwrap();
    let c = id_of(&graph, "c.scss");

    files.delete("c.scss");
    assert_eq!(graph.reload(&url("c.scss")).unwrap(), ReloadOutcome::Removed);
    assert!(!graph.contains(&url("c.scss")));
    assert!(graph.get(c).is_some());

    // Importers no longer point at the dead node.
    for path in ["_a.scss", "b.scss"] {
        let node = graph.node(&url(path)).unwrap();
        assert!(node.upstream().is_empty(), "{path} still imports c");
        assert_eq!(node.unresolved(), &["c".to_string()]);
    }
    assert!(graph.get(c).unwrap().downstream().is_empty());
    assert_eq!(graph.stats().edge_count, 2);
    assert_edges_consistent(&graph);

    // Restoring the file links the importers to the fresh node.
    files.write("c.scss", "$c: 2;");
    graph.add("app:c").unwrap();
    let new = id_of(&graph, "c.scss");
    assert_ne!(c, new);
    assert_eq!(graph.node(&url("_a.scss")).unwrap().upstream(), &[new]);
    assert_eq!(graph.node(&url("b.scss")).unwrap().upstream(), &[new]);
    assert!(graph.node(&url("_a.scss")).unwrap().unresolved().is_empty());
    assert_eq!(
        graph.impact_of(&url("c.scss")),
        vec![url("c.scss"), url("_a.scss"), url("b.scss"), url("main.scss")]
    );
    assert_edges_consistent(&graph);
}

#[test]
fn test_evict_relinks_importers_to_another_candidate() {
    let (mut graph, files) = setup(&[("main.scss", "@use \"theme\";"), ("_theme.scss", "")]);
    graph.add("app:main").unwrap();
    let theme = id_of(&graph, "_theme.scss");

    files.delete("_theme.scss");
    files.write("theme.css", "");
    assert_eq!(graph.evict(&url("_theme.scss")), Some(theme));

    let main = graph.node(&url("main.scss")).unwrap();
    assert_eq!(main.upstream(), &[id_of(&graph, "theme.css")]);
    assert!(main.unresolved().is_empty());
    assert_edges_consistent(&graph);
}

#[test]
fn test_import_target_added_later_is_linked() {
    let (mut graph, files) = setup(&[("main.scss", "@use \"c\";\n@use \"sass:math\";")]);
    graph.add("app:main").unwrap();
    let main = id_of(&graph, "main.scss");
    assert_eq!(
        graph.get(main).unwrap().unresolved(),
        &["c".to_string(), "sass:math".to_string()]
    );

    files.write("c.scss", "");
    graph.add("app:c").unwrap();

    let c = id_of(&graph, "c.scss");
    assert_eq!(graph.get(main).unwrap().upstream(), &[c]);
    assert_eq!(graph.get(main).unwrap().unresolved(), &["sass:math".to_string()]);
    assert_eq!(graph.reload(&url("main.scss")).unwrap(), ReloadOutcome::Unchanged);
    assert_eq!(graph.impact_of(&url("c.scss")), vec![url("c.scss"), url("main.scss")]);
    assert_edges_consistent(&graph);
}

#[test]
fn test_unchanged_reload_links_pending_imports() {
    let (mut graph, files) = setup(&[("main.scss", "@use \"c\";")]);
    graph.add("app:main").unwrap();

    files.write("c.scss", "@use \"d\";");
    files.write("d.scss", "");
    assert_eq!(graph.reload(&url("main.scss")).unwrap(), ReloadOutcome::Unchanged);

    let main = graph.node(&url("main.scss")).unwrap();
    assert_eq!(main.upstream(), &[id_of(&graph, "c.scss")]);
    assert_eq!(
        graph.node(&url("c.scss")).unwrap().upstream(),
        &[id_of(&graph, "d.scss")]
    );
    assert_eq!(graph.len(), 3);
    assert_edges_consistent(&graph);
}

#[test]
fn test_resolve_pending_counts_relinked_nodes() {
    let (mut graph, files) = setup(&[
        ("a.scss", "@use \"shared\";"),
        ("b.scss", "@use \"shared\";\n@use \"never\";"),
    ]);
    graph.add("app:a").unwrap();
    graph.add("app:b").unwrap();
    assert_eq!(graph.resolve_pending(), 0);

    files.write("_shared.scss", "");
    assert_eq!(graph.resolve_pending(), 2);
    assert_eq!(graph.len(), 3);
    assert_eq!(
        graph.node(&url("b.scss")).unwrap().unresolved(),
        &["never".to_string()]
    );
    assert_eq!(graph.resolve_pending(), 0);
    assert_edges_consistent(&graph);
}

#[test]
fn test_reload_rejects_an_import_of_a_dependent() {
    let (mut graph, files) = diamond();
    graph.add("app:top").unwrap();
    let c = id_of(&graph, "c.scss");

    files.write("c.scss", "@use \"top\";");
    let err = graph.reload(&url("c.scss")).unwrap_err();
    assert!(matches!(err, StyleGraphError::CircularImport { .. }));
    assert!(graph.get(c).unwrap().upstream().is_empty());
    assert_edges_consistent(&graph);
}

#[test]
fn test_reload_of_unknown_url_is_not_found() {
    let (mut graph, _) = diamond();
    assert!(matches!(
        graph.reload(&url("main.scss")),
        Err(StyleGraphError::NotFound { .. })
    ));
}

#[test]
fn test_transitive_queries() {
    let (mut graph, _) = diamond();
    graph.add("app:top").unwrap();
    let c = id_of(&graph, "c.scss");
    let top = id_of(&graph, "top.scss");

    let dependents = graph.transitive_downstream(c);
    assert_eq!(dependents.len(), 4);
    assert_eq!(dependents.last(), Some(&top));

    let dependencies = graph.transitive_upstream(top);
    assert_eq!(dependencies.len(), 4);
    assert_eq!(dependencies[0], id_of(&graph, "main.scss"));

    let impact = graph.impact_of(&url("b.scss"));
    assert_eq!(impact, vec![url("b.scss"), url("main.scss"), url("top.scss")]);
    assert!(graph.impact_of(&url("nowhere.scss")).is_empty());
}

#[test]
fn test_stats_and_summary() {
    let (mut graph, _) = diamond();
    graph.add("app:top").unwrap();

    let stats = graph.stats();
    assert_eq!(stats.node_count, 5);
    assert_eq!(stats.edge_count, 5);
    assert_eq!(stats.root_count, 1);
    assert_eq!(stats.leaf_count, 1);

    let summary = graph.summary(id_of(&graph, "main.scss")).unwrap();
    assert_eq!(summary.upstream, vec!["app:///_a.scss", "app:///b.scss"]);
    assert_eq!(summary.downstream, vec!["app:///top.scss"]);
    assert_eq!(summary.syntax, Syntax::Scss);
    assert!(summary.unresolved.is_empty());
}
