use super::{plan, plan_with, planner};
use apollo_compiler::ExecutableDocument;
use federation_query_planner::QueryPlanError;
use serde_json::{json, Value};
use std::collections::BTreeSet;

#[test]
fn plans_single_service_query_as_one_fetch() {
    assert_eq!(
        plan("{ me { id name } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "accounts",
                "variableUsages": [],
                "operation": "{me{id name}}"
            }
        })
    );
}

#[test]
fn plans_entity_extension_as_dependent_fetch() {
    assert_eq!(
        plan("{ me { reviews { body } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "accounts",
                        "variableUsages": [],
                        "operation": "{me{__typename id}}"
                    },
                    {
                        "kind": "Flatten",
                        "path": ["me"],
                        "node": {
                            "kind": "Fetch",
                            "serviceName": "reviews",
                            "variableUsages": [],
                            "requires": [
                                {
                                    "kind": "InlineFragment",
                                    "typeCondition": "User",
                                    "selections": [
                                        { "kind": "Field", "name": "__typename" },
                                        { "kind": "Field", "name": "id" }
                                    ]
                                }
                            ],
                            "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on User{reviews{body}}}}"
                        }
                    }
                ]
            }
        })
    );
}

#[test]
fn plans_independent_root_fields_in_parallel() {
    assert_eq!(
        plan("{ me { name } topProducts { name } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Parallel",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "accounts",
                        "variableUsages": [],
                        "operation": "{me{name}}"
                    },
                    {
                        "kind": "Fetch",
                        "serviceName": "products",
                        "variableUsages": [],
                        "operation": "{topProducts{name}}"
                    }
                ]
            }
        })
    );
}

#[test]
fn batches_mutation_fields_in_order() {
    assert_eq!(
        plan(
            r#"mutation {
              createReview(body: "great") { id }
              updateReview(body: "fine") { id }
              login(username: "ada") { name }
              deleteReview(id: "1")
            }"#
        ),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "reviews",
                        "variableUsages": [],
                        "operation": "mutation{createReview(body:\"great\"){id}updateReview(body:\"fine\"){id}}"
                    },
                    {
                        "kind": "Fetch",
                        "serviceName": "accounts",
                        "variableUsages": [],
                        "operation": "mutation{login(username:\"ada\"){name}}"
                    },
                    {
                        "kind": "Fetch",
                        "serviceName": "reviews",
                        "variableUsages": [],
                        "operation": "mutation{deleteReview(id:\"1\")}"
                    }
                ]
            }
        })
    );
}

#[test]
fn provides_elides_the_dependent_fetch() {
    assert_eq!(
        plan("{ topReviews { author { username } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "reviews",
                "variableUsages": [],
                "operation": "{topReviews{author{username}}}"
            }
        })
    );
}

#[test]
fn chains_entity_fetches_across_three_services() {
    assert_eq!(
        plan("{ me { reviews { product { name } } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "accounts",
                        "variableUsages": [],
                        "operation": "{me{__typename id}}"
                    },
                    {
                        "kind": "Sequence",
                        "nodes": [
                            {
                                "kind": "Flatten",
                                "path": ["me"],
                                "node": {
                                    "kind": "Fetch",
                                    "serviceName": "reviews",
                                    "variableUsages": [],
                                    "requires": [
                                        {
                                            "kind": "InlineFragment",
                                            "typeCondition": "User",
                                            "selections": [
                                                { "kind": "Field", "name": "__typename" },
                                                { "kind": "Field", "name": "id" }
                                            ]
                                        }
                                    ],
                                    "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on User{reviews{product{__typename upc}}}}}"
                                }
                            },
                            {
                                "kind": "Flatten",
                                "path": ["me", "reviews", "@", "product"],
                                "node": {
                                    "kind": "Fetch",
                                    "serviceName": "products",
                                    "variableUsages": [],
                                    "requires": [
                                        {
                                            "kind": "InlineFragment",
                                            "typeCondition": "Product",
                                            "selections": [
                                                { "kind": "Field", "name": "__typename" },
                                                { "kind": "Field", "name": "upc" }
                                            ]
                                        }
                                    ],
                                    "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{name}}}"
                                }
                            }
                        ]
                    }
                ]
            }
        })
    );
}

#[test]
fn forwards_variables_into_the_fetches_that_use_them() {
    let value = plan(
        r#"query GetTopProducts($first: Int, $limit: Int) {
          topProducts(first: $first) {
            name
            reviews(limit: $limit) { body }
          }
        }"#,
    );
    assert_eq!(
        value,
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "products",
                        "variableUsages": ["first"],
                        "operation": "query($first:Int){topProducts(first:$first){name __typename upc}}"
                    },
                    {
                        "kind": "Flatten",
                        "path": ["topProducts", "@"],
                        "node": {
                            "kind": "Fetch",
                            "serviceName": "reviews",
                            "variableUsages": ["limit"],
                            "requires": [
                                {
                                    "kind": "InlineFragment",
                                    "typeCondition": "Product",
                                    "selections": [
                                        { "kind": "Field", "name": "__typename" },
                                        { "kind": "Field", "name": "upc" }
                                    ]
                                }
                            ],
                            "operation": "query($representations:[_Any!]!$limit:Int){_entities(representations:$representations){...on Product{reviews(limit:$limit){body}}}}"
                        }
                    }
                ]
            }
        })
    );
    assert_variable_completeness(&value["node"]);
    assert_entity_fetch_shapes(&value["node"]);
}

#[test]
fn expands_named_fragments_into_the_fetch() {
    assert_eq!(
        plan("{ me { ...Names } } fragment Names on User { name username }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "accounts",
                "variableUsages": [],
                "operation": "{me{name username}}"
            }
        })
    );
}

#[test]
fn inline_fragment_directives_apply_to_same_type_siblings() {
    // The directives of an inline fragment live on the scope of the first
    // field of its parent-type group, so they wrap sibling fields of the
    // same parent type even when those were selected outside the fragment.
    assert_eq!(
        plan(
            r#"query Q($x: Boolean!) {
              me {
                ... on User @include(if: $x) { name }
                username
              }
            }"#
        ),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "accounts",
                "variableUsages": ["x"],
                "operation": "query($x:Boolean!){me{...on User@include(if:$x){name username}}}"
            }
        })
    );
}

#[test]
fn explodes_abstract_selections_by_runtime_type() {
    assert_eq!(
        plan("{ search { name } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "products",
                "variableUsages": [],
                "operation": "{search{__typename ...on Product{name}...on Gadget{name}}}"
            }
        })
    );
}

#[test]
fn generates_fragments_when_auto_fragmentization_is_on() {
    let planner = planner(true);
    assert_eq!(
        plan_with(&planner, "{ topReviews { id body author { username } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "reviews",
                "variableUsages": [],
                "operation": "{topReviews{...__QueryPlanFragment_0}}fragment __QueryPlanFragment_0 on Review{id body author{username}}"
            }
        })
    );
}

#[test]
fn reuses_generated_fragments_for_identical_selections() {
    let planner = planner(true);
    assert_eq!(
        plan_with(
            &planner,
            r#"{
              a: topReviews { id body author { username } }
              b: topReviews { id body author { username } }
            }"#
        ),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "reviews",
                "variableUsages": [],
                "operation": "{a:topReviews{...__QueryPlanFragment_0}b:topReviews{...__QueryPlanFragment_0}}fragment __QueryPlanFragment_0 on Review{id body author{username}}"
            }
        })
    );
}

#[test]
fn merges_repeated_fields_into_one_selection() {
    assert_eq!(
        plan("{ me { name } me { username } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "accounts",
                "variableUsages": [],
                "operation": "{me{name username}}"
            }
        })
    );
}

#[test]
fn plans_nothing_for_root_introspection() {
    assert_eq!(
        plan("{ __typename }"),
        json!({ "kind": "QueryPlan", "node": null })
    );
}

#[test]
fn rejects_subscriptions() {
    let planner = planner(false);
    let document = ExecutableDocument::parse_and_validate(
        planner.supergraph().schema(),
        "subscription { reviewAdded { id } }",
        "subscription.graphql",
    )
    .unwrap();
    let error = planner.build_query_plan(&document, None).unwrap_err();
    assert_eq!(error, QueryPlanError::UnsupportedSubscription);
    assert_eq!(error.code().to_string(), "UNSUPPORTED_SUBSCRIPTION");
}

#[test]
fn resolves_operations_by_name() {
    let planner = planner(false);
    let document = ExecutableDocument::parse_and_validate(
        planner.supergraph().schema(),
        "query A { me { name } } query B { topProducts { name } }",
        "multi.graphql",
    )
    .unwrap();

    assert_eq!(
        planner.build_query_plan(&document, None).unwrap_err(),
        QueryPlanError::OperationNameNotProvided
    );
    assert_eq!(
        planner.build_query_plan(&document, Some("C")).unwrap_err(),
        QueryPlanError::UnknownOperation
    );
    let plan = planner.build_query_plan(&document, Some("B")).unwrap();
    assert_eq!(
        serde_json::to_value(plan).unwrap()["node"]["serviceName"],
        json!("products")
    );
}

#[test]
fn fails_when_no_service_owns_a_root_field() {
    let supergraph = federation_query_planner::ComposedSchema::parse(
        r#"
        directive @join__graph(name: String!, url: String!) on ENUM_VALUE

        enum join__Graph {
          SOLO @join__graph(name: "solo", url: "http://localhost:4000")
        }

        type Query {
          thing: String
        }
        "#,
    )
    .unwrap();
    let planner =
        federation_query_planner::QueryPlanner::new(supergraph, Default::default());
    let document = ExecutableDocument::parse_and_validate(
        planner.supergraph().schema(),
        "{ thing }",
        "query.graphql",
    )
    .unwrap();
    assert!(matches!(
        planner.build_query_plan(&document, None).unwrap_err(),
        QueryPlanError::NoOwningService { .. }
    ));
}

fn variable_references(operation: &str) -> BTreeSet<String> {
    let bytes = operation.as_bytes();
    let mut references = BTreeSet::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            references.insert(operation[start..end].to_owned());
            i = end;
        } else {
            i += 1;
        }
    }
    references
}

/// Every fetch must reference exactly its reported variable usages, plus
/// `representations` iff it is an entity fetch.
fn assert_variable_completeness(node: &Value) {
    match node["kind"].as_str() {
        Some("Fetch") => {
            let mut expected: BTreeSet<String> = node["variableUsages"]
                .as_array()
                .unwrap()
                .iter()
                .map(|usage| usage.as_str().unwrap().to_owned())
                .collect();
            if node.get("requires").is_some() {
                expected.insert("representations".to_owned());
            }
            assert_eq!(
                variable_references(node["operation"].as_str().unwrap()),
                expected
            );
        }
        Some("Flatten") => assert_variable_completeness(&node["node"]),
        Some("Sequence") | Some("Parallel") => {
            for child in node["nodes"].as_array().unwrap() {
                assert_variable_completeness(child);
            }
        }
        other => panic!("unexpected plan node kind: {other:?}"),
    }
}

/// Every fetch with a `requires` must be an `_entities` query over
/// `$representations`.
fn assert_entity_fetch_shapes(node: &Value) {
    match node["kind"].as_str() {
        Some("Fetch") => {
            if node.get("requires").is_some() {
                let operation = node["operation"].as_str().unwrap();
                assert!(
                    operation.starts_with("query($representations:[_Any!]!"),
                    "entity fetch must declare $representations first: {operation}"
                );
                assert!(
                    operation.contains("{_entities(representations:$representations){"),
                    "entity fetch must select _entities: {operation}"
                );
            }
        }
        Some("Flatten") => assert_entity_fetch_shapes(&node["node"]),
        Some("Sequence") | Some("Parallel") => {
            for child in node["nodes"].as_array().unwrap() {
                assert_entity_fetch_shapes(child);
            }
        }
        other => panic!("unexpected plan node kind: {other:?}"),
    }
}
