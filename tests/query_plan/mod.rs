mod build_plan_tests;

use apollo_compiler::ExecutableDocument;
use federation_query_planner::{ComposedSchema, QueryPlanner, QueryPlannerConfig};

pub(crate) const TEST_SUPERGRAPH: &str = r#"
schema
  @link(url: "https://specs.apollo.dev/link/v1.0")
  @link(url: "https://specs.apollo.dev/join/v0.2", for: EXECUTION)
{
  query: Query
  mutation: Mutation
  subscription: Subscription
}

directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet, type: String, external: Boolean, override: String, usedOverridden: Boolean) repeatable on FIELD_DEFINITION | INPUT_FIELD_DEFINITION

directive @join__graph(name: String!, url: String!) on ENUM_VALUE

directive @join__implements(graph: join__Graph!, interface: String!) repeatable on OBJECT | INTERFACE

directive @join__type(graph: join__Graph!, key: join__FieldSet, extension: Boolean! = false, resolvable: Boolean! = true) repeatable on OBJECT | INTERFACE | UNION | ENUM | INPUT_OBJECT | SCALAR

directive @link(url: String, as: String, for: link__Purpose, import: [link__Import]) repeatable on SCHEMA

scalar join__FieldSet

scalar link__Import

enum link__Purpose {
  SECURITY
  EXECUTION
}

enum join__Graph {
  ACCOUNTS @join__graph(name: "accounts", url: "http://localhost:4001")
  PRODUCTS @join__graph(name: "products", url: "http://localhost:4002")
  REVIEWS @join__graph(name: "reviews", url: "http://localhost:4003")
}

type Query
  @join__type(graph: ACCOUNTS)
  @join__type(graph: PRODUCTS)
  @join__type(graph: REVIEWS)
{
  me: User @join__field(graph: ACCOUNTS)
  topProducts(first: Int): [Product] @join__field(graph: PRODUCTS)
  topReviews(first: Int): [Review] @join__field(graph: REVIEWS)
  search(text: String): [Item] @join__field(graph: PRODUCTS)
}

type Mutation
  @join__type(graph: ACCOUNTS)
  @join__type(graph: REVIEWS)
{
  createReview(body: String): Review @join__field(graph: REVIEWS)
  updateReview(body: String): Review @join__field(graph: REVIEWS)
  login(username: String!): User @join__field(graph: ACCOUNTS)
  deleteReview(id: ID!): Boolean @join__field(graph: REVIEWS)
}

type Subscription
  @join__type(graph: REVIEWS)
{
  reviewAdded: Review @join__field(graph: REVIEWS)
}

type User
  @join__type(graph: ACCOUNTS, key: "id")
  @join__type(graph: REVIEWS, key: "id")
{
  id: ID!
  name: String @join__field(graph: ACCOUNTS)
  username: String @join__field(graph: ACCOUNTS)
  reviews: [Review] @join__field(graph: REVIEWS)
}

interface Item
  @join__type(graph: PRODUCTS)
{
  name: String
}

type Product implements Item
  @join__implements(graph: PRODUCTS, interface: "Item")
  @join__type(graph: PRODUCTS, key: "upc")
  @join__type(graph: REVIEWS, key: "upc")
{
  upc: String!
  name: String @join__field(graph: PRODUCTS)
  price: Int @join__field(graph: PRODUCTS)
  reviews(limit: Int): [Review] @join__field(graph: REVIEWS)
}

type Gadget implements Item
  @join__implements(graph: PRODUCTS, interface: "Item")
  @join__type(graph: PRODUCTS)
{
  name: String @join__field(graph: PRODUCTS)
}

type Review
  @join__type(graph: REVIEWS, key: "id")
{
  id: ID!
  body: String @join__field(graph: REVIEWS)
  author: User @join__field(graph: REVIEWS, provides: "username")
  product: Product @join__field(graph: REVIEWS)
}
"#;

pub(crate) fn planner(auto_fragmentization: bool) -> QueryPlanner {
    let supergraph = ComposedSchema::parse(TEST_SUPERGRAPH).expect("supergraph should compose");
    QueryPlanner::new(
        supergraph,
        QueryPlannerConfig {
            auto_fragmentization,
        },
    )
}

pub(crate) fn plan_with(planner: &QueryPlanner, query: &str) -> serde_json::Value {
    let document = ExecutableDocument::parse_and_validate(
        planner.supergraph().schema(),
        query,
        "query.graphql",
    )
    .expect("operation should validate");
    let plan = planner
        .build_query_plan(&document, None)
        .expect("planning should succeed");
    serde_json::to_value(plan).expect("plan should serialize")
}

pub(crate) fn plan(query: &str) -> serde_json::Value {
    plan_with(&planner(false), query)
}
