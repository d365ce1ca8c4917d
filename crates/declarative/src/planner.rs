//! Execution planner - orders resources into an execution plan

use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::resource::{BoxedResource, Resource};
use crate::types::{ResourceKey, ResourceKind};

/// An execution plan: the resource set in convergence order
pub struct ExecutionPlan {
    /// Resources in the order they will be applied
    pub resources: Vec<BoxedResource>,
    graph: ResourceGraph,
}

impl ExecutionPlan {
    /// Order a resource set into a plan
    ///
    /// Duplicate keys, undeclared dependencies and cycles are rejected here,
    /// before anything is applied.
    pub fn new(resources: Vec<BoxedResource>) -> Result<Self> {
        let graph = ResourceGraph::build(&resources)?;
        let order = graph.order();

        let mut slots: Vec<Option<BoxedResource>> = resources.into_iter().map(Some).collect();
        let resources = order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect();

        Ok(Self { resources, graph })
    }

    /// Keys in convergence order
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.resources.iter().map(|r| r.key()).collect()
    }

    /// Direct dependencies of a resource
    pub fn dependencies_of(&self, key: &ResourceKey) -> Vec<&ResourceKey> {
        self.graph.dependencies_of(key)
    }

    /// Find a resource by key
    pub fn get(&self, key: &ResourceKey) -> Option<&dyn Resource> {
        self.resources
            .iter()
            .find(|r| &r.key() == key)
            .map(|r| r.as_ref())
    }

    /// Resources matching a target pattern, in convergence order
    ///
    /// Target format: "kind" or "kind.name", e.g. `files` or
    /// `user.fcrepo`. Filtering is for display only; an applied plan always
    /// contains the whole resource set.
    pub fn filter_by_target(&self, target: Option<&str>) -> Vec<&dyn Resource> {
        let (kind, name) = match target {
            None => (None, None),
            Some(t) => parse_target(t),
        };
        self.resources
            .iter()
            .map(|r| r.as_ref())
            .filter(|r| matches_filter(*r, kind, name.as_deref()))
            .collect()
    }

    /// Total number of resources in the plan
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Parse a target string like "kind.name" into (kind, name)
///
/// Only the first dot separates, so paths such as `file./fedora/config/x.xml`
/// keep their own dots.
fn parse_target(target: &str) -> (Option<ResourceKind>, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) => match ResourceKind::parse(kind) {
            Some(kind) => (Some(kind), Some(name.to_string())),
            None => (None, Some(target.to_string())),
        },
        None => match ResourceKind::parse(target) {
            Some(kind) => (Some(kind), None),
            None => (None, Some(target.to_string())),
        },
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &dyn Resource, kind: Option<ResourceKind>, name: Option<&str>) -> bool {
    let key = resource.key();

    if let Some(k) = kind
        && key.kind != k
    {
        return false;
    }

    if let Some(n) = name
        && !key.name.contains(n)
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::graph::tests::Node;

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("files"), (Some(ResourceKind::File), None));
        assert_eq!(
            parse_target("file./fedora/config/infinispan.xml"),
            (
                Some(ResourceKind::File),
                Some("/fedora/config/infinispan.xml".to_string())
            )
        );
        assert_eq!(parse_target("fcrepo"), (None, Some("fcrepo".to_string())));
    }

    #[test]
    fn test_plan_is_in_dependency_order() {
        let plan = ExecutionPlan::new(vec![
            Node::boxed("/fedora/tomcat7", &["/fedora"]),
            Node::boxed("/fedora", &[]),
        ])
        .unwrap();

        let names: Vec<_> = plan.keys().into_iter().map(|k| k.name).collect();
        assert_eq!(names, ["/fedora", "/fedora/tomcat7"]);
    }

    #[test]
    fn test_filter_by_name() {
        let plan = ExecutionPlan::new(vec![
            Node::boxed("/fedora", &[]),
            Node::boxed("/data", &[]),
        ])
        .unwrap();

        assert_eq!(plan.filter_by_target(Some("directories")).len(), 2);
        assert_eq!(plan.filter_by_target(Some("dirs.data")).len(), 1);
        assert_eq!(plan.filter_by_target(Some("users")).len(), 0);
    }

    #[test]
    fn test_cycle_rejected_before_plan_exists() {
        let result = ExecutionPlan::new(vec![
            Node::boxed("a", &["b"]),
            Node::boxed("b", &["a"]),
        ]);
        assert!(matches!(result, Err(Error::Cycle { .. })));
    }
}
