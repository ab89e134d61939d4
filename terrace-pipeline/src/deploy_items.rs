//! Materialization of resolved deploy item templates

use std::collections::{BTreeMap, BTreeSet};

use terrace_core::annotations::{EXECUTION_MANAGED_BY_LABEL, EXECUTION_MANAGED_NAME_ANNOTATION};
use terrace_core::domain::deploy_item::{DeployItem, DeployItemTemplate};

use crate::error::{PipelineError, Result};

/// Checks that `dependsOn` only names templates of the same batch and has no cycle
///
/// # Errors
/// Returns `InvalidDeployItemSpecification` for duplicate names, unknown
/// dependencies and the first template found on a cycle
pub fn validate_dependencies(templates: &[DeployItemTemplate]) -> Result<()> {
    let mut graph: BTreeMap<&str, &[String]> = BTreeMap::new();
    for tmpl in templates {
        if graph.insert(&tmpl.name, &tmpl.depends_on).is_some() {
            return Err(PipelineError::deploy_item(&tmpl.name, "duplicate deploy item name"));
        }
    }
    for tmpl in templates {
        for dep in &tmpl.depends_on {
            if !graph.contains_key(dep.as_str()) {
                return Err(PipelineError::deploy_item(
                    &tmpl.name,
                    format!("depends on unknown deploy item {:?}", dep),
                ));
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        graph: &BTreeMap<&'a str, &'a [String]>,
        marks: &mut BTreeMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(PipelineError::deploy_item(name, "cyclic dependency"));
            }
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        for dep in graph.get(name).copied().unwrap_or_default() {
            visit(dep, graph, marks)?;
        }
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    for name in graph.keys().copied() {
        visit(name, &graph, &mut marks)?;
    }
    Ok(())
}

/// Builds the deploy items of an execution
///
/// Every item gets the managed-by label naming the execution and an
/// annotation naming the template it was built from.
pub fn materialize_deploy_items(
    templates: &[DeployItemTemplate],
    namespace: &str,
    execution: &str,
) -> Result<Vec<DeployItem>> {
    validate_dependencies(templates)?;
    Ok(templates
        .iter()
        .map(|tmpl| {
            let mut item = DeployItem::from_template(namespace, tmpl);
            item.metadata
                .labels
                .insert(EXECUTION_MANAGED_BY_LABEL.to_string(), execution.to_string());
            item.metadata
                .annotations
                .insert(EXECUTION_MANAGED_NAME_ANNOTATION.to_string(), tmpl.name.clone());
            item
        })
        .collect())
}

/// Names of the templates in an order where dependencies come first
pub fn dependency_order(templates: &[DeployItemTemplate]) -> Result<Vec<String>> {
    validate_dependencies(templates)?;
    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut order = Vec::with_capacity(templates.len());
    while order.len() < templates.len() {
        for tmpl in templates {
            if done.contains(tmpl.name.as_str()) {
                continue;
            }
            if tmpl.depends_on.iter().all(|d| done.contains(d.as_str())) {
                done.insert(&tmpl.name);
                order.push(tmpl.name.clone());
            }
        }
    }
    Ok(order)
}
