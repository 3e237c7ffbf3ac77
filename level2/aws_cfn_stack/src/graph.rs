//! The resource dependency graph implied by a template.
//!
//! CloudFormation derives creation order from `Ref`/`Fn::GetAtt`/`Fn::Sub`
//! references and `DependsOn`. We compute the same graph before deploying so
//! that dangling references and cycles are reported locally instead of by a
//! failed stack operation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use stack_lib::{Result, StackError};

use crate::intrinsics::{is_pseudo_parameter, referenced_ids};
use crate::SavedTemplate;

/// for every resource, the set of other resources it must be created after.
/// references to parameters and pseudo parameters are not edges.
pub fn resource_dependencies(template: &SavedTemplate) -> BTreeMap<String, BTreeSet<String>> {
    let mut out = BTreeMap::new();
    for (name, resource) in template.resources.iter() {
        let mut refs = BTreeSet::new();
        referenced_ids(&resource.properties, &mut refs);
        refs.extend(resource.depends_on.iter().cloned());
        refs.retain(|r| template.resources.contains_key(r) && r != name);
        out.insert(name.clone(), refs);
    }
    out
}

pub fn validate_references(template: &SavedTemplate) -> Result<()> {
    let known = |id: &str| {
        template.resources.contains_key(id)
            || template.parameters.contains_key(id)
            || is_pseudo_parameter(id)
    };
    let unknown = |name: &String, target: &String| StackError::UnknownReference {
        resource: name.clone(),
        target: target.clone(),
    };
    for (name, resource) in template.resources.iter() {
        let mut refs = BTreeSet::new();
        referenced_ids(&resource.properties, &mut refs);
        if let Some(target) = refs.iter().find(|r| !known(r.as_str())) {
            return Err(unknown(name, target));
        }
        let missing = resource.depends_on.iter().find(|d| !template.resources.contains_key(*d));
        if let Some(target) = missing {
            return Err(unknown(name, target));
        }
    }
    for (name, output) in template.outputs.iter() {
        let mut refs = BTreeSet::new();
        referenced_ids(&output.value, &mut refs);
        if let Some(target) = refs.iter().find(|r| !known(r.as_str())) {
            return Err(unknown(name, target));
        }
    }
    Ok(())
}

/// a creation order where every resource comes after its dependencies.
/// ties are broken alphabetically so the order is stable.
pub fn dependency_order(template: &SavedTemplate) -> Result<Vec<String>> {
    let deps = resource_dependencies(template);
    let mut remaining: BTreeMap<&str, usize> =
        deps.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, targets) in deps.iter() {
        for t in targets {
            dependents.entry(t.as_str()).or_default().push(name.as_str());
        }
    }

    let mut ready: VecDeque<&str> =
        remaining.iter().filter(|(_, n)| **n == 0).map(|(k, _)| *k).collect();
    let mut order = Vec::with_capacity(deps.len());
    while let Some(next) = ready.pop_front() {
        order.push(next.to_string());
        remaining.remove(next);
        let mut newly_ready = vec![];
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    newly_ready.push(*dependent);
                }
            }
        }
        newly_ready.sort_unstable();
        ready.extend(newly_ready);
    }

    if !remaining.is_empty() {
        let stuck = remaining.keys().map(|k| k.to_string()).collect();
        return Err(StackError::DependencyCycle(stuck));
    }
    Ok(order)
}
