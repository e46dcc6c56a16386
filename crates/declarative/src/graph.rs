//! Dependency graph builder
//!
//! Turns a list of declarations into a validated graph. Every check here
//! runs before any remote call is made.

use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::types::{ResourceId, ResourceRef};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Longest name accepted for any resource
pub const MAX_NAME_LEN: usize = 80;

static NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn name_regex() -> &'static Regex {
    NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("name pattern is a valid regex")
    })
}

/// Declared resources plus their resolved dependency edges
///
/// Resources keep declaration order; `dependencies_of(i)` lists indices
/// in declaration order with duplicates removed.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    dependencies: Vec<Vec<usize>>,
}

impl ResourceGraph {
    /// Validate declarations and resolve every dependency reference
    pub fn build(resources: Vec<Resource>) -> Result<Self> {
        let mut index = HashMap::with_capacity(resources.len());
        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();

        for (i, resource) in resources.iter().enumerate() {
            validate_name(&resource.id)?;
            if index.insert(resource.id.clone(), i).is_some() {
                return Err(Error::Declaration(format!(
                    "{} is declared more than once",
                    resource.id
                )));
            }
            by_name.entry(resource.name()).or_default().push(i);
        }

        let mut dependencies = Vec::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            let mut deps = Vec::with_capacity(resource.depends_on.len());
            for reference in &resource.depends_on {
                let dep = resolve(reference, &resource.id, &index, &by_name)?;
                if dep == i {
                    return Err(Error::Declaration(format!(
                        "{} depends on itself",
                        resource.id
                    )));
                }
                deps.push(dep);
            }
            deps.sort_unstable();
            deps.dedup();
            dependencies.push(deps);
        }

        log::debug!("Built resource graph with {} resources", resources.len());

        Ok(Self {
            resources,
            index,
            dependencies,
        })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, idx: usize) -> &Resource {
        &self.resources[idx]
    }

    pub fn index_of(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index_of(id).map(|i| &self.resources[i])
    }

    /// Direct dependencies of a resource, as declaration indices
    pub fn dependencies_of(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    /// Direct dependencies of a resource, as identifiers
    pub fn dependency_ids(&self, idx: usize) -> Vec<ResourceId> {
        self.dependencies[idx]
            .iter()
            .map(|&d| self.resources[d].id.clone())
            .collect()
    }
}

fn validate_name(id: &ResourceId) -> Result<()> {
    if id.name.is_empty() {
        return Err(Error::Declaration(format!("{} has an empty name", id.kind)));
    }
    if id.name.len() > MAX_NAME_LEN {
        return Err(Error::Declaration(format!(
            "{id}: name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if !name_regex().is_match(&id.name) {
        return Err(Error::Declaration(format!(
            "{id}: names may only contain letters, digits, '.', '_' and '-'"
        )));
    }
    Ok(())
}

fn resolve(
    reference: &ResourceRef,
    owner: &ResourceId,
    index: &HashMap<ResourceId, usize>,
    by_name: &HashMap<&str, Vec<usize>>,
) -> Result<usize> {
    match reference {
        ResourceRef::Id(id) => index.get(id).copied().ok_or_else(|| {
            Error::Declaration(format!("{owner} depends on undeclared resource {id}"))
        }),
        ResourceRef::Name(name) => match by_name.get(name.as_str()).map(Vec::as_slice) {
            Some([single]) => Ok(*single),
            Some(many) if many.len() > 1 => Err(Error::Declaration(format!(
                "{owner} depends on '{name}', which matches {} resources; use 'kind/{name}'",
                many.len()
            ))),
            _ => Err(Error::Declaration(format!(
                "{owner} depends on undeclared resource '{name}'"
            ))),
        },
    }
}
