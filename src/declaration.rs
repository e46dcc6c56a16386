//! Declaration files
//!
//! A declaration file lists the resources of one stack:
//!
//! ```toml
//! name = "tutorial"
//!
//! [[resource]]
//! kind = "virtual_network"
//! name = "myVNet"
//! depends_on = ["myResourceGroup"]
//!
//! [resource.config]
//! address_space = "10.0.0.0/16"
//! ```
//!
//! JSON is accepted for files ending in `.json`, with the same shape.

use anyhow::{Context, Result, bail};
use blake3::Hasher;
use declarative::{Attributes, Resource, ResourceGraph, ResourceKind, ResourceRef};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// Schema
// ============================================================================

/// One declaration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclarationFile {
    /// Stack name; defaults to the file stem
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

/// One `[[resource]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Resource kind; aliases such as `vnet` or `nic` are accepted
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<ResourceRef>,
    #[serde(default)]
    pub config: Attributes,
}

impl ResourceDecl {
    fn to_resource(&self) -> Result<Resource> {
        let kind: ResourceKind = self
            .kind
            .parse()
            .with_context(|| format!("Invalid kind for resource '{}'", self.name))?;

        let mut resource = Resource::new(kind, self.name.clone());
        resource.attributes = self.config.clone();
        resource.depends_on = self.depends_on.clone();
        Ok(resource)
    }
}

/// A loaded, validated stack
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub graph: ResourceGraph,
    /// blake3 over the normalized declarations
    pub fingerprint: String,
}

// ============================================================================
// Loading
// ============================================================================

/// Load a declaration file and build its resource graph
pub fn load(path: &Path) -> Result<Stack> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read declaration file: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let file: DeclarationFile = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?
    };

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default");

    let stack = file
        .into_stack(default_name)
        .with_context(|| format!("Invalid declarations in {}", path.display()))?;
    log::debug!(
        "Loaded stack '{}' with {} resources from {}",
        stack.name,
        stack.graph.len(),
        path.display()
    );
    Ok(stack)
}

impl DeclarationFile {
    pub fn into_stack(self, default_name: &str) -> Result<Stack> {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| default_name.to_string());
        if name.trim().is_empty() {
            bail!("stack name must not be empty");
        }
        if self.resources.is_empty() {
            bail!("no resources declared");
        }

        let resources = self
            .resources
            .iter()
            .map(ResourceDecl::to_resource)
            .collect::<Result<Vec<_>>>()?;
        let fingerprint = fingerprint(&resources);
        let graph = ResourceGraph::build(resources)?;

        Ok(Stack {
            name,
            graph,
            fingerprint,
        })
    }
}

/// Hash the declarations so later runs can tell whether they changed
pub fn fingerprint(resources: &[Resource]) -> String {
    let mut hasher = Hasher::new();
    for resource in resources {
        hasher.update(resource.id.to_string().as_bytes());
        hasher.update(&[0]);
        // Attributes are a BTreeMap, so key order is stable
        let attributes = serde_json::to_string(&resource.attributes).unwrap_or_default();
        hasher.update(attributes.as_bytes());
        hasher.update(&[0]);
        for dep in &resource.depends_on {
            hasher.update(dep.to_string().as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&[0xff]);
    }
    hasher.finalize().to_hex().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Provider, ResourceId};
    use tempfile::TempDir;

    const TUTORIAL: &str = r#"
name = "tutorial"

[[resource]]
kind = "resource_group"
name = "myResourceGroup"
[resource.config]
region = "westus2"

[[resource]]
kind = "vnet"
name = "myVNet"
depends_on = ["myResourceGroup"]
[resource.config]
address_space = "10.0.0.0/16"
subnets = [{ name = "mySubnet", prefix = "10.0.0.0/24" }]

[[resource]]
kind = "nic"
name = "myNIC"
depends_on = ["virtual_network/myVNet"]
"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let stack = load(&write(&dir, "stack.toml", TUTORIAL)).unwrap();

        assert_eq!(stack.name, "tutorial");
        assert_eq!(stack.graph.len(), 3);
        let vnet = stack
            .graph
            .get(&ResourceId::new(ResourceKind::VirtualNetwork, "myVNet"))
            .unwrap();
        assert_eq!(vnet.attr_str("address_space"), Some("10.0.0.0/16"));
        assert!(vnet.attr("subnets").unwrap().is_array());
    }

    #[test]
    fn test_load_json_uses_file_stem() {
        let dir = TempDir::new().unwrap();
        let json = r#"{
            "resource": [
                { "kind": "resource_group", "name": "g", "config": { "region": "eastus" } },
                { "kind": "disk", "name": "d", "depends_on": ["g"], "config": { "size_gb": 4 } }
            ]
        }"#;
        let stack = load(&write(&dir, "disks.json", json)).unwrap();
        assert_eq!(stack.name, "disks");
        assert_eq!(stack.graph.len(), 2);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let dir = TempDir::new().unwrap();
        let content = "[[resource]]\nkind = \"load_balancer\"\nname = \"lb\"\n";
        let err = load(&write(&dir, "bad.toml", content)).unwrap_err();
        assert!(format!("{err:#}").contains("load_balancer"));
    }

    #[test]
    fn test_unresolved_dependency_is_rejected() {
        let dir = TempDir::new().unwrap();
        let content = "[[resource]]\nkind = \"vnet\"\nname = \"n\"\ndepends_on = [\"missing\"]\n";
        let err = load(&write(&dir, "bad.toml", content)).unwrap_err();
        assert!(format!("{err:#}").contains("missing"));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(load(&write(&dir, "empty.toml", "name = \"x\"\n")).is_err());
    }

    #[test]
    fn test_demo_stack_applies_in_dependency_order() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/windows-vm.toml");
        let stack = load(&path).unwrap();
        assert_eq!(stack.name, "windows-vm");

        let provider = declarative::MemoryProvider::new();
        let opts = declarative::ExecuteOptions::default();
        let report = declarative::apply_simple(&stack.graph, &provider, &opts).unwrap();
        let names: Vec<&str> = report
            .plan
            .steps()
            .iter()
            .map(|s| s.id.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["myResourceGroup", "myAVSet", "myPublicIP", "myVNet", "myNIC", "myVM"]
        );

        let vm = provider
            .get(&ResourceId::new(ResourceKind::VirtualMachine, "myVM"))
            .unwrap()
            .unwrap()
            .vm
            .unwrap();
        assert_eq!(vm.size, "Standard_DS2_v2");
        assert_eq!(vm.admin_username.as_deref(), Some("azureuser"));
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let dir = TempDir::new().unwrap();
        let first = load(&write(&dir, "a.toml", TUTORIAL)).unwrap();
        let same = load(&write(&dir, "b.toml", TUTORIAL)).unwrap();
        assert_eq!(first.fingerprint, same.fingerprint);

        let changed = TUTORIAL.replace("westus2", "eastus");
        let changed = load(&write(&dir, "c.toml", &changed)).unwrap();
        assert_ne!(first.fingerprint, changed.fingerprint);
    }
}
