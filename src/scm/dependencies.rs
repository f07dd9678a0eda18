//! Service dependency tree
//!
//! Depth-first walk over the SCM's recorded dependencies. Cycles are detected against
//! the names on the current path only, so a dependency shared by two branches is
//! expanded under both.

use super::{ServiceAccessLevel, ServiceApi, ServiceManagerApi, ServiceState};
use serde::Serialize;

/// One service in a dependency tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDependencyNode {
    pub service_name: String,
    pub display_name: String,
    pub is_running: bool,
    /// The name already appears between the root and this node; not expanded
    pub is_cycle: bool,
    pub children: Vec<ServiceDependencyNode>,
}

impl ServiceDependencyNode {
    fn leaf(service_name: &str, display_name: String, is_running: bool, is_cycle: bool) -> Self {
        ServiceDependencyNode {
            service_name: service_name.to_string(),
            display_name,
            is_running,
            is_cycle,
            children: Vec::new(),
        }
    }

    /// Render as an indented tree
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let marker = if self.is_cycle {
            " (cycle)"
        } else if self.is_running {
            " [running]"
        } else {
            ""
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.display_name);
        out.push_str(marker);
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

/// Builds dependency trees over an open SCM connection
pub struct DependencyResolver<'a, M: ServiceManagerApi> {
    manager: &'a M,
}

struct Lookup {
    display_name: String,
    is_running: bool,
    dependencies: Vec<String>,
}

impl<'a, M: ServiceManagerApi> DependencyResolver<'a, M> {
    pub fn new(manager: &'a M) -> Self {
        DependencyResolver { manager }
    }

    /// Tree of everything `root` depends on, built fresh on each call
    pub fn get_dependencies(&self, root: &str) -> ServiceDependencyNode {
        let mut path = Vec::new();
        self.resolve(root, &mut path)
    }

    fn resolve(&self, name: &str, path: &mut Vec<String>) -> ServiceDependencyNode {
        let on_path = path.iter().any(|p| p.eq_ignore_ascii_case(name));

        let info = match self.lookup(name) {
            Some(info) => info,
            None => {
                return ServiceDependencyNode::leaf(name, format!("{} (Unavailable)", name), false, on_path);
            }
        };

        if on_path {
            return ServiceDependencyNode::leaf(name, info.display_name, info.is_running, true);
        }

        path.push(name.to_string());
        let mut children: Vec<_> = info
            .dependencies
            .iter()
            .map(|dep| self.resolve(dep, path))
            .collect();
        path.pop();

        children.sort_by_key(|c| c.display_name.to_lowercase());

        ServiceDependencyNode {
            service_name: name.to_string(),
            display_name: info.display_name,
            is_running: info.is_running,
            is_cycle: false,
            children,
        }
    }

    /// Read what we need and release the handle before descending
    fn lookup(&self, name: &str) -> Option<Lookup> {
        let service = match self.manager.open_service(name, ServiceAccessLevel::Query) {
            Ok(service) => service,
            Err(e) => {
                tracing::debug!("Dependency '{}' unavailable: {}", name, e);
                return None;
            }
        };
        let config = service.query_config().ok()?;
        let state = service.query_state().unwrap_or(ServiceState::Unknown);

        let display_name = if config.display_name.is_empty() {
            name.to_string()
        } else {
            config.display_name
        };
        Some(Lookup {
            display_name,
            is_running: state == ServiceState::Running,
            dependencies: config.dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm::ScmConnector;
    use crate::scm::testing::FakeScm;

    fn names(node: &ServiceDependencyNode) -> Vec<&str> {
        node.children.iter().map(|c| c.display_name.as_str()).collect()
    }

    #[test]
    fn cycle_becomes_a_marked_leaf() {
        let scm = FakeScm::new()
            .with_service("A", "A", &["B"], ServiceState::Running)
            .with_service("B", "B", &["C"], ServiceState::Running)
            .with_service("C", "C", &["A"], ServiceState::Stopped);
        let manager = scm.connect().unwrap();
        let tree = DependencyResolver::new(&manager).get_dependencies("A");

        let b = &tree.children[0];
        let c = &b.children[0];
        let back_to_a = &c.children[0];
        assert_eq!(back_to_a.service_name, "A");
        assert!(back_to_a.is_cycle);
        assert!(back_to_a.children.is_empty());
        assert!(!c.is_cycle);
        assert!(!c.is_running);
        assert!(tree.is_running);
    }

    #[test]
    fn shared_dependency_is_not_a_cycle() {
        let scm = FakeScm::new()
            .with_service("app", "App", &["db", "cache"], ServiceState::Running)
            .with_service("db", "Database", &["net"], ServiceState::Running)
            .with_service("cache", "Cache", &["net"], ServiceState::Running)
            .with_service("net", "Network", &[], ServiceState::Running);
        let manager = scm.connect().unwrap();
        let tree = DependencyResolver::new(&manager).get_dependencies("app");

        assert_eq!(names(&tree), vec!["Cache", "Database"]);
        for child in &tree.children {
            assert_eq!(child.children.len(), 1);
            assert_eq!(child.children[0].display_name, "Network");
            assert!(!child.children[0].is_cycle);
        }
    }

    #[test]
    fn unavailable_dependency_does_not_abort() {
        let scm = FakeScm::new()
            .with_service("app", "App", &["missing", "locked", "ok"], ServiceState::Stopped)
            .with_service("locked", "Locked", &[], ServiceState::Running)
            .with_service("ok", "Ok", &[], ServiceState::Running);
        scm.lock().unavailable.push("locked".into());
        let manager = scm.connect().unwrap();
        let tree = DependencyResolver::new(&manager).get_dependencies("app");

        assert_eq!(names(&tree), vec!["locked (Unavailable)", "missing (Unavailable)", "Ok"]);
        drop(manager);
        assert_eq!(scm.open_handles(), 0);
    }

    #[test]
    fn children_sort_case_insensitively() {
        let scm = FakeScm::new()
            .with_service("root", "Root", &["b", "a", "c"], ServiceState::Running)
            .with_service("a", "alpha", &[], ServiceState::Running)
            .with_service("b", "Beta", &[], ServiceState::Running)
            .with_service("c", "charlie", &[], ServiceState::Running);
        let manager = scm.connect().unwrap();
        let tree = DependencyResolver::new(&manager).get_dependencies("root");

        assert_eq!(names(&tree), vec!["alpha", "Beta", "charlie"]);
        assert!(tree.render().contains("\n  Beta [running]\n"));
    }
}
