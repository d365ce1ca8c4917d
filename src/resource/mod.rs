//! Concrete resources for each declaration kind
//!
//! Every declaration in the [`Catalog`] becomes one [`Resource`]:
//! - State detection (current vs desired) through the [`Host`]
//! - Apply function that changes only what differs
//! - Dependency keys copied verbatim from the declaration

use anyhow::Result;
use declarative::BoxedResource;
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::host::{Host, Ownership};
use crate::install::Installer;
use crate::model::{Catalog, Declaration};

pub mod deployment;
pub mod directory;
pub mod file;
pub mod group;
pub mod user;

pub use deployment::Deployment;
pub use directory::Directory;
pub use file::FileContent;
pub use group::Group;
pub use user::User;

/// What resources need to reach the machine
#[derive(Clone)]
pub struct Environment {
    pub host: Arc<dyn Host>,
    pub installer: Arc<dyn Installer>,
    /// Directory holding source artifacts on the local machine
    pub artifacts: PathBuf,
}

impl Environment {
    pub fn new(host: Arc<dyn Host>, installer: Arc<dyn Installer>, artifacts: PathBuf) -> Self {
        Self {
            host,
            installer,
            artifacts,
        }
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.artifacts.join(name)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("root", &self.host.root())
            .field("artifacts", &self.artifacts)
            .finish_non_exhaustive()
    }
}

/// Instantiate one resource per declaration, in declaration order
pub fn build(catalog: &Catalog, env: &Environment) -> Vec<BoxedResource> {
    catalog
        .entries
        .iter()
        .map(|entry| {
            let deps = entry.dependencies.clone();
            let resource: BoxedResource = match &entry.declaration {
                Declaration::Group(d) => Box::new(Group::new(d.clone(), env.clone())),
                Declaration::User(d) => Box::new(User::new(d.clone(), deps, env.clone())),
                Declaration::Directory(d) => {
                    Box::new(Directory::new(d.clone(), deps, env.clone()))
                }
                Declaration::File(d) => Box::new(FileContent::new(
                    d.clone(),
                    deps,
                    catalog.bindings.clone(),
                    env.clone(),
                )),
                Declaration::Deployment(d) => {
                    Box::new(Deployment::new(d.clone(), deps, env.clone()))
                }
            };
            resource
        })
        .collect()
}

// ============================================================================
// Shared attribute handling for directories and files
// ============================================================================

/// Mode and owner of an existing path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attributes {
    pub mode: u32,
    pub owner: Ownership,
}

impl Attributes {
    pub(crate) fn read(host: &dyn Host, path: &Path) -> Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self {
            mode: meta.permissions().mode() & 0o7777,
            owner: host.ownership(path)?,
        })
    }
}

/// Desired mode and owner, with the owner resolved when the identities exist
pub(crate) struct WantedAttributes<'a> {
    pub mode: u32,
    pub user: &'a str,
    pub group: &'a str,
}

impl WantedAttributes<'_> {
    /// `user:group 0755`, the form both current and desired states use
    pub(crate) fn describe(&self) -> String {
        format!("{}:{} {:04o}", self.user, self.group, self.mode)
    }

    /// Describe `current`, or `None` when it already matches
    pub(crate) fn mismatch(&self, host: &dyn Host, current: Attributes) -> Option<String> {
        let owner_ok = host
            .lookup_ownership(self.user, self.group)
            .is_ok_and(|wanted| wanted == current.owner);
        if owner_ok && current.mode == self.mode {
            None
        } else {
            Some(format!("{} {:04o}", current.owner, current.mode))
        }
    }

    /// Fix mode and owner where they differ; returns whether anything changed
    pub(crate) fn enforce(&self, host: &dyn Host, path: &Path, current: Attributes) -> Result<bool> {
        let mut changed = false;
        if current.mode != self.mode {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.mode))?;
            changed = true;
        }
        let wanted = host.lookup_ownership(self.user, self.group)?;
        if current.owner != wanted {
            host.set_ownership(path, wanted)?;
            changed = true;
        }
        Ok(changed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::host::memory::MemoryHost;
    use crate::install::TarballInstaller;
    use crate::install::tests::write_tarball;
    use declarative::{
        AutoConfirm, ExecuteOptions, ExecutionPlan, Facts, ResourceKey, TraceRecorder,
    };
    use std::fs;

    /// A temporary host with artifacts for every default source
    pub(crate) struct Fixture {
        pub dir: tempfile::TempDir,
        pub host: Arc<MemoryHost>,
        pub env: Environment,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("root");
            let artifacts = dir.path().join("artifacts");
            fs::create_dir_all(root.join("home")).unwrap();
            fs::create_dir_all(&artifacts).unwrap();

            write_tarball(
                &artifacts.join("jdk-7u51-linux-x64.tar.gz"),
                "jdk1.7.0_51",
                &[("bin/java", "#!/bin/sh\n")],
            );
            write_tarball(
                &artifacts.join("apache-maven-3.1.1-bin.tar.gz"),
                "apache-maven-3.1.1",
                &[("bin/mvn", "#!/bin/sh\n")],
            );
            write_tarball(
                &artifacts.join("apache-tomcat-7.0.50.tar.gz"),
                "apache-tomcat-7.0.50",
                &[
                    ("bin/catalina.sh", "#!/bin/sh\n"),
                    ("conf/server.xml", "<Server/>\n"),
                    ("webapps/ROOT/index.jsp", "root\n"),
                    ("webapps/manager/index.jsp", "manager\n"),
                ],
            );
            fs::write(artifacts.join("fcrepo.war"), b"PK\x03\x04war").unwrap();

            let host = Arc::new(MemoryHost::new(root));
            let env = Environment::new(
                host.clone(),
                Arc::new(TarballInstaller),
                artifacts,
            );
            Self { dir, host, env }
        }

        pub(crate) fn root(&self) -> PathBuf {
            self.dir.path().join("root")
        }

        pub(crate) fn plan(&self, config: &ProvisionConfig) -> ExecutionPlan {
            let facts = Facts {
                hostname: "FedoraTestNode".to_string(),
                os_family: "RedHat".to_string(),
            };
            let catalog = Catalog::build(&config.resolve().unwrap(), &facts).unwrap();
            ExecutionPlan::new(build(&catalog, &self.env)).unwrap()
        }

        pub(crate) fn converge(&self, config: &ProvisionConfig) -> TraceRecorder {
            let plan = self.plan(config);
            let mut trace = TraceRecorder::new();
            declarative::execute(
                &plan,
                &ExecuteOptions::default(),
                &mut trace,
                &mut AutoConfirm,
            )
            .unwrap();
            trace
        }
    }

    #[test]
    fn test_full_convergence_then_idempotent_rerun() {
        let fixture = Fixture::new();
        let config = ProvisionConfig::default();

        let first = fixture.converge(&config);
        assert!(first.changes() > 0);
        assert!(first.failed.is_none());

        let root = fixture.root();
        assert!(root.join("fedora/java7/bin/java").is_file());
        assert!(root.join("fedora/maven3/bin/mvn").is_file());
        assert!(root.join("fedora/tomcat7/webapps/fcrepo.war").is_file());
        assert!(!root.join("fedora/tomcat7/webapps/ROOT").exists());
        assert!(!root.join("fedora/tomcat7/webapps/manager").exists());
        assert!(root.join("data").is_dir());

        let server = fs::read_to_string(root.join("fedora/tomcat7/conf/server.xml")).unwrap();
        assert!(server.contains("FedoraTestNode"));
        let storage = fs::read_to_string(root.join("fedora/config/infinispan.xml")).unwrap();
        assert!(storage.contains("/data/"));

        let mutations = fixture.host.mutations();
        let second = fixture.converge(&config);
        assert_eq!(second.changes(), 0);
        assert_eq!(fixture.host.mutations(), mutations);
        assert_eq!(second.keys(), first.keys());
    }

    #[test]
    fn test_trace_respects_every_dependency() {
        let fixture = Fixture::new();
        let config = ProvisionConfig::default();
        let plan = fixture.plan(&config);
        let trace = fixture.converge(&config);
        let keys = trace.keys();
        let position = |key: &ResourceKey| keys.iter().position(|k| k == key).unwrap();

        for key in &keys {
            for dep in plan.dependencies_of(key) {
                assert!(position(dep) < position(key), "{dep} must precede {key}");
            }
        }
    }

    #[test]
    fn test_failure_stops_at_failing_resource() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.env.artifact("apache-maven-3.1.1-bin.tar.gz")).unwrap();

        let plan = fixture.plan(&ProvisionConfig::default());
        let mut trace = TraceRecorder::new();
        let err = declarative::execute(
            &plan,
            &ExecuteOptions::default(),
            &mut trace,
            &mut AutoConfirm,
        )
        .unwrap_err();

        assert_eq!(err.failing_key(), Some(&ResourceKey::deployment("maven")));
        assert!(format!("{err:#}").contains("apache-maven-3.1.1-bin.tar.gz"));
        assert!(trace.keys().contains(&ResourceKey::deployment("java")));
        assert!(!trace.keys().contains(&ResourceKey::deployment("tomcat")));
        assert!(fixture.root().join("fedora/java7/bin/java").is_file());
        assert!(!fixture.root().join("fedora/tomcat7").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let fixture = Fixture::new();
        let plan = fixture.plan(&ProvisionConfig::default());
        let summary = declarative::execute_simple(
            &plan,
            &ExecuteOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(summary.total_changes(), 0);
        assert_eq!(summary.skipped, plan.len());
        assert_eq!(fixture.host.mutations(), 0);
        assert!(!fixture.root().join("fedora").exists());
    }

    #[test]
    fn test_overridden_owner_is_applied() {
        let fixture = Fixture::new();
        let config = ProvisionConfig {
            user: Some("fedora".into()),
            group: Some("fedora".into()),
            ..Default::default()
        };
        fixture.converge(&config);

        let host = fixture.host.as_ref();
        let wanted = host.lookup_ownership("fedora", "fedora").unwrap();
        for path in ["fedora", "data", "fedora/config/repository.json", "home/fedora/.bashrc"] {
            assert_eq!(host.ownership(&fixture.root().join(path)).unwrap(), wanted, "{path}");
        }
    }
}
