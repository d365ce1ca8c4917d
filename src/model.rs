//! Resource model: the closed set of declarations for one host
//!
//! [`Catalog::build`] turns a [`ResolvedConfig`] and the host [`Facts`] into
//! every declaration needed to reach the end state, with all ordering
//! relationships written out as explicit dependency keys:
//!
//! - a user depends on its primary group
//! - a directory or file depends on its owner, its group, and the nearest
//!   declared path that produces its parent (a directory or a deployment
//!   destination)
//! - a deployment depends on its installing user and group, the producer of
//!   its destination's parent, the profile file it exports into, and the
//!   deployment declared before it
//!
//! Nothing is inferred later: the graph builder sees only these keys.

use declarative::{Bindings, Error, Facts, ResourceKey};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::ResolvedConfig;
use crate::paths;
use crate::templates::{self, TemplateId};

pub const DIR_MODE: u32 = 0o755;
pub const FILE_MODE: u32 = 0o644;
pub const SERVER_XML_MODE: u32 = 0o600;
pub const SCRIPT_MODE: u32 = 0o755;

/// Artifact name of the repository web application
pub const WAR_ARTIFACT: &str = "fcrepo.war";

/// Webapps bundled with the application server that are always removed
pub const EXCLUDED_WEBAPPS: [&str; 5] = ["docs", "examples", "host-manager", "manager", "ROOT"];

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDecl {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDecl {
    pub name: String,
    /// Primary group; must name a declared group
    pub group: String,
    pub shell: String,
    pub home: PathBuf,
    /// Create and populate the home directory together with the account
    pub manage_home: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryDecl {
    pub path: PathBuf,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

/// Where a file's bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    /// Copied from the artifact directory
    Artifact(&'static str),
    /// Rendered from a shipped template
    Template(TemplateId),
    /// Ensured to exist; the content belongs to someone else
    Unmanaged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecl {
    pub path: PathBuf,
    pub owner: String,
    pub group: String,
    pub mode: u32,
    pub source: FileSource,
}

/// One `export` line written to a profile file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub value: String,
}

impl Export {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }

    /// The shell line for this export
    pub fn line(&self) -> String {
        format!("export {}={}", self.name, self.value)
    }

    /// Whether the value extends the variable's previous value (`PATH=...:$PATH`)
    ///
    /// Several deployments may each contribute one of these lines, so they
    /// never replace each other.
    pub fn is_cumulative(&self) -> bool {
        self.value.contains(&format!("${}", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDecl {
    /// Logical name: `java`, `maven` or `tomcat`
    pub name: String,
    /// Source artifact file name
    pub source: String,
    pub destination: PathBuf,
    pub user: String,
    pub group: String,
    /// Profile file the exports are appended to
    pub profile: Option<PathBuf>,
    pub exports: Vec<Export>,
    /// Top-level `webapps/` entries removed after unpacking
    pub excluded_webapps: Vec<String>,
}

/// A typed description of desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Group(GroupDecl),
    User(UserDecl),
    Directory(DirectoryDecl),
    File(FileDecl),
    Deployment(DeploymentDecl),
}

impl Declaration {
    pub fn key(&self) -> ResourceKey {
        match self {
            Self::Group(g) => ResourceKey::group(&g.name),
            Self::User(u) => ResourceKey::user(&u.name),
            Self::Directory(d) => ResourceKey::directory(paths::display(&d.path)),
            Self::File(f) => ResourceKey::file(paths::display(&f.path)),
            Self::Deployment(d) => ResourceKey::deployment(&d.name),
        }
    }

    /// Owner and group this declaration assigns, if any
    fn ownership(&self) -> Option<(&str, &str)> {
        match self {
            Self::Group(_) => None,
            Self::User(u) => Some((&u.name, &u.group)),
            Self::Directory(d) => Some((&d.owner, &d.group)),
            Self::File(f) => Some((&f.owner, &f.group)),
            Self::Deployment(d) => Some((&d.user, &d.group)),
        }
    }

    /// Path this declaration produces on disk, for parent lookups
    fn produced_path(&self) -> Option<&Path> {
        match self {
            Self::Directory(d) => Some(&d.path),
            Self::Deployment(d) => Some(&d.destination),
            _ => None,
        }
    }
}

/// A declaration with its dependency keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub declaration: Declaration,
    pub dependencies: Vec<ResourceKey>,
}

impl Declared {
    pub fn key(&self) -> ResourceKey {
        self.declaration.key()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Every declaration for one convergence run, in declaration order
#[derive(Debug, Clone)]
pub struct Catalog {
    pub bindings: Bindings,
    pub entries: Vec<Declared>,
}

impl Catalog {
    /// Instantiate, wire and validate the declarations for a configuration
    ///
    /// Every template is rendered once here, so a template that references
    /// an unbound name fails the run before anything touches the host.
    pub fn build(config: &ResolvedConfig, facts: &Facts) -> declarative::Result<Self> {
        let declarations = declare(config);
        let entries = wire(declarations)?;
        check_references(&entries)?;

        let bindings = templates::bindings(config, facts);
        for entry in &entries {
            if let Declaration::File(FileDecl {
                source: FileSource::Template(id),
                ..
            }) = &entry.declaration
            {
                id.template().render(&bindings)?;
            }
        }

        log::debug!("Catalog has {} declarations", entries.len());
        Ok(Self {
            bindings,
            entries,
        })
    }

    /// Templated and copied files, in declaration order
    pub fn files(&self) -> impl Iterator<Item = &FileDecl> {
        self.entries.iter().filter_map(|e| match &e.declaration {
            Declaration::File(f) => Some(f),
            _ => None,
        })
    }

    /// Render the templated file declared at `path`
    ///
    /// Returns `None` when no templated file is declared there.
    pub fn render(&self, path: &Path) -> Option<declarative::Result<String>> {
        self.files().find(|f| f.path == path).and_then(|f| match f.source {
            FileSource::Template(id) => Some(id.template().render(&self.bindings)),
            _ => None,
        })
    }
}

/// Instantiate the declarations in declaration order
fn declare(config: &ResolvedConfig) -> Vec<Declaration> {
    let user = config.user.as_str();
    let group = config.group.as_str();
    let dir = |path: &Path| {
        Declaration::Directory(DirectoryDecl {
            path: path.to_path_buf(),
            owner: user.to_string(),
            group: group.to_string(),
            mode: DIR_MODE,
        })
    };
    let file = |path: PathBuf, mode: u32, source: FileSource| {
        Declaration::File(FileDecl {
            path,
            owner: user.to_string(),
            group: group.to_string(),
            mode,
            source,
        })
    };
    let java_home = paths::display(&config.java.deploy_dir);
    let maven_home = paths::display(&config.maven.deploy_dir);
    let tomcat = &config.tomcat.deploy_dir;

    vec![
        Declaration::Group(GroupDecl {
            name: group.to_string(),
        }),
        Declaration::User(UserDecl {
            name: user.to_string(),
            group: group.to_string(),
            shell: config.shell.clone(),
            home: config.home.clone(),
            manage_home: true,
        }),
        dir(&config.home),
        file(config.user_profile.clone(), FILE_MODE, FileSource::Unmanaged),
        dir(&config.sandbox_home),
        dir(&config.datadir),
        dir(&config.configdir),
        Declaration::Deployment(DeploymentDecl {
            name: "java".to_string(),
            source: config.java.source.clone(),
            destination: config.java.deploy_dir.clone(),
            user: user.to_string(),
            group: group.to_string(),
            profile: Some(config.user_profile.clone()),
            exports: vec![
                Export::new("JAVA_HOME", java_home),
                Export::new("PATH", "$JAVA_HOME/bin:$PATH"),
            ],
            excluded_webapps: Vec::new(),
        }),
        Declaration::Deployment(DeploymentDecl {
            name: "maven".to_string(),
            source: config.maven.source.clone(),
            destination: config.maven.deploy_dir.clone(),
            user: user.to_string(),
            group: group.to_string(),
            profile: Some(config.user_profile.clone()),
            exports: vec![
                Export::new("M2_HOME", maven_home),
                Export::new("PATH", "$M2_HOME/bin:$PATH"),
            ],
            excluded_webapps: Vec::new(),
        }),
        Declaration::Deployment(DeploymentDecl {
            name: "tomcat".to_string(),
            source: config.tomcat.source.clone(),
            destination: tomcat.clone(),
            user: user.to_string(),
            group: group.to_string(),
            profile: None,
            exports: Vec::new(),
            excluded_webapps: EXCLUDED_WEBAPPS.iter().map(ToString::to_string).collect(),
        }),
        dir(&tomcat.join("webapps")),
        dir(&tomcat.join("conf")),
        dir(&tomcat.join("bin")),
        file(
            tomcat.join("webapps").join(WAR_ARTIFACT),
            FILE_MODE,
            FileSource::Artifact(WAR_ARTIFACT),
        ),
        file(
            tomcat.join("conf/server.xml"),
            SERVER_XML_MODE,
            FileSource::Template(TemplateId::ServerXml),
        ),
        file(
            tomcat.join("bin/setenv.sh"),
            SCRIPT_MODE,
            FileSource::Template(TemplateId::SetenvSh),
        ),
        file(
            config.configdir.join("repository.json"),
            FILE_MODE,
            FileSource::Template(TemplateId::RepositoryJson),
        ),
        file(
            config.configdir.join("jgroups-fcrepo-tcp.xml"),
            FILE_MODE,
            FileSource::Template(TemplateId::JgroupsTcp),
        ),
        file(
            config.configdir.join("infinispan.xml"),
            FILE_MODE,
            FileSource::Template(TemplateId::Infinispan),
        ),
    ]
}

/// Attach explicit dependency keys to each declaration
fn wire(declarations: Vec<Declaration>) -> declarative::Result<Vec<Declared>> {
    let producers: Vec<(PathBuf, ResourceKey)> = declarations
        .iter()
        .filter_map(|d| d.produced_path().map(|p| (p.to_path_buf(), d.key())))
        .collect();

    // Nearest strict ancestor among declared producers
    let parent_producer = |path: &Path| -> Option<ResourceKey> {
        producers
            .iter()
            .filter(|(p, _)| p != path && paths::is_within(path, p))
            .max_by_key(|(p, _)| p.components().count())
            .map(|(_, key)| key.clone())
    };

    let mut previous_deployment: Option<ResourceKey> = None;
    let mut wired = Vec::with_capacity(declarations.len());

    for declaration in declarations {
        let mut deps: Vec<ResourceKey> = Vec::new();
        match &declaration {
            Declaration::Group(_) => {}
            Declaration::User(u) => deps.push(ResourceKey::group(&u.group)),
            Declaration::Directory(d) => {
                deps.push(ResourceKey::user(&d.owner));
                deps.push(ResourceKey::group(&d.group));
                deps.extend(parent_producer(&d.path));
            }
            Declaration::File(f) => {
                deps.push(ResourceKey::user(&f.owner));
                deps.push(ResourceKey::group(&f.group));
                let parent = f.path.parent().unwrap_or(Path::new("/"));
                let declared_parent = producers
                    .iter()
                    .find(|(p, _)| p == parent)
                    .map(|(_, key)| key.clone());
                match declared_parent {
                    Some(key) => deps.push(key),
                    None => {
                        return Err(Error::configuration(format!(
                            "parent directory {} of {} is not declared",
                            parent.display(),
                            f.path.display()
                        )));
                    }
                }
            }
            Declaration::Deployment(d) => {
                deps.push(ResourceKey::user(&d.user));
                deps.push(ResourceKey::group(&d.group));
                deps.extend(parent_producer(&d.destination));
                if let Some(profile) = &d.profile {
                    deps.push(ResourceKey::file(paths::display(profile)));
                }
                if let Some(prev) = previous_deployment.replace(declaration.key()) {
                    deps.push(prev);
                }
            }
        }
        deps.dedup();
        wired.push(Declared {
            declaration,
            dependencies: deps,
        });
    }

    Ok(wired)
}

/// Owners, groups and dependencies must all name declared resources
fn check_references(entries: &[Declared]) -> declarative::Result<()> {
    let declared: HashSet<ResourceKey> = entries.iter().map(Declared::key).collect();

    for entry in entries {
        let key = entry.key();
        if let Some((owner, group)) = entry.declaration.ownership() {
            if !matches!(entry.declaration, Declaration::User(_))
                && !declared.contains(&ResourceKey::user(owner))
            {
                return Err(Error::configuration(format!(
                    "{key} is owned by undeclared user '{owner}'"
                )));
            }
            if !declared.contains(&ResourceKey::group(group)) {
                return Err(Error::configuration(format!(
                    "{key} references undeclared group '{group}'"
                )));
            }
        }
        if let Some(missing) = entry.dependencies.iter().find(|d| !declared.contains(d)) {
            return Err(Error::configuration(format!(
                "{key} depends on undeclared {missing}"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
