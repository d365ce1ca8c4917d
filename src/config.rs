//! Provisioning configuration
//!
//! [`ProvisionConfig`] is what the caller supplies: the twelve recognized
//! options, every one optional. [`ProvisionConfig::resolve`] substitutes the
//! documented defaults, validates the result, and produces a
//! [`ResolvedConfig`] that later stages receive by value.

use anyhow::{Context, Result, bail};
use declarative::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::paths;

pub const DEFAULT_USER: &str = "fcrepo";
pub const DEFAULT_GROUP: &str = "fcrepo";
pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_SANDBOX_HOME: &str = "/fedora";
pub const DEFAULT_DATADIR: &str = "/data";
pub const DEFAULT_JAVA_SOURCE: &str = "jdk-7u51-linux-x64.tar.gz";
pub const DEFAULT_MAVEN_SOURCE: &str = "apache-maven-3.1.1-bin.tar.gz";
pub const DEFAULT_TOMCAT_SOURCE: &str = "apache-tomcat-7.0.50.tar.gz";

/// Directory names of the default deployments inside the sandbox
const CONFIG_DIR_NAME: &str = "config";
const JAVA_DIR_NAME: &str = "java7";
const MAVEN_DIR_NAME: &str = "maven3";
const TOMCAT_DIR_NAME: &str = "tomcat7";

/// POSIX-portable account names, as useradd accepts them
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

// ============================================================================
// Caller-supplied configuration
// ============================================================================

/// The recognized options; `None` means "use the default"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcrepo_sandbox_home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcrepo_datadir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcrepo_configdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_deploydir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maven_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maven_deploydir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tomcat_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tomcat_deploydir: Option<String>,
}

impl ProvisionConfig {
    /// Load a config file; `.json` is read as JSON, anything else as TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON config: {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML config: {}", path.display()))
        }
    }

    /// Layer `overrides` on top of this config; set options in `overrides` win
    pub fn merge(self, overrides: Self) -> Self {
        Self {
            user: overrides.user.or(self.user),
            group: overrides.group.or(self.group),
            user_profile: overrides.user_profile.or(self.user_profile),
            fcrepo_sandbox_home: overrides.fcrepo_sandbox_home.or(self.fcrepo_sandbox_home),
            fcrepo_datadir: overrides.fcrepo_datadir.or(self.fcrepo_datadir),
            fcrepo_configdir: overrides.fcrepo_configdir.or(self.fcrepo_configdir),
            java_source: overrides.java_source.or(self.java_source),
            java_deploydir: overrides.java_deploydir.or(self.java_deploydir),
            maven_source: overrides.maven_source.or(self.maven_source),
            maven_deploydir: overrides.maven_deploydir.or(self.maven_deploydir),
            tomcat_source: overrides.tomcat_source.or(self.tomcat_source),
            tomcat_deploydir: overrides.tomcat_deploydir.or(self.tomcat_deploydir),
        }
    }

    /// Substitute defaults and validate
    ///
    /// The group does not follow a custom user name: it stays `fcrepo`
    /// unless `group` is given explicitly.
    pub fn resolve(&self) -> declarative::Result<ResolvedConfig> {
        let user = account_name("user", self.user.as_deref().unwrap_or(DEFAULT_USER))?;
        let group = account_name("group", self.group.as_deref().unwrap_or(DEFAULT_GROUP))?;

        let home = PathBuf::from("/home").join(&user);
        let user_profile = match &self.user_profile {
            Some(p) => option_path("user_profile", p)?,
            None => home.join(".bashrc"),
        };

        let sandbox_home = match &self.fcrepo_sandbox_home {
            Some(p) => option_path("fcrepo_sandbox_home", p)?,
            None => PathBuf::from(DEFAULT_SANDBOX_HOME),
        };
        let datadir = match &self.fcrepo_datadir {
            Some(p) => option_path("fcrepo_datadir", p)?,
            None => PathBuf::from(DEFAULT_DATADIR),
        };
        let configdir = match &self.fcrepo_configdir {
            Some(p) => option_path("fcrepo_configdir", p)?,
            None => sandbox_home.join(CONFIG_DIR_NAME),
        };

        let java = software(
            "java",
            self.java_source.as_deref(),
            DEFAULT_JAVA_SOURCE,
            self.java_deploydir.as_deref(),
            &sandbox_home.join(JAVA_DIR_NAME),
        )?;
        let maven = software(
            "maven",
            self.maven_source.as_deref(),
            DEFAULT_MAVEN_SOURCE,
            self.maven_deploydir.as_deref(),
            &sandbox_home.join(MAVEN_DIR_NAME),
        )?;
        let tomcat = software(
            "tomcat",
            self.tomcat_source.as_deref(),
            DEFAULT_TOMCAT_SOURCE,
            self.tomcat_deploydir.as_deref(),
            &sandbox_home.join(TOMCAT_DIR_NAME),
        )?;

        let resolved = ResolvedConfig {
            user,
            group,
            shell: DEFAULT_SHELL.to_string(),
            home,
            user_profile,
            sandbox_home,
            datadir,
            configdir,
            java,
            maven,
            tomcat,
        };
        resolved.check_layout()?;

        log::debug!(
            "Resolved config: user={} group={} sandbox={}",
            resolved.user,
            resolved.group,
            resolved.sandbox_home.display()
        );
        Ok(resolved)
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// A software deployment's source artifact and destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftwareConfig {
    /// File name of the source artifact
    pub source: String,
    /// Directory the artifact unpacks into
    pub deploy_dir: PathBuf,
}

/// Fully defaulted and validated configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub user: String,
    pub group: String,
    pub shell: String,
    pub home: PathBuf,
    pub user_profile: PathBuf,
    pub sandbox_home: PathBuf,
    pub datadir: PathBuf,
    pub configdir: PathBuf,
    pub java: SoftwareConfig,
    pub maven: SoftwareConfig,
    pub tomcat: SoftwareConfig,
}

impl ResolvedConfig {
    /// Directories created directly, with the option that names each
    fn managed_dirs(&self) -> [(&'static str, &Path); 4] {
        [
            ("fcrepo_sandbox_home", &self.sandbox_home),
            ("fcrepo_datadir", &self.datadir),
            ("fcrepo_configdir", &self.configdir),
            ("user home", &self.home),
        ]
    }

    /// Deployment destinations, with the option that names each
    fn deploy_dirs(&self) -> [(&'static str, &Path); 3] {
        [
            ("java_deploydir", &self.java.deploy_dir),
            ("maven_deploydir", &self.maven.deploy_dir),
            ("tomcat_deploydir", &self.tomcat.deploy_dir),
        ]
    }

    /// Reject layouts where declared paths collide or a deployment would
    /// unpack over another declared path
    fn check_layout(&self) -> declarative::Result<()> {
        let all: Vec<(&str, &Path)> = self
            .managed_dirs()
            .into_iter()
            .chain(self.deploy_dirs())
            .chain([("user_profile", self.user_profile.as_path())])
            .collect();

        for (i, (name_a, a)) in all.iter().enumerate() {
            for (name_b, b) in &all[i + 1..] {
                if a == b {
                    return Err(Error::configuration(format!(
                        "{name_a} and {name_b} both resolve to {}",
                        a.display()
                    )));
                }
            }
        }

        for (deploy_name, deploy_dir) in self.deploy_dirs() {
            for (other_name, other) in &all {
                if *other_name == deploy_name {
                    continue;
                }
                if paths::is_within(other, deploy_dir) {
                    return Err(Error::configuration(format!(
                        "{other_name} ({}) lies inside {deploy_name} ({}), which the deployment unpacks over",
                        other.display(),
                        deploy_dir.display()
                    )));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn account_name(option: &str, name: &str) -> declarative::Result<String> {
    if NAME_PATTERN.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(Error::configuration(format!(
            "{option} '{name}' is not a valid account name"
        )))
    }
}

fn option_path(option: &str, value: &str) -> declarative::Result<PathBuf> {
    paths::clean_absolute(value).map_err(|e| Error::configuration(format!("{option}: {e}")))
}

fn source_name(option: &str, value: &str) -> declarative::Result<String> {
    let valid = !value.is_empty() && !value.contains('/') && value != "." && value != "..";
    if valid {
        Ok(value.to_string())
    } else {
        Err(Error::configuration(format!(
            "{option} '{value}' must be a plain artifact file name"
        )))
    }
}

fn software(
    name: &str,
    source: Option<&str>,
    default_source: &str,
    deploy_dir: Option<&str>,
    default_deploy_dir: &Path,
) -> declarative::Result<SoftwareConfig> {
    let source = source_name(&format!("{name}_source"), source.unwrap_or(default_source))?;
    let deploy_dir = match deploy_dir {
        Some(p) => option_path(&format!("{name}_deploydir"), p)?,
        None => default_deploy_dir.to_path_buf(),
    };
    Ok(SoftwareConfig { source, deploy_dir })
}

/// Parse `key=value` pairs from the command line into a config layer
pub fn parse_assignment(config: &mut ProvisionConfig, assignment: &str) -> Result<()> {
    let Some((key, value)) = assignment.split_once('=') else {
        bail!("Expected key=value, got '{assignment}'");
    };
    let value = Some(value.to_string());
    match key.trim() {
        "user" => config.user = value,
        "group" => config.group = value,
        "user_profile" => config.user_profile = value,
        "fcrepo_sandbox_home" => config.fcrepo_sandbox_home = value,
        "fcrepo_datadir" => config.fcrepo_datadir = value,
        "fcrepo_configdir" => config.fcrepo_configdir = value,
        "java_source" => config.java_source = value,
        "java_deploydir" => config.java_deploydir = value,
        "maven_source" => config.maven_source = value,
        "maven_deploydir" => config.maven_deploydir = value,
        "tomcat_source" => config.tomcat_source = value,
        "tomcat_deploydir" => config.tomcat_deploydir = value,
        other => bail!("Unknown option '{other}'"),
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
