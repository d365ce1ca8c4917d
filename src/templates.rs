//! Shipped configuration templates
//!
//! The template bodies live under `templates/` and are compiled into the
//! binary. Each one is rendered against a [`Bindings`] map assembled from
//! host facts and the resolved configuration.

use declarative::{Bindings, Facts, Template};

use crate::config::ResolvedConfig;
use crate::paths;

/// The templated files this profile manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    /// Application server descriptor (`<tomcat>/conf/server.xml`)
    ServerXml,
    /// Application server environment script (`<tomcat>/bin/setenv.sh`)
    SetenvSh,
    /// Repository configuration (`<configdir>/repository.json`)
    RepositoryJson,
    /// Cluster discovery configuration (`<configdir>/jgroups-fcrepo-tcp.xml`)
    JgroupsTcp,
    /// Storage and cache configuration (`<configdir>/infinispan.xml`)
    Infinispan,
}

impl TemplateId {
    /// File name the template renders to
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::ServerXml => "server.xml",
            Self::SetenvSh => "setenv.sh",
            Self::RepositoryJson => "repository.json",
            Self::JgroupsTcp => "jgroups-fcrepo-tcp.xml",
            Self::Infinispan => "infinispan.xml",
        }
    }

    const fn source(self) -> &'static str {
        match self {
            Self::ServerXml => include_str!("../templates/server.xml"),
            Self::SetenvSh => include_str!("../templates/setenv.sh"),
            Self::RepositoryJson => include_str!("../templates/repository.json"),
            Self::JgroupsTcp => include_str!("../templates/jgroups-fcrepo-tcp.xml"),
            Self::Infinispan => include_str!("../templates/infinispan.xml"),
        }
    }

    pub const fn template(self) -> Template<'static> {
        Template::new(self.file_name(), self.source())
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Assemble the bindings every template is rendered with
///
/// All values are gathered up front; rendering never consults the host.
pub fn bindings(config: &ResolvedConfig, facts: &Facts) -> Bindings {
    Bindings::builder()
        .bind("hostname", &facts.hostname)
        .bind("os_family", &facts.os_family)
        .bind("user", &config.user)
        .bind("group", &config.group)
        .bind("sandbox_home", paths::display(&config.sandbox_home))
        .bind("datadir", paths::display(&config.datadir))
        .bind("configdir", paths::display(&config.configdir))
        .bind("java_home", paths::display(&config.java.deploy_dir))
        .bind("maven_home", paths::display(&config.maven.deploy_dir))
        .bind("catalina_home", paths::display(&config.tomcat.deploy_dir))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;

    fn facts() -> Facts {
        Facts {
            hostname: "FedoraTestNode".to_string(),
            os_family: "RedHat".to_string(),
        }
    }

    fn render(id: TemplateId, config: &ProvisionConfig) -> String {
        let resolved = config.resolve().unwrap();
        id.template().render(&bindings(&resolved, &facts())).unwrap()
    }

    #[test]
    fn test_every_template_renders_with_default_bindings() {
        let config = ProvisionConfig::default();
        for id in [
            TemplateId::ServerXml,
            TemplateId::SetenvSh,
            TemplateId::RepositoryJson,
            TemplateId::JgroupsTcp,
            TemplateId::Infinispan,
        ] {
            let out = render(id, &config);
            assert!(!out.contains("{{"), "{id} left a placeholder behind");
        }
    }

    #[test]
    fn test_cluster_and_server_descriptors_carry_hostname() {
        let config = ProvisionConfig::default();
        assert!(render(TemplateId::JgroupsTcp, &config).contains("FedoraTestNode"));
        assert!(render(TemplateId::ServerXml, &config).contains("FedoraTestNode"));
    }

    #[test]
    fn test_config_dir_is_embedded() {
        let config = ProvisionConfig::default();
        for id in [
            TemplateId::SetenvSh,
            TemplateId::RepositoryJson,
            TemplateId::Infinispan,
        ] {
            assert!(render(id, &config).contains("/fedora/config"), "{id}");
        }
    }

    #[test]
    fn test_storage_descriptor_uses_data_dir() {
        assert!(render(TemplateId::Infinispan, &ProvisionConfig::default()).contains("/data/"));

        let moved = ProvisionConfig {
            fcrepo_datadir: Some("/opt/fedora/data".into()),
            ..Default::default()
        };
        let out = render(TemplateId::Infinispan, &moved);
        assert!(out.contains("/opt/fedora/data/"));
        assert!(!out.contains("\"/data/"));
    }

    #[test]
    fn test_rendered_json_is_valid() {
        let out = render(TemplateId::RepositoryJson, &ProvisionConfig::default());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            value["storage"]["cacheConfiguration"],
            "/fedora/config/infinispan.xml"
        );
    }
}
