//! Export Document Rendering
//!
//! Pure functions from `(svm, protocol settings, export rules)` to the
//! NFS-Ganesha document, its content hash and its metadata sidecar.

use crate::config::ArcaConfig;
use crate::domain::records::ExportRule;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Layout version of the rendered document
pub const TEMPLATE_VERSION: &str = "1.0.0";

/// Hex characters kept from the content hash
pub const CONFIG_VERSION_LEN: usize = 12;

/// Metadata stored next to every config snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMeta {
    pub template_version: String,
    pub config_version: String,
    pub protocols: String,
    pub mountd_port: u16,
    /// Only meaningful with NFSv3
    pub nlm_port: Option<u16>,
    pub exports: Vec<ExportRule>,
}

/// A rendered document and everything derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub config_version: String,
    pub content: String,
    pub meta: ConfigMeta,
}

/// Hashed input; field names are part of the version identity
#[derive(Serialize)]
struct VersionInput<'a> {
    svm: &'a str,
    protocols: &'a str,
    mountd_port: u16,
    nlm_port: u16,
    exports: &'a [ExportRule],
}

/// Whether `raw` has the shape of a config version
pub fn is_config_version(raw: &str) -> bool {
    raw.len() == CONFIG_VERSION_LEN && raw.chars().all(|c| c.is_ascii_hexdigit())
}

/// Order rules by `(export_id, path, client)`
pub fn sort_rules(rules: &mut [ExportRule]) {
    rules.sort_by(|a, b| {
        (a.export_id, &a.path, &a.client).cmp(&(b.export_id, &b.path, &b.client))
    });
}

/// Content hash of the canonical render input
pub fn config_version(
    svm: &str,
    protocols: &str,
    mountd_port: u16,
    nlm_port: u16,
    sorted_rules: &[ExportRule],
) -> Result<String> {
    let input = VersionInput {
        svm,
        protocols,
        mountd_port,
        nlm_port,
        exports: sorted_rules,
    };
    // Through Value so object keys are sorted
    let canonical = serde_json::to_string(&serde_json::to_value(&input)?)?;
    let mut version = hex::encode(Sha256::digest(canonical.as_bytes()));
    version.truncate(CONFIG_VERSION_LEN);
    Ok(version)
}

/// Render the document for an SVM
pub fn render(svm: &str, rules: &[ExportRule], config: &ArcaConfig) -> Result<RenderedConfig> {
    let mut rules = rules.to_vec();
    sort_rules(&mut rules);

    let protocols = config.ganesha_protocols.render();
    let v3 = config.ganesha_protocols.v3_enabled();
    let version = config_version(
        svm,
        &protocols,
        config.ganesha_mountd_port,
        config.ganesha_nlm_port,
        &rules,
    )?;

    let mut out = String::new();
    out.push_str(&format!("# NFS-Ganesha configuration for SVM {}\n", svm));
    out.push_str("# Managed by arca-storage; local edits are overwritten.\n");
    out.push_str(&format!("# template_version: {}\n", TEMPLATE_VERSION));
    out.push_str(&format!("# config_version: {}\n\n", version));

    out.push_str("NFS_CORE_PARAM {\n");
    out.push_str(&format!("    Protocols = {};\n", protocols));
    if v3 {
        out.push_str("    Enable_NLM = true;\n");
        out.push_str(&format!("    MNT_Port = {};\n", config.ganesha_mountd_port));
        out.push_str(&format!("    NLM_Port = {};\n", config.ganesha_nlm_port));
    } else {
        out.push_str("    Enable_NLM = false;\n");
        out.push_str("    Enable_RQUOTA = false;\n");
    }
    out.push_str("}\n\n");

    out.push_str("NFSV4 {\n");
    out.push_str("    Graceless = false;\n");
    out.push_str("    Lease_Lifetime = 60;\n");
    out.push_str("}\n");

    for rule in &rules {
        out.push_str(&render_export(rule, &protocols));
    }

    let meta = ConfigMeta {
        template_version: TEMPLATE_VERSION.to_string(),
        config_version: version.clone(),
        protocols,
        mountd_port: config.ganesha_mountd_port,
        nlm_port: v3.then_some(config.ganesha_nlm_port),
        exports: rules,
    };

    Ok(RenderedConfig {
        config_version: version,
        content: out,
        meta,
    })
}

fn render_export(rule: &ExportRule, protocols: &str) -> String {
    let sec: Vec<&str> = rule
        .sec
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let sec = if sec.is_empty() { "sys".to_string() } else { sec.join(", ") };

    format!(
        "\nEXPORT {{\n    Export_Id = {id};\n    Path = \"{path}\";\n    Pseudo = \"{pseudo}\";\n    Protocols = {protocols};\n    Transports = TCP;\n    Access_Type = None;\n    Squash = {squash};\n    SecType = {sec};\n\n    FSAL {{\n        Name = VFS;\n    }}\n\n    CLIENT {{\n        Clients = {client};\n        Access_Type = {access};\n    }}\n}}\n",
        id = rule.export_id,
        path = rule.path,
        pseudo = rule.pseudo,
        protocols = protocols,
        squash = rule.squash,
        sec = sec,
        client = rule.client,
        access = rule.access,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NfsProtocols;
    use crate::domain::records::{Access, Squash};

    fn rule(export_id: u32, volume: &str, client: &str) -> ExportRule {
        ExportRule {
            export_id,
            path: format!("/exports/tenantA/{}", volume),
            pseudo: format!("/exports/tenantA/{}", volume),
            access: Access::ReadWrite,
            squash: Squash::RootSquash,
            sec: vec!["sys".into()],
            client: client.into(),
        }
    }

    #[test]
    fn test_render_is_order_independent() {
        let config = ArcaConfig::default();
        let a = vec![rule(1, "vol1", "10.0.0.0/24"), rule(2, "vol2", "10.0.1.0/24")];
        let b = vec![a[1].clone(), a[0].clone()];

        let first = render("tenantA", &a, &config).unwrap();
        let second = render("tenantA", &b, &config).unwrap();
        assert_eq!(first, second);
        assert!(is_config_version(&first.config_version));
        assert!(first.content.find("Export_Id = 1;").unwrap() < first.content.find("Export_Id = 2;").unwrap());
    }

    #[test]
    fn test_version_tracks_inputs() {
        let config = ArcaConfig::default();
        let rules = vec![rule(1, "vol1", "10.0.0.0/24")];
        let base = render("tenantA", &rules, &config).unwrap().config_version;

        assert_ne!(render("tenantB", &rules, &config).unwrap().config_version, base);

        let mut ro = rules.clone();
        ro[0].access = Access::ReadOnly;
        assert_ne!(render("tenantA", &ro, &config).unwrap().config_version, base);

        let v3 = ArcaConfig {
            ganesha_protocols: NfsProtocols::parse("3,4"),
            ..ArcaConfig::default()
        };
        assert_ne!(render("tenantA", &rules, &v3).unwrap().config_version, base);
    }

    #[test]
    fn test_v3_ports_only_when_enabled() {
        let rules = vec![rule(1, "vol1", "10.0.0.0/24")];

        let v4 = render("tenantA", &rules, &ArcaConfig::default()).unwrap();
        assert!(v4.content.contains("Protocols = 4;"));
        assert!(!v4.content.contains("NLM_Port"));
        assert_eq!(v4.meta.nlm_port, None);

        let config = ArcaConfig {
            ganesha_protocols: NfsProtocols::parse("4,3"),
            ganesha_nlm_port: 4045,
            ..ArcaConfig::default()
        };
        let v3 = render("tenantA", &rules, &config).unwrap();
        assert!(v3.content.contains("Protocols = 3, 4;"));
        assert!(v3.content.contains("NLM_Port = 4045;"));
        assert!(v3.content.contains("MNT_Port = 20048;"));
        assert_eq!(v3.meta.nlm_port, Some(4045));
    }

    #[test]
    fn test_export_block_contents() {
        let mut r = rule(7, "vol1", "192.168.0.0/16");
        r.squash = Squash::NoRootSquash;
        r.access = Access::ReadOnly;
        r.sec = vec!["krb5".into(), " sys ".into()];

        let rendered = render("tenantA", &[r], &ArcaConfig::default()).unwrap();
        let content = &rendered.content;
        assert!(content.contains(&format!("# config_version: {}", rendered.config_version)));
        assert!(content.contains("# template_version: 1.0.0"));
        assert!(content.contains("Export_Id = 7;"));
        assert!(content.contains("Path = \"/exports/tenantA/vol1\";"));
        assert!(content.contains("Squash = No_Root_Squash;"));
        assert!(content.contains("SecType = krb5, sys;"));
        assert!(content.contains("Clients = 192.168.0.0/16;"));
        assert!(content.contains("Access_Type = RO;"));
    }

    #[test]
    fn test_is_config_version() {
        assert!(is_config_version("0123456789ab"));
        assert!(!is_config_version("latest"));
        assert!(!is_config_version("0123456789abc"));
        assert!(!is_config_version("b.0123456789"));
    }
}
