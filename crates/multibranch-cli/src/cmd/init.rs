use anyhow::{bail, Context};
use multibranch_core::config::{Config, SourceConfig};
use multibranch_core::paths;
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>, sources: &[String]) -> anyhow::Result<()> {
    let name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    println!("Initializing multibranch project in: {}", root.display());

    let branches = paths::branches_dir(root);
    std::fs::create_dir_all(&branches)
        .with_context(|| format!("failed to create {}", branches.display()))?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        if !sources.is_empty() {
            bail!("{} already exists; edit it to change sources", paths::CONFIG_FILE);
        }
        println!("  exists:  {}", paths::CONFIG_FILE);
        return Ok(());
    }

    let mut config = Config::new(name);
    for spec in sources {
        config.sources.push(parse_source(spec)?);
    }
    config.save(root).context("failed to write config.yaml")?;
    println!("  created: {}", paths::CONFIG_FILE);
    for source in &config.sources {
        println!("  source:  {}", source.id);
    }
    Ok(())
}

/// `ID=git:REMOTE` or `ID=manifest:PATH`.
fn parse_source(spec: &str) -> anyhow::Result<SourceConfig> {
    let Some((id, rest)) = spec.split_once('=') else {
        bail!("invalid source '{spec}': expected ID=git:REMOTE or ID=manifest:PATH");
    };
    match rest.split_once(':') {
        Some(("git", remote)) if !remote.is_empty() => Ok(SourceConfig::git(id, remote)),
        Some(("manifest", path)) if !path.is_empty() => Ok(SourceConfig::manifest(id, path)),
        _ => bail!("invalid source '{spec}': expected ID=git:REMOTE or ID=manifest:PATH"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multibranch_core::config::SourceKind;

    #[test]
    fn parses_source_specs() {
        let git = parse_source("origin=git:git@example.com:team/repo.git").unwrap();
        assert_eq!(git.id, "origin");
        assert_eq!(
            git.kind,
            SourceKind::Git {
                remote: "git@example.com:team/repo.git".to_string()
            }
        );
        let manifest = parse_source("local=manifest:heads.yaml").unwrap();
        assert!(matches!(manifest.kind, SourceKind::Manifest { .. }));
        assert!(parse_source("nope").is_err());
        assert!(parse_source("x=svn:whatever").is_err());
    }
}
