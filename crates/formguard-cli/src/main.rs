//! Formguard - form validation annotations over JSON document snapshots
//!
//! Main entry point for the `formguard` binary. Reports go to stdout as
//! JSON; logs go to stderr.

mod cli;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use formguard_dom::{MemoryDocument, NodeId};
use formguard_forms::ResolvedForm;
use formguard_engine::{
    Config, DocumentScope, FormValidator, JsonFileStateStore, PlanLimits, ScanReport, StaticLimits,
};

use cli::{Cli, Commands, Target};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    smol::block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(tier) = cli.tier {
        config.plan_tier = tier;
    }
    let limits = load_limits(cli.limits.as_deref())?;
    let store = Arc::new(JsonFileStateStore::new(&cli.state));

    match cli.command {
        Commands::Scan { target } => {
            let (_, validator) = open(&target, &config, &limits, &store)?;
            let report = validator.scan(&scope(&target)).await?;
            print_json(&report)
        }
        Commands::Apply {
            target,
            forms,
            dry_run,
            out,
        } => {
            let (doc, validator) = open(&target, &config, &limits, &store)?;
            let scope = scope(&target);
            let scan = validator.scan(&scope).await?;
            let selected = select_forms(&scan, &forms)?;

            if dry_run {
                let mut plans = Vec::new();
                for form in &selected {
                    plans.push(validator.plan_validation(form, &config.rules, chrono::Utc::now()).await?);
                }
                return print_json(&plans);
            }

            let mut cache = validator.limits_cache();
            let mut reports = Vec::new();
            for form in &selected {
                reports.push(validator.apply_validation(&scope, form, &config.rules, &mut cache).await?);
            }
            save(&doc, out.as_deref().unwrap_or(&target.document))?;
            print_json(&reports)
        }
        Commands::Remove { target, forms, out } => {
            let (doc, validator) = open(&target, &config, &limits, &store)?;
            let scope = scope(&target);
            let scan = validator.scan(&scope).await?;
            let selected = select_forms(&scan, &forms)?;

            let mut reports = Vec::new();
            for form in &selected {
                reports.push(validator.remove_validation(&scope, form).await?);
            }
            save(&doc, out.as_deref().unwrap_or(&target.document))?;
            print_json(&reports)
        }
        Commands::Prune { target } => {
            let (_, validator) = open(&target, &config, &limits, &store)?;
            let report = validator.prune_states(&scope(&target)).await?;
            print_json(&report)
        }
    }
}

fn open(
    target: &Target,
    config: &Config,
    limits: &StaticLimits,
    store: &Arc<JsonFileStateStore>,
) -> anyhow::Result<(Arc<MemoryDocument>, FormValidator)> {
    let json = std::fs::read_to_string(&target.document)
        .with_context(|| format!("Failed to read document {}", target.document.display()))?;
    let doc = Arc::new(MemoryDocument::from_json(&json).context("Invalid document snapshot")?);
    tracing::debug!("Loaded {} nodes from {}", doc.outline().len(), target.document.display());

    let validator = FormValidator::new(doc.clone(), Arc::new(limits.clone()), store.clone(), config.clone());
    Ok((doc, validator))
}

fn scope(target: &Target) -> DocumentScope {
    let scope = DocumentScope::new(target.scope.clone());
    match &target.root {
        Some(root) => scope.within(root.as_str()),
        None => scope,
    }
}

fn load_limits(path: Option<&Path>) -> anyhow::Result<StaticLimits> {
    let Some(path) = path else {
        return Ok(StaticLimits::new());
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read limits {}", path.display()))?;
    let tiers: HashMap<String, PlanLimits> = serde_json::from_str(&json).context("Invalid limits file")?;
    Ok(tiers
        .into_iter()
        .fold(StaticLimits::new(), |limits, (tier, plan)| limits.with_tier(&tier, plan)))
}

/// Scanned forms matching `ids`, or every scanned form when `ids` is empty
fn select_forms(scan: &ScanReport, ids: &[String]) -> anyhow::Result<Vec<ResolvedForm>> {
    if ids.is_empty() {
        return Ok(scan.resolved_forms());
    }
    let mut selected = Vec::new();
    for id in ids {
        match scan.form(&NodeId::from(id.as_str())) {
            Some(found) => selected.push(found.form.clone()),
            None => bail!("Form {} not found among scanned forms", id),
        }
    }
    Ok(selected)
}

fn save(doc: &MemoryDocument, path: &Path) -> anyhow::Result<()> {
    let json = doc.to_json()?;
    std::fs::write(path, json).with_context(|| format!("Failed to write document {}", path.display()))?;
    tracing::info!("Saved document to {}", path.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use formguard_dom::NodeType;
    use formguard_engine::MemoryStateStore;

    fn scanned() -> ScanReport {
        let doc = Arc::new(MemoryDocument::new());
        for label in ["Email", "Phone"] {
            let form = doc.append(None, NodeType::Form, &[]).unwrap();
            doc.append(Some(&form), NodeType::TextInput, &[("label", label), ("required", "")])
                .unwrap();
        }
        let validator = FormValidator::new(
            doc,
            Arc::new(StaticLimits::new()),
            Arc::new(MemoryStateStore::new()),
            Config::default(),
        );
        smol::block_on(validator.scan(&DocumentScope::new("test"))).unwrap()
    }

    #[test]
    fn test_select_forms() {
        let scan = scanned();
        assert_eq!(select_forms(&scan, &[]).unwrap().len(), 2);

        let second = scan.forms[1].form.node_id.to_string();
        let selected = select_forms(&scan, &[second.clone()]).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].node_id.as_str(), second);

        assert!(select_forms(&scan, &["missing".to_string()]).is_err());
    }

    #[test]
    fn test_load_limits_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");
        std::fs::write(
            &path,
            r#"{"pro": {"maxForms": 10, "maxRequiredFieldsPerForm": 20, "supportedFieldTypes": ["email", "phone"]}}"#,
        )
        .unwrap();

        let limits = load_limits(Some(&path)).unwrap();
        let pro = smol::block_on(formguard_engine::LimitsService::get_limits(&limits, "pro")).unwrap();
        assert_eq!(pro.max_forms, 10);
        assert_eq!(pro.supported_field_types.len(), 2);
        assert!(load_limits(None).is_ok());
    }

    #[test]
    fn test_scope_root() {
        let target = Target {
            document: "page.json".into(),
            scope: "site".to_string(),
            root: Some("main".to_string()),
        };
        assert_eq!(scope(&target), DocumentScope::new("site").within("main"));
    }
}
