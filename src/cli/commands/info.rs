//! Info command implementation
//!
//! Implements `modbuild info`: describe modules, their install state and
//! their relations.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::cli::commands::Session;
use crate::cli::output::OutputConfig;
use crate::cli::GlobalArgs;
use crate::core::module::Module;
use crate::core::packagedb::PackageDatabase;
use crate::infra::process::CommandRunner;
use crate::modtypes::{source, PhaseContext};

/// Everything `info` reports about one module
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub module_set: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub installed_version: Option<String>,
    pub installed_date: Option<String>,
    pub source: String,
    pub source_dir: Option<String>,
    pub tree_id: Option<String>,
    pub requires: Vec<String>,
    pub required_by: Vec<String>,
    pub suggests: Vec<String>,
    pub after: Vec<String>,
    pub before: Vec<String>,
}

/// Execute the info command
pub async fn execute(global: &GlobalArgs, names: &[String]) -> Result<()> {
    let session = Session::load(global, global.overrides())?;
    let packagedb = session.open_packagedb()?;

    let names = if names.is_empty() {
        session.graph.modules().iter().map(|m| m.name.clone()).collect()
    } else {
        names.to_vec()
    };

    let mut infos = Vec::new();
    for name in &names {
        let module = session.graph.get_module(name, true)?;
        infos.push(describe(&session, &packagedb, module));
    }
    if infos.is_empty() {
        bail!("No modules to describe");
    }

    if OutputConfig::global().json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        for info in &infos {
            print_info(info);
        }
    }
    Ok(())
}

/// Collect the report for one module
pub fn describe(session: &Session, packagedb: &PackageDatabase, module: &Module) -> ModuleInfo {
    let runner = CommandRunner::new().with_capture(true);
    let ctx = PhaseContext::new(&session.config, &runner);
    let tree_id = session
        .registry
        .get(&module.module_type)
        .and_then(|adapter| adapter.freshness(module, &ctx));
    let record = packagedb.get(&module.name);
    let names = |modules: Vec<&Module>| -> Vec<String> {
        modules.into_iter().map(|m| m.name.clone()).collect()
    };

    ModuleInfo {
        name: module.name.clone(),
        module_set: module.moduleset_name.clone(),
        module_type: module.module_type.clone(),
        installed_version: record.map(|r| r.version.clone()),
        installed_date: record.map(|r| r.installed.format("%Y-%m-%d %H:%M:%S").to_string()),
        source: module.branch.describe(),
        source_dir: source::srcdir(module, &session.config).map(|p| p.display().to_string()),
        tree_id,
        requires: module.depends.clone(),
        required_by: names(session.graph.required_by(&module.name)),
        suggests: module.suggests.clone(),
        after: module.after.clone(),
        before: names(session.graph.before(&module.name)),
    }
}

fn print_info(info: &ModuleInfo) {
    println!("Name: {}", info.name);
    println!("Module Set: {}", info.module_set);
    println!("Type: {}", info.module_type);
    match (&info.installed_version, &info.installed_date) {
        (Some(version), Some(date)) => {
            println!("Install version: {version}");
            println!("Install date: {date}");
        }
        _ => println!("Install version: not installed"),
    }
    println!("Source: {}", info.source);
    if let Some(dir) = &info.source_dir {
        println!("Source dir: {dir}");
    }
    if let Some(tree_id) = &info.tree_id {
        println!("Tree-ID: {tree_id}");
    }
    for (label, list) in [
        ("Requires", &info.requires),
        ("Required by", &info.required_by),
        ("Suggests", &info.suggests),
        ("After", &info.after),
        ("Before", &info.before),
    ] {
        if !list.is_empty() {
            println!("{label}: {}", list.join(", "));
        }
    }
    println!();
}
