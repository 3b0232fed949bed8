use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tracing::info;

use arbor_catalog::{ArborConfig, InMemoryCatalog, ListOptions};
use arbor_store::{EntryCursor, FsPartStore, PartStore, TreeStore};
use arbor_tree::{RebuildOutcome, TreeCursor, TreeRebuilder};
use arbor_types::{CommitId, Entry, EntryPath, EntryValue, TreeId};

use crate::cli::*;
use crate::mutations::read_mutations;

pub fn load_config(cli: &Cli) -> anyhow::Result<ArborConfig> {
    let mut config = match &cli.config {
        Some(path) => ArborConfig::load(path)?,
        None => ArborConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.storage.root = Some(root.clone());
    }
    Ok(config)
}

pub fn run_command(cli: Cli, config: ArborConfig) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Tree(TreeCommand::Show(args)) => cmd_tree_show(args, &config, format),
        Command::Tree(TreeCommand::Ls(args)) => cmd_tree_ls(args, &config, format),
        Command::Tree(TreeCommand::Apply(args)) => cmd_tree_apply(args, &config, format),
        Command::Demo(args) => cmd_demo(args, &config, format),
    }
}

fn open_store(config: &ArborConfig) -> anyhow::Result<FsPartStore> {
    let root: &PathBuf = config
        .storage
        .root
        .as_ref()
        .context("tree commands need --root or storage.root in the configuration")?;
    Ok(FsPartStore::open(root)?)
}

fn parse_tree(s: &str) -> anyhow::Result<TreeId> {
    s.parse().with_context(|| format!("invalid tree id {s:?}"))
}

fn cmd_tree_show(args: ShowArgs, config: &ArborConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let id = parse_tree(&args.tree)?;
    let tree = store.load_tree(&id)?;
    tree.validate()?;

    let mut missing = 0;
    let mut rows = Vec::with_capacity(tree.len());
    for part in &tree {
        let present = store.part_exists(&part.name)?;
        if !present {
            missing += 1;
        }
        rows.push((part, present));
    }

    match format {
        OutputFormat::Json => {
            let parts: Vec<_> = rows
                .iter()
                .map(|(part, present)| {
                    json!({ "name": part.name, "max_path": part.max_path, "present": present })
                })
                .collect();
            println!("{}", json!({ "tree": id, "parts": parts, "missing": missing }));
        }
        OutputFormat::Text => {
            println!("Tree {} ({} parts)", id.short_hex().yellow().bold(), tree.len());
            for (index, (part, present)) in rows.iter().enumerate() {
                let status = if *present { "ok".green() } else { "missing".red().bold() };
                println!(
                    "  {:>4}  {}  ..= {}  {}",
                    index,
                    part.name.short_hex().cyan(),
                    part.max_path,
                    status
                );
            }
            if missing == 0 {
                println!("{} Boundaries valid, all parts present", "✓".green().bold());
            } else {
                println!("{} {} parts missing", "✗".red().bold(), missing);
            }
        }
    }
    if missing > 0 {
        anyhow::bail!("tree {} references {missing} missing parts", id.short_hex());
    }
    Ok(())
}

fn cmd_tree_ls(args: LsArgs, config: &ArborConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let id = parse_tree(&args.tree)?;
    let after = args.after.map(EntryPath::new);
    let mut cursor = TreeCursor::open(&store, &store, &id, after.as_ref())?;

    let limit = args.limit.unwrap_or(usize::MAX);
    let mut shown = 0;
    while shown < limit {
        let Some(entry) = cursor.next_entry()? else {
            break;
        };
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&entry)?),
            OutputFormat::Text => print_entry(&entry, None),
        }
        shown += 1;
    }
    info!(tree = %id.short_hex(), shown, "listed tree");
    Ok(())
}

fn cmd_tree_apply(args: ApplyArgs, config: &ArborConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let base = match &args.base {
        Some(s) => parse_tree(s)?,
        None => TreeId::empty(),
    };
    let file = File::open(&args.mutations)
        .with_context(|| format!("opening {}", args.mutations.display()))?;
    let mutations = read_mutations(BufReader::new(file))?;

    let mut options = config.rebuild.clone();
    if let Some(target) = args.target_part_entries {
        anyhow::ensure!(target > 0, "--target-part-entries must be positive");
        options.target_part_entries = target;
    }
    let count = mutations.len();
    let outcome = TreeRebuilder::with_options(&store, &store, options).apply(&base, mutations)?;
    print_outcome(&base, count, &outcome, format);
    Ok(())
}

fn print_outcome(base: &TreeId, mutations: usize, outcome: &RebuildOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "base": base,
                "tree": outcome.tree_id,
                "mutations": mutations,
                "parts": outcome.tree.len(),
                "reused": outcome.reused,
                "opened": outcome.opened,
                "written": outcome.written,
            })
        ),
        OutputFormat::Text => {
            println!("{} Tree {}", "✓".green().bold(), outcome.tree_id.to_hex().yellow());
            println!("  Base: {}", base.short_hex().dimmed());
            println!("  Mutations: {mutations}");
            println!(
                "  Parts: {} ({} reused, {} opened, {} written)",
                outcome.tree.len().to_string().bold(),
                outcome.reused.to_string().green(),
                outcome.opened,
                outcome.written.to_string().cyan()
            );
        }
    }
}

fn print_entry(entry: &Entry, branch: Option<&str>) {
    let origin = branch.map(|b| format!("  [{}]", b.yellow())).unwrap_or_default();
    match entry.value() {
        Some(value) => println!(
            "  {}  {}  {}{}",
            entry.path,
            value.checksum.dimmed(),
            value.size,
            origin
        ),
        None => println!("  {}  {}{}", entry.path, "(deleted)".red(), origin),
    }
}

const DEMO_REPO: &str = "demo";
const DEMO_PART_ENTRIES: usize = 4;

fn demo_value(tag: &str, size: u64) -> EntryValue {
    EntryValue::new(format!("mem://{DEMO_REPO}/{tag}"), tag, size)
}

fn cmd_demo(args: DemoArgs, config: &ArborConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = config.clone();
    config.rebuild.target_part_entries = config.rebuild.target_part_entries.min(DEMO_PART_ENTRIES);
    let catalog = InMemoryCatalog::from_config(&config)?;
    catalog.create_repository(DEMO_REPO, "mem://demo", "main")?;

    let paths: Vec<String> = (0..args.entries.max(3)).map(|i| format!("data/{i:04}")).collect();
    for (i, path) in paths.iter().enumerate() {
        catalog.put_entry(DEMO_REPO, "main", Entry::new(path.as_str(), demo_value("main", i as u64)))?;
    }
    let seed = catalog.commit(DEMO_REPO, "main", "seed", "demo")?;

    catalog.create_branch(DEMO_REPO, "dev", "main")?;
    catalog.put_entry(DEMO_REPO, "dev", Entry::new(paths[1].as_str(), demo_value("dev", 1)))?;
    catalog.delete_entry(DEMO_REPO, "dev", &EntryPath::from(paths[2].as_str()))?;
    catalog.commit(DEMO_REPO, "dev", "change two entries", "demo")?;

    catalog.create_branch(DEMO_REPO, "feature", "dev")?;
    catalog.put_entry(DEMO_REPO, "feature", Entry::new(paths[1].as_str(), demo_value("feature", 1)))?;
    catalog.put_entry(DEMO_REPO, "feature", Entry::new("zz/new", demo_value("feature", 7)))?;

    // Touch one entry on main to show part reuse.
    let middle = paths[paths.len() / 2].as_str();
    catalog.put_entry(DEMO_REPO, "main", Entry::new(middle, demo_value("main-v2", 0)))?;
    let touched = catalog.commit(DEMO_REPO, "main", "touch one entry", "demo")?;
    let store = catalog.store();
    let before = store.trees().load_tree(&seed.tree_id)?;
    let after = store.trees().load_tree(&touched.tree_id)?;
    let reused = after
        .parts()
        .iter()
        .filter(|p| before.parts().contains(p))
        .count();

    let branches = ["main", "dev", "feature"];
    let mut listings = Vec::with_capacity(branches.len());
    for branch in branches {
        let listing = catalog.list_entries(DEMO_REPO, branch, CommitId::UNCOMMITTED, &ListOptions::default())?;
        listings.push((branch, listing));
    }

    match format {
        OutputFormat::Json => {
            let views: serde_json::Map<String, serde_json::Value> = listings
                .iter()
                .map(|(branch, listing)| {
                    let entries: Vec<_> = listing
                        .entries
                        .iter()
                        .map(|e| json!({ "path": e.path, "checksum": e.value().map(|v| v.checksum.clone()) }))
                        .collect();
                    (branch.to_string(), serde_json::Value::Array(entries))
                })
                .collect();
            println!(
                "{}",
                json!({
                    "branches": views,
                    "main_parts": { "before": before.len(), "after": after.len(), "reused": reused },
                })
            );
        }
        OutputFormat::Text => {
            for (branch, listing) in &listings {
                let lineage = catalog.get_branch(DEMO_REPO, branch)?.lineage;
                println!(
                    "{} {} ({} entries, {} ancestors)",
                    "Branch".bold(),
                    branch.yellow().bold(),
                    listing.entries.len(),
                    lineage.len()
                );
                for entry in &listing.entries {
                    let owner = entry.value().map(|v| v.checksum.as_str());
                    print_entry(entry, owner);
                }
            }
            println!(
                "{} main: {} parts before, {} after, {} reused unchanged",
                "✓".green().bold(),
                before.len(),
                after.len(),
                reused.to_string().green()
            );
        }
    }
    Ok(())
}
