use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use manuscript_tree::{Node, Snapshot};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Snapshot file, or a directory to search for *.json snapshots
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

/// Outcome of checking one file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<usize>,
}

pub fn check(args: CheckArgs, cwd: &str) -> Result<()> {
    let root = if args.path.is_absolute() {
        args.path.clone()
    } else {
        Path::new(cwd).join(&args.path)
    };

    println!("{}", "🔍 Checking snapshots...".bright_blue().bold());
    println!();

    let files = find_snapshot_files(&root)?;
    if files.is_empty() {
        println!("{}", "⚠️  No snapshot files found".yellow());
        return Ok(());
    }

    let reports: Vec<FileReport> = files.into_iter().map(check_file).collect();
    let mut invalid = 0;
    for report in &reports {
        let display = report
            .path
            .strip_prefix(&root)
            .unwrap_or(&report.path)
            .display();
        match &report.result {
            Ok(count) => println!("  {} {} ({} nodes)", "✓".green(), display, count),
            Err(err) => {
                invalid += 1;
                println!("  {} {}", "✗".red(), display);
                println!("      {}", format!("{err:#}").red());
            }
        }
    }

    println!();
    if invalid == 0 {
        println!(
            "{} {} snapshot(s) consistent",
            "✅".green(),
            reports.len()
        );
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} snapshot(s) are inconsistent",
            invalid,
            reports.len()
        ))
    }
}

/// Read a JSON array of nodes.
pub fn read_nodes(path: &Path) -> Result<Vec<Node>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub fn check_file(path: PathBuf) -> FileReport {
    let result = read_nodes(&path).and_then(|nodes| {
        let snapshot = Snapshot::from_nodes(nodes)?;
        Ok(snapshot.len())
    });
    FileReport { path, result }
}

fn find_snapshot_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.exists() {
        return Err(anyhow!("{} does not exist", root.display()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name().to_str().unwrap_or_default()))
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            if path.file_name().and_then(|n| n.to_str()) == Some(crate::config::DEFAULT_CONFIG_NAME) {
                continue;
            }
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}
