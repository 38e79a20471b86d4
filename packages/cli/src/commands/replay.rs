use crate::commands::check::read_nodes;
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use manuscript_editor::{
    Direction, DragMachine, Editor, EditorConfig, EditorHooks, HistoryOutcome, MemoryStore,
    Notification, NotificationKind,
};
use manuscript_tree::{Fields, Node, NodeId, NodeKind, Snapshot};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Script file describing the session
    pub script: PathBuf,

    /// Starting document (a JSON array of nodes); overrides the script's own
    #[arg(short, long)]
    pub document: Option<PathBuf>,

    /// Make the N-th store write fail (repeatable)
    #[arg(long = "fail-write", value_name = "N")]
    pub fail_writes: Vec<u64>,

    /// Print the final document as JSON instead of an outline
    #[arg(long)]
    pub json: bool,

    /// Exit with an error if any step failed
    #[arg(long)]
    pub strict: bool,
}

/// A scripted editing session.
#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub document: Vec<Node>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Insert {
        #[serde(default)]
        parent: Option<String>,
        kind: NodeKind,
        #[serde(default)]
        fields: Fields,
        #[serde(default)]
        at: Option<usize>,
        /// Name later steps can use for the new node
        #[serde(rename = "as", default)]
        alias: Option<String>,
    },
    Delete {
        node: String,
    },
    Set {
        node: String,
        field: String,
        value: Value,
    },
    Reorder {
        #[serde(default)]
        parent: Option<String>,
        order: Vec<String>,
    },
    Move {
        node: String,
        parent: String,
        #[serde(default)]
        at: Option<usize>,
    },
    Drag {
        node: String,
        #[serde(default)]
        over: Option<String>,
        #[serde(default)]
        keys: Vec<Key>,
    },
    Type {
        node: String,
        field: String,
        values: Vec<Value>,
    },
    Undo,
    Redo,
    Fail {
        /// Relative write numbers, 1 = the next write
        writes: Vec<u64>,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Up,
    Down,
}

impl From<Key> for Direction {
    fn from(key: Key) -> Self {
        match key {
            Key::Up => Direction::Up,
            Key::Down => Direction::Down,
        }
    }
}

/// Prints undo/redo outcomes as they happen.
struct ConsoleHooks;

impl EditorHooks for ConsoleHooks {
    fn on_notification(&self, notification: &Notification) {
        match notification.kind {
            NotificationKind::Success => println!("    {} {}", "↺".green(), notification.message),
            NotificationKind::Error => println!("    {} {}", "!".red(), notification.message.red()),
            NotificationKind::Info => println!("    {}", notification.message.dimmed()),
        }
    }
}

/// Result of running every step.
#[derive(Debug)]
pub struct Report {
    pub snapshot: Snapshot,
    pub failed: usize,
    pub steps: usize,
    pub undo_levels: usize,
    pub redo_levels: usize,
    pub store_in_sync: bool,
}

pub fn replay(args: ReplayArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let content = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Cannot read script {}", args.script.display()))?;
    let script: Script = serde_json::from_str(&content)
        .with_context(|| format!("Invalid script {}", args.script.display()))?;

    let nodes = match &args.document {
        Some(path) => read_nodes(path)?,
        None => script.document,
    };
    let snapshot = Snapshot::from_nodes(nodes).context("Starting document is inconsistent")?;

    println!(
        "{}",
        format!("▶ Replaying {} steps...", script.steps.len())
            .bright_blue()
            .bold()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(run(
        snapshot,
        &script.steps,
        config.editor,
        &args.fail_writes,
    ))?;

    println!();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.snapshot.into_nodes())?);
    } else {
        print_outline(&report.snapshot, None, 0);
    }
    println!();

    let summary = format!(
        "{} steps, {} failed, {} undo / {} redo levels",
        report.steps, report.failed, report.undo_levels, report.redo_levels
    );
    if report.failed == 0 {
        println!("{} {}", "✅".green(), summary);
    } else {
        println!("{} {}", "⚠️".yellow(), summary);
    }
    if !report.store_in_sync {
        println!(
            "{}",
            "   store rows differ from the local document (a compensating write failed)"
                .yellow()
        );
    }

    if args.strict && report.failed > 0 {
        return Err(anyhow!("{} step(s) failed", report.failed));
    }
    Ok(())
}

/// Run `steps` against a fresh in-memory store seeded with `snapshot`.
pub async fn run(
    snapshot: Snapshot,
    steps: &[Step],
    config: EditorConfig,
    fail_writes: &[u64],
) -> Result<Report> {
    let store = Arc::new(MemoryStore::seeded(&snapshot));
    for n in fail_writes {
        store.fail_write(*n);
    }
    let editor = Editor::with_config(store.clone(), snapshot, config).with_hooks(Arc::new(ConsoleHooks));
    let mut session = Session {
        editor,
        store: store.clone(),
        aliases: HashMap::new(),
    };

    let mut failed = 0;
    for (i, step) in steps.iter().enumerate() {
        match session.perform(step).await {
            Ok(done) => println!("  {} {:>3}. {}", "✓".green(), i + 1, done),
            Err(err) => {
                failed += 1;
                println!(
                    "  {} {:>3}. {}",
                    "✗".red(),
                    i + 1,
                    format!("{err:#}").red()
                );
            }
        }
    }

    let snapshot = session.editor.snapshot();
    let store_in_sync = store
        .to_snapshot()
        .map(|stored| stored == snapshot)
        .unwrap_or(false);

    Ok(Report {
        failed,
        steps: steps.len(),
        undo_levels: session.editor.undo_levels(),
        redo_levels: session.editor.redo_levels(),
        store_in_sync,
        snapshot,
    })
}

struct Session {
    editor: Editor,
    store: Arc<MemoryStore>,
    aliases: HashMap<String, NodeId>,
}

impl Session {
    fn resolve(&self, name: &str) -> NodeId {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| NodeId::from(name))
    }

    async fn perform(&mut self, step: &Step) -> Result<String> {
        match step {
            Step::Insert {
                parent,
                kind,
                fields,
                at,
                alias,
            } => {
                let parent_id = parent.as_deref().map(|p| self.resolve(p));
                let id = self
                    .editor
                    .insert(parent_id, *kind, fields.clone(), *at)
                    .await?;
                let mut done = format!("insert {kind} {id}");
                if let Some(alias) = alias {
                    done.push_str(&format!(" as {alias}"));
                    self.aliases.insert(alias.clone(), id);
                }
                Ok(done)
            }

            Step::Delete { node } => {
                let id = self.resolve(node);
                self.editor.delete(&id).await?;
                Ok(format!("delete {id}"))
            }

            Step::Set { node, field, value } => {
                let id = self.resolve(node);
                self.editor.update_field(&id, field, value.clone()).await?;
                Ok(format!("set {id}.{field} = {value}"))
            }

            Step::Reorder { parent, order } => {
                let parent_id = parent.as_deref().map(|p| self.resolve(p));
                let ordered: Vec<NodeId> = order.iter().map(|id| self.resolve(id)).collect();
                self.editor.reorder(parent_id, ordered).await?;
                Ok(format!("reorder {}", order.join(", ")))
            }

            Step::Move { node, parent, at } => {
                let id = self.resolve(node);
                let parent_id = self.resolve(parent);
                self.editor.move_node(&id, &parent_id, *at).await?;
                Ok(format!("move {id} into {parent_id}"))
            }

            Step::Drag { node, over, keys } => {
                let snapshot = self.editor.snapshot();
                let mut drag = DragMachine::new();
                drag.start(&snapshot, &self.resolve(node))?;
                if let Some(over) = over {
                    drag.hover(&snapshot, Some(&self.resolve(over)));
                }
                for key in keys {
                    drag.step(&snapshot, (*key).into());
                }
                let intent = drag.drop();
                let target = over.clone().unwrap_or_else(|| "keyboard target".to_string());
                if self.editor.apply_drop(intent).await? {
                    Ok(format!("drag {node} onto {target}"))
                } else {
                    Ok(format!("drag {node} onto {target} (invalid drop, nothing written)"))
                }
            }

            Step::Type {
                node,
                field,
                values,
            } => {
                let id = self.resolve(node);
                let Some((last, intermediate)) = values.split_last() else {
                    return Err(anyhow!("type step for {id}.{field} has no values"));
                };
                self.editor.begin_text_edit(&id, field)?;
                for value in intermediate {
                    self.editor.type_text(&id, field, value.clone()).await?;
                }
                let recorded = self.editor.end_text_edit(&id, field, last.clone()).await?;
                Ok(if recorded {
                    format!("type {id}.{field} = {last}")
                } else {
                    format!("type {id}.{field} (unchanged, not recorded)")
                })
            }

            Step::Undo => Ok(describe("undo", self.editor.undo().await?)),

            Step::Redo => Ok(describe("redo", self.editor.redo().await?)),

            Step::Fail { writes } => {
                for n in writes {
                    self.store.fail_write(*n);
                }
                Ok(format!("arm failure for write(s) {writes:?}"))
            }
        }
    }
}

fn describe(verb: &str, outcome: HistoryOutcome) -> String {
    match outcome {
        HistoryOutcome::Applied(description) => format!("{verb} {description}"),
        HistoryOutcome::Empty => format!("{verb} (nothing to {verb})"),
        HistoryOutcome::Busy => format!("{verb} (busy, dropped)"),
    }
}

fn print_outline(snapshot: &Snapshot, parent: Option<&NodeId>, depth: usize) {
    for node in snapshot.children(parent) {
        let label = node
            .get_str("title")
            .or_else(|| node.get_str("body"))
            .map(|t| format!(" \"{t}\""))
            .unwrap_or_default();
        println!(
            "{}{} {}{}",
            "  ".repeat(depth + 1),
            node.kind.label().dimmed(),
            node.id.as_str().bright_white(),
            label
        );
        print_outline(snapshot, Some(&node.id), depth + 1);
    }
}
