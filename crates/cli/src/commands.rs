//! Command handlers. Each builds the services it needs around one shared
//! workspace and event bus, performs its action, and prints the result.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use futures::StreamExt;
use quill_client::payload::AgentStreamEvent;
use quill_client::{
    ApiClient, BlockService, ChatService, ClientConfig, GenerationOutcome, Orchestrator,
    ProjectService, SharedWorkspace,
};
use quill_core::autonomy::PhaseTransition;
use quill_core::unit::ContentUnit;
use quill_core::workspace::Workspace;
use quill_events::{EventBus, NotificationService, ToastEvent, ToastLevel, WorkspaceEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::args::Commands;

/// Services shared by every command.
struct Session {
    config: ClientConfig,
    api: ApiClient,
    workspace: SharedWorkspace,
    bus: Arc<EventBus>,
    notifications: Arc<NotificationService>,
}

impl Session {
    fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let api = ApiClient::new(&config).context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            api,
            workspace: Arc::new(RwLock::new(Workspace::new())),
            bus: Arc::new(EventBus::default()),
            notifications: Arc::new(NotificationService::new()),
        })
    }

    fn projects(&self) -> ProjectService {
        ProjectService::new(self.api.clone(), self.workspace.clone(), self.bus.clone())
    }

    async fn load(&self, project_id: &str) -> anyhow::Result<ProjectService> {
        let projects = self.projects();
        projects
            .load(project_id)
            .await
            .with_context(|| format!("Failed to load project {project_id}"))?;
        Ok(projects)
    }
}

pub async fn run(command: Commands, config: ClientConfig) -> anyhow::Result<()> {
    let session = Session::new(config)?;
    let toasts = spawn_toast_printer(session.notifications.subscribe());

    let result = dispatch(command, &session).await;

    session.notifications.shutdown().await;
    toasts.abort();
    result
}

async fn dispatch(command: Commands, session: &Session) -> anyhow::Result<()> {
    match command {
        Commands::Projects => {
            for project in session.api.list_projects().await? {
                println!(
                    "{}\t{}\tv{}\t{}",
                    project.id, project.name, project.version, project.current_phase
                );
            }
        }

        Commands::Units { project, phase } => {
            session.load(&project).await?;
            let ws = session.workspace.read().await;
            let shown = |u: &ContentUnit| phase.as_deref().map_or(true, |p| u.phase == p);
            for unit in ws.fields().iter().filter(|u| shown(u)) {
                print_unit(unit, 0);
            }
            for unit in ws.blocks().flatten().into_iter().filter(|u| shown(u)) {
                print_unit(unit, unit.depth as usize + 1);
            }
        }

        Commands::Generate {
            project,
            unit,
            phase,
        } => {
            session.load(&project).await?;
            generate(session, unit, phase).await?;
        }

        Commands::Chat {
            project,
            message,
            stream,
        } => {
            session.load(&project).await?;
            let chat = ChatService::new(
                session.api.clone(),
                session.workspace.clone(),
                session.bus.clone(),
            );
            let unresolved = chat.unresolved_references(&message).await;
            if !unresolved.is_empty() {
                session.notifications.warning(format!(
                    "No unit named {}",
                    unresolved
                        .iter()
                        .map(|name| format!("@{name}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            if stream {
                let mut events = chat.stream(&message).await?;
                while let Some(event) = events.next().await {
                    match event? {
                        AgentStreamEvent::Node { node, content } => println!("[{node}] {content}"),
                        AgentStreamEvent::Done { content } => {
                            if let Some(content) = content {
                                println!("{content}");
                            }
                            break;
                        }
                        AgentStreamEvent::Error(message) => bail!("Agent error: {message}"),
                    }
                }
            } else {
                let reply = chat.send(&message).await?;
                println!("{}", reply.message);
                if reply.waiting_for_human {
                    println!("(phase '{}' is waiting for your confirmation)", reply.phase);
                }
            }
        }

        Commands::Reorder { project, phases } => {
            let projects = session.load(&project).await?;
            match projects.reorder_phases(&phases).await? {
                Some(saved) => println!("{}", saved.phase_order.join(" -> ")),
                None => bail!(
                    "Phases must be a reordering of: {}",
                    projects.layout().middle.join(", ")
                ),
            }
        }

        Commands::Autonomy {
            project,
            state,
            phase,
            all,
        } => {
            let projects = session.load(&project).await?;
            let saved = match (all, phase) {
                (true, _) => projects.set_all_autonomy(state.is_on()).await?,
                (false, Some(phase)) => projects.set_autonomy(&phase, state.is_on()).await?,
                (false, None) => bail!("Name a phase or pass --all"),
            };
            for phase in &saved.phase_order {
                let on = saved.agent_autonomy.get(phase).copied().unwrap_or(true);
                println!("{phase}\t{}", if on { "autonomous" } else { "supervised" });
            }
        }

        Commands::Deps {
            project,
            unit,
            depends_on,
            mode,
        } => {
            let projects = session.load(&project).await?;
            let saved = projects
                .set_dependencies(&unit, depends_on, mode.into())
                .await?;
            println!(
                "{} depends on [{}] ({})",
                saved.name,
                saved.dependencies.depends_on.join(", "),
                saved.dependencies.dependency_type
            );
        }

        Commands::MoveBlock {
            project,
            block,
            parent,
            index,
        } => {
            session.load(&project).await?;
            let moved = blocks(session)
                .move_block(&block, parent.as_deref(), index)
                .await?;
            println!(
                "Moved '{}' under {} at position {}",
                moved.name,
                moved.parent_id.as_deref().unwrap_or("<root>"),
                moved.order_index
            );
        }

        Commands::Delete { project, block } => {
            session.load(&project).await?;
            delete(session, &block).await?;
        }

        Commands::Advance { project, confirm } => {
            let projects = session.load(&project).await?;
            let transition = if confirm {
                projects.confirm_advance().await?
            } else {
                projects.advance().await?
            };
            print_transition(&transition);
        }

        Commands::Version { project, note } => {
            let projects = session.load(&project).await?;
            let version = projects.create_version(note.as_deref()).await?;
            println!("Created {} (v{})", version.id, version.version);
        }
    }
    Ok(())
}

fn blocks(session: &Session) -> Arc<BlockService> {
    Arc::new(
        BlockService::new(
            session.api.clone(),
            session.workspace.clone(),
            session.bus.clone(),
            session.config.undo_window,
        )
        .with_notifications(session.notifications.clone()),
    )
}

async fn generate(
    session: &Session,
    unit: Option<String>,
    phase: Option<String>,
) -> anyhow::Result<()> {
    let orchestrator = Arc::new(
        Orchestrator::new(
            session.api.clone(),
            session.workspace.clone(),
            session.bus.clone(),
        )
        .with_notifications(session.notifications.clone()),
    );
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let printer = spawn_chunk_printer(session.bus.subscribe(), done_rx);
    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.shutdown();
            }
        })
    };

    let (outcomes, transition) = match (unit, phase) {
        (Some(unit), _) => (vec![(unit.clone(), orchestrator.generate(&unit).await?)], None),
        (None, Some(phase)) => {
            let run = orchestrator.run_phase(&phase).await?;
            (run.outcomes, run.transition)
        }
        (None, None) => bail!("Name a unit or pass --phase"),
    };

    interrupt.abort();
    let _ = done_tx.send(());
    let _ = printer.await;

    for (id, outcome) in &outcomes {
        let label = match outcome {
            GenerationOutcome::Completed { .. } => "completed".to_string(),
            GenerationOutcome::Failed { message } => format!("failed: {message}"),
            GenerationOutcome::Cancelled => "cancelled".to_string(),
            GenerationOutcome::Interrupted => "interrupted".to_string(),
            GenerationOutcome::Blocked { blockers } => format!(
                "blocked by {}",
                quill_core::dependency::describe_blockers(blockers)
            ),
            GenerationOutcome::AlreadyInFlight => "already running".to_string(),
        };
        eprintln!("{id}: {label}");
    }
    if let Some(transition) = transition {
        print_transition(&transition);
    }
    Ok(())
}

async fn delete(session: &Session, block: &str) -> anyhow::Result<()> {
    let service = blocks(session);
    let name = session
        .workspace
        .read()
        .await
        .unit(block)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| block.to_string());

    service.delete_with_undo(block).await?;
    let window = session.config.undo_window;
    eprintln!(
        "Deleted '{name}'. Press Ctrl-C within {}s to undo.",
        window.as_secs_f32()
    );

    tokio::select! {
        _ = tokio::time::sleep(window) => {
            service.flush().await?;
            println!("Deleted '{name}'");
        }
        _ = tokio::signal::ctrl_c() => {
            if service.undo(block).await? {
                println!("Restored '{name}'");
            }
        }
    }
    Ok(())
}

fn print_transition(transition: &PhaseTransition) {
    match transition {
        PhaseTransition::Advanced { from, to } => println!("{from} -> {to}"),
        PhaseTransition::AwaitingConfirmation { to, .. } => {
            println!("Phase '{to}' is supervised; run `quill advance --confirm` to enter it")
        }
        PhaseTransition::Finished { phase } => println!("Finished final phase '{phase}'"),
    }
}

fn print_unit(unit: &ContentUnit, indent: usize) {
    println!(
        "{:indent$}{}\t{}\t{}\t{}",
        "",
        unit.id,
        unit.name,
        unit.phase,
        unit.status,
        indent = indent * 2
    );
}

/// Print streamed chunks to stdout until `done` fires and the backlog is
/// drained.
fn spawn_chunk_printer(
    mut rx: broadcast::Receiver<quill_events::Envelope>,
    mut done: tokio::sync::oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut finishing = false;
        loop {
            let received = if finishing {
                match rx.try_recv() {
                    Ok(envelope) => Ok(envelope),
                    Err(_) => break,
                }
            } else {
                tokio::select! {
                    received = rx.recv() => received,
                    _ = &mut done => {
                        finishing = true;
                        continue;
                    }
                }
            };
            match received {
                Ok(envelope) => print_event(&envelope.event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output fell behind; some chunks were not printed");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &WorkspaceEvent) {
    let mut stdout = std::io::stdout().lock();
    match event {
        WorkspaceEvent::GenerationStarted { unit_id } => {
            let _ = writeln!(stdout, "--- {unit_id} ---");
        }
        WorkspaceEvent::ChunkAppended { chunk, .. } => {
            let _ = write!(stdout, "{chunk}");
        }
        WorkspaceEvent::GenerationCompleted { .. }
        | WorkspaceEvent::GenerationFailed { .. }
        | WorkspaceEvent::GenerationCancelled { .. }
        | WorkspaceEvent::GenerationInterrupted { .. } => {
            let _ = writeln!(stdout);
        }
        _ => {}
    }
    let _ = stdout.flush();
}

fn spawn_toast_printer(mut rx: broadcast::Receiver<ToastEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ToastEvent::Shown(toast)) => {
                    let tag = match toast.level {
                        ToastLevel::Success => "ok",
                        ToastLevel::Info => "info",
                        ToastLevel::Warning => "warn",
                        ToastLevel::Error => "error",
                    };
                    eprintln!("[{tag}] {}", toast.message);
                }
                Ok(ToastEvent::Dismissed(_)) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}
