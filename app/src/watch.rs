//! Interactive watch mode: polling in the background, commands on stdin.

use session::{BootstrapOutcome, Session, SessionSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::spawn_local;
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum WatchCommand {
    Select(usize),
    Create(String),
    Delete(usize),
    Train,
    /// Add the selected person's face, optionally cropped to the Nth
    /// currently detected face.
    AddFace(Option<usize>),
    Key(String),
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "commands: select N | create NAME | delete N | train | add-face [FACE] | key KEY | show | help | quit";

pub fn parse_command(line: &str) -> Result<WatchCommand, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let index = |what: &str| -> Result<usize, String> {
        rest.parse::<usize>()
            .map_err(|_| format!("{} needs a numeric index, got {:?}", what, rest))
    };

    match verb {
        "select" => index("select").map(WatchCommand::Select),
        "delete" => index("delete").map(WatchCommand::Delete),
        "create" if !rest.is_empty() => Ok(WatchCommand::Create(rest.to_string())),
        "create" => Err("create needs a name".to_string()),
        "train" => Ok(WatchCommand::Train),
        "add-face" if rest.is_empty() => Ok(WatchCommand::AddFace(None)),
        "add-face" => index("add-face").map(|i| WatchCommand::AddFace(Some(i))),
        "key" => Ok(WatchCommand::Key(rest.to_string())),
        "show" | "" => Ok(WatchCommand::Show),
        "help" | "?" => Ok(WatchCommand::Help),
        "quit" | "exit" | "q" => Ok(WatchCommand::Quit),
        other => Err(format!("unknown command {:?}", other)),
    }
}

pub fn render_snapshot(snap: &SessionSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("group {} | cycle {}\n", snap.group_id, snap.cycles));
    if snap.errors.no_key {
        out.push_str("! no API key set, use `key KEY`\n");
    }
    if snap.errors.none_selected {
        out.push_str("! select a person before adding a face\n");
    }
    if snap.errors.need_train {
        out.push_str("! model out of date, run `train`\n");
    }

    out.push_str("persons:\n");
    for (i, p) in snap.persons.iter().enumerate() {
        let marker = if snap.selected == Some(i) { '*' } else { ' ' };
        let smiling = p
            .smiling
            .map(|s| format!(" smiling {:.2}", s))
            .unwrap_or_default();
        out.push_str(&format!(
            " {}{}: {} ({} faces){}\n",
            marker, i, p.name, p.persisted_faces, smiling
        ));
    }

    out.push_str("detected:\n");
    for (i, f) in snap.detected_faces.iter().enumerate() {
        let label = f.identified_as.as_deref().unwrap_or("unknown");
        let smile = f.smile().map(|s| format!(" smile {:.2}", s)).unwrap_or_default();
        out.push_str(&format!("  {}: {} at {}{}\n", i, label, f.face_rectangle, smile));
    }
    out
}

fn describe_bootstrap(outcome: &BootstrapOutcome) -> String {
    match outcome {
        BootstrapOutcome::NoKey => "No API key set".to_string(),
        BootstrapOutcome::Created => "Created a new person group".to_string(),
        BootstrapOutcome::Loaded(n) => format!("Loaded {} persons", n),
        BootstrapOutcome::Failed(e) => format!("Group setup failed: {}", e),
    }
}

/// Apply one command. Returns `false` when the user asked to quit.
pub async fn execute(session: &Session, command: WatchCommand) -> bool {
    let result = match command {
        WatchCommand::Select(i) => session.select_person(i).map(|_| format!("Selected {}", i)),
        WatchCommand::Create(name) => session
            .add_person(&name, None)
            .await
            .map(|p| format!("Created {} ({})", p.name, p.person_id)),
        WatchCommand::Delete(i) => session
            .remove_person(i)
            .await
            .map(|p| format!("Deleted {}, train to apply", p.name)),
        WatchCommand::Train => session.train().await.map(|_| "Training started".to_string()),
        WatchCommand::AddFace(face) => {
            let rectangle = face.and_then(|i| {
                session
                    .snapshot()
                    .detected_faces
                    .get(i)
                    .map(|f| f.face_rectangle)
            });
            if face.is_some() && rectangle.is_none() {
                println!("No detected face with that index");
                return true;
            }
            session
                .add_face_to_selected(rectangle)
                .await
                .map(|id| format!("Added face {}", id))
        }
        WatchCommand::Key(key) => Ok(describe_bootstrap(&session.set_api_key(&key).await)),
        WatchCommand::Show => Ok(render_snapshot(&session.snapshot())),
        WatchCommand::Help => Ok(HELP.to_string()),
        WatchCommand::Quit => return false,
    };
    match result {
        Ok(msg) => println!("{}", msg),
        Err(e) => println!("Error: {}", e),
    }
    true
}

pub async fn run(session: Session, interval: Duration) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", describe_bootstrap(&session.ensure_group().await));
    println!("{}", HELP);

    let poller = session.start_polling(interval);

    let mut snapshots = session.subscribe();
    let printer = spawn_local(async move {
        let mut last_cycle = 0;
        while snapshots.changed().await.is_ok() {
            let snap = snapshots.borrow_and_update().clone();
            if snap.cycles != last_cycle {
                last_cycle = snap.cycles;
                print!("{}", render_snapshot(&snap));
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                match parse_command(&line) {
                    Ok(command) => {
                        if !execute(&session, command).await {
                            break;
                        }
                    }
                    Err(e) => println!("{}\n{}", e, HELP),
                }
            }
        }
    }

    poller.stop().await;
    printer.abort();
    Ok(())
}
