use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read};

use arrrg::CommandLine;
use tracing_subscriber::{fmt, EnvFilter};

use interactions::{Engine, EntityDecl, EntityRef, JsonlStore, Outcome, Registry};

#[derive(Clone, Default, Debug, Eq, PartialEq, arrrg_derive::CommandLine)]
struct Args {
    #[arrrg(optional, "File of entity declarations to enforce")]
    policies: Option<String>,
    #[arrrg(optional, "JSON-lines interaction log to read and append to")]
    log: Option<String>,
    #[arrrg(flag, "Read the policies file as JSON lines of entity declarations")]
    json: bool,
    #[arrrg(flag, "Log every evaluation")]
    verbose: bool,
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
struct Request {
    target: EntityRef,
    initiator: EntityRef,
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
struct Summary {
    recorded: usize,
    denied: usize,
    vetoed: usize,
    failed: usize,
}

fn load_registry(path: &str, json: bool) -> Result<Registry, Box<dyn std::error::Error>> {
    let mut file = BufReader::new(OpenOptions::new().read(true).open(path)?);
    let decls: Vec<EntityDecl> = if json {
        let mut decls = vec![];
        for line in file.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                decls.push(serde_json::from_str(&line)?);
            }
        }
        decls
    } else {
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        EntityDecl::parse_all(&text)?
    };
    let mut registry = Registry::default();
    for decl in decls.iter() {
        registry.declare(decl)?;
    }
    Ok(registry)
}

fn replay(
    engine: &mut Engine<JsonlStore>,
    input: impl BufRead,
    summary: &mut Summary,
) -> Result<(), Box<dyn std::error::Error>> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                eprintln!("error parsing request {line}: {err}");
                summary.failed += 1;
                continue;
            }
        };
        let result = engine.try_perform(
            &request.target,
            &request.action,
            &request.initiator,
            request.params.clone(),
        );
        let output = match result {
            Ok(Outcome::Recorded(interaction)) => {
                summary.recorded += 1;
                serde_json::json! {{
                    "request": request,
                    "outcome": "recorded",
                    "interaction": interaction,
                }}
            }
            Ok(Outcome::Denied(decision)) => {
                summary.denied += 1;
                serde_json::json! {{
                    "request": request,
                    "outcome": "denied",
                    "decision": decision,
                }}
            }
            Ok(Outcome::Vetoed(veto)) => {
                summary.vetoed += 1;
                serde_json::json! {{
                    "request": request,
                    "outcome": "vetoed",
                    "hook": veto.index,
                    "reason": veto.reason,
                }}
            }
            Err(err) => {
                summary.failed += 1;
                serde_json::json! {{
                    "request": request,
                    "outcome": "error",
                    "error": err.to_string(),
                }}
            }
        };
        println!("{output}");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = Args::from_command_line_relaxed(
        "USAGE: interactions-replay --policies FILE --log FILE [request_file...]",
    );
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(policies) = args.policies.as_deref() else {
        return Err("--policies is required".into());
    };
    let Some(log) = args.log.as_deref() else {
        return Err("--log is required".into());
    };
    let registry = load_registry(policies, args.json)?;
    let store = JsonlStore::open(log)?;
    tracing::info!(
        entity_types = registry.entity_types().len(),
        prior = store.len(),
        "replaying interaction requests"
    );
    let mut engine = Engine::new(registry, store);

    let mut summary = Summary::default();
    if free.is_empty() {
        replay(&mut engine, std::io::stdin().lock(), &mut summary)?;
    } else {
        for path in free.iter() {
            let file = OpenOptions::new().read(true).open(path)?;
            replay(&mut engine, BufReader::new(file), &mut summary)?;
        }
    }
    eprintln!(
        "recorded {}; denied {}; vetoed {}; failed {}",
        summary.recorded, summary.denied, summary.vetoed, summary.failed
    );
    Ok(())
}
