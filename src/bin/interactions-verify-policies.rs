use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read};

use arrrg::CommandLine;
use tracing_subscriber::{fmt, EnvFilter};

use interactions::{EntityDecl, Registry};

#[derive(Clone, Default, Debug, Eq, PartialEq, arrrg_derive::CommandLine)]
struct Args {
    #[arrrg(flag, "Read JSON lines of entity declarations instead of declaration text")]
    json: bool,
    #[arrrg(flag, "Log every registered policy")]
    verbose: bool,
}

fn read_decls(path: &str, json: bool) -> Result<Vec<EntityDecl>, Box<dyn std::error::Error>> {
    let file = OpenOptions::new().read(true).open(path)?;
    let mut file = BufReader::new(file);
    if json {
        let mut decls = vec![];
        for line in file.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            decls.push(serde_json::from_str(&line)?);
        }
        Ok(decls)
    } else {
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        Ok(EntityDecl::parse_all(&text)?)
    }
}

fn main() {
    let (args, free) = Args::from_command_line_relaxed(
        "USAGE: interactions-verify-policies [--json] [--verbose] <policy_file> [policy_file...]",
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

    let mut verified = 0usize;
    let mut errors = 0usize;
    for path in free.iter() {
        let decls = match read_decls(path, args.json) {
            Ok(decls) => decls,
            Err(err) => {
                eprintln!("error reading policies from {path}: {err}");
                errors += 1;
                continue;
            }
        };
        let mut registry = Registry::default();
        for decl in decls.iter() {
            match registry.declare(decl) {
                Ok(count) => verified += count,
                Err(err) => {
                    eprintln!("error in {path} entity {}: {err}", decl.name);
                    errors += 1;
                }
            }
        }
    }
    eprintln!("verified {verified} actions; {errors} errors");
    if errors > 0 {
        std::process::exit(1);
    }
}
