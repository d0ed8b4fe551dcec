//! vitte-cli/src/lib.rs — CLI pour Vitte.
//!
//! Deux modes (spec §6 "External Interfaces") :
//!   - `vitte script.vitte`  : compile et exécute un fichier source, une
//!     seule fois, puis quitte avec le code de sortie approprié.
//!   - `vitte` (sans argument) : REPL ligne à ligne, une `Vm` partagée entre
//!     les lignes pour que les globales survivent d'une ligne à l'autre.
//!
//! Enregistre la native canonique `clock()` (spec §6) avant toute exécution.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use vitte_vm::{Value, Vm, VmError, VmOptions};

/// `vitte` — compilateur + VM du langage Vitte, en un seul binaire.
#[derive(Parser, Debug)]
#[command(name = "vitte", version, about = "Vitte: interpréteur à bytecode")]
struct Cli {
    /// Fichier source à exécuter. Omis : démarre une REPL.
    script: Option<PathBuf>,

    /// Force une collecte GC avant chaque allocation (stress-test du GC).
    #[arg(long)]
    stress_gc: bool,

    /// Trace chaque instruction exécutée (niveau `tracing::trace!`).
    #[arg(long)]
    trace: bool,

    /// Seuil initial de déclenchement du GC, en octets.
    #[arg(long, value_name = "BYTES")]
    gc_threshold: Option<usize>,

    /// Limite de profondeur des appels imbriqués.
    #[arg(long, value_name = "N")]
    frames_max: Option<usize>,
}

/// Point d'entrée du binaire (appelé depuis `src/main.rs`).
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut options = VmOptions { stress_gc: cli.stress_gc, trace: cli.trace, ..VmOptions::default() };
    options.gc_threshold = cli.gc_threshold;
    if let Some(frames_max) = cli.frames_max {
        options.frames_max = frames_max;
    }

    tracing::debug!(?options, "vm options resolved");

    let mut vm = Vm::new(options);
    vm.define_native("clock", native_clock);

    match cli.script {
        Some(path) => run_file(&mut vm, &path),
        None => run_repl(&mut vm),
    }
}

fn run_file(vm: &mut Vm, path: &PathBuf) -> Result<()> {
    tracing::info!(path = %path.display(), "running script");
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("lecture de {}", path.display()))?;

    match vm.interpret(&source) {
        Ok(()) => Ok(()),
        Err(VmError::CompileError) => {
            tracing::warn!(path = %path.display(), "compile error");
            std::process::exit(65)
        }
        Err(VmError::RuntimeError) => {
            tracing::warn!(path = %path.display(), "runtime error");
            std::process::exit(70)
        }
    }
}

fn run_repl(vm: &mut Vm) -> Result<()> {
    tracing::info!("starting repl");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let mut line_no = 0u64;
    loop {
        print!("> ");
        stdout.flush().ok();

        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line).context("lecture de stdin")?;
        if bytes_read == 0 {
            println!();
            break;
        }
        line_no += 1;
        tracing::trace!(line_no, "repl input");

        // Une erreur (compile ou runtime) est déjà signalée sur stderr par
        // la Vm ; la REPL continue avec la ligne suivante, comme clox.
        let _ = vm.interpret(&line);
    }

    tracing::info!(lines = line_no, "repl session ended");
    Ok(())
}

/// Native canonique de la spec (§6) : secondes CPU écoulées depuis le
/// démarrage du processus.
fn native_clock(_args: &[Value]) -> Value {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    Value::Number(start.elapsed().as_secs_f64())
}
