//! vitte-cli/src/main.rs
//!
//! Point d'entrée du binaire `vitte`. Prépare l'environnement (rapports
//! d'erreurs, logs) puis délègue toute la logique à `vitte_cli::run()`.

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("⚠️  Impossible d'initialiser color-eyre: {e}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = vitte_cli::run() {
        eprintln!("❌ Erreur: {err:?}");

        if std::env::var("RUST_BACKTRACE").as_deref() == Ok("1") {
            eprintln!("\n📜 Backtrace:\n{}", err.backtrace());
        }

        std::process::exit(1);
    }
}
