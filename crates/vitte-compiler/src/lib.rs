//! vitte-compiler — scanner, parseur Pratt, résolveur de portée, émetteur
//! de bytecode.
//!
//! Point d'entrée unique : [`compile`]. Le compilateur partage le tas de
//! `vitte-core` avec la VM (il interne les identifiants et les littéraux
//! chaîne, et y alloue les `ObjFunction` qu'il construit) mais ne partage
//! aucun autre état mutable avec elle à l'exécution.

#![forbid(unsafe_code)]

mod compiler;
pub mod scanner;

pub use compiler::compile;

/// Une erreur de compilation structurée (spec §7 : `[line L] Error at
/// 'LEXEME': MESSAGE`). Gardée comme donnée plutôt qu'une simple chaîne
/// `anyhow`, parce que l'hôte (CLI, tests) a besoin de la ligne et du lexème
/// séparément.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[line {line}] Error{at}: {message}")]
pub struct Diagnostic {
    pub line: u32,
    pub message: String,
    /// Rendu ` at 'LEXEME'` ou ` at end`, déjà formaté pour l'affichage.
    at: String,
}

impl Diagnostic {
    fn new(line: u32, lexeme_context: Option<&str>, message: impl Into<String>) -> Self {
        let at = match lexeme_context {
            Some(lexeme) => format!(" at '{lexeme}'"),
            None => " at end".to_string(),
        };
        Self { line, message: message.into(), at }
    }
}

/// Résultat d'une compilation : toujours une fonction top-level valide (le
/// compilateur ne renvoie jamais d'erreur fatale, spec §8 invariant 1), plus
/// un indicateur d'échec que l'appelant doit consulter séparément.
pub struct CompileOutcome {
    pub function: vitte_core::ObjRef,
    pub had_error: bool,
    pub diagnostics: Vec<Diagnostic>,
}
