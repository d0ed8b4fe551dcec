//! vitte-core — valeurs, objets gérés, tas GC, table de hachage, chunk.
//!
//! Cœur partagé par `vitte-compiler` (qui émet des [`chunk::Chunk`]) et
//! `vitte-vm` (qui les exécute). Ce crate ne connaît ni la syntaxe du
//! langage ni la boucle de dispatch de la VM : il fournit le modèle de
//! données et le tas, rien d'autre.

#![forbid(unsafe_code)]

pub mod chunk;
pub mod heap;
pub mod object;
pub mod ops;
pub mod table;
pub mod value;

pub use chunk::Chunk;
pub use heap::{GcStats, Heap};
pub use object::{Object, ObjKind, ObjRef};
pub use ops::OpCode;
pub use table::Table;
pub use value::Value;

/// Erreurs propres au modèle de données et au tas (spec: "Allocation
/// failure", "Chunk corruption"). Les erreurs de compilation/exécution vivent
/// dans leurs crates respectifs, qui ont besoin de bien plus de contexte
/// (ligne, lexème) que ce que ce type générique pourrait porter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("chunk has too many constants (max {max})")]
    TooManyConstants { max: usize },

    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    #[error("out of memory")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, Error>;
