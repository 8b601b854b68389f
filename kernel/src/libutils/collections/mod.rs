//! Structures de données du noyau
//!
//! Les TCB et objets de synchronisation vivent dans des arènes indexées par
//! des poignées générationnelles : une poignée périmée est détectée au lieu
//! de pointer vers un objet réutilisé.

pub mod arena;

pub use arena::{Arena, ArenaKey};
