//! Bibliothèque de modules réutilisables pour le noyau
//!
//! Ce module contient des abstractions et des utilitaires communs
//! utilisés à travers tout le noyau.

pub mod collections;

pub use collections::*;
